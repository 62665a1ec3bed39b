//! SQLite database operations for complaint-lens
//!
//! Holds the source relations and every stage's output table. Stage outputs are
//! replaced wholesale inside one transaction.

use crate::error::{LensError, Result};
use crate::ml::{Embedding, EmbeddingRecord, TaskType};
use crate::records::{ComplaintRecord, ImageReference};
use crate::stages::{ExtractionReport, RejectedExtraction, StructuredExtraction};
use crate::storage::schema::*;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;

/// Persisted vector tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorTable {
    Text,
    Image,
}

impl VectorTable {
    fn table_name(&self) -> &'static str {
        match self {
            VectorTable::Text => "text_embeddings",
            VectorTable::Image => "image_embeddings",
        }
    }
}

/// Database connection and operations
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) a database file
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| LensError::Storage(format!("Failed to open database: {}", e)))?;

        let mut db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    pub fn memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            LensError::Storage(format!("Failed to create in-memory database: {}", e))
        })?;

        let mut db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    fn initialize(&mut self) -> Result<()> {
        let _: String = self
            .conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .map_err(|e| LensError::Storage(format!("Failed to enable WAL mode: {}", e)))?;
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| LensError::Storage(format!("Failed to enable foreign keys: {}", e)))?;

        for (name, sql) in [
            ("complaints", CREATE_COMPLAINTS_TABLE),
            ("extraction", CREATE_EXTRACTION_TABLES),
            ("image reference", CREATE_IMAGE_REFERENCES_TABLE),
            ("embedding", CREATE_EMBEDDING_TABLES),
            ("metadata", CREATE_METADATA_TABLE),
        ] {
            self.conn.execute_batch(sql).map_err(|e| {
                LensError::Storage(format!("Failed to create {} tables: {}", name, e))
            })?;
        }

        self.conn
            .execute(
                "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?)",
                params![SCHEMA_VERSION.to_string()],
            )
            .map_err(|e| LensError::Storage(format!("Failed to set schema version: {}", e)))?;

        log::debug!("Database initialized with schema version {}", SCHEMA_VERSION);
        Ok(())
    }

    /// Insert complaints; ids already present are left untouched
    pub fn insert_complaints(&mut self, complaints: &[ComplaintRecord]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT OR IGNORE INTO complaints (id, category, resolution, created_at, latitude, longitude)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )?;
            for c in complaints {
                inserted += stmt
                    .execute(params![
                        c.id,
                        c.category,
                        c.resolution,
                        c.created_at,
                        c.latitude,
                        c.longitude
                    ])
                    .map_err(|e| {
                        LensError::Storage(format!("Failed to insert complaint {}: {}", c.id, e))
                    })?;
            }
        }
        tx.commit()?;

        log::info!(
            "Inserted {} of {} complaints ({} already present)",
            inserted,
            complaints.len(),
            complaints.len() - inserted
        );
        Ok(inserted)
    }

    /// Every complaint, ordered by id
    pub fn load_complaints(&self) -> Result<Vec<ComplaintRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, category, resolution, created_at, latitude, longitude FROM complaints ORDER BY id",
        )?;
        let rows = stmt.query_map([], Self::row_to_complaint)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Complaint by id
    pub fn get_complaint(&self, id: &str) -> Result<Option<ComplaintRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, category, resolution, created_at, latitude, longitude FROM complaints WHERE id = ?",
        )?;
        Ok(stmt
            .query_row(params![id], Self::row_to_complaint)
            .optional()?)
    }

    /// Replace both extraction tables with one run's output
    pub fn replace_extractions(&mut self, report: &ExtractionReport) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM extractions", [])?;
        tx.execute("DELETE FROM rejected_extractions", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO extractions (id, issue_category, severity, summary) VALUES (?, ?, ?, ?)",
            )?;
            for row in &report.accepted {
                stmt.execute(params![row.id, row.issue_category, row.severity, row.summary])
                    .map_err(|e| {
                        LensError::Storage(format!("Failed to insert extraction {}: {}", row.id, e))
                    })?;
            }

            let mut stmt = tx.prepare(
                "INSERT INTO rejected_extractions (id, raw_output, reason) VALUES (?, ?, ?)",
            )?;
            for row in &report.rejected {
                stmt.execute(params![row.id, row.raw_output, row.reason])?;
            }
        }
        tx.commit()?;

        log::info!(
            "Stored {} extractions and {} rejections",
            report.accepted.len(),
            report.rejected.len()
        );
        Ok(())
    }

    pub fn load_extractions(&self) -> Result<Vec<StructuredExtraction>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, issue_category, severity, summary FROM extractions ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(StructuredExtraction {
                id: row.get(0)?,
                issue_category: row.get(1)?,
                severity: row.get(2)?,
                summary: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn load_rejected_extractions(&self) -> Result<Vec<RejectedExtraction>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, raw_output, reason FROM rejected_extractions ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(RejectedExtraction {
                id: row.get(0)?,
                raw_output: row.get(1)?,
                reason: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Replace the image catalog snapshot
    pub fn replace_image_references(&mut self, images: &[ImageReference]) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM image_references", [])?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO image_references (uri, content_type, size_bytes, width, height, updated_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )?;
            for image in images {
                stmt.execute(params![
                    image.uri,
                    image.content_type,
                    image.size_bytes as i64,
                    image.width,
                    image.height,
                    image.updated_at
                ])?;
            }
        }
        tx.commit()?;
        log::info!("Stored {} image references", images.len());
        Ok(())
    }

    pub fn load_image_references(&self) -> Result<Vec<ImageReference>> {
        let mut stmt = self.conn.prepare(
            "SELECT uri, content_type, size_bytes, width, height, updated_at FROM image_references ORDER BY uri",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ImageReference {
                uri: row.get(0)?,
                content_type: row.get(1)?,
                size_bytes: row.get::<_, i64>(2)? as u64,
                width: row.get(3)?,
                height: row.get(4)?,
                updated_at: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Replace a vector table with a new snapshot
    pub fn replace_embeddings(
        &mut self,
        table: VectorTable,
        records: &[EmbeddingRecord],
    ) -> Result<()> {
        let name = table.table_name();
        let tx = self.conn.transaction()?;
        tx.execute(&format!("DELETE FROM {}", name), [])?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} (id, task, dimension, embedding) VALUES (?, ?, ?, ?)",
                name
            ))?;
            for record in records {
                stmt.execute(params![
                    record.id,
                    record.embedding.task().as_str(),
                    record.embedding.dimension() as i64,
                    encode_vector(record.embedding.values()),
                ])
                .map_err(|e| {
                    LensError::Storage(format!("Failed to insert vector {}: {}", record.id, e))
                })?;
            }
        }
        tx.commit()?;
        log::info!("Stored {} vectors in {}", records.len(), name);
        Ok(())
    }

    /// Every row of a vector table, ordered by id
    pub fn load_embeddings(&self, table: VectorTable) -> Result<Vec<EmbeddingRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, task, dimension, embedding FROM {} ORDER BY id",
            table.table_name()
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Vec<u8>>(3)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, task, dimension, blob) = row?;
            let values = decode_vector(&blob);
            if values.len() as i64 != dimension {
                return Err(LensError::Storage(format!(
                    "Vector {} is corrupt: {} values, expected {}",
                    id,
                    values.len(),
                    dimension
                )));
            }
            records.push(EmbeddingRecord {
                id,
                embedding: Embedding::new(values, TaskType::parse(&task)?),
            });
        }
        Ok(records)
    }

    /// Row counts and file size
    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let count = |table: &str| -> Result<usize> {
            let n: i64 =
                self.conn
                    .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                        row.get(0)
                    })?;
            Ok(n as usize)
        };

        let file_size: i64 = self
            .conn
            .query_row(
                "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
                [],
                |row| row.get(0),
            )
            .map_err(|e| LensError::Storage(format!("Failed to get database size: {}", e)))?;

        Ok(DatabaseStats {
            complaints: count("complaints")?,
            extractions: count("extractions")?,
            rejected_extractions: count("rejected_extractions")?,
            text_embeddings: count("text_embeddings")?,
            image_references: count("image_references")?,
            image_embeddings: count("image_embeddings")?,
            file_size_bytes: file_size as usize,
        })
    }

    fn row_to_complaint(row: &Row) -> rusqlite::Result<ComplaintRecord> {
        Ok(ComplaintRecord {
            id: row.get(0)?,
            category: row.get(1)?,
            resolution: row.get(2)?,
            created_at: row.get(3)?,
            latitude: row.get(4)?,
            longitude: row.get(5)?,
        })
    }
}

fn encode_vector(values: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * 4);
    for &val in values {
        bytes.extend_from_slice(&val.to_le_bytes());
    }
    bytes
}

fn decode_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Database statistics
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseStats {
    pub complaints: usize,
    pub extractions: usize,
    pub rejected_extractions: usize,
    pub text_embeddings: usize,
    pub image_references: usize,
    pub image_embeddings: usize,
    pub file_size_bytes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn complaint(id: &str) -> ComplaintRecord {
        ComplaintRecord {
            id: id.to_string(),
            category: "Street Condition".to_string(),
            resolution: Some(format!("Resolution for {}", id)),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
            latitude: Some(40.7),
            longitude: Some(-73.9),
        }
    }

    #[test]
    fn test_complaints_round_trip_and_immutability() {
        let mut db = Database::memory().unwrap();
        assert_eq!(db.insert_complaints(&[complaint("b"), complaint("a")]).unwrap(), 2);

        let mut changed = complaint("a");
        changed.category = "Noise".to_string();
        assert_eq!(db.insert_complaints(&[changed]).unwrap(), 0);

        let loaded = db.load_complaints().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0], complaint("a"));
        assert!(db.get_complaint("zzz").unwrap().is_none());
    }

    #[test]
    fn test_extractions_are_replaced() {
        let mut db = Database::memory().unwrap();
        db.insert_complaints(&[complaint("a"), complaint("b")]).unwrap();

        let first = ExtractionReport {
            accepted: vec![StructuredExtraction {
                id: "a".into(),
                issue_category: "pothole".into(),
                severity: Some(3),
                summary: Some("Filled.".into()),
            }],
            rejected: vec![RejectedExtraction {
                id: "b".into(),
                raw_output: "oops".into(),
                reason: "malformed JSON".into(),
            }],
        };
        db.replace_extractions(&first).unwrap();
        db.replace_extractions(&first).unwrap();
        assert_eq!(db.load_extractions().unwrap(), first.accepted);
        assert_eq!(db.load_rejected_extractions().unwrap(), first.rejected);

        db.replace_extractions(&ExtractionReport::default()).unwrap();
        assert!(db.load_extractions().unwrap().is_empty());
        assert!(db.load_rejected_extractions().unwrap().is_empty());
    }

    #[test]
    fn test_extraction_requires_existing_complaint() {
        let mut db = Database::memory().unwrap();
        let orphan = ExtractionReport {
            accepted: vec![StructuredExtraction {
                id: "ghost".into(),
                issue_category: "noise".into(),
                severity: None,
                summary: None,
            }],
            rejected: Vec::new(),
        };
        assert!(db.replace_extractions(&orphan).is_err());
    }

    #[test]
    fn test_vectors_round_trip() {
        let mut db = Database::memory().unwrap();
        let records = vec![
            EmbeddingRecord {
                id: "b".into(),
                embedding: Embedding::new(vec![0.25, -1.5, 3.0], TaskType::RetrievalDocument),
            },
            EmbeddingRecord {
                id: "a".into(),
                embedding: Embedding::new(vec![1.0, 0.0, 0.0], TaskType::RetrievalDocument),
            },
        ];
        db.replace_embeddings(VectorTable::Text, &records).unwrap();

        let loaded = db.load_embeddings(VectorTable::Text).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0], records[1]);
        assert_eq!(loaded[1], records[0]);
        assert!(db.load_embeddings(VectorTable::Image).unwrap().is_empty());
    }

    #[test]
    fn test_image_references_and_stats() {
        let mut db = Database::memory().unwrap();
        let image = ImageReference {
            uri: "file:///tmp/pothole.jpg".into(),
            content_type: Some("image/jpeg".into()),
            size_bytes: 2048,
            width: Some(640),
            height: Some(480),
            updated_at: Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()),
        };
        db.replace_image_references(std::slice::from_ref(&image)).unwrap();
        assert_eq!(db.load_image_references().unwrap(), vec![image]);

        db.insert_complaints(&[complaint("a")]).unwrap();
        let stats = db.get_stats().unwrap();
        assert_eq!(stats.complaints, 1);
        assert_eq!(stats.image_references, 1);
        assert_eq!(stats.extractions, 0);
        assert!(stats.file_size_bytes > 0);
    }

    #[test]
    fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lens.db");
        {
            let mut db = Database::new(&path).unwrap();
            db.insert_complaints(&[complaint("a")]).unwrap();
        }
        let db = Database::new(&path).unwrap();
        assert_eq!(db.load_complaints().unwrap().len(), 1);
    }
}
