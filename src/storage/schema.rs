//! Database schema definitions

/// Database schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Source complaints; rows are never updated once ingested
pub const CREATE_COMPLAINTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS complaints (
    id TEXT PRIMARY KEY,
    category TEXT NOT NULL,
    resolution TEXT,
    created_at TEXT NOT NULL,
    latitude REAL,
    longitude REAL
);
CREATE INDEX IF NOT EXISTS idx_complaints_category ON complaints(category);
"#;

/// Output of the extraction stage
pub const CREATE_EXTRACTION_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS extractions (
    id TEXT PRIMARY KEY REFERENCES complaints(id),
    issue_category TEXT NOT NULL,
    severity INTEGER CHECK (severity IS NULL OR severity BETWEEN 1 AND 5),
    summary TEXT
);
CREATE TABLE IF NOT EXISTS rejected_extractions (
    id TEXT PRIMARY KEY REFERENCES complaints(id),
    raw_output TEXT NOT NULL,
    reason TEXT NOT NULL
);
"#;

/// Image catalog snapshot
pub const CREATE_IMAGE_REFERENCES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS image_references (
    uri TEXT PRIMARY KEY,
    content_type TEXT,
    size_bytes INTEGER NOT NULL,
    width INTEGER,
    height INTEGER,
    updated_at TEXT
);
"#;

/// Vector tables, keyed by complaint id or image URI
pub const CREATE_EMBEDDING_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS text_embeddings (
    id TEXT PRIMARY KEY,
    task TEXT NOT NULL,
    dimension INTEGER NOT NULL,
    embedding BLOB NOT NULL
);
CREATE TABLE IF NOT EXISTS image_embeddings (
    id TEXT PRIMARY KEY,
    task TEXT NOT NULL,
    dimension INTEGER NOT NULL,
    embedding BLOB NOT NULL
);
"#;

/// SQL for creating the metadata table
pub const CREATE_METADATA_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;
