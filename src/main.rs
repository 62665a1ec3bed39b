//! complaint-lens CLI application
//!
//! Command-line interface for the complaint-lens library.

use clap::{Parser, Subcommand, ValueEnum};
use complaint_lens::utils::{format_file_size, preview};
use complaint_lens::{ComplaintPipeline, Config, StageSummary};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "complaint-lens")]
#[command(about = "Structured extraction, semantic search and dashboards over service complaints")]
#[command(version)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overrides the configured path
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Which model services to use
    #[arg(long, global = true, value_enum, default_value_t = Backend::Local)]
    backend: Backend,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Deterministic offline services
    Local,
    /// Hosted HTTP services
    Remote,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest complaints from a JSON array or JSON lines file
    Ingest {
        #[arg(required = true)]
        file: PathBuf,
    },

    /// Run structured extraction over complaint narratives
    Extract,

    /// Embed complaint narratives
    Embed,

    /// Catalog the images under a directory
    Catalog {
        dir: PathBuf,

        /// Extensions to include, comma separated
        #[arg(long, value_delimiter = ',')]
        ext: Vec<String>,
    },

    /// Embed catalogued images
    EmbedImages,

    /// Find complaints similar to a phrase
    Search {
        phrase: String,

        #[arg(short = 'k', long, default_value = "5")]
        top_k: usize,
    },

    /// Find images matching a phrase
    ImageSearch {
        phrase: String,

        #[arg(short = 'k', long, default_value = "5")]
        top_k: usize,
    },

    /// Daily counts with rolling baselines
    Anomalies {
        #[arg(long)]
        category: Option<String>,

        /// Window length in days
        #[arg(long)]
        window: Option<u32>,
    },

    /// Complaint counts per location and category
    Hotspots {
        /// Round coordinates to this many decimals before grouping
        #[arg(long)]
        precision: Option<u32>,
    },

    /// Show table sizes
    Stats,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    }
    .with_env_overrides();
    if let Some(database) = cli.database {
        config.database.path = database;
    }

    let mut pipeline = match cli.backend {
        Backend::Local => ComplaintPipeline::local(config)?,
        Backend::Remote => ComplaintPipeline::remote(config)?,
    };

    match cli.command {
        Commands::Ingest { file } => {
            let inserted = pipeline.ingest_complaints_file(&file)?;
            println!("✅ Ingested {} new complaints from {}", inserted, file.display());
        }
        Commands::Extract => {
            let spinner = spinner("Extracting structured fields...")?;
            let summary = pipeline.run_extraction().await;
            spinner.finish_and_clear();
            print_summary(&summary?);
        }
        Commands::Embed => {
            let spinner = spinner("Embedding complaint narratives...")?;
            let summary = pipeline.run_text_embedding().await;
            spinner.finish_and_clear();
            print_summary(&summary?);
        }
        Commands::Catalog { dir, ext } => {
            let extensions = (!ext.is_empty()).then_some(ext);
            let count = pipeline.catalog_images(&dir, extensions.as_deref())?;
            println!("🖼️  Catalogued {} images under {}", count, dir.display());
        }
        Commands::EmbedImages => {
            let spinner = spinner("Embedding images...")?;
            let summary = pipeline.run_image_embedding().await;
            spinner.finish_and_clear();
            print_summary(&summary?);
        }
        Commands::Search { phrase, top_k } => {
            println!("🔍 Searching for: \"{}\"", phrase);
            let matches = pipeline.semantic_search(&phrase, top_k).await?;
            if matches.is_empty() {
                println!("❌ No results found");
            }
            for (i, hit) in matches.iter().enumerate() {
                println!("{}. [{:.4}] {} ({})", i + 1, hit.distance, hit.id, hit.category);
                if let Some(text) = &hit.resolution {
                    println!("   {}", preview(text, 100));
                }
            }
        }
        Commands::ImageSearch { phrase, top_k } => {
            println!("🔍 Searching images for: \"{}\"", phrase);
            let matches = pipeline.image_search(&phrase, top_k).await?;
            if matches.is_empty() {
                println!("❌ No results found");
            }
            for (i, hit) in matches.iter().enumerate() {
                println!("{}. [{:.4}] {}", i + 1, hit.distance, hit.uri);
            }
        }
        Commands::Anomalies { category, window } => {
            let rows = pipeline.anomaly_view(category.as_deref(), window)?;
            println!("{:<30} {:<12} {:>6} {:>10}", "category", "day", "count", "rolling");
            for row in rows {
                let rolling = row
                    .rolling_average
                    .map(|avg| format!("{:.2}", avg))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<30} {:<12} {:>6} {:>10}",
                    preview(&row.category, 30),
                    row.day,
                    row.count,
                    rolling
                );
            }
        }
        Commands::Hotspots { precision } => {
            let cells = pipeline.hotspot_view(precision)?;
            println!("{:>6} {:<30} {}", "count", "category", "location");
            for cell in cells {
                println!(
                    "{:>6} {:<30} {}",
                    cell.count,
                    preview(&cell.category, 30),
                    cell.to_wkt()
                );
            }
        }
        Commands::Stats => {
            let stats = pipeline.stats()?;
            println!("📊 Database statistics");
            println!("   Complaints:           {}", stats.complaints);
            println!("   Extractions:          {}", stats.extractions);
            println!("   Rejected extractions: {}", stats.rejected_extractions);
            println!("   Text embeddings:      {}", stats.text_embeddings);
            println!("   Image references:     {}", stats.image_references);
            println!("   Image embeddings:     {}", stats.image_embeddings);
            println!(
                "   Size:                 {}",
                format_file_size(stats.file_size_bytes as u64)
            );
        }
    }

    Ok(())
}

fn spinner(message: &'static str) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")?);
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(120));
    Ok(bar)
}

fn print_summary(summary: &StageSummary) {
    println!("✅ Stage '{}' complete", summary.stage);
    println!("   📥 Input rows: {}", summary.input_rows);
    println!("   📝 Written:    {}", summary.written);
    if summary.rejected > 0 {
        println!("   ⚠️  Rejected:   {}", summary.rejected);
    }
}
