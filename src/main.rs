mod db;
mod drive;
mod error;
mod links;
mod parser;
mod pipeline;
mod reconcile;
mod settings;
mod source;
mod status;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing::info;

use drive::{DriveFolderIndex, LocalFolderIndex};
use settings::{Overrides, Settings};
use source::{DocumentSource, PdftotextSource};
use status::HttpStatusLookup;

#[derive(Parser)]
#[command(
    name = "proa_extract",
    about = "Extract penalty records from notification documents into the PROA table"
)]
struct Cli {
    /// Directory with the documents (.pdf or .txt)
    #[arg(long, global = true)]
    documents_dir: Option<PathBuf>,
    /// SQLite database holding the table
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the destination table
    Init,
    /// Extract every document and reconcile into the table
    Run {
        /// Re-extract every document, even when the table is up to date
        #[arg(short, long)]
        force: bool,
    },
    /// Extract one document and print the record as JSON (no status lookup)
    Extract {
        file: PathBuf,
    },
    /// Hyperlink the stored process numbers to their documents
    Links,
    /// Show status statistics of the stored table
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let force = match cli.command {
        Commands::Run { force: true } => Some(true),
        _ => None,
    };
    let settings = Settings::load(&Overrides {
        documents_dir: cli.documents_dir,
        db_path: cli.db_path,
        force_refresh: force,
    })?;
    info!(
        "Documents: {}, database: {}",
        settings.documents_dir.display(),
        settings.db_path.display()
    );
    let today = chrono::Local::now().date_naive();

    let result = match cli.command {
        Commands::Init => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            println!(
                "Table '{}' ready in {}",
                db::TABLE,
                settings.db_path.display()
            );
            Ok(())
        }
        Commands::Run { .. } => {
            let conn = db::connect(&settings.db_path)?;
            let status = HttpStatusLookup::new(&settings.status_url, settings.status_timeout())?;
            let source = PdftotextSource;
            let summary = match settings.drive()? {
                Some((folder, token)) => {
                    let links = DriveFolderIndex::new(folder, token)?;
                    let services = pipeline::Services::new(&source, &status, &links);
                    pipeline::run(&conn, &settings, services, today).await?
                }
                None => {
                    let links = LocalFolderIndex::new(&settings.documents_dir);
                    let services = pipeline::Services::new(&source, &status, &links);
                    pipeline::run(&conn, &settings, services, today).await?
                }
            };
            summary.print();
            Ok(())
        }
        Commands::Extract { file } => {
            let doc = parser::Document::new(PdftotextSource.read_pages(&file));
            if doc.is_empty() {
                println!("No extractable text in {}", file.display());
                return Ok(());
            }
            let peek = parser::peek(&doc);
            let extraction = parser::process_document(&doc, &peek, &settings.extract_options());
            let record = extraction.into_record(String::new(), today);
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        Commands::Links => {
            let conn = db::connect(&settings.db_path)?;
            let attached = match settings.drive()? {
                Some((folder, token)) => {
                    pipeline::relink(&conn, &DriveFolderIndex::new(folder, token)?).await?
                }
                None => {
                    pipeline::relink(&conn, &LocalFolderIndex::new(&settings.documents_dir)).await?
                }
            };
            println!("Linked {} process numbers.", attached);
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&settings.db_path)?;
            let table = db::load_table(&conn)?;
            let s = db::get_stats(&table);
            println!("Total:      {}", s.total);
            println!("Ativos:     {}", s.active);
            println!("Com erro:   {}", s.errors);
            println!("Sem status: {}", s.without_status.len());
            if !s.by_status.is_empty() {
                println!("\n--- Status ---");
                for (status, n) in &s.by_status {
                    println!("{:>5}  {}", n, truncate(status, 60));
                }
            }
            if !s.without_status.is_empty() {
                println!("\n--- Sem retorno de status ---");
                for (proa, company) in &s.without_status {
                    println!("  {}  {}", proa, truncate(company, 50));
                }
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
