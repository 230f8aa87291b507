//! CLI parser and command dispatch.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Settings;

#[derive(Parser)]
#[command(name = "invox")]
#[command(about = "Multi-tenant invoice OCR and AI extraction pipeline")]
#[command(version)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the API server and processing worker
    Serve,
    /// Register an invoice file and run the pipeline on it once
    Ingest {
        /// Path to the invoice file (image or PDF)
        file: PathBuf,
        /// Owning tenant id
        #[arg(long)]
        tenant: String,
        /// Path to client-produced OCR text; skips server-side recognition
        #[arg(long)]
        ocr_text: Option<PathBuf>,
        /// Confidence of the client-produced OCR (0-100)
        #[arg(long, default_value_t = 0)]
        ocr_confidence: u8,
    },
    /// Print the status payload for a job
    Status {
        job_id: String,
        /// Tenant the job belongs to
        #[arg(long)]
        tenant: String,
    },
    /// Database management
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
}

#[derive(Subcommand)]
enum DbCommand {
    /// Create the schema
    Init,
}

/// Early verbosity check, before the full parser runs.
pub fn is_verbose() -> bool {
    std::env::args().any(|a| a == "-v" || a == "--verbose")
}

/// Parse arguments and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Command::Serve => commands::serve::cmd_serve(&settings).await,
        Command::Ingest {
            file,
            tenant,
            ocr_text,
            ocr_confidence,
        } => commands::ingest::cmd_ingest(&settings, &file, &tenant, ocr_text, ocr_confidence).await,
        Command::Status { job_id, tenant } => {
            commands::status::cmd_status(&settings, &job_id, &tenant)
        }
        Command::Db {
            command: DbCommand::Init,
        } => commands::db::cmd_init(&settings),
    }
}
