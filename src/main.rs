use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use payment_reconciler::config::AppConfig;
use payment_reconciler::models::{
    CanonicalColumn, ExtractedRecord, ReconField, RowId, EXPORT_COLUMNS,
};
use payment_reconciler::pipeline::Pipeline;
use payment_reconciler::storage::Session;
use payment_reconciler::utils::Timer;

#[derive(Parser)]
#[command(
    name = "payment-reconciler",
    about = "Scrape payment tables, reconcile against passbooks, export",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Extract payment records from a page and open a session
    Scrape {
        /// Page URL (http:// or https://)
        #[arg(required_unless_present = "file")]
        url: Option<String>,

        /// Read a saved HTML page instead of fetching
        #[arg(short, long, conflicts_with = "url")]
        file: Option<PathBuf>,
    },

    /// Print the records of a session
    Show { session: String },

    /// Set reconciliation fields, e.g. `CBU_PassBook=1200 CBU_Remarks=late`
    Update {
        session: String,
        row_id: String,
        #[arg(required = true, value_parser = parse_assignment)]
        fields: Vec<(String, String)>,
    },

    /// Add a row by hand, e.g. `Date=04/30/2024 Principal=500`
    AddRow {
        session: String,
        #[arg(required = true, value_parser = parse_assignment)]
        fields: Vec<(String, String)>,
    },

    /// Delete a row by id
    DeleteRow { session: String, row_id: String },

    /// Write the session to CSV
    Export {
        session: String,

        /// Output directory (default: export.out_dir)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Keep the session open after exporting
        #[arg(long)]
        keep: bool,
    },

    /// Remove expired sessions
    Purge,
}

fn parse_assignment(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected FIELD=VALUE, got `{}`", s))?;
    Ok((key.trim().to_string(), value.trim().to_string()))
}

fn recon_edits(fields: &[(String, String)]) -> Result<Vec<(ReconField, String)>> {
    fields
        .iter()
        .map(|(k, v)| {
            let field = k
                .parse::<ReconField>()
                .map_err(|e| anyhow!("{} (only PassBook/Variance/Remarks fields are editable)", e))?;
            Ok((field, v.clone()))
        })
        .collect()
}

fn manual_record(fields: &[(String, String)]) -> Result<ExtractedRecord> {
    let mut record = ExtractedRecord::default();
    for (key, value) in fields {
        if let Ok(column) = key.parse::<CanonicalColumn>() {
            record.fields.set(column, value.as_str());
        } else {
            let field = key.parse::<ReconField>()?;
            record.reconciliation.insert(field, value.clone());
        }
    }
    Ok(record)
}

fn print_session(session: &Session) {
    println!("─────────────────────────────────");
    println!("  Session : {}", session.id);
    println!("  Source  : {}", session.url);
    println!("  Records : {}", session.records.len());
    println!("─────────────────────────────────");
    for record in &session.records {
        let cells: Vec<String> = EXPORT_COLUMNS
            .iter()
            .filter_map(|c| {
                let v = record.value(*c);
                (!v.is_empty()).then(|| format!("{}={}", c.header(), v))
            })
            .collect();
        println!("  {}  {}", record.row_id, cells.join("  "));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "payment_reconciler=info,warn",
        1 => "payment_reconciler=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;
    let pipeline = Pipeline::new(config);

    match cli.command {
        Command::Scrape { url, file } => {
            let _t = Timer::start("Scrape");
            let session = match (file, url) {
                (Some(path), _) => pipeline.scrape_file(&path)?,
                (None, Some(url)) => pipeline.scrape_url(&url).await?,
                (None, None) => unreachable!("clap requires a url or --file"),
            };
            match session {
                Some(session) => print_session(&session),
                None => println!("No payment data found on the specified page."),
            }
        }

        Command::Show { session } => {
            print_session(&pipeline.load(&session)?);
        }

        Command::Update {
            session,
            row_id,
            fields,
        } => {
            let edits = recon_edits(&fields)?;
            let session = pipeline.update(&session, &RowId::from(row_id.as_str()), &edits)?;
            print_session(&session);
        }

        Command::AddRow { session, fields } => {
            let record = manual_record(&fields).context("Invalid row")?;
            let (row_id, session) = pipeline.add_row(&session, record)?;
            info!("New row id: {}", row_id);
            print_session(&session);
        }

        Command::DeleteRow { session, row_id } => {
            let session = pipeline.delete_row(&session, &RowId::from(row_id.as_str()))?;
            print_session(&session);
        }

        Command::Export { session, out, keep } => {
            let path = pipeline.export(&session, out.as_deref(), keep)?;
            println!("Exported to {}", path.display());
        }

        Command::Purge => {
            let n = pipeline.purge()?;
            println!("{} expired sessions removed.", n);
        }
    }

    Ok(())
}
