use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use ingest::CsvReader;
use pipeline::{
    build_orchestrator, export, render_table, AppConfig, BatchRequest, LoadedSource, SourceKind,
    RESULTS_FILE_NAME,
};
use tracing_subscriber::EnvFilter;

const PREVIEW_ROWS: usize = 20;

/// Search the web for each row's entity and extract a fact with an LLM.
#[derive(Parser, Debug)]
#[command(name = "run_batch", version)]
#[command(group(ArgGroup::new("source").required(true).args(["csv", "sheet"])))]
struct Args {
    /// CSV file to read
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Google Sheets URL to read (first worksheet)
    #[arg(long)]
    sheet: Option<String>,

    /// Primary column holding the entity to search for
    #[arg(long)]
    column: Option<String>,

    /// Number of rows to process
    #[arg(long, default_value_t = 1)]
    rows: usize,

    /// Information to extract, e.g. "Extract the email address of {company}"
    #[arg(long)]
    template: Option<String>,

    /// Where to write the extracted results
    #[arg(long, default_value = RESULTS_FILE_NAME)]
    output: PathBuf,

    /// Also write results back to the source spreadsheet
    #[arg(long)]
    export_to_sheet: bool,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let config = AppConfig::from_env().context("Failed to load configuration")?;

    let source = match (&args.csv, &args.sheet) {
        (Some(path), _) => LoadedSource {
            table: CsvReader::read_file(path)
                .await
                .with_context(|| format!("Error reading CSV file {:?}", path))?,
            kind: SourceKind::Csv,
        },
        (None, Some(url)) => LoadedSource::from_sheet(url, &config)
            .await
            .context("Error fetching data from Google Sheets")?,
        (None, None) => anyhow::bail!("either --csv or --sheet is required"),
    };

    println!("=== Data Preview ===\n");
    println!("{}", render_table(&source.table, PREVIEW_ROWS));

    let (Some(column), Some(template)) = (args.column, args.template) else {
        println!("Columns: {}", source.table.columns().join(", "));
        println!("Pass --column and --template to run the extraction.");
        return Ok(());
    };

    let request = BatchRequest {
        column,
        rows: args.rows,
        template,
    };

    let orchestrator = build_orchestrator(&config);
    let report = orchestrator.run(&source.table, &request).await?;

    for result in &report.results {
        if let Some(failure) = result.failure() {
            eprintln!("Error in API call for {}: {}", result.entity, failure.message);
        }
    }

    println!("\n=== Extracted Information ===\n");
    println!(
        "{}",
        render_table(&export::results_table(&report.results), report.results.len())
    );

    let csv = export::to_csv(&report.results)?;
    tokio::fs::write(&args.output, csv)
        .await
        .with_context(|| format!("Failed to write {:?}", args.output))?;
    println!("✅ Results saved to {}", args.output.display());

    if args.export_to_sheet {
        match source.sheet() {
            Some(sheet) => {
                match export::export_to_worksheet(sheet, &config.export.worksheet, &report.results).await {
                    Ok(summary) => println!(
                        "✅ Exported {} rows to worksheet {}",
                        summary.rows_written, summary.worksheet
                    ),
                    // Results are already on disk; report and carry on
                    Err(e) => eprintln!("Error exporting data to Google Sheets: {}", e),
                }
            }
            None => eprintln!("--export-to-sheet only applies to a Google Sheet source"),
        }
    }

    Ok(())
}
