//! flightcheck CLI - Inspect, correct and export validation errors
//!
//! # Main Commands
//!
//! ```bash
//! flightcheck serve                          # Start HTTP server (port 3000)
//! flightcheck summary errors.json           # Totals per category
//! flightcheck page errors.json DATE_ERRORS 2
//! flightcheck correct errors.json fixes.json
//! flightcheck export errors.json -c fixes.json --out-dir out/
//! flightcheck snapshot list                 # Manage stored snapshots
//! ```
//!
//! # Codec Commands
//!
//! ```bash
//! flightcheck encode errors.json            # ErrorData -> compact form
//! flightcheck decode compact.json           # compact form -> ErrorData
//! flightcheck rows dataset.csv              # dataset CSV -> rows_data JSON
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use flightcheck::{
    codec, export_bundle, export_clean, export_errors, export_group, group_view,
    load_error_data_file, CorrectionLedger, CsvFile, EngineConfig, OptimizedErrorData,
    SnapshotRegistry,
};
use flightcheck::pipeline::{load_corrections, load_rows_data};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "flightcheck")]
#[command(about = "Validation-error reporting for flight record datasets", long_about = None)]
struct Cli {
    /// Instances per page (overrides FLIGHTCHECK_PAGE_SIZE)
    #[arg(long, global = true)]
    page_size: Option<usize>,

    /// Snapshot directory (overrides FLIGHTCHECK_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportChoice {
    Clean,
    Errors,
    Both,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the error summary of an ErrorData file
    Summary {
        /// Input ErrorData JSON
        input: PathBuf,
    },

    /// Print pagination metadata
    Metadata {
        /// Input ErrorData JSON
        input: PathBuf,
    },

    /// Print one page of a category
    Page {
        /// Input ErrorData JSON
        input: PathBuf,
        /// Category name
        category: String,
        /// 1-based page number
        page: usize,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Encode ErrorData into the compact positional form
    Encode {
        /// Input ErrorData JSON
        input: PathBuf,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Decode a compact payload back into ErrorData
    Decode {
        /// Input compact JSON
        input: PathBuf,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show sequence buckets, highlights and locked columns
    Sequences {
        /// Input ErrorData JSON
        input: PathBuf,
        /// Only this category
        #[arg(short, long)]
        category: Option<String>,
    },

    /// Apply a corrections batch and report rejections
    Correct {
        /// Input ErrorData JSON
        input: PathBuf,
        /// Corrections JSON: {"<row_idx>": {"<column>": value}}
        corrections: PathBuf,
        /// Write corrected rows_data here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write clean and/or errors CSV exports
    Export {
        /// Input ErrorData JSON
        input: PathBuf,
        /// Corrections JSON to apply first
        #[arg(short, long)]
        corrections: Option<PathBuf>,
        /// Which export to write
        #[arg(short, long, value_enum, default_value = "both")]
        kind: ExportChoice,
        /// Export a single group of this category (requires --reason)
        #[arg(long, requires = "reason")]
        category: Option<String>,
        /// Group reason for --category
        #[arg(long, requires = "category")]
        reason: Option<String>,
        /// Base file name (default: input file stem)
        #[arg(short, long)]
        name: Option<String>,
        /// Output directory
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Read a dataset CSV into rows_data JSON
    Rows {
        /// Input CSV file
        input: PathBuf,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Manage stored snapshots
    Snapshot {
        #[command(subcommand)]
        action: SnapshotAction,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on (overrides FLIGHTCHECK_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(Subcommand)]
enum SnapshotAction {
    /// Store an ErrorData file as a new snapshot
    Save {
        /// Input ErrorData JSON
        input: PathBuf,
        /// Name for the snapshot
        #[arg(short, long)]
        name: Option<String>,
    },

    /// List all stored snapshots
    List,

    /// Show metadata of a snapshot
    Show {
        /// Snapshot ID
        id: String,
    },

    /// Delete a snapshot
    Delete {
        /// Snapshot ID
        id: String,
    },
}

type CmdResult = Result<(), Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match load_config(&cli) {
        Ok(config) => run(cli.command, config).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let mut config = EngineConfig::from_env()?;
    if let Some(page_size) = cli.page_size {
        if page_size == 0 {
            return Err("--page-size must be at least 1".into());
        }
        config.page_size = page_size;
    }
    if let Some(ref dir) = cli.data_dir {
        config.data_dir = dir.clone();
    }
    Ok(config)
}

async fn run(command: Commands, config: EngineConfig) -> CmdResult {
    match command {
        Commands::Summary { input } => cmd_summary(&input),
        Commands::Metadata { input } => cmd_metadata(&input, &config),
        Commands::Page {
            input,
            category,
            page,
            output,
        } => cmd_page(&input, &category, page, output.as_deref(), &config),
        Commands::Encode { input, output } => cmd_encode(&input, output.as_deref()),
        Commands::Decode { input, output } => cmd_decode(&input, output.as_deref()),
        Commands::Sequences { input, category } => cmd_sequences(&input, category.as_deref()),
        Commands::Correct {
            input,
            corrections,
            output,
        } => cmd_correct(&input, &corrections, output.as_deref()),
        Commands::Export {
            input,
            corrections,
            kind,
            category,
            reason,
            name,
            out_dir,
        } => {
            let group = category.zip(reason);
            cmd_export(
                &input,
                corrections.as_deref(),
                kind,
                group,
                name,
                &out_dir,
            )
        }
        Commands::Rows { input, output } => cmd_rows(&input, output.as_deref()),
        Commands::Snapshot { action } => cmd_snapshot(action, &config),
        Commands::Serve { port } => {
            let mut config = config;
            if let Some(port) = port {
                config.port = port;
            }
            flightcheck::server::start_server(config).await
        }
    }
}

fn cmd_summary(input: &Path) -> CmdResult {
    let data = load_error_data_file(input)?;
    write_json(&data.summary, None)
}

fn cmd_metadata(input: &Path, config: &EngineConfig) -> CmdResult {
    let data = load_error_data_file(input)?;
    write_json(&codec::metadata(&data, config.page_size)?, None)
}

fn cmd_page(
    input: &Path,
    category: &str,
    page: usize,
    output: Option<&Path>,
    config: &EngineConfig,
) -> CmdResult {
    let data = load_error_data_file(input)?;
    let page = codec::page(&data, category, page, config.page_size)?;
    eprintln!(
        "📄 {} page {}/{} ({} errors)",
        page.category_name, page.page, page.total_pages, page.errors_on_page
    );
    write_json(&page, output)
}

fn cmd_encode(input: &Path, output: Option<&Path>) -> CmdResult {
    let data = load_error_data_file(input)?;
    let compact = codec::encode(&data);
    eprintln!("📦 {} field names interned", compact.meta.field_map.len());
    write_json(&compact, output)
}

fn cmd_decode(input: &Path, output: Option<&Path>) -> CmdResult {
    let content = fs::read_to_string(input)?;
    let payload: OptimizedErrorData = serde_json::from_str(&content)?;
    let data = codec::decode(&payload)?;
    eprintln!(
        "✅ Decoded {} errors on {} rows",
        data.summary.total_errors, data.summary.error_rows
    );
    write_json(&data, output)
}

fn cmd_sequences(input: &Path, category: Option<&str>) -> CmdResult {
    let data = load_error_data_file(input)?;
    let views: Vec<_> = data
        .categories
        .iter()
        .filter(|c| category.map_or(true, |name| c.name == name))
        .flat_map(|c| c.errors.iter())
        .filter(|g| g.is_sequence())
        .map(group_view)
        .collect();

    if views.is_empty() {
        eprintln!("No sequence errors found.");
        return Ok(());
    }
    write_json(&views, None)
}

fn cmd_correct(input: &Path, corrections: &Path, output: Option<&Path>) -> CmdResult {
    let data = load_error_data_file(input)?;
    let batch = load_corrections(corrections)?;

    let mut ledger = CorrectionLedger::new();
    let outcome = ledger.submit_batch(&data, batch);
    eprintln!(
        "✏️  {} corrections accepted, {} rejected",
        outcome.accepted,
        outcome.rejected.len()
    );
    for rejection in &outcome.rejected {
        eprintln!("   - row {} '{}': {}", rejection.row_idx, rejection.column, rejection.reason);
    }

    if let Some(path) = output {
        write_json(&ledger.materialize(&data), Some(path))?;
    }
    write_json(&outcome, None)
}

fn cmd_export(
    input: &Path,
    corrections: Option<&Path>,
    kind: ExportChoice,
    group: Option<(String, String)>,
    name: Option<String>,
    out_dir: &Path,
) -> CmdResult {
    let data = load_error_data_file(input)?;
    let mut ledger = CorrectionLedger::new();
    if let Some(path) = corrections {
        let outcome = ledger.submit_batch(&data, load_corrections(path)?);
        if !outcome.rejected.is_empty() {
            eprintln!("⚠️  {} corrections rejected", outcome.rejected.len());
        }
    }

    let base = name.unwrap_or_else(|| {
        input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("export")
            .to_string()
    });

    fs::create_dir_all(out_dir)?;

    if let Some((category, reason)) = group {
        let file = export_group(&data, &ledger, &category, &reason)?;
        return write_csv(&file, out_dir);
    }

    match kind {
        ExportChoice::Clean => write_csv(&export_clean(&data, &ledger, &base)?, out_dir),
        ExportChoice::Errors => write_csv(&export_errors(&data, &ledger, &base)?, out_dir),
        ExportChoice::Both => {
            let bundle = export_bundle(&data, &ledger, &base)?;
            for file in bundle.clean.iter().chain(bundle.errors.iter()) {
                write_csv(file, out_dir)?;
            }
            Ok(())
        }
    }
}

fn cmd_rows(input: &Path, output: Option<&Path>) -> CmdResult {
    let rows = load_rows_data(input)?;
    write_json(&rows, output)
}

fn cmd_snapshot(action: SnapshotAction, config: &EngineConfig) -> CmdResult {
    let mut registry = SnapshotRegistry::with_dir(&config.data_dir);

    match action {
        SnapshotAction::Save { input, name } => {
            let data = load_error_data_file(&input)?;
            let snapshot_name = name.unwrap_or_else(|| {
                input
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("snapshot")
                    .to_string()
            });
            let id = registry.save(data, &snapshot_name)?;
            eprintln!("✅ Snapshot saved with ID: {}", id);
            println!("{}", id);
        }

        SnapshotAction::List => {
            let snapshots = registry.list();
            if snapshots.is_empty() {
                eprintln!("📋 No snapshots stored yet.");
                eprintln!("   Use 'flightcheck snapshot save <file>' to add one.");
                return Ok(());
            }

            eprintln!("📋 Stored snapshots ({}):\n", snapshots.len());
            for s in snapshots {
                println!("  📄 {} ({})", s.name, s.id);
                println!("     Created: {}", s.created_at);
                println!("     Errors: {} on {} rows", s.total_errors, s.error_rows);
                println!("     Categories: {}", s.categories.join(", "));
                println!();
            }
        }

        SnapshotAction::Show { id } => {
            let snapshot = registry.get(&id)?;
            write_json(&snapshot.info, None)?;
            write_json(&codec::metadata(&snapshot.data, config.page_size)?, None)?;
        }

        SnapshotAction::Delete { id } => {
            registry.delete(&id)?;
            eprintln!("🗑️  Snapshot deleted: {}", id);
        }
    }

    Ok(())
}

fn write_json<T: Serialize>(value: &T, path: Option<&Path>) -> CmdResult {
    let json = serde_json::to_string_pretty(value)?;
    write_output(&json, path)
}

fn write_csv(file: &CsvFile, out_dir: &Path) -> CmdResult {
    let path = out_dir.join(&file.filename);
    fs::write(&path, file.bytes())?;
    eprintln!("💾 {} rows written to: {}", file.rows, path.display());
    Ok(())
}

fn write_output(content: &str, path: Option<&Path>) -> CmdResult {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
