//! schema-enrich CLI - crawl a database into an enriched, prompt-ready schema.

mod responder;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use schema_enrich::{
    description_checkpoint_path, CheckpointStore, CommentMode, Config, CrawlError, Database,
    NoOpResponder, RenderOptions, Responder, SchemaCrawler,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

use crate::responder::CommandResponder;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "schema-enrich")]
#[command(about = "Crawl a relational schema and enrich it for prompting")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read the catalog and sample examples, then save the schema model
    Introspect,

    /// Introspect, classify fields and generate descriptions
    Enrich {
        /// Override comment mode: origin, merge, generation, no_comment
        #[arg(long = "mode")]
        comment_mode: Option<CommentMode>,

        /// Shell command answering one JSON request per call on stdin
        #[arg(long)]
        responder_cmd: Option<String>,

        /// Timeout in seconds for each responder call
        #[arg(long, default_value = "120")]
        responder_timeout: u64,

        /// Enrich a previously saved schema model instead of introspecting
        #[arg(long)]
        from_schema: Option<PathBuf>,

        /// Discard the classification and description checkpoints before starting
        #[arg(long)]
        fresh: bool,
    },

    /// Print a saved schema model as M-Schema text
    Render {
        /// Saved schema model [default: output.schema_file from the config]
        #[arg(long)]
        schema_file: Option<PathBuf>,

        /// Only these tables (comma-separated)
        #[arg(long, value_delimiter = ',')]
        tables: Option<Vec<String>>,

        /// Only these columns as table.column (comma-separated)
        #[arg(long, value_delimiter = ',')]
        columns: Option<Vec<String>>,

        /// Examples shown per field
        #[arg(long, default_value = "3")]
        example_num: usize,

        /// Show full declared types
        #[arg(long)]
        show_type_detail: bool,
    },

    /// Show classification and description checkpoint progress
    Progress,

    /// Test the database connection
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), CrawlError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(CrawlError::Config)?;

    // Rendering an explicit file needs no configuration
    if let Commands::Render {
        schema_file: Some(path),
        tables,
        columns,
        example_num,
        show_type_detail,
    } = &cli.command
    {
        let options = RenderOptions {
            selected_tables: tables.clone(),
            selected_columns: columns.clone(),
            example_num: *example_num,
            show_type_detail: *show_type_detail,
        };
        return render(path, &options);
    }

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Introspect => {
            let mut crawler = SchemaCrawler::connect(&config, Arc::new(NoOpResponder::new())).await?;
            crawler.introspect().await?;
            let model = crawler.model();
            model.save(&crawler.options().schema_file)?;
            crawler.close().await;

            if cli.output_json {
                println!("{}", model.to_json()?);
            } else {
                println!("\nIntrospection completed!");
                println!("  Database: {}", model.db_id);
                println!("  Tables: {}", model.tables.len());
                println!("  Fields: {}", model.field_count());
                println!("  Foreign keys: {}", model.foreign_keys.len());
                println!("  Saved to: {}", crawler.options().schema_file.display());
            }
        }

        Commands::Enrich {
            comment_mode,
            responder_cmd,
            responder_timeout,
            from_schema,
            fresh,
        } => {
            if let Some(mode) = comment_mode {
                config.enrichment.comment_mode = mode;
            }
            let responder: Arc<dyn Responder> = match responder_cmd {
                Some(cmd) => Arc::new(CommandResponder::new(
                    cmd,
                    Duration::from_secs(responder_timeout),
                )),
                None => Arc::new(NoOpResponder::new()),
            };
            info!("Using {} responder", responder.responder_type());

            let cancel_token = setup_signal_handler().await?;

            let mut crawler = SchemaCrawler::connect(&config, responder).await?;
            if let Some(path) = from_schema {
                crawler = crawler.with_model(Database::load(&path)?);
            }
            if fresh {
                crawler.reset_checkpoint();
            }

            let report = crawler.run(&cancel_token).await?;
            crawler.close().await;

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                let status_msg = if report.interrupted {
                    "Enrichment interrupted; rerun to resume."
                } else {
                    "Enrichment completed!"
                };
                println!("\n{}", status_msg);
                println!("  Database: {} ({})", report.db_id, report.dialect);
                println!("  Duration: {:.2}s", report.duration_seconds);
                println!("  Tables: {}", report.tables_total);
                println!(
                    "  Fields: {} ({} classified, {} restored, {} unclassified)",
                    report.fields_total,
                    report.fields_classified,
                    report.fields_restored,
                    report.fields_unclassified
                );
                println!(
                    "  Descriptions: {} generated, {} restored",
                    report.descriptions_generated, report.descriptions_restored
                );
                println!("  Responder calls: {}", report.responder_calls);
                println!("  Saved to: {}", report.schema_file);
            }
        }

        Commands::Render {
            schema_file: None,
            tables,
            columns,
            example_num,
            show_type_detail,
        } => {
            let options = RenderOptions {
                selected_tables: tables,
                selected_columns: columns,
                example_num,
                show_type_detail,
            };
            render(Path::new(&config.output.schema_file), &options)?;
        }

        // handled before loading the configuration
        Commands::Render { .. } => {}

        Commands::Progress => {
            let store = CheckpointStore::new(&config.output.checkpoint_file);
            let (tables, fields) = store.progress();
            let descriptions =
                CheckpointStore::new(description_checkpoint_path(&config.output.checkpoint_file));
            let (_, described) = descriptions.progress();

            if cli.output_json {
                let summary = serde_json::json!({
                    "checkpoint_file": store.path().display().to_string(),
                    "tables": tables,
                    "fields": fields,
                    "descriptions": described,
                });
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("Checkpoint: {}", store.path().display());
                println!("  Tables with classified fields: {}", tables);
                println!("  Fields classified: {}", fields);
                println!("  Descriptions saved: {}", described);
            }
        }

        Commands::HealthCheck => {
            let crawler = SchemaCrawler::connect(&config, Arc::new(NoOpResponder::new())).await?;
            let result = crawler.health_check().await;
            crawler.close().await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Database ({}): {} ({}ms)",
                    result.dialect,
                    if result.connected { "OK" } else { "FAILED" },
                    result.latency_ms
                );
                if let Some(ref err) = result.error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(CrawlError::Config("Health check failed".to_string()));
            }
        }
    }

    Ok(())
}

fn render(path: &Path, options: &RenderOptions) -> Result<(), CrawlError> {
    let model = Database::load(path)?;
    println!("{}", model.render(options));
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout carries results; logs go to stderr
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
async fn setup_signal_handler() -> Result<CancellationToken, CrawlError> {
    let cancel_token = CancellationToken::new();

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let token_int = cancel_token.clone();
    tokio::spawn(async move {
        sigint.recv().await;
        eprintln!("\nReceived SIGINT. Finishing the current field, then saving...");
        token_int.cancel();
    });

    let token_term = cancel_token.clone();
    tokio::spawn(async move {
        sigterm.recv().await;
        eprintln!("\nReceived SIGTERM. Finishing the current field, then saving...");
        token_term.cancel();
    });

    Ok(cancel_token)
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
async fn setup_signal_handler() -> Result<CancellationToken, CrawlError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Finishing the current field, then saving...");
            token.cancel();
        }
    });

    Ok(cancel_token)
}
