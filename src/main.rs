use chrono::Utc;
use clap::{Parser, Subcommand};
use loan_eligibility::config::{LoggingSettings, Settings};
use loan_eligibility::core::BatchMatcher;
use loan_eligibility::models::{
    validate_rows, ApplicantRow, BatchNotification, HealthResponse, IngestReport,
};
use loan_eligibility::services::{
    ApplicantScope, ApplicantSource, ApplicantStore, BatchNotifier, NoopNotifier, PostgresStore,
    StoreError, WebhookNotifier,
};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "loan-eligibility", version, about = "Batch loan eligibility matching")]
struct Cli {
    /// Configuration file; defaults to config/default.toml + config/local.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Match unprocessed applicants against the active product catalog
    Run {
        /// Only match applicants from this ingestion batch
        #[arg(long)]
        batch_id: Option<String>,
        /// Cap on applicants pulled when no batch is given
        #[arg(long)]
        limit: Option<usize>,
        /// Reuse an existing match-batch id instead of generating one
        #[arg(long)]
        match_batch_id: Option<String>,
    },
    /// Validate and upsert applicant rows from a JSON array file
    Ingest {
        file: PathBuf,
        #[arg(long)]
        batch_id: Option<String>,
    },
    /// Re-send the workflow notification for an ingestion batch
    Trigger {
        /// Defaults to the most recent ingestion batch
        #[arg(long)]
        batch_id: Option<String>,
    },
    /// Check database connectivity
    Health,
}

fn init_logging(logging: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    match logging.format.as_str() {
        "pretty" => subscriber.pretty().init(),
        "json" => subscriber.json().init(),
        _ => subscriber.init(),
    }
}

async fn connect_store(settings: &Settings) -> Result<Arc<PostgresStore>, StoreError> {
    let db = &settings.database;
    let store = PostgresStore::from_settings(
        &db.url,
        db.max_connections,
        db.min_connections,
        db.acquire_timeout_secs,
        db.idle_timeout_secs,
    )
    .await
    .map_err(|e| {
        error!("Failed to connect to PostgreSQL: {}", e);
        e
    })?;

    info!(
        "PostgreSQL store initialized (max: {} connections)",
        db.max_connections.unwrap_or(10)
    );
    Ok(Arc::new(store))
}

async fn check_database(settings: &Settings) -> Result<(), StoreError> {
    connect_store(settings).await?.health_check().await?;
    Ok(())
}

fn build_notifier(settings: &Settings) -> Result<Arc<dyn BatchNotifier>, Box<dyn Error>> {
    match &settings.notification.webhook_url {
        Some(url) => {
            let timeout = Duration::from_secs(settings.notification.timeout_secs);
            info!("Workflow notifications enabled: {}", url);
            Ok(Arc::new(WebhookNotifier::new(url.clone(), timeout)?))
        }
        None => {
            info!("N8N_WEBHOOK_URL not configured, notifications disabled");
            Ok(Arc::new(NoopNotifier))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    init_logging(&settings.logging);
    info!("Configuration loaded successfully");

    let notifier = build_notifier(&settings)?;

    match cli.command {
        Command::Run {
            batch_id,
            limit,
            match_batch_id,
        } => {
            let scope = match batch_id {
                Some(id) => ApplicantScope::Batch(id),
                None => ApplicantScope::Unscoped {
                    limit: limit.unwrap_or(settings.matching.default_limit),
                },
            };

            let store = connect_store(&settings).await?;
            let matcher = BatchMatcher::new(store, notifier, settings.matcher_options());
            let report = match match_batch_id {
                Some(id) => matcher.run_with_batch_id(scope, &id).await?,
                None => matcher.run(scope).await?,
            };

            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Ingest { file, batch_id } => {
            let raw = std::fs::read_to_string(&file)?;
            let rows: Vec<ApplicantRow> = serde_json::from_str(&raw)?;
            let batch_id = batch_id.unwrap_or_else(|| Utc::now().format("%Y%m%d%H%M%S").to_string());

            info!("Ingesting {} rows from {} as batch {}", rows.len(), file.display(), batch_id);

            let validated = validate_rows(rows, &batch_id, settings.matching.error_cap);
            let store = connect_store(&settings).await?;
            let added = store.upsert_applicants(&validated.applicants).await?;

            if added > 0 {
                let notification = BatchNotification {
                    batch_id: batch_id.clone(),
                    user_count: added,
                    timestamp: Utc::now(),
                    manual_trigger: false,
                };
                if let Err(e) = notifier.batch_completed(&notification).await {
                    tracing::warn!("Failed to notify workflow of batch {}: {}", batch_id, e);
                }
            }

            let report = IngestReport {
                batch_id,
                applicants_added: added,
                applicants_failed: validated.rejected,
                errors: validated.errors,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Trigger { batch_id } => {
            let store = connect_store(&settings).await?;
            let batch_id = match batch_id {
                Some(id) => id,
                None => store
                    .latest_batch_id()
                    .await?
                    .ok_or("No applicant batches found")?,
            };

            let user_count = store.batch_size(&batch_id).await?;
            let notification = BatchNotification {
                batch_id,
                user_count,
                timestamp: Utc::now(),
                manual_trigger: true,
            };
            notifier.batch_completed(&notification).await?;

            println!("{}", serde_json::to_string_pretty(&notification)?);
        }
        Command::Health => {
            let response = HealthResponse::from_check(check_database(&settings).await);
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    Ok(())
}
