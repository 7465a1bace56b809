use clap::Parser;
use fincode_audit::{
    audit::AuditService,
    config::Settings,
    create_adapter,
    orchestrator::{AuditOrchestrator, OrchestratorConfig},
    RuleEngine,
};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fincode-audit", version, about = "Run the audit verification loop over extracted document data")]
struct Cli {
    /// Document data produced by the extraction step (JSON, or plain text)
    input: PathBuf,

    /// Only validate these rule ids (comma separated)
    #[arg(long, value_delimiter = ',')]
    rules: Option<Vec<String>>,

    /// Only load rules of this category
    #[arg(long)]
    category: Option<String>,

    /// Override MAX_RETRY_COUNT
    #[arg(long)]
    max_retries: Option<u32>,

    /// Override RULES_DIR
    #[arg(long)]
    rules_dir: Option<PathBuf>,

    /// Pretty-print the report
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut settings = Settings::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Some(max_retries) = cli.max_retries {
        settings.max_retries = max_retries;
    }
    if let Some(dir) = cli.rules_dir {
        settings.rules_dir = dir;
    }

    info!(mode = %settings.inference_mode, "FinCode audit starting");

    // Startup failures stop here, before any run
    let adapter = match create_adapter(&settings) {
        Ok(adapter) => adapter,
        Err(e) => {
            error!("Reasoning adapter could not be created: {}", e);
            return Err(Box::new(e) as Box<dyn std::error::Error>);
        }
    };

    let mut engine = RuleEngine::with_tolerance(settings.balance_tolerance);
    let loaded = engine.load(&settings.rules_dir, cli.category.as_deref());
    if loaded == 0 {
        warn!(path = %settings.rules_dir.display(), "No rules loaded, every run will be approved");
    }

    let orchestrator = Arc::new(AuditOrchestrator::new(
        adapter,
        Arc::new(engine),
        OrchestratorConfig::from_settings(&settings),
    ));
    let service = AuditService::new(orchestrator);

    let text = std::fs::read_to_string(&cli.input)?;
    let raw_input = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

    let audit_id = service.start_audit(raw_input, cli.rules).await;
    let report = service
        .get_result(audit_id)
        .await
        .ok_or("audit report missing from log")?;

    let rendered = if cli.pretty {
        serde_json::to_string_pretty(report.as_ref())?
    } else {
        serde_json::to_string(report.as_ref())?
    };
    println!("{}", rendered);

    info!(
        audit_id = %audit_id,
        outcome = %report.outcome,
        retry_count = report.retry_count,
        "Audit finished"
    );

    Ok(())
}
