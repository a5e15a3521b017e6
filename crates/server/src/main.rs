use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gateway_core::{
    config_path, create_authenticator, load_config, validate_config, AuthMethod, Authenticator,
    Config, FixedWindowRateLimiter, HttpStageProvider, HttpWebhookDispatcher, JobOrchestrator,
    JobStore, Ledger, PipelineExecutor, SqliteJobStore, SqliteLedger, Tier, WebhookSecrets,
    ANONYMOUS_ACCOUNT,
};
use gateway_server::api::create_router;
use gateway_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = config_path();

    // Load configuration
    info!(version = VERSION, "Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Auth method: {:?}", config.auth.method);
    info!("Database path: {:?}", config.database.path);

    // Create authenticator
    let authenticator: Arc<dyn Authenticator> = Arc::from(
        create_authenticator(&config.auth).context("Failed to create authenticator")?,
    );
    info!("Using authenticator: {}", authenticator.method_name());

    // Create SQLite ledger and open configured accounts
    let ledger: Arc<dyn Ledger> = Arc::new(
        SqliteLedger::new(&config.database.path).context("Failed to create ledger")?,
    );
    open_accounts(ledger.as_ref(), &config)?;

    // Create SQLite job store
    let store: Arc<dyn JobStore> = Arc::new(
        SqliteJobStore::new(&config.database.path).context("Failed to create job store")?,
    );
    info!("Job store initialized");

    // Stage providers and pipeline
    let provider = HttpStageProvider::new(config.providers.clone())
        .context("Failed to create stage provider client")?;
    let executor = PipelineExecutor::new(
        Arc::new(provider),
        Duration::from_secs(config.providers.timeout_secs),
    );
    info!(
        enrich = %config.providers.enrich_url,
        upscale = %config.providers.upscale_url,
        infuse = %config.providers.infuse_url,
        "Stage providers configured"
    );

    // Webhooks
    let dispatcher = HttpWebhookDispatcher::new(&config.webhook)
        .context("Failed to create webhook client")?;
    let secrets = webhook_secrets(&config);

    let orchestrator = Arc::new(JobOrchestrator::new(
        config.orchestrator.clone(),
        config.pricing.clone(),
        Arc::clone(&ledger),
        store,
        Arc::new(executor),
        Arc::new(dispatcher),
        secrets,
    ));
    info!(
        max_concurrent_jobs = config.orchestrator.max_concurrent_jobs,
        "Job orchestrator initialized"
    );

    // Settle jobs a previous run left behind
    let recovered = orchestrator
        .recover()
        .context("Failed to recover unfinished jobs")?;
    info!(
        failed = recovered.failed,
        requeued = recovered.requeued,
        "Job recovery complete"
    );

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        authenticator,
        Arc::clone(&orchestrator),
        ledger,
        Arc::new(FixedWindowRateLimiter::new()),
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    // Let in-flight pipelines finish
    info!("Server shutting down, waiting for running jobs...");
    orchestrator.shutdown().await;
    info!("Job orchestrator stopped");

    Ok(())
}

/// Open every configured account. Existing balances are left untouched.
fn open_accounts(ledger: &dyn Ledger, config: &Config) -> Result<()> {
    for account in &config.accounts {
        let opened = ledger
            .open_account(&account.id, account.tier, account.initial_balance)
            .with_context(|| format!("Failed to open account {}", account.id))?;
        info!(
            account_id = %opened.id,
            tier = %opened.tier,
            balance = opened.balance,
            "Account ready"
        );
    }

    // Unauthenticated requests act as the anonymous account.
    if config.auth.method == AuthMethod::None
        && !config.accounts.iter().any(|a| a.id == ANONYMOUS_ACCOUNT)
    {
        warn!("Auth is disabled and no anonymous account is configured, opening it empty");
        ledger
            .open_account(ANONYMOUS_ACCOUNT, Tier::default(), 0)
            .context("Failed to open anonymous account")?;
    }

    Ok(())
}

fn webhook_secrets(config: &Config) -> WebhookSecrets {
    let per_account: HashMap<String, String> = config
        .accounts
        .iter()
        .filter_map(|a| a.webhook_secret.clone().map(|s| (a.id.clone(), s)))
        .collect();

    if per_account.is_empty() && config.webhook.signing_secret.is_none() {
        warn!("No webhook signing secrets configured, webhooks will be sent unsigned");
    }

    WebhookSecrets::new(per_account, config.webhook.signing_secret.clone())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
