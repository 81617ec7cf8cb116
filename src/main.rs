//! Onstaq Automation Engine entry point.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use onstaq_automation::adapters::sqlite::{
    initialize_database, SqliteAutomationRepository, SqliteExecutionRepository,
    SqliteTriggerStateRepository, SqliteWebhookRepository,
};
use onstaq_automation::domain::ports::{
    AutomationFilter, AutomationRepository, ExecutionRepository, OnstaqApi,
    TriggerStateRepository, WebhookRepository,
};
use onstaq_automation::infrastructure::config::ConfigLoader;
use onstaq_automation::infrastructure::http::{self, AppState};
use onstaq_automation::infrastructure::logging;
use onstaq_automation::infrastructure::onstaq::OnstaqClient;
use onstaq_automation::services::{
    RuleProgramExecutor, TemplateResolver, TriggerManager, TriggerSink,
};
use onstaq_automation::EngineConfig;

#[derive(Parser)]
#[command(
    name = "onstaq-automation",
    about = "Automation engine for Onstaq workspaces",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to a YAML config file (overrides the default search).
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine: trigger watchers plus the HTTP surface (default).
    Serve,
    /// Apply database migrations and exit.
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    logging::init(&config.logging)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Migrate => {
            let pool = initialize_database(&config.database.url)
                .await
                .context("failed to initialize database")?;
            info!("migrations applied");
            pool.close().await;
            Ok(())
        }
        Commands::Serve => serve(config).await,
    }
}

async fn serve(config: EngineConfig) -> Result<()> {
    let pool = initialize_database(&config.database.url)
        .await
        .context("failed to initialize database")?;

    let api: Arc<dyn OnstaqApi> = Arc::new(
        OnstaqClient::new(&config.api).context("failed to build upstream client")?,
    );
    let automation_repo: Arc<dyn AutomationRepository> =
        Arc::new(SqliteAutomationRepository::new(pool.clone()));
    let execution_repo: Arc<dyn ExecutionRepository> =
        Arc::new(SqliteExecutionRepository::new(pool.clone()));
    let trigger_state_repo: Arc<dyn TriggerStateRepository> =
        Arc::new(SqliteTriggerStateRepository::new(pool.clone()));
    let webhook_repo: Arc<dyn WebhookRepository> =
        Arc::new(SqliteWebhookRepository::new(pool.clone()));

    let resolver = Arc::new(TemplateResolver::new(Arc::clone(&api)));
    let executor = Arc::new(RuleProgramExecutor::new(
        Arc::clone(&automation_repo),
        Arc::clone(&execution_repo),
        Arc::clone(&api),
        resolver,
        config.max_concurrent_executions,
    ));

    let sink: Arc<dyn TriggerSink> = executor.clone();
    let trigger_manager = TriggerManager::new(
        Arc::clone(&api),
        Arc::clone(&trigger_state_repo),
        sink,
        &config,
    );

    executor.start();
    let enabled = automation_repo
        .list(AutomationFilter {
            enabled: Some(true),
            ..AutomationFilter::default()
        })
        .await
        .context("failed to load enabled automations")?;
    info!(count = enabled.len(), "installing trigger watchers");
    trigger_manager.start_all(enabled).await;

    let state = AppState {
        automation_repo,
        execution_repo,
        webhook_repo,
        trigger_state_repo,
        api,
        executor: executor.clone(),
        trigger_manager: trigger_manager.clone(),
    };

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
    };
    http::serve(state, config.port, shutdown).await?;

    trigger_manager.stop_all().await;
    executor.stop().await;
    pool.close().await;
    info!("engine stopped");
    Ok(())
}
