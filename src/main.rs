//! Regions Updater - Main CLI Application
//!
//! Keeps a ranked list of low-latency VPN regions in an object store until
//! interrupted with SIGINT or SIGTERM.

use clap::Parser;
use regions_updater::{
    catalog::CatalogClient,
    cli::Cli,
    config::{display_config_summary, load_config, EnvManager},
    error::{AppError, Result},
    logging::Logger,
    orchestrator::Orchestrator,
    persist::{FileObjectStore, SnapshotPersister},
    probe::TcpProber,
    BUILD_TIME, GIT_COMMIT, PKG_NAME, TARGET_TRIPLE, VERSION,
};
use std::io::IsTerminal;
use std::process;
use std::sync::Arc;
use uuid::Uuid;

#[tokio::main]
async fn main() {
    // Set up better panic handling
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panic: {}", panic_info);
        process::exit(99);
    }));

    // .env goes first so that it can feed flags backed by environment variables
    if let Err(e) = EnvManager::load_env_file() {
        exit_with(&e);
    }

    let cli = Cli::parse();

    if let Err(e) = run_application(cli).await {
        exit_with(&e);
    }
}

fn exit_with(error: &AppError) -> ! {
    eprintln!("{}", error.format_for_console(std::io::stderr().is_terminal()));
    print_error_suggestions(error);
    process::exit(error.exit_code());
}

/// Main application logic
async fn run_application(cli: Cli) -> Result<()> {
    let config = load_config(cli)?;
    let logger = Logger::with_config(PKG_NAME.to_string(), &config);
    logger.set_session_id(Uuid::new_v4().to_string()).await;
    logger.add_context_field("namespace".to_string(), &config.namespace).await;

    logger
        .info("starting...")
        .field("version", VERSION)
        .field("commit", GIT_COMMIT)
        .field("built", BUILD_TIME)
        .field("target", TARGET_TRIPLE)
        .log()
        .await;
    logger
        .debug("configuration loaded")
        .field("summary", display_config_summary(&config))
        .log()
        .await;

    let store = FileObjectStore::open(&config.store_dir).await?;
    let persister =
        SnapshotPersister::new(Arc::new(store), config.namespace.clone(), config.object_name.clone());
    let source = CatalogClient::new(&config.servers_list_url, config.fetch_timeout)?;

    let orchestrator = Orchestrator::new(
        config,
        Arc::new(source),
        Arc::new(TcpProber::new()),
        persister,
        logger.clone(),
    )?;

    let summary = orchestrator.run(wait_for_signal(logger.clone())).await?;

    logger
        .info("goodbye!")
        .field("cycles", summary.cycles_completed)
        .field("writes", summary.snapshots_persisted)
        .log()
        .await;

    Ok(())
}

/// Resolves on SIGINT or SIGTERM
async fn wait_for_signal(logger: Logger) {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            logger.error("cannot listen for SIGINT").err(&e).log().await;
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = interrupt => {}
        _ = term_signal(&logger) => {}
    }
}

#[cfg(unix)]
async fn term_signal(logger: &Logger) {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            term.recv().await;
        }
        Err(e) => {
            logger.error("cannot listen for SIGTERM").err(&e).log().await;
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn term_signal(_logger: &Logger) {
    std::future::pending::<()>().await;
}

/// Print helpful suggestions for common errors
fn print_error_suggestions(error: &AppError) {
    match error {
        AppError::Config(_) | AppError::Parse(_) => {
            eprintln!();
            eprintln!("Configuration help:");
            eprintln!("  - Set the NAMESPACE environment variable or pass --namespace");
            eprintln!("  - --order-by accepts name or latency, --order-direction asc or desc");
            eprintln!("  - Durations need a unit, e.g. 50ms, 5m, 1h30m");
            eprintln!("  - Check your .env file format");
        }
        AppError::Store(_) | AppError::Io(_) => {
            eprintln!();
            eprintln!("Storage troubleshooting:");
            eprintln!("  - Check that --store-dir exists or can be created");
            eprintln!("  - Verify the directory is writable by this user");
        }
        _ => {}
    }
}
