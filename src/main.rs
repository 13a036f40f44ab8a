use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pagepilot::browser::{
    BrowserPort, BrowserSupervisor, CdpBrowser, LaunchOptions, NavWait, StubBrowser,
};
use pagepilot::catalog::CatalogService;
use pagepilot::config::Config;
use pagepilot::executor::DslExecutor;
use pagepilot::planner::UnconfiguredPlanner;
use pagepilot::server::{build_router, AppState};
use pagepilot::tasks::TaskManager;

#[derive(Parser)]
#[command(name = "pagepilot", version, about = "Browser automation agent")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service over a managed browser.
    Serve {
        /// Listen address, e.g. 127.0.0.1:8700.
        #[arg(long)]
        bind: Option<String>,
        /// Run the browser with a visible window.
        #[arg(long)]
        headful: bool,
        /// Path to a Chromium executable.
        #[arg(long)]
        chrome: Option<std::path::PathBuf>,
        /// Use the in-memory browser stub instead of Chromium (wiring
        /// checks only).
        #[arg(long)]
        stub: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve {
            bind,
            headful,
            chrome,
            stub,
        } => serve(bind, headful, chrome, stub).await,
    }
}

async fn serve(
    bind: Option<String>,
    headful: bool,
    chrome: Option<std::path::PathBuf>,
    stub: bool,
) -> anyhow::Result<()> {
    let config = Arc::new(Config::from_env());
    let _log_guard = init_tracing(&config)?;

    let port: Arc<dyn BrowserPort> = if stub {
        info!("using the in-memory browser stub");
        Arc::new(StubBrowser::new())
    } else {
        let options = LaunchOptions {
            headless: !headful,
            chrome_path: chrome,
            default_timeout: config.locator_timeout(),
            ..LaunchOptions::default()
        };
        Arc::new(
            CdpBrowser::launch(options)
                .await
                .context("failed to launch browser")?,
        )
    };

    if let Some(start_url) = &config.start_url {
        if let Err(err) = port
            .navigate(start_url, NavWait::Load, config.navigate_timeout())
            .await
        {
            tracing::warn!(%start_url, %err, "initial navigation failed; starting blank");
        }
    }

    let supervisor = Arc::new(BrowserSupervisor::new(port, config.clone()));
    let catalog = Arc::new(CatalogService::new());
    let executor = Arc::new(DslExecutor::new(
        supervisor.clone(),
        catalog.clone(),
        config.clone(),
    ));
    let tasks = TaskManager::new(&config);
    let _sweeper = tasks.spawn_sweeper(Duration::from_secs(30));

    let state = AppState::new(
        config.clone(),
        supervisor,
        executor,
        tasks,
        Arc::new(UnconfiguredPlanner),
        catalog,
    );
    let app = build_router(state);

    let addr = bind.unwrap_or_else(|| config.bind_addr.clone());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "pagepilot listening");
    axum::serve(listener, app).await.context("server error")
}

fn init_tracing(config: &Config) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.save_debug_artifacts {
        std::fs::create_dir_all(&config.debug_dir)?;
        let file_appender = tracing_appender::rolling::daily(&config.debug_dir, "pagepilot.log");
        let (writer, guard) = tracing_appender::non_blocking(file_appender);
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .with(fmt::layer().with_ansi(false).with_writer(writer))
            .init();
        Ok(Some(guard))
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
        Ok(None)
    }
}
