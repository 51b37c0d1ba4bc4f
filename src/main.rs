//! threadbot CLI entry point (spec §10.4): load config, start a platform adapter task
//! per configured entry, and run until `SIGINT`/`SIGTERM`.

use anyhow::Context as _;
use arc_swap::ArcSwap;
use clap::Parser;
use std::collections::HashMap;
use std::sync::Arc;

use threadbot::config::{self, PlatformConfig, RuntimeConfig};
use threadbot::formatter::ConfigDrivenFormatterRegistry;
use threadbot::gateway::ChatGateway;
use threadbot::platform::mattermost::{MattermostConfig, MattermostPlatform};
use threadbot::platform::slack::{SlackConfig, SlackPlatform};
use threadbot::platform::PlatformDyn;
use threadbot::reactions::ReactionRouter;
use threadbot::session::manager::SessionManager;
use threadbot::threadlog::ThreadLog;
use threadbot::PlatformId;

#[derive(Parser)]
#[command(name = "threadbot", version)]
#[command(about = "Turns chat threads into interactive programming-assistant sessions")]
struct Cli {
    /// Path to the YAML config file (default: a platform-appropriate config dir)
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Run the setup wizard (external tool; accepted so scripts don't fail, no-op here)
    #[arg(long)]
    setup: bool,

    /// Alias for --setup
    #[arg(long)]
    reconfigure: bool,
}

fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    let cli = Cli::parse();

    if cli.setup || cli.reconfigure {
        eprintln!("threadbot: --setup/--reconfigure runs an external wizard; this binary doesn't implement one.");
        eprintln!("Hand-edit the config file directly (see spec §6) and run threadbot with no flags.");
        return Ok(());
    }

    let config_path = cli.config.unwrap_or_else(config::default_config_path);
    let config = match config::load(&config_path) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("threadbot: failed to load config at {}: {error}", config_path.display());
            std::process::exit(1);
        }
    };

    let log_dir = dirs::data_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("threadbot")
        .join("logs");
    let _logging_guard = match threadbot::logging::init(&log_dir, cli.debug, true) {
        Ok(guard) => guard,
        Err(error) => {
            eprintln!("threadbot: failed to initialize logging at {}: {error}", log_dir.display());
            std::process::exit(1);
        }
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build Tokio runtime")?;

    runtime.block_on(run(config, config_path))
}

async fn run(config: RuntimeConfig, config_path: std::path::PathBuf) -> anyhow::Result<()> {
    let platforms = build_platforms(&config)?;
    let config = Arc::new(ArcSwap::new(Arc::new(config)));

    if let Err(error) = threadbot::config::ConfigWatcher::spawn(config_path, config.clone()) {
        tracing::warn!(%error, "failed to start config file watcher; hot-reload disabled");
    }

    let thread_log_dir = dirs::data_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("threadbot")
        .join("thread-logs");
    let threadlog = Arc::new(ThreadLog::new(thread_log_dir.clone()));
    threadbot::threadlog::spawn_retention_job(
        thread_log_dir,
        config.load().thread_log_retention_days,
        std::time::Duration::from_secs(3600),
    );

    let formatters = Arc::new(ConfigDrivenFormatterRegistry::new(config.clone()));
    let sessions = Arc::new(SessionManager::new(platforms.clone(), formatters, threadlog, config));
    let reactions = Arc::new(ReactionRouter::new(sessions.tracker().clone(), sessions.clone()));
    let gateway = Arc::new(ChatGateway::new(sessions.clone(), reactions));

    let mut adapter_tasks = Vec::new();
    for (id, platform) in platforms {
        let gateway = gateway.clone();
        adapter_tasks.push(tokio::spawn(async move {
            if let Err(error) = gateway.run(platform).await {
                tracing::error!(platform = %id, %error, "platform adapter exited with an error");
            } else {
                tracing::warn!(platform = %id, "platform adapter event stream ended");
            }
        }));
    }

    wait_for_shutdown_signal().await;
    tracing::info!("shutting down");

    for task in adapter_tasks {
        task.abort();
    }
    sessions.shutdown_all(std::time::Duration::from_secs(10)).await;

    Ok(())
}

fn build_platforms(config: &RuntimeConfig) -> anyhow::Result<HashMap<PlatformId, Arc<dyn PlatformDyn>>> {
    let mut platforms: HashMap<PlatformId, Arc<dyn PlatformDyn>> = HashMap::new();
    for entry in &config.platforms {
        match entry {
            PlatformConfig::Mattermost(c) => {
                let adapter = MattermostPlatform::new(MattermostConfig {
                    id: c.id.clone(),
                    display_name: c.display_name.clone(),
                    url: c.url.clone(),
                    token: c.token.clone(),
                    channel_id: c.channel_id.clone(),
                    bot_name: c.bot_name.clone(),
                    allowed_users: c.allowed_users.iter().cloned().collect(),
                });
                platforms.insert(Arc::from(c.id.as_str()), Arc::new(adapter));
            }
            PlatformConfig::Slack(c) => {
                let adapter = SlackPlatform::new(SlackConfig {
                    id: c.id.clone(),
                    display_name: c.display_name.clone(),
                    bot_token: c.bot_token.clone(),
                    app_token: c.app_token.clone(),
                    channel_id: c.channel_id.clone(),
                    bot_name: c.bot_name.clone(),
                    allowed_users: c.allowed_users.iter().cloned().collect(),
                })
                .with_context(|| format!("failed to initialize Slack platform {}", c.id))?;
                platforms.insert(Arc::from(c.id.as_str()), Arc::new(adapter));
            }
        }
    }
    Ok(platforms)
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(error) => {
                tracing::warn!(%error, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
