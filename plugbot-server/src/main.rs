use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use plugbot_common::models::Context;
use plugbot_core::config::{ConfigHandle, PluginConfigStore, UserDataStore};
use plugbot_core::logging::init_tracing;
use plugbot_core::plugins::manager::{GitInstaller, PluginManager};
use plugbot_core::plugins::nicesuno::SunoClient;
use plugbot_core::plugins::{Friendship, Godcmd, NiceSuno};
use plugbot_core::sessions::InMemorySessions;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

mod console;
use console::{render, ConsoleChannel};

const CONSOLE_USER: &str = "console";

#[derive(Parser, Debug, Clone)]
#[command(name = "plugbot")]
#[command(author, version, about = "PlugBot - chat bot plugin host with a console channel")]
struct Args {
    /// Global config file; defaults apply when it does not exist.
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Directory holding plugin configs, installed plugins and plugins.json.
    #[arg(long, default_value = "plugins")]
    plugin_dir: PathBuf,

    /// Chat backend type reported to plugins.
    #[arg(long, default_value = "openAI")]
    bot_type: String,

    #[arg(long, default_value = "false")]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Arc::new(ConfigHandle::load(&args.config).context("loading config")?);
    let log_control = Arc::new(init_tracing(args.debug || config.get().debug)?);
    info!("PlugBot starting. config={:?}, plugin_dir={:?}", args.config, args.plugin_dir);

    let backend = Arc::new(InMemorySessions::new(args.bot_type.clone()));
    let user_data = Arc::new(UserDataStore::new());
    let store = PluginConfigStore::new(&args.plugin_dir);
    let manager = Arc::new(PluginManager::new(&args.plugin_dir, Box::new(GitInstaller)));

    let godcmd = Godcmd::new(config.clone(), store.clone(), backend.clone(), user_data, log_control)
        .context("initialising Godcmd")?;
    manager.register(Arc::new(godcmd))?;

    let suno = NiceSuno::new(store.clone(), Arc::new(SunoClient::new()?)).context("initialising NiceSuno")?;
    manager.register(Arc::new(suno))?;

    match Friendship::new(store, backend.clone()) {
        Ok(friendship) => manager.register(Arc::new(friendship))?,
        Err(e) => warn!("Friendship not loaded: {}", e),
    }

    match manager.scan_plugins() {
        Ok(found) if !found.is_empty() => info!("Found {} external plugins", found.len()),
        Ok(_) => {}
        Err(e) => error!("Plugin scan failed: {}", e),
    }

    run_console(manager).await
}

/// Feeds stdin lines through the plugin chain as private messages.
async fn run_console(manager: Arc<PluginManager>) -> anyhow::Result<()> {
    let channel = Arc::new(ConsoleChannel);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("Console ready. Type '#help' for the command list.");

    while let Some(line) = lines.next_line().await? {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        let ectx = manager.emit(Context::text(line, CONSOLE_USER), channel.clone()).await;
        match ectx.reply {
            Some(reply) => println!("{}", render(&reply)),
            None => info!("No plugin replied (action {:?})", ectx.action),
        }
    }
    info!("stdin closed, shutting down");
    Ok(())
}
