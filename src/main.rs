use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use bobo::backend::HttpBackend;
use bobo::chime::{BellChime, Chime, ChimeControl, WavChime};
use bobo::config::{ClientConfig, Config};
use bobo::media::{HttpStorage, MediaResolver};
use bobo::{spawn_poller, Dashboard};

#[derive(Parser, Debug)]
#[command(name = "bobo")]
#[command(about = "Bobo home-monitoring alert client", long_about = None)]
struct Args {
    /// Verbose output (-v, -vv, -vvv)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file path (defaults to ~/.bobo/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// User id to poll alerts for (overrides config and BOBO_USER_ID)
    #[arg(long)]
    user: Option<String>,

    /// Enable the arrival chime
    #[arg(long)]
    sound: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let verbosity = args.verbose.min(3);

    Config::ensure_log_directory().ok();
    bobo::init_tracing(verbosity, Some(Config::log_file_path()));

    let mut config = ClientConfig::load(args.config.as_deref())?;
    if let Some(user) = args.user {
        config.user_id = Some(user);
    }
    if args.sound {
        config.sound_enabled = true;
    }
    config.validate()?;

    let user_id = config
        .user_id
        .clone()
        .context("No user id configured (--user, config.json or BOBO_USER_ID)")?;

    info!("bobo {}: polling alerts for user {}", Config::version(), user_id);

    let backend = Arc::new(HttpBackend::new(&config)?);
    let media = Arc::new(MediaResolver::new(HttpStorage::new(&config)?));

    let player: Box<dyn Chime> = match &config.sound_player {
        Some(command) => Box::new(WavChime::new(command.clone())),
        None => Box::new(BellChime),
    };
    let chime = Arc::new(ChimeControl::new(player));
    // Launching the client is the user gesture that unlocks audio.
    chime.arm();
    chime.set_enabled(config.sound_enabled);

    let dashboard = Dashboard::new();
    let handle = spawn_poller(
        backend,
        media,
        chime,
        dashboard,
        user_id,
        Duration::from_millis(config.poll_interval_ms),
    );

    let token = handle.cancel_token();
    ctrlc::set_handler(move || token.cancel()).context("Failed to set Ctrl-C handler")?;

    handle.join().await;
    Ok(())
}
