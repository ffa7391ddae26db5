//! Tapedeck: a gapless command-line music player.
//!
//! Every track is decoded by its own `ffmpeg` process; the decoded PCM is
//! piped into one sink process (speakers, a UDP or Icecast stream, or a
//! file). The next track's decoder starts while the current one plays, so
//! there is no gap between tracks.
//!
//! ## Commands
//! - `play`: play a file, a folder, or folder N from the last search.
//! - `search`: find folders with music and remember them.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use tapedeck::cli::{Args, Command};
use tapedeck::config::{PlayConfig, SearchConfig, TapedeckConfig};
use tapedeck::runtime;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,tapedeck=info,reel=info")
        }))
        .with_writer(std::io::stderr)
        .init();

    let cfg = TapedeckConfig::discover(args.config.as_deref())?;
    if args.show_config {
        print!("{}", toml::to_string(&cfg).context("render config")?);
        return Ok(());
    }

    match args.cmd {
        Some(Command::Play(play)) => runtime::run_play(PlayConfig::resolve(&play, &cfg)?).await,
        Some(Command::Search(search)) => runtime::run_search(SearchConfig::resolve(&search, &cfg)?).await,
        None => {
            Args::command().print_help()?;
            Ok(())
        }
    }
}
