use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "tapedeck", version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// Config file (defaults to $XDG_CONFIG_HOME/tapedeck/config.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print the resolved configuration and exit
    #[arg(long)]
    pub show_config: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play a file or folder, gaplessly
    Play(PlayArgs),

    /// Find folders with music and remember them for `play -m N`
    Search(SearchArgs),
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct PlayArgs {
    /// Audio file or folder to play
    pub track: Option<PathBuf>,

    /// Output: speakers, udp, icecast, null, or a file path
    #[arg(short, long)]
    pub output: Option<String>,

    /// Shuffle the order of tracks
    #[arg(short, long)]
    pub shuffle: bool,

    /// Also play every subfolder of TRACK that has music
    #[arg(short, long)]
    pub recursive: bool,

    /// Play folder number N from the last search
    #[arg(short, long, value_name = "N")]
    pub memory: Option<usize>,

    /// Network streaming host (udp, icecast)
    #[arg(long)]
    pub host: Option<String>,

    /// Network streaming port (udp, icecast)
    #[arg(long)]
    pub port: Option<u16>,

    /// Icecast mount point
    #[arg(long)]
    pub mount: Option<String>,

    /// Icecast source password
    #[arg(long)]
    pub password: Option<String>,

    /// Launch a local icecast server for the duration of playback
    #[arg(long)]
    pub icecast_server: bool,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct SearchArgs {
    /// Directory to search
    pub directory: Option<PathBuf>,

    /// Search hidden dot-directories
    #[arg(short = 'd', long)]
    pub follow_dots: bool,

    /// Follow symlinked directories
    #[arg(short = 'l', long)]
    pub follow_links: bool,

    /// Print the last search and exit
    #[arg(short, long)]
    pub memory: bool,
}
