//! Configuration loading and play-request resolution.
//!
//! File values are defaults; command-line flags override them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use reel::ReelConfig;
use reel::ReelError;
use reel::cmd::icecast::IcecastTarget;
use serde::{Deserialize, Serialize};

use crate::cli::{PlayArgs, SearchArgs};

const DEFAULT_EXTENSIONS: &[&str] = &["flac", "mp3", "wav", "shn", "aac", "m4a", "aiff", "ogg"];

/// Top-level config loaded from TOML.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct TapedeckConfig {
    /// Default output settings.
    pub output: Option<OutputConfig>,
    /// Pipeline tuning.
    pub playback: Option<PlaybackConfig>,
    /// Where `search` remembers its results.
    pub cache_file: Option<String>,
    /// Audio file extensions, without the dot.
    pub extensions: Option<Vec<String>>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// speakers, udp, icecast, null, or a file path.
    pub kind: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub mount: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct PlaybackConfig {
    /// Bytes per read from a decoder (default 16384).
    pub chunk_bytes: Option<usize>,
    /// Milliseconds a stage gets to exit before it is killed.
    pub close_grace_ms: Option<u64>,
    /// Upper bound in milliseconds for the now-playing announcement.
    pub announce_timeout_ms: Option<u64>,
}

impl TapedeckConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<TapedeckConfig>(&raw).with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }

    /// `$XDG_CONFIG_HOME/tapedeck/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("tapedeck").join("config.toml"))
    }

    /// Load `explicit`, else the default file when it exists, else defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn reel_config(&self) -> ReelConfig {
        let mut cfg = ReelConfig::default();
        if let Some(playback) = self.playback.as_ref() {
            if let Some(bytes) = playback.chunk_bytes {
                cfg.chunk_bytes = bytes;
            }
            if let Some(ms) = playback.close_grace_ms {
                cfg.close_grace = Duration::from_millis(ms);
            }
            if let Some(ms) = playback.announce_timeout_ms {
                cfg.announce_timeout = Duration::from_millis(ms);
            }
        }
        cfg
    }

    pub fn extensions(&self) -> Vec<String> {
        match self.extensions.as_ref() {
            Some(exts) if !exts.is_empty() => exts
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            _ => DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// The search memory file, `$XDG_CACHE_HOME/tapedeck/search.txt` by default.
    pub fn cache_file(&self) -> Result<PathBuf> {
        if let Some(path) = non_empty(self.cache_file.as_deref()) {
            return Ok(PathBuf::from(path));
        }
        dirs::cache_dir()
            .map(|dir| dir.join("tapedeck").join("search.txt"))
            .ok_or_else(|| anyhow::anyhow!("no cache directory; set cache_file in the config"))
    }

    fn output(&self) -> OutputConfig {
        self.output.clone().unwrap_or_default()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Where decoded audio is sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputKind {
    Speakers,
    Udp { host: String, port: u16 },
    Icecast(IcecastTarget),
    File(PathBuf),
    Discard,
}

impl OutputKind {
    /// Map an output name plus network flags to a sink description.
    ///
    /// Unknown names are treated as file paths.
    pub fn resolve(
        name: &str,
        host: Option<String>,
        port: Option<u16>,
        mount: Option<String>,
        password: Option<String>,
    ) -> std::result::Result<Self, ReelError> {
        match name {
            "speakers" => Ok(OutputKind::Speakers),
            "null" => Ok(OutputKind::Discard),
            "udp" => match (host, port) {
                (Some(host), Some(port)) => Ok(OutputKind::Udp { host, port }),
                _ => Err(ReelError::Config("udp output needs --host and --port".to_string())),
            },
            "icecast" => {
                let defaults = IcecastTarget::default();
                Ok(OutputKind::Icecast(IcecastTarget {
                    host: host.unwrap_or(defaults.host),
                    port: port.unwrap_or(defaults.port),
                    mount: mount.unwrap_or(defaults.mount),
                    password: password.unwrap_or(defaults.password),
                }))
            }
            "" => Err(ReelError::Config("empty output name".to_string())),
            path => Ok(OutputKind::File(PathBuf::from(path))),
        }
    }
}

/// A validated `play` request.
#[derive(Clone, Debug)]
pub struct PlayConfig {
    pub track: Option<PathBuf>,
    pub memory: Option<usize>,
    pub shuffle: bool,
    pub recursive: bool,
    pub output: OutputKind,
    pub icecast_server: bool,
    pub reel: ReelConfig,
    pub extensions: Vec<String>,
    pub cache_file: PathBuf,
}

impl PlayConfig {
    pub fn resolve(args: &PlayArgs, cfg: &TapedeckConfig) -> Result<Self> {
        let file = cfg.output();
        let name = args
            .output
            .clone()
            .or(file.kind)
            .unwrap_or_else(|| "speakers".to_string());
        let output = OutputKind::resolve(
            name.trim(),
            args.host.clone().or(file.host),
            args.port.or(file.port),
            args.mount.clone().or(file.mount),
            args.password.clone().or(file.password),
        )?;
        if args.track.is_none() && args.memory.is_none() {
            return Err(ReelError::Config("nothing to play; give a TRACK or -m N".to_string()).into());
        }
        if args.icecast_server && !matches!(output, OutputKind::Icecast(_)) {
            return Err(ReelError::Config("--icecast-server needs -o icecast".to_string()).into());
        }
        Ok(Self {
            track: args.track.clone(),
            memory: args.memory,
            shuffle: args.shuffle,
            recursive: args.recursive,
            output,
            icecast_server: args.icecast_server,
            reel: cfg.reel_config(),
            extensions: cfg.extensions(),
            cache_file: cfg.cache_file()?,
        })
    }
}

/// A validated `search` request.
#[derive(Clone, Debug)]
pub struct SearchConfig {
    pub directory: PathBuf,
    pub follow_dots: bool,
    pub follow_links: bool,
    pub recall: bool,
    pub extensions: Vec<String>,
    pub cache_file: PathBuf,
}

impl SearchConfig {
    pub fn resolve(args: &SearchArgs, cfg: &TapedeckConfig) -> Result<Self> {
        Ok(Self {
            directory: args.directory.clone().unwrap_or_else(|| PathBuf::from(".")),
            follow_dots: args.follow_dots,
            follow_links: args.follow_links,
            recall: args.memory,
            extensions: cfg.extensions(),
            cache_file: cfg.cache_file()?,
        })
    }
}
