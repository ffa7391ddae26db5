//! Icecast: the streaming server daemon and the ffmpeg source client.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::command::Cmd;
use crate::server::Daemon;
use crate::spool::Spool;

use super::{CHANNELS, SAMPLE_RATE};

/// Where a source client publishes its stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IcecastTarget {
    pub host: String,
    pub port: u16,
    pub mount: String,
    pub password: String,
}

impl Default for IcecastTarget {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8777,
            mount: "asdf".to_string(),
            password: "hack-it-up".to_string(),
        }
    }
}

impl IcecastTarget {
    pub fn url(&self) -> String {
        format!(
            "icecast://source:{}@{}:{}/{}",
            self.password,
            self.host,
            self.port,
            self.mount.trim_start_matches('/')
        )
    }
}

impl fmt::Display for IcecastTarget {
    /// The public listening URL; the password is left out.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http://{}:{}/{}", self.host, self.port, self.mount.trim_start_matches('/'))
    }
}

/// Encode PCM from stdin to Ogg Vorbis and publish it on `target`.
pub fn client(target: &IcecastTarget) -> Spool {
    Spool::new(
        Cmd::new("ffmpeg")
            .args(["-re", "-ac", CHANNELS, "-ar", SAMPLE_RATE, "-f", "s16le", "-i", "-"])
            .args(["-vn", "-codec:a", "libvorbis", "-q:a", "8.0"])
            .args(["-content_type", "audio/ogg", "-f", "ogg"])
            .arg(target.url()),
    )
}

/// Settings for a generated `icecast.xml`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IcecastServerConfig {
    pub location: String,
    pub admin_email: String,
    pub password: String,
    pub hostname: String,
    pub port: u16,
    pub logdir: PathBuf,
}

impl Default for IcecastServerConfig {
    fn default() -> Self {
        let target = IcecastTarget::default();
        Self {
            location: "Neptune".to_string(),
            admin_email: "sushi@trident.sea".to_string(),
            password: target.password,
            hostname: target.host,
            port: target.port,
            logdir: std::env::temp_dir(),
        }
    }
}

impl IcecastServerConfig {
    /// The server accepting sources for `target`.
    pub fn for_target(target: &IcecastTarget) -> Self {
        Self {
            password: target.password.clone(),
            hostname: target.host.clone(),
            port: target.port,
            ..Self::default()
        }
    }

    pub fn render(&self) -> String {
        format!(
            r#"<icecast>
    <location>{location}</location>
    <admin>{admin}</admin>
    <authentication>
        <source-password>{password}</source-password>
        <relay-password>{password}</relay-password>
        <admin-user>admin</admin-user>
        <admin-password>{password}</admin-password>
    </authentication>
    <hostname>{hostname}</hostname>
    <listen-socket>
        <port>{port}</port>
    </listen-socket>
    <paths>
        <logdir>{logdir}</logdir>
    </paths>
    <logging>
        <accesslog>access.log</accesslog>
        <errorlog>error.log</errorlog>
        <loglevel>3</loglevel>
    </logging>
</icecast>
"#,
            location = self.location,
            admin = self.admin_email,
            password = self.password,
            hostname = self.hostname,
            port = self.port,
            logdir = self.logdir.display(),
        )
    }
}

/// `icecast -c <config>`.
pub fn server(config: &Path) -> Daemon {
    Daemon::new(Cmd::new("icecast").arg("-c")).config_arg(config)
}
