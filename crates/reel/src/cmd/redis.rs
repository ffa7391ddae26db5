use std::path::Path;

use crate::command::Cmd;
use crate::server::Daemon;

/// Settings written to the generated `redis.conf`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedisConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8776,
        }
    }
}

impl RedisConfig {
    pub fn render(&self) -> String {
        format!("bind {}\nport {}\n", self.bind, self.port)
    }
}

/// `redis-server <config>`.
pub fn server(config: &Path) -> Daemon {
    Daemon::new(Cmd::new("redis-server")).config_arg(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_bind_and_port() {
        assert_eq!(RedisConfig::default().render(), "bind 127.0.0.1\nport 8776\n");
    }

    #[test]
    fn config_path_is_the_last_argument() {
        let daemon = server(Path::new("/etc/tapedeck/redis.conf"));
        assert_eq!(daemon.cmd().argv(), ["redis-server", "/etc/tapedeck/redis.conf"]);
    }
}
