use std::path::Path;

use crate::command::Cmd;
use crate::server::Daemon;

/// An aria2 download manager answering JSON-RPC.
pub fn rpc(config: &Path) -> Daemon {
    Daemon::new(Cmd::new("aria2c").arg("--enable-rpc"))
        .config_arg(format!("--conf-path={}", config.display()))
}
