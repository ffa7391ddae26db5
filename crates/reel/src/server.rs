//! Supervisor for long-running background processes.
//!
//! Daemons (a streaming server, a cache, a download manager) are started
//! before any chain that needs them and stopped explicitly afterwards. They
//! never sit in a [`Transport`](crate::transport::Transport).

use std::ffi::OsStr;
use std::fmt;
use std::ops::BitOr;

use tokio::sync::oneshot;

use crate::command::Cmd;
use crate::config::ReelConfig;
use crate::error::{ReelError, Result};
use crate::scope::Scope;
use crate::spool::Spool;
use crate::track::Streamer;

/// A background process with no position in a chain.
#[derive(Clone, Debug)]
pub struct Daemon {
    cmd: Cmd,
    config: ReelConfig,
    spool: Spool,
}

impl Daemon {
    pub fn new(cmd: Cmd) -> Self {
        let config = ReelConfig::default();
        Self {
            spool: Spool::new(cmd.clone()).with_config(config.clone()),
            cmd,
            config,
        }
    }

    /// Append a generated argument (usually a config file path).
    pub fn config_arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.cmd = self.cmd.arg(arg);
        self.spool = Spool::new(self.cmd.clone()).with_config(self.config.clone());
        self
    }

    pub fn with_config(mut self, config: ReelConfig) -> Self {
        self.spool = Spool::new(self.cmd.clone()).with_config(config.clone());
        self.config = config;
        self
    }

    pub fn cmd(&self) -> &Cmd {
        &self.cmd
    }

    pub fn spool(&self) -> &Spool {
        &self.spool
    }

    pub fn pid(&self) -> Option<u32> {
        self.spool.pid()
    }

    pub async fn is_running(&self) -> bool {
        self.spool.is_running().await
    }

    async fn launch(&self, scope: &Scope) -> Result<()> {
        self.spool.start(scope, None).await?;
        self.spool.close_input().await?;
        tracing::info!(daemon = %self.cmd, pid = ?self.pid(), "daemon started");
        Ok(())
    }

    /// Ask the process to exit (SIGTERM) and wait for it, killing it once
    /// the close grace period runs out.
    pub async fn stop(&self) -> Result<()> {
        if !self.spool.is_started() {
            return Ok(());
        }
        self.spool.terminate().await?;
        tracing::info!(daemon = %self.cmd, status = ?self.spool.exit_status(), "daemon stopped");
        Ok(())
    }
}

impl fmt::Display for Daemon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.cmd.fmt(f)
    }
}

/// An ordered set of daemons started and stopped together.
#[derive(Clone, Debug, Default)]
pub struct Server {
    daemons: Vec<Daemon>,
}

impl Server {
    pub fn new(daemons: impl IntoIterator<Item = Daemon>) -> Self {
        Self {
            daemons: daemons.into_iter().collect(),
        }
    }

    pub fn then(mut self, daemon: Daemon) -> Self {
        self.daemons.push(daemon);
        self
    }

    pub fn daemons(&self) -> &[Daemon] {
        &self.daemons
    }

    /// Start every daemon in order, each one ready before the next launches.
    ///
    /// Returns once all are running. Their output is drained by tasks in
    /// `scope` until they exit.
    pub async fn run(&self, scope: &Scope) -> Result<()> {
        for daemon in &self.daemons {
            let (ready_tx, ready_rx) = oneshot::channel();
            let supervised = daemon.clone();
            let task_scope = scope.clone();
            scope.spawn(async move {
                if let Err(e) = supervised.launch(&task_scope).await {
                    let _ = ready_tx.send(Err(e));
                    return Ok(());
                }
                let _ = ready_tx.send(Ok(()));
                let spool = supervised.spool();
                while let Some(chunk) = spool.pull_chunk(spool.chunk_bytes()).await? {
                    tracing::trace!(daemon = %supervised, bytes = chunk.len(), "daemon output");
                }
                tracing::debug!(daemon = %supervised, "daemon output closed");
                Ok(())
            });
            match ready_rx.await {
                Ok(result) => result?,
                Err(_) => return Err(ReelError::Cancelled),
            }
        }
        Ok(())
    }

    /// Stop every daemon, even when some of them fail to stop.
    pub async fn stop(&self) -> Result<()> {
        let mut first = None;
        for daemon in &self.daemons {
            if let Err(e) = daemon.stop().await {
                tracing::warn!(daemon = %daemon, error = %e, "failed to stop daemon");
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }
}

impl BitOr<Daemon> for Daemon {
    type Output = Server;

    fn bitor(self, rhs: Daemon) -> Server {
        Server::new([self, rhs])
    }
}

impl BitOr<Daemon> for Server {
    type Output = Server;

    fn bitor(self, rhs: Daemon) -> Server {
        self.then(rhs)
    }
}
