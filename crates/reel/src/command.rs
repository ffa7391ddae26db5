//! Command lines for pipeline stages.

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::fmt;

use crate::error::{ReelError, Result};

/// A program plus its arguments and an environment overlay.
///
/// The overlay is merged onto the inherited environment at spawn time.
/// No shell is involved: [`Cmd::parse`] only splits words. Arguments are
/// kept as OS strings, so paths that are not UTF-8 reach the process intact.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cmd {
    argv: Vec<OsString>,
    env: BTreeMap<String, String>,
}

impl Cmd {
    /// A command with no arguments.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            argv: vec![program.into()],
            env: BTreeMap::new(),
        }
    }

    /// Split a single command string into argv using POSIX shell word rules.
    pub fn parse(line: &str) -> Result<Self> {
        let argv = shlex::split(line)
            .ok_or_else(|| ReelError::Config(format!("unbalanced quoting in `{line}`")))?;
        if argv.is_empty() {
            return Err(ReelError::Config("empty command".to_string()));
        }
        Ok(Self {
            argv: argv.into_iter().map(OsString::from).collect(),
            env: BTreeMap::new(),
        })
    }

    /// Append one argument. Path-like values are accepted as-is.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.argv.push(arg.as_ref().to_owned());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self = self.arg(arg);
        }
        self
    }

    /// Overlay one environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Overlay several environment variables.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in vars {
            self.env.insert(k.into(), v.into());
        }
        self
    }

    pub fn program(&self) -> &OsStr {
        &self.argv[0]
    }

    pub fn argv(&self) -> &[OsString] {
        &self.argv
    }

    pub fn env_overlay(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Build the tokio command. Standard streams are configured by the caller.
    pub(crate) fn to_command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.argv[0]);
        cmd.args(&self.argv[1..]);
        cmd.envs(&self.env);
        cmd
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arg) in self.argv.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str(&arg.to_string_lossy())?;
        }
        Ok(())
    }
}
