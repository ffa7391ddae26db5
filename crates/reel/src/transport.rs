//! Stage chains: stage N's output wired into stage N+1's input.
//!
//! ```text
//!  input ─▶ [stage 0] ─ch0─▶ [stage 1] ─ch1─▶ ... ─▶ [stage N-1] ─▶ Output
//! ```
//!
//! Every channel is a rendezvous channel, so a slow stage stalls the ones
//! upstream of it instead of buffering.

use std::ops::BitOr;

use tokio::sync::watch;

use crate::channel::{Chunk, ChunkReceiver, ChunkSender, rendezvous};
use crate::error::{ReelError, Result};
use crate::reel::Reel;
use crate::scope::Scope;
use crate::spool::Spool;
use crate::track::{Streamer, Track};

/// Where the final stage's output goes.
pub enum Output {
    Discard,
    /// Accumulate everything in memory and return it from `run`.
    Capture,
    /// Forward chunks to an external consumer.
    Channel(ChunkSender),
}

#[derive(Clone, Default, Debug)]
pub struct Transport {
    stages: Vec<Track>,
}

impl Transport {
    pub fn new<I, T>(stages: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Track>,
    {
        Self {
            stages: stages.into_iter().map(Into::into).collect(),
        }
    }

    /// Append a stage to the end of the chain.
    pub fn then(mut self, stage: impl Into<Track>) -> Self {
        self.stages.push(stage.into());
        self
    }

    pub fn stages(&self) -> &[Track] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run the chain to completion in a fresh root scope.
    pub async fn run(&self, input: Option<Chunk>, output: Output) -> Result<Option<Chunk>> {
        self.run_in(&Scope::new(), input, output).await
    }

    /// Run the chain in a child of `parent`.
    ///
    /// Cancelling `parent` stops streaming. Every stage is closed before this
    /// returns, whether the chain finished, failed, or was cancelled. With
    /// [`Output::Capture`] the collected bytes are returned.
    pub async fn run_in(
        &self,
        parent: &Scope,
        input: Option<Chunk>,
        output: Output,
    ) -> Result<Option<Chunk>> {
        if self.stages.is_empty() {
            return Err(ReelError::Config("transport has no stages".to_string()));
        }
        let scope = parent.child();
        let streamed = self.stream(&scope, input, output).await;
        if streamed.is_err() {
            scope.cancel();
        }
        let joined = scope.join().await;
        let closed = self.close_all().await;
        tracing::debug!(
            stages = self.stages.len(),
            ok = streamed.is_ok(),
            cancelled = parent.is_cancelled(),
            "transport finished"
        );
        let captured = streamed?;
        joined?;
        closed?;
        Ok(captured)
    }

    async fn stream(
        &self,
        scope: &Scope,
        mut input: Option<Chunk>,
        output: Output,
    ) -> Result<Option<Chunk>> {
        for (i, stage) in self.stages.iter().enumerate() {
            let message = if i == 0 { input.take() } else { None };
            let has_input = message.is_some();
            stage.start(scope, message).await?;
            if i == 0 && !has_input {
                stage.close_input().await?;
            }
        }

        for pair in self.stages.windows(2) {
            let (tx, rx) = rendezvous();
            let upstream = pair[0].clone();
            let downstream = pair[1].clone();
            scope.spawn(async move {
                let end = upstream.stream_out(tx).await?;
                tracing::trace!(stage = %upstream, ?end, "stream_out finished");
                Ok(())
            });
            scope.spawn(async move {
                let end = downstream.stream_in(rx).await?;
                tracing::trace!(stage = %downstream, ?end, "stream_in finished");
                Ok(())
            });
        }

        let (tx, rx) = rendezvous();
        if let Some(last) = self.stages.last().cloned() {
            scope.spawn(async move {
                let end = last.stream_out(tx).await?;
                tracing::trace!(stage = %last, ?end, "final stream_out finished");
                Ok(())
            });
        }

        let (joined, captured) = tokio::join!(scope.join(), collect(rx, output));
        joined?;
        Ok(captured)
    }

    async fn close_all(&self) -> Result<()> {
        let mut first = None;
        for stage in &self.stages {
            if let Err(e) = stage.close().await {
                tracing::warn!(stage = %stage, error = %e, "failed to close stage");
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Run with no input and throw the output away.
    pub async fn play(&self) -> Result<()> {
        self.run(None, Output::Discard).await.map(|_| ())
    }

    /// Run with optional stdin bytes and return the raw output.
    pub async fn read_bytes(&self, input: Option<Chunk>) -> Result<Vec<u8>> {
        Ok(self.run(input, Output::Capture).await?.unwrap_or_default())
    }

    /// Run and return the output as text with one trailing newline removed.
    pub async fn read(&self, message: Option<&str>) -> Result<String> {
        let bytes = self.read_bytes(message.map(|m| m.as_bytes().to_vec())).await?;
        let mut text = String::from_utf8(bytes)?;
        if text.ends_with('\n') {
            text.pop();
        }
        Ok(text)
    }

    /// Run and split the output into lines.
    pub async fn read_lines(&self, message: Option<&str>) -> Result<Vec<String>> {
        let text = self.read(message).await?;
        if text.is_empty() {
            return Ok(Vec::new());
        }
        Ok(text.split('\n').map(str::to_owned).collect())
    }

    /// Run in the background as a task of `scope`.
    ///
    /// Cancelling `scope` stops the transport; its stages are still closed
    /// before the task ends.
    pub fn spawn_in(&self, scope: &Scope) -> TransportHandle {
        let (done_tx, done_rx) = watch::channel(false);
        let transport = self.clone();
        let parent = scope.clone();
        scope.spawn_graceful(async move {
            let result = transport.run_in(&parent, None, Output::Discard).await;
            let _ = done_tx.send(true);
            result.map(|_| ())
        });
        TransportHandle { done: done_rx }
    }
}

async fn collect(mut rx: ChunkReceiver, output: Output) -> Option<Chunk> {
    match output {
        Output::Discard => {
            while rx.recv().await.is_some() {}
            None
        }
        Output::Capture => {
            let mut all = Vec::new();
            while let Some(chunk) = rx.recv().await {
                all.extend_from_slice(&chunk);
            }
            Some(all)
        }
        Output::Channel(sink) => {
            while let Some(chunk) = rx.recv().await {
                if sink.send(chunk).await.is_err() {
                    tracing::debug!("output consumer went away");
                    rx.close();
                    break;
                }
            }
            None
        }
    }
}

/// Completion handle for a transport started with [`Transport::spawn_in`].
#[derive(Clone)]
pub struct TransportHandle {
    done: watch::Receiver<bool>,
}

impl TransportHandle {
    pub fn is_done(&self) -> bool {
        *self.done.borrow() || self.done.has_changed().is_err()
    }

    /// Wait until the transport has finished and closed its stages.
    pub async fn wait(&mut self) {
        let _ = self.done.wait_for(|done| *done).await;
    }
}

impl<T: Into<Track>> BitOr<T> for Transport {
    type Output = Transport;

    fn bitor(self, rhs: T) -> Transport {
        self.then(rhs)
    }
}

impl<T: Into<Track>> BitOr<T> for Spool {
    type Output = Transport;

    fn bitor(self, rhs: T) -> Transport {
        Transport::new([Track::from(self)]).then(rhs)
    }
}

impl<T: Into<Track>> BitOr<T> for Reel {
    type Output = Transport;

    fn bitor(self, rhs: T) -> Transport {
        Transport::new([Track::from(self)]).then(rhs)
    }
}
