//! The capability shared by every pipeline stage.
//!
//! A [`Spool`] (one process) and a [`Reel`] (an ordered list of tracks) both
//! implement [`Streamer`], so either can sit anywhere in a [`Transport`] or
//! inside another reel. [`Track`] is the closed set used for storage.
//!
//! [`Transport`]: crate::transport::Transport

use std::fmt;

use async_trait::async_trait;

use crate::channel::{Chunk, ChunkReceiver, ChunkSender};
use crate::error::{Result, StreamEnd};
use crate::reel::Reel;
use crate::scope::Scope;
use crate::spool::Spool;

/// Start, stream out, stream in, close.
#[async_trait]
pub trait Streamer: Send + Sync {
    /// Spawn whatever is needed to produce or consume data.
    ///
    /// `input`, when given, is written to the stage's input and the input is
    /// then closed. Starting twice is a no-op.
    async fn start(&self, scope: &Scope, input: Option<Chunk>) -> Result<()>;

    /// Next block of output (at most `max_bytes`), `None` once exhausted.
    async fn pull_chunk(&self, max_bytes: usize) -> Result<Option<Chunk>>;

    /// Write `chunk` to the stage's input. `Ok(false)` means the input side
    /// is closed and the chunk was dropped.
    async fn send_chunk(&self, chunk: &[u8]) -> Result<bool>;

    /// Signal end-of-data on the stage's input.
    async fn close_input(&self) -> Result<()>;

    /// Release every resource. Safe to call any number of times.
    async fn close(&self) -> Result<()>;

    /// Preferred read size for [`stream_out`](Self::stream_out).
    fn chunk_bytes(&self) -> usize;

    /// Why the last [`pull_chunk`](Self::pull_chunk) returned `None`.
    fn end_reason(&self) -> StreamEnd {
        StreamEnd::Eof
    }

    /// Copy output into `sink` until the stage is exhausted.
    ///
    /// When `sink` closes first, or a quota stops the stage, nobody reads
    /// this stage any more, so the stage itself is closed.
    async fn stream_out(&self, sink: ChunkSender) -> Result<StreamEnd> {
        loop {
            let Some(chunk) = self.pull_chunk(self.chunk_bytes()).await? else {
                let end = self.end_reason();
                if end.is_quota() {
                    tracing::debug!(?end, "quota stop; closing stage");
                    self.close().await?;
                }
                return Ok(end);
            };
            if sink.send(chunk).await.is_err() {
                tracing::debug!("downstream closed; closing stage");
                self.close().await?;
                return Ok(StreamEnd::Closed);
            }
        }
    }

    /// Copy chunks from `source` into the input until `source` is exhausted,
    /// then close the input.
    async fn stream_in(&self, mut source: ChunkReceiver) -> Result<StreamEnd> {
        while let Some(chunk) = source.recv().await {
            if !self.send_chunk(&chunk).await? {
                tracing::debug!("input closed; ending stream_in");
                source.close();
                self.close_input().await?;
                return Ok(StreamEnd::Closed);
            }
        }
        self.close_input().await?;
        Ok(StreamEnd::Eof)
    }
}

/// One element of a transport or reel.
#[derive(Clone)]
pub enum Track {
    Spool(Spool),
    Reel(Reel),
}

impl Track {
    fn streamer(&self) -> &dyn Streamer {
        match self {
            Track::Spool(s) => s,
            Track::Reel(r) => r,
        }
    }

    pub fn as_spool(&self) -> Option<&Spool> {
        match self {
            Track::Spool(s) => Some(s),
            Track::Reel(_) => None,
        }
    }

    pub fn as_reel(&self) -> Option<&Reel> {
        match self {
            Track::Reel(r) => Some(r),
            Track::Spool(_) => None,
        }
    }

    /// Whether two handles refer to the same underlying stage.
    pub fn same_as(&self, other: &Track) -> bool {
        match (self, other) {
            (Track::Spool(a), Track::Spool(b)) => a.same_as(b),
            (Track::Reel(a), Track::Reel(b)) => a.same_as(b),
            _ => false,
        }
    }
}

#[async_trait]
impl Streamer for Track {
    async fn start(&self, scope: &Scope, input: Option<Chunk>) -> Result<()> {
        self.streamer().start(scope, input).await
    }

    async fn pull_chunk(&self, max_bytes: usize) -> Result<Option<Chunk>> {
        self.streamer().pull_chunk(max_bytes).await
    }

    async fn send_chunk(&self, chunk: &[u8]) -> Result<bool> {
        self.streamer().send_chunk(chunk).await
    }

    async fn close_input(&self) -> Result<()> {
        self.streamer().close_input().await
    }

    async fn close(&self) -> Result<()> {
        self.streamer().close().await
    }

    fn chunk_bytes(&self) -> usize {
        self.streamer().chunk_bytes()
    }

    fn end_reason(&self) -> StreamEnd {
        self.streamer().end_reason()
    }
}

impl From<Spool> for Track {
    fn from(spool: Spool) -> Self {
        Track::Spool(spool)
    }
}

impl From<Reel> for Track {
    fn from(reel: Reel) -> Self {
        Track::Reel(reel)
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Track::Spool(s) => s.fmt(f),
            Track::Reel(r) => r.fmt(f),
        }
    }
}

impl fmt::Debug for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Track::Spool(s) => write!(f, "Track::Spool({s})"),
            Track::Reel(r) => write!(f, "Track::Reel({r})"),
        }
    }
}
