//! Ordered tracks played back to back.
//!
//! A reel keeps a cursor `(current, next)`. The current track is streamed,
//! the next one is started ahead of time so the switch has no gap, and every
//! other track stays unstarted.
//!
//! ```text
//!   tracks:  [0] [1] [2] [3]
//!             ^   ^
//!       current   next (prefetched)
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::channel::Chunk;
use crate::config::ReelConfig;
use crate::error::{ReelError, Result};
use crate::scope::Scope;
use crate::track::{Streamer, Track};

pub type AnnounceFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Track-change callback, run with the newly current track.
///
/// A slow or panicking callback is logged and otherwise ignored.
#[derive(Clone)]
pub enum Announce {
    Sync(Arc<dyn Fn(&Track) + Send + Sync>),
    Async(Arc<dyn Fn(Track) -> AnnounceFuture + Send + Sync>),
}

impl Announce {
    pub fn sync(f: impl Fn(&Track) + Send + Sync + 'static) -> Self {
        Announce::Sync(Arc::new(f))
    }

    pub fn future<F, Fut>(f: F) -> Self
    where
        F: Fn(Track) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Announce::Async(Arc::new(move |track| -> AnnounceFuture { Box::pin(f(track)) }))
    }
}

/// Position of a reel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cursor {
    pub current: Option<usize>,
    pub next: Option<usize>,
}

#[derive(Clone)]
pub struct Reel {
    tracks: Arc<[Track]>,
    announce: Option<Announce>,
    config: ReelConfig,
    state: Arc<ReelState>,
}

#[derive(Default)]
struct ReelState {
    cursor: StdMutex<Cursor>,
    /// Serializes advancing, skipping and closing.
    advance: Mutex<()>,
    scope: StdMutex<Option<Scope>>,
    /// Last queued track-change notification; each one waits for its predecessor.
    announcing: StdMutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
    closed: AtomicBool,
    input_closed: AtomicBool,
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Reel {
    pub fn new<I, T>(tracks: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Track>,
    {
        Self {
            tracks: tracks.into_iter().map(Into::into).collect(),
            announce: None,
            config: ReelConfig::default(),
            state: Arc::default(),
        }
    }

    pub fn announce(mut self, announce: Announce) -> Self {
        self.announce = Some(announce);
        self
    }

    pub fn with_config(mut self, config: ReelConfig) -> Self {
        self.config = config;
        self
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn cursor(&self) -> Cursor {
        *lock(&self.state.cursor)
    }

    pub fn current_index(&self) -> Option<usize> {
        self.cursor().current
    }

    pub fn next_index(&self) -> Option<usize> {
        self.cursor().next
    }

    pub fn current_track(&self) -> Option<Track> {
        self.current_index().map(|i| self.tracks[i].clone())
    }

    pub fn next_track(&self) -> Option<Track> {
        self.next_index().map(|i| self.tracks[i].clone())
    }

    pub fn same_as(&self, other: &Reel) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Switch to the next track right away.
    ///
    /// With `close_current` the current track is closed; otherwise only its
    /// input is, letting it finish what it already received. Returns `false`
    /// when there is no next track.
    pub async fn skip_to_next(&self, close_current: bool) -> Result<bool> {
        let Some(current) = self.current_index() else {
            return Ok(false);
        };
        let skipped = self.advance(current, close_current, true).await?;
        if skipped {
            tracing::debug!(from = current, "skipped");
        }
        Ok(skipped)
    }

    fn scope(&self) -> Result<Scope> {
        lock(&self.state.scope)
            .clone()
            .ok_or_else(|| ReelError::Config("reel used before start".to_string()))
    }

    async fn start_track(&self, index: usize, input: Option<Chunk>) -> Result<()> {
        let scope = self.scope()?;
        let track = &self.tracks[index];
        track.start(&scope, input).await?;
        if self.state.input_closed.load(Ordering::SeqCst) {
            track.close_input().await?;
        }
        Ok(())
    }

    /// Move the cursor past `from` if it is still current.
    async fn advance(&self, from: usize, close_current: bool, require_next: bool) -> Result<bool> {
        let promoted = {
            let _guard = self.state.advance.lock().await;
            if self.state.closed.load(Ordering::SeqCst) {
                return Ok(false);
            }
            let cursor = {
                let mut cursor = lock(&self.state.cursor);
                if cursor.current != Some(from) || (require_next && cursor.next.is_none()) {
                    return Ok(false);
                }
                cursor.current = cursor.next;
                cursor.next = cursor
                    .current
                    .map(|i| i + 1)
                    .filter(|&i| i < self.tracks.len());
                *cursor
            };

            let finished = &self.tracks[from];
            if close_current {
                finished.close().await?;
            } else {
                finished.close_input().await?;
            }
            if let Some(current) = cursor.current {
                self.start_track(current, None).await?;
            }
            if let Some(next) = cursor.next {
                self.start_track(next, None).await?;
            }
            tracing::debug!(from, current = ?cursor.current, next = ?cursor.next, "advanced");
            cursor.current
        };
        if let Some(current) = promoted {
            self.notify(current);
        }
        Ok(true)
    }

    /// Queue the track-change notification off the data path.
    ///
    /// Notifications run one after another in cursor order, each bounded by
    /// `announce_timeout`.
    fn notify(&self, index: usize) {
        let Some(announce) = self.announce.clone() else {
            return;
        };
        let track = self.tracks[index].clone();
        let timeout = self.config.announce_timeout;
        let mut tail = lock(&self.state.announcing);
        let previous = tail.take();
        *tail = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            let handle = match announce {
                Announce::Sync(f) => tokio::task::spawn_blocking(move || f(&track)),
                Announce::Async(f) => tokio::spawn(f(track)),
            };
            match tokio::time::timeout(timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(index, error = %e, "track-change notification failed"),
                Err(_) => tracing::warn!(index, "track-change notification timed out"),
            }
        }));
    }

    /// Wait (bounded) for queued notifications to be delivered.
    async fn flush_announcements(&self) {
        let tail = lock(&self.state.announcing).take();
        if let Some(mut tail) = tail {
            if tokio::time::timeout(self.config.announce_timeout, &mut tail)
                .await
                .is_err()
            {
                tracing::warn!("dropping undelivered track-change notifications");
                tail.abort();
            }
        }
    }
}

#[async_trait]
impl Streamer for Reel {
    async fn start(&self, scope: &Scope, input: Option<Chunk>) -> Result<()> {
        if self.state.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        *lock(&self.state.scope) = Some(scope.clone());
        let cursor = {
            let _guard = self.state.advance.lock().await;
            let cursor = {
                let mut cursor = lock(&self.state.cursor);
                cursor.current = (!self.tracks.is_empty()).then_some(0);
                cursor.next = (self.tracks.len() > 1).then_some(1);
                *cursor
            };
            if let Some(current) = cursor.current {
                self.start_track(current, input).await?;
            }
            if let Some(next) = cursor.next {
                self.start_track(next, None).await?;
            }
            cursor
        };
        tracing::debug!(tracks = self.tracks.len(), "reel started");
        if let Some(current) = cursor.current {
            self.notify(current);
        }
        Ok(())
    }

    async fn pull_chunk(&self, max_bytes: usize) -> Result<Option<Chunk>> {
        loop {
            if self.state.closed.load(Ordering::SeqCst) {
                return Ok(None);
            }
            let Some(index) = self.current_index() else {
                return Ok(None);
            };
            let track = self.tracks[index].clone();
            match track.pull_chunk(max_bytes).await? {
                Some(chunk) if self.current_index() == Some(index) => return Ok(Some(chunk)),
                Some(_) => tracing::trace!(index, "dropping chunk from a skipped track"),
                None => {
                    self.advance(index, true, false).await?;
                }
            }
        }
    }

    async fn send_chunk(&self, chunk: &[u8]) -> Result<bool> {
        loop {
            let Some(index) = self.current_index() else {
                return Ok(false);
            };
            if self.tracks[index].send_chunk(chunk).await? {
                return Ok(true);
            }
            if self.current_index() == Some(index) {
                return Ok(false);
            }
        }
    }

    async fn close_input(&self) -> Result<()> {
        self.state.input_closed.store(true, Ordering::SeqCst);
        let cursor = self.cursor();
        for index in [cursor.current, cursor.next].into_iter().flatten() {
            self.tracks[index].close_input().await?;
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.state.closed.store(true, Ordering::SeqCst);
        let _guard = self.state.advance.lock().await;
        let mut first = None;
        for track in self.tracks.iter() {
            if let Err(e) = track.close().await {
                tracing::warn!(track = %track, error = %e, "failed to close track");
                first.get_or_insert(e);
            }
        }
        self.flush_announcements().await;
        first.map_or(Ok(()), Err)
    }

    fn chunk_bytes(&self) -> usize {
        self.config.chunk_bytes()
    }
}

impl fmt::Display for Reel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reel of {} tracks", self.tracks.len())
    }
}

impl fmt::Debug for Reel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reel")
            .field("tracks", &self.tracks)
            .field("cursor", &self.cursor())
            .finish()
    }
}
