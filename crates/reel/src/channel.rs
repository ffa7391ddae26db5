//! Rendezvous channels connecting adjacent pipeline stages.
//!
//! A send completes only after the receiving side has taken the chunk, so a
//! slow consumer stalls its producer and no more than one chunk is ever
//! resident in a channel.

use tokio::sync::{mpsc, oneshot};

/// A block of bytes moved between stages. Chunk boundaries carry no meaning.
pub type Chunk = Vec<u8>;

struct Handoff {
    chunk: Chunk,
    taken: oneshot::Sender<()>,
}

/// The receiving side went away; the chunk was not delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelClosed;

impl std::fmt::Display for ChannelClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("channel closed")
    }
}

/// Producer half. Dropping it signals end-of-data to the receiver.
pub struct ChunkSender {
    tx: mpsc::Sender<Handoff>,
}

/// Consumer half.
pub struct ChunkReceiver {
    rx: mpsc::Receiver<Handoff>,
}

/// Create a zero-buffer channel pair.
pub fn rendezvous() -> (ChunkSender, ChunkReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (ChunkSender { tx }, ChunkReceiver { rx })
}

impl ChunkSender {
    /// Hand `chunk` to the receiver, waiting until it has been taken.
    pub async fn send(&self, chunk: Chunk) -> Result<(), ChannelClosed> {
        let (taken, acked) = oneshot::channel();
        self.tx
            .send(Handoff { chunk, taken })
            .await
            .map_err(|_| ChannelClosed)?;
        acked.await.map_err(|_| ChannelClosed)
    }

    /// Whether the receiver has been dropped or closed.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl ChunkReceiver {
    /// Take the next chunk, or `None` once the sender is gone.
    pub async fn recv(&mut self) -> Option<Chunk> {
        let handoff = self.rx.recv().await?;
        let _ = handoff.taken.send(());
        Some(handoff.chunk)
    }

    /// Refuse further chunks; pending and future sends fail.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn send_waits_for_receiver() {
        let (tx, mut rx) = rendezvous();
        let pending = tokio::time::timeout(Duration::from_millis(50), tx.send(b"abc".to_vec())).await;
        assert!(pending.is_err(), "send must not complete without a receiver");

        let sender = tokio::spawn(async move { tx.send(b"def".to_vec()).await });
        // The first (timed-out) handoff may still sit in the slot; drain both.
        let mut got = Vec::new();
        while let Some(chunk) = rx.recv().await {
            got.extend(chunk);
        }
        assert!(sender.await.unwrap().is_ok());
        assert!(got.ends_with(b"def"));
    }

    #[tokio::test]
    async fn dropping_sender_ends_stream() {
        let (tx, mut rx) = rendezvous();
        let producer = tokio::spawn(async move {
            for i in 0..3u8 {
                tx.send(vec![i]).await.unwrap();
            }
        });
        let mut seen = Vec::new();
        while let Some(chunk) = rx.recv().await {
            seen.extend(chunk);
        }
        producer.await.unwrap();
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn closed_receiver_fails_send() {
        let (tx, mut rx) = rendezvous();
        rx.close();
        assert_eq!(tx.send(vec![1]).await, Err(ChannelClosed));
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn at_most_one_chunk_in_flight() {
        let (tx, mut rx) = rendezvous();
        let sent = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = sent.clone();
        let producer = tokio::spawn(async move {
            for _ in 0..10 {
                tx.send(vec![0u8; 8]).await.unwrap();
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }
        });
        for received in 1..=10usize {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let before = sent.load(std::sync::atomic::Ordering::SeqCst);
            assert!(before < received, "producer ran ahead of the consumer");
            assert!(rx.recv().await.is_some());
        }
        producer.await.unwrap();
    }
}
