use std::time::Duration;

/// Streaming tuning parameters shared by spools, transports and reels.
#[derive(Clone, Debug)]
pub struct ReelConfig {
    /// Max bytes read from a process stream per chunk.
    pub chunk_bytes: usize,
    /// How long `close()` waits for a process to exit before killing it.
    pub close_grace: Duration,
    /// Upper bound for a single track-change notification.
    pub announce_timeout: Duration,
}

impl Default for ReelConfig {
    /// Defaults sized for raw 16-bit stereo audio between decoder and sink.
    fn default() -> Self {
        Self {
            chunk_bytes: 16384,
            close_grace: Duration::from_secs(2),
            announce_timeout: Duration::from_secs(5),
        }
    }
}

impl ReelConfig {
    /// Chunk size, never zero.
    pub fn chunk_bytes(&self) -> usize {
        self.chunk_bytes.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_bytes_never_zero() {
        let cfg = ReelConfig {
            chunk_bytes: 0,
            ..ReelConfig::default()
        };
        assert_eq!(cfg.chunk_bytes(), 1);
        assert_eq!(ReelConfig::default().chunk_bytes(), 16384);
    }
}
