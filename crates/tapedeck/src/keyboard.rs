//! Keyboard control while playing.
//!
//! Keys:
//! - j / n: skip to the next track
//! - q / Esc / Ctrl-C: quit

use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tokio::sync::mpsc;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Skip,
    Quit,
    Other,
}

pub fn decode(event: &KeyEvent) -> Option<Key> {
    if event.kind != KeyEventKind::Press {
        return None;
    }
    let key = match event.code {
        KeyCode::Char('c') if event.modifiers.contains(KeyModifiers::CONTROL) => Key::Quit,
        KeyCode::Char('j') | KeyCode::Char('n') => Key::Skip,
        KeyCode::Char('q') | KeyCode::Esc => Key::Quit,
        _ => Key::Other,
    };
    Some(key)
}

/// Key presses from the controlling terminal, decoded on a reader thread.
///
/// The terminal is in raw mode while this exists. Without a terminal on
/// stdin no keys are ever produced.
pub struct Keyboard {
    rx: mpsc::Receiver<Key>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    raw: bool,
}

impl Keyboard {
    pub fn open() -> Result<Self> {
        if !io::stdin().is_terminal() {
            let (_, rx) = mpsc::channel(1);
            return Ok(Self {
                rx,
                stop: Arc::new(AtomicBool::new(true)),
                reader: None,
                raw: false,
            });
        }
        enable_raw_mode().context("enable raw terminal mode")?;
        Ok(Self::with_source(terminal_event, true))
    }

    /// Decode keys from `source`, polled on a reader thread with a timeout.
    fn with_source<F>(source: F, raw: bool) -> Self
    where
        F: FnMut(Duration) -> io::Result<Option<Event>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(16);
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let reader = std::thread::spawn(move || read_keys(tx, flag, source));
        Self {
            rx,
            stop,
            reader: Some(reader),
            raw,
        }
    }

    /// Next decoded key; `None` once no more keys can arrive.
    pub async fn next(&mut self) -> Option<Key> {
        self.rx.recv().await
    }
}

impl Drop for Keyboard {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        // Unblocks a reader waiting on a full channel.
        self.rx.close();
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        if self.raw {
            if let Err(e) = disable_raw_mode() {
                tracing::warn!(error = %e, "failed to restore terminal mode");
            }
        }
    }
}

fn terminal_event(timeout: Duration) -> io::Result<Option<Event>> {
    if event::poll(timeout)? {
        event::read().map(Some)
    } else {
        Ok(None)
    }
}

fn read_keys<F>(tx: mpsc::Sender<Key>, stop: Arc<AtomicBool>, mut source: F)
where
    F: FnMut(Duration) -> io::Result<Option<Event>>,
{
    while !stop.load(Ordering::Relaxed) {
        match source(POLL_INTERVAL) {
            Ok(Some(Event::Key(key))) => {
                let Some(key) = decode(&key) else { continue };
                if tx.blocking_send(key).is_err() {
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "keyboard read failed");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn skip_and_quit_keys() {
        assert_eq!(decode(&press(KeyCode::Char('j'), KeyModifiers::NONE)), Some(Key::Skip));
        assert_eq!(decode(&press(KeyCode::Char('n'), KeyModifiers::NONE)), Some(Key::Skip));
        assert_eq!(decode(&press(KeyCode::Char('q'), KeyModifiers::NONE)), Some(Key::Quit));
        assert_eq!(decode(&press(KeyCode::Char('c'), KeyModifiers::CONTROL)), Some(Key::Quit));
        assert_eq!(decode(&press(KeyCode::Char('c'), KeyModifiers::NONE)), Some(Key::Other));
    }

    fn skip_forever(_: Duration) -> io::Result<Option<Event>> {
        Ok(Some(Event::Key(press(KeyCode::Char('j'), KeyModifiers::NONE))))
    }

    #[tokio::test]
    async fn keys_reach_the_player() {
        let mut keyboard = Keyboard::with_source(skip_forever, false);
        assert_eq!(keyboard.next().await, Some(Key::Skip));
    }

    #[test]
    fn drop_with_a_full_queue_returns() {
        let keyboard = Keyboard::with_source(skip_forever, false);
        std::thread::sleep(Duration::from_millis(50));
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            drop(keyboard);
            let _ = done_tx.send(());
        });
        assert!(done_rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn releases_are_ignored() {
        let mut release = press(KeyCode::Char('j'), KeyModifiers::NONE);
        release.kind = KeyEventKind::Release;
        assert_eq!(decode(&release), None);
    }
}
