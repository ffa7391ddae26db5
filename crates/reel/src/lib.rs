//! Process pipelines with backpressure, and gapless playlists built on them.
//!
//! A [`Spool`] wraps one OS process. A [`Transport`] wires spools stdout to
//! stdin through rendezvous channels. A [`Reel`] plays tracks back to back,
//! starting the next one early so switching has no gap. Long-running helper
//! processes go in a [`Server`].

pub mod channel;
pub mod cmd;
pub mod command;
pub mod config;
pub mod error;
pub mod reel;
pub mod scope;
pub mod server;
pub mod spool;
pub mod track;
pub mod transport;

pub use channel::{Chunk, ChunkReceiver, ChunkSender, rendezvous};
pub use command::Cmd;
pub use config::ReelConfig;
pub use error::{ReelError, Result, StreamEnd};
pub use reel::{Announce, Cursor, Reel};
pub use scope::Scope;
pub use server::{Daemon, Server};
pub use spool::Spool;
pub use track::{Streamer, Track};
pub use transport::{Output, Transport, TransportHandle};
