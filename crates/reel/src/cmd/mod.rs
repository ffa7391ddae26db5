//! Ready-made commands for the external programs a player drives.
//!
//! Audio moves between stages as raw PCM: signed 16-bit little-endian,
//! 44.1 kHz, two channels.

pub mod aria2;
pub mod ffmpeg;
pub mod ffprobe;
pub mod icecast;
pub mod redis;
pub mod sox;

/// Sample rate shared by every preset.
pub const SAMPLE_RATE: &str = "44.1k";
/// Channel count shared by every preset.
pub const CHANNELS: &str = "2";
