//! ffmpeg as decoder (track source) and encoder (network or file sink).

use std::ffi::OsStr;
use std::path::Path;

use crate::command::Cmd;
use crate::spool::Spool;

use super::{CHANNELS, SAMPLE_RATE};

/// Raw PCM on the input side of an encoder.
fn pcm_input(realtime: bool) -> Cmd {
    let cmd = Cmd::new("ffmpeg");
    let cmd = if realtime { cmd.arg("-re") } else { cmd };
    cmd.args(["-ac", CHANNELS, "-ar", SAMPLE_RATE, "-f", "s16le", "-i", "-"])
}

/// Decode any file or URL ffmpeg understands into raw PCM on stdout.
pub fn read(uri: impl AsRef<OsStr>) -> Spool {
    Spool::new(
        Cmd::new("ffmpeg")
            .args(["-ac", CHANNELS, "-i"])
            .arg(uri)
            .args(["-f", "s16le", "-ar", SAMPLE_RATE, "-acodec", "pcm_s16le", "-"]),
    )
}

/// Like [`read`], with EBU R128 loudness normalization.
pub fn read_normalized(uri: impl AsRef<OsStr>) -> Spool {
    Spool::new(
        Cmd::new("ffmpeg")
            .args(["-ac", CHANNELS, "-i"])
            .arg(uri)
            .args(["-af", "loudnorm=I=-16:TP=-1.5:LRA=11"])
            .args(["-ac", CHANNELS, "-f", "s16le", "-ar", SAMPLE_RATE, "-acodec", "pcm_s16le", "-"]),
    )
}

/// Endless silence, paced in real time.
pub fn silence() -> Spool {
    Spool::new(Cmd::new("ffmpeg").args(["-re", "-f", "s16le", "-i", "/dev/zero", "-f", "s16le", "-"]))
}

/// Encode PCM from stdin to MP3 and send it to `udp://host:port`.
pub fn to_udp(host: &str, port: u16) -> Spool {
    Spool::new(
        pcm_input(true)
            .args(["-vn", "-acodec", "mp3", "-q:a", "0", "-f", "mp3"])
            .arg(format!("udp://{host}:{port}")),
    )
}

/// Encode PCM from stdin into `path`; the container follows the extension.
pub fn to_file(path: &Path) -> Spool {
    Spool::new(pcm_input(false).arg("-y").arg(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_decodes_to_stdout() {
        let spool = read("/music/a b.flac");
        let argv = spool.cmd().argv();
        assert!(argv.windows(2).any(|w| w == ["-i", "/music/a b.flac"]));
        assert_eq!(argv.last().and_then(|a| a.to_str()), Some("-"));
    }

    #[test]
    fn udp_targets_host_and_port() {
        let spool = to_udp("192.168.1.100", 6667);
        assert_eq!(
            spool.cmd().argv().last().and_then(|a| a.to_str()),
            Some("udp://192.168.1.100:6667")
        );
        assert_eq!(spool.cmd().argv()[1], "-re");
    }

    #[test]
    fn file_sink_overwrites() {
        let spool = to_file(Path::new("/tmp/out.mp3"));
        let argv = spool.cmd().argv();
        assert_eq!(&argv[argv.len() - 2..], ["-y", "/tmp/out.mp3"]);
        assert_ne!(argv[1], "-re");
    }
}
