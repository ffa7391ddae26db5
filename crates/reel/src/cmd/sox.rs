use crate::command::Cmd;
use crate::spool::Spool;

use super::{CHANNELS, SAMPLE_RATE};

/// Play raw PCM from stdin on the default audio device.
pub fn speakers() -> Spool {
    Spool::new(Cmd::new("play").args([
        "-t",
        "raw",
        "-r",
        SAMPLE_RATE,
        "-e",
        "signed-integer",
        "-b",
        "16",
        "--endian",
        "little",
        "-c",
        CHANNELS,
        "-",
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speakers_reads_stdin() {
        let argv = speakers().cmd().argv().to_vec();
        assert_eq!(argv[0], "play");
        assert_eq!(argv.last().and_then(|a| a.to_str()), Some("-"));
        assert!(argv.windows(2).any(|w| w == ["--endian", "little"]));
    }
}
