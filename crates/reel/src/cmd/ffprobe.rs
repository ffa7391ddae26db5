//! Capability queries answered by `ffprobe`.

use crate::command::Cmd;
use crate::spool::Spool;

/// Lists the audio devices ffmpeg can see.
pub fn devices() -> Spool {
    Spool::new(Cmd::new("ffprobe").args(["-hide_banner", "-devices"]))
}

/// Lists the codecs ffmpeg supports.
pub fn codecs() -> Spool {
    Spool::new(Cmd::new("ffprobe").args(["-hide_banner", "-codecs"]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queries_hide_the_banner() {
        assert_eq!(devices().to_string(), "ffprobe -hide_banner -devices");
        assert_eq!(codecs().to_string(), "ffprobe -hide_banner -codecs");
    }
}
