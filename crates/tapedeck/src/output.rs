//! Turn a play request into reel stages: a playlist of decoders and a sink.

use std::path::PathBuf;

use reel::cmd::{ffmpeg, icecast, sox};
use reel::{Announce, Cmd, Reel, ReelConfig, Spool};

use crate::config::OutputKind;
use crate::library::display_name;

/// The stage that receives decoded PCM.
pub fn sink(output: &OutputKind, config: &ReelConfig) -> Spool {
    let spool = match output {
        OutputKind::Speakers => sox::speakers(),
        OutputKind::Udp { host, port } => ffmpeg::to_udp(host, *port),
        OutputKind::Icecast(target) => icecast::client(target),
        OutputKind::File(path) => ffmpeg::to_file(path),
        OutputKind::Discard => Spool::new(Cmd::new("cat")),
    };
    spool.with_config(config.clone())
}

/// One decoder per file, announced on stdout as each one starts.
pub fn playlist(paths: &[PathBuf], config: &ReelConfig) -> Reel {
    let labelled: Vec<(Spool, String)> = paths
        .iter()
        .map(|path| (ffmpeg::read(path).with_config(config.clone()), display_name(path)))
        .collect();
    let tracks: Vec<Spool> = labelled.iter().map(|(spool, _)| spool.clone()).collect();
    let announce = Announce::sync(move |track| {
        let name = labelled
            .iter()
            .find(|(spool, _)| track.as_spool().is_some_and(|t| t.same_as(spool)))
            .map(|(_, name)| name.clone())
            .unwrap_or_else(|| track.to_string());
        // Raw terminal mode: return the carriage explicitly.
        print!("▶ {name}\r\n");
    });
    Reel::new(tracks).with_config(config.clone()).announce(announce)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel::cmd::icecast::IcecastTarget;

    #[test]
    fn sinks_match_output_kinds() {
        let cfg = ReelConfig::default();
        assert_eq!(sink(&OutputKind::Speakers, &cfg).cmd().program(), "play");
        let udp = sink(
            &OutputKind::Udp {
                host: "10.0.0.2".into(),
                port: 6667,
            },
            &cfg,
        );
        assert!(udp.to_string().ends_with("udp://10.0.0.2:6667"));
        let ice = sink(&OutputKind::Icecast(IcecastTarget::default()), &cfg);
        assert!(ice.to_string().contains("icecast://"));
        let file = sink(&OutputKind::File(PathBuf::from("/tmp/x.ogg")), &cfg);
        assert!(file.to_string().ends_with("/tmp/x.ogg"));
    }

    #[test]
    fn playlist_has_one_decoder_per_file() {
        let paths = vec![PathBuf::from("/m/01.flac"), PathBuf::from("/m/02.flac")];
        let reel = playlist(&paths, &ReelConfig::default());
        assert_eq!(reel.len(), 2);
        assert!(reel.tracks()[1].to_string().contains("/m/02.flac"));
    }
}
