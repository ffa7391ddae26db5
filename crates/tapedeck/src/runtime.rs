//! Tapedeck runtime: the `play` and `search` commands.

use std::future::Future;
use std::path::PathBuf;

use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use reel::cmd::icecast::{self, IcecastServerConfig};
use reel::{Output, ReelError, Scope, Server};

use crate::config::{OutputKind, PlayConfig, SearchConfig};
use crate::keyboard::{Key, Keyboard};
use crate::library::{self, display_name};
use crate::memory::SearchMemory;
use crate::output;

/// Scan for music, print numbered folders, and remember them.
pub async fn run_search(config: SearchConfig) -> Result<()> {
    let memory = SearchMemory::new(&config.cache_file);
    if config.recall {
        for (i, path) in memory.entries().await?.iter().enumerate() {
            println!("{:>4}. {}", i + 1, display_name(path));
        }
        return Ok(());
    }

    let SearchConfig {
        directory,
        extensions,
        follow_links,
        follow_dots,
        ..
    } = config.clone();
    tracing::info!(dir = %directory.display(), "scanning for music");
    let folders = tokio::task::spawn_blocking(move || {
        library::find_tunes(&directory, &extensions, follow_links, follow_dots)
    })
    .await
    .context("search task")??;

    for (i, folder) in folders.iter().enumerate() {
        println!("{:>4}. {}", i + 1, folder.name());
    }
    memory.store(&folders).await
}

/// Files to play, in order: the TRACK file itself, then the remembered
/// folder, subfolders (with `-r`), and the TRACK folder.
pub async fn collect_tracks(config: &PlayConfig) -> Result<Vec<PathBuf>> {
    let mut folders = Vec::new();
    if let Some(index) = config.memory {
        folders.push(SearchMemory::new(&config.cache_file).recall(index).await?);
    }

    let config = config.clone();
    let mut tracks = tokio::task::spawn_blocking(move || -> Result<Vec<PathBuf>> {
        let mut tracks = Vec::new();
        if let Some(track) = config.track.as_ref() {
            if config.recursive {
                for folder in library::find_tunes(track, &config.extensions, false, false)? {
                    folders.push(folder.path);
                }
            } else if track.is_dir() {
                folders.push(track.clone());
            } else if track.is_file() {
                tracks.push(track.clone());
            } else {
                anyhow::bail!("no such file or folder: {}", track.display());
            }
        }
        for folder in &folders {
            tracks.extend(library::scan_folder(folder, &config.extensions)?);
        }
        if config.shuffle {
            tracks.shuffle(&mut rand::rng());
        }
        Ok(tracks)
    })
    .await
    .context("scan task")??;

    tracks.dedup();
    if tracks.is_empty() {
        return Err(ReelError::Config("no audio files found".to_string()).into());
    }
    Ok(tracks)
}

/// Play the requested tracks until the playlist ends or the user quits.
pub async fn run_play(config: PlayConfig) -> Result<()> {
    let tracks = collect_tracks(&config).await?;
    tracing::info!(tracks = tracks.len(), output = ?config.output, "playing");

    let scope = Scope::new();
    {
        let scope = scope.clone();
        let _ = ctrlc::set_handler(move || scope.cancel());
    }

    let server = daemons(&config).await?;
    supervised(&server, &scope, play(&config, &tracks, &scope)).await
}

/// Run `body` while the daemons of `server` are up.
///
/// The daemons are stopped and the scope joined however `body` (or the
/// daemon launch itself) ends.
async fn supervised<F>(server: &Server, scope: &Scope, body: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    let result = match server.run(scope).await {
        Ok(()) => body.await,
        Err(e) => Err(e).context("start daemons"),
    };
    let stopped = server.stop().await;
    scope.cancel();
    let joined = scope.join().await;
    result?;
    stopped?;
    joined?;
    Ok(())
}

async fn play(config: &PlayConfig, tracks: &[PathBuf], scope: &Scope) -> Result<()> {
    let reel = output::playlist(tracks, &config.reel);
    let transport = reel.clone() | output::sink(&config.output, &config.reel);

    let mut keyboard = Keyboard::open()?;
    let mut keys_open = true;
    let playing = transport.run_in(scope, None, Output::Discard);
    tokio::pin!(playing);
    loop {
        tokio::select! {
            result = &mut playing => {
                result?;
                return Ok(());
            }
            key = keyboard.next(), if keys_open => match key {
                Some(Key::Skip) => match reel.skip_to_next(true).await {
                    Ok(true) => {}
                    Ok(false) => tracing::info!("already on the last track"),
                    Err(e) => tracing::warn!(error = %e, "skip failed"),
                },
                Some(Key::Quit) => {
                    tracing::info!("quit requested");
                    scope.cancel();
                }
                Some(Key::Other) => {}
                None => keys_open = false,
            },
        }
    }
}

/// Background services the output needs.
async fn daemons(config: &PlayConfig) -> Result<Server> {
    let OutputKind::Icecast(target) = &config.output else {
        return Ok(Server::default());
    };
    if !config.icecast_server {
        return Ok(Server::default());
    }
    let path = std::env::temp_dir().join("tapedeck-icecast.xml");
    tokio::fs::write(&path, IcecastServerConfig::for_target(target).render())
        .await
        .with_context(|| format!("write icecast config {:?}", path))?;
    tracing::info!(listen = %target, "starting icecast");
    Ok(Server::new([icecast::server(&path)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::PlayArgs;
    use crate::config::TapedeckConfig;
    use crate::library::Folder;
    use reel::{Cmd, Daemon};
    use std::path::Path;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    fn play_config(dir: &Path, args: PlayArgs) -> PlayConfig {
        let cfg = TapedeckConfig {
            cache_file: Some(dir.join("search.txt").display().to_string()),
            ..TapedeckConfig::default()
        };
        PlayConfig::resolve(&args, &cfg).unwrap()
    }

    fn names(tracks: &[PathBuf]) -> Vec<String> {
        tracks.iter().map(|p| display_name(p)).collect()
    }

    #[tokio::test]
    async fn folder_tracks_are_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.flac", "a.flac", "c.txt"] {
            touch(&dir.path().join("album").join(name));
        }
        let args = PlayArgs {
            track: Some(dir.path().join("album")),
            output: Some("null".into()),
            ..PlayArgs::default()
        };
        let tracks = collect_tracks(&play_config(dir.path(), args)).await.unwrap();
        assert_eq!(names(&tracks), ["a.flac", "b.flac"]);
    }

    #[tokio::test]
    async fn recursive_play_includes_subfolders() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("x/1.flac"));
        touch(&dir.path().join("x/y/2.flac"));
        let args = PlayArgs {
            track: Some(dir.path().join("x")),
            recursive: true,
            ..PlayArgs::default()
        };
        let tracks = collect_tracks(&play_config(dir.path(), args)).await.unwrap();
        let mut got = names(&tracks);
        got.sort();
        assert_eq!(got, ["1.flac", "2.flac"]);
    }

    #[tokio::test]
    async fn memory_selects_a_remembered_folder() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("one/a.mp3"));
        touch(&dir.path().join("two/b.mp3"));
        let memory = SearchMemory::new(dir.path().join("search.txt"));
        let folders: Vec<Folder> = ["one", "two"]
            .iter()
            .map(|n| Folder {
                path: dir.path().join(n),
                song_files: Vec::new(),
                text_files: Vec::new(),
            })
            .collect();
        memory.store(&folders).await.unwrap();

        let args = PlayArgs {
            memory: Some(2),
            ..PlayArgs::default()
        };
        let tracks = collect_tracks(&play_config(dir.path(), args)).await.unwrap();
        assert_eq!(names(&tracks), ["b.mp3"]);

        let args = PlayArgs {
            memory: Some(5),
            ..PlayArgs::default()
        };
        let err = collect_tracks(&play_config(dir.path(), args)).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<ReelError>(), Some(ReelError::Index { index: 5, len: 2 })));
    }

    #[tokio::test]
    async fn shuffle_keeps_every_track() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..20 {
            touch(&dir.path().join(format!("album/{i:02}.flac")));
        }
        let args = PlayArgs {
            track: Some(dir.path().join("album")),
            shuffle: true,
            ..PlayArgs::default()
        };
        let mut got = names(&collect_tracks(&play_config(dir.path(), args)).await.unwrap());
        got.sort();
        let expected: Vec<String> = (0..20).map(|i| format!("{i:02}.flac")).collect();
        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn empty_folder_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("empty")).unwrap();
        let args = PlayArgs {
            track: Some(dir.path().join("empty")),
            ..PlayArgs::default()
        };
        let err = collect_tracks(&play_config(dir.path(), args)).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<ReelError>(), Some(ReelError::Config(_))));
    }

    fn sleeper() -> Daemon {
        Daemon::new(Cmd::new("sleep").arg("30"))
    }

    #[tokio::test]
    async fn failed_daemon_launch_stops_the_started_ones() {
        let scope = Scope::new();
        let first = sleeper();
        let server = first.clone() | Daemon::new(Cmd::new("no-such-daemon-9b2d"));
        let err = supervised(&server, &scope, async { Ok::<(), anyhow::Error>(()) }).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<ReelError>(), Some(ReelError::Spawn { .. })));
        assert!(first.pid().is_some());
        assert!(!first.is_running().await);
        assert_eq!(first.spool().releases(), 1);
    }

    #[tokio::test]
    async fn failed_playback_stops_the_daemons() {
        let scope = Scope::new();
        let daemon = sleeper();
        let server = Server::new([daemon.clone()]);
        let err = supervised(&server, &scope, async {
            Err::<(), _>(anyhow::Error::from(ReelError::Config("no terminal".to_string())))
        })
        .await
        .unwrap_err();
        assert!(matches!(err.downcast_ref::<ReelError>(), Some(ReelError::Config(_))));
        assert!(!daemon.is_running().await);
        assert!(scope.is_cancelled());
    }

    #[tokio::test]
    async fn search_remembers_folders() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("music/Beta/1.flac"));
        touch(&dir.path().join("music/alpha/1.flac"));
        let config = SearchConfig {
            directory: dir.path().join("music"),
            follow_dots: false,
            follow_links: false,
            recall: false,
            extensions: vec!["flac".to_string()],
            cache_file: dir.path().join("cache/search.txt"),
        };
        run_search(config.clone()).await.unwrap();
        let remembered = SearchMemory::new(&config.cache_file).entries().await.unwrap();
        assert_eq!(names(&remembered), ["alpha", "Beta"]);
    }
}
