/// The single entry point through which every command source mutates
/// playback.
///
/// ```text
///   hardware ─┐
///   socket   ─┼── Dispatcher::execute(line) ── lock(Core) ── handler ── report
///   http     ─┘                                   │
///                                                 └── DecoderSupervisor::switch/stop
///   parser tasks ── MetadataEvent ── applier ── Dispatcher::apply_metadata
/// ```
///
/// `Core` holds everything mutable.  It is only reachable through the mutex,
/// so a handler always sees and leaves a consistent state.
use crate::decoder::{DecoderError, DecoderSupervisor};
use crate::metadata::MetadataEvent;
use crate::mixer::{Mixer, MixerError};
use crate::snapshot::SnapshotWriter;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tuner_proto::config::Config;
use tuner_proto::playlist::PlaylistSource;
use tuner_proto::protocol::{
    Command, CommandOutcome, FailureKind, ParseError, StreamMetadata, VolumeChange,
};
use tuner_proto::state::PlaybackState;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("playlist is empty")]
    EmptyPlaylist,
    #[error(transparent)]
    Decoder(#[from] DecoderError),
    #[error("volume: {volume}% (mixer failed: {source})")]
    Mixer {
        volume: u8,
        #[source]
        source: MixerError,
    },
    #[error("failed to encode metadata: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("shutting down")]
    ShuttingDown,
}

impl CommandError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CommandError::Parse(_) => FailureKind::Command,
            CommandError::EmptyPlaylist => FailureKind::Environment,
            CommandError::Decoder(_) | CommandError::Mixer { .. } | CommandError::Encode(_) => {
                FailureKind::Resource
            }
            CommandError::ShuttingDown => FailureKind::Unavailable,
        }
    }
}

/// What a test or diagnostic sees of the decoder without holding the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderStatus {
    pub generation: u64,
    pub spawned: u64,
    pub pid: Option<u32>,
    pub running: bool,
}

struct Core {
    state: PlaybackState,
    decoder: DecoderSupervisor,
    accepting: bool,
}

impl Core {
    /// Select `index` and (re)start the decoder on it.  A failed spawn
    /// leaves the index selected and playback off.
    async fn switch_to(&mut self, index: usize, playlist: &[String]) -> Result<(), CommandError> {
        let url = playlist.get(index).ok_or(CommandError::EmptyPlaylist)?;
        self.state.select(index);
        self.state.metadata = StreamMetadata::for_stream(url);
        info!("station {}/{}: {}", index + 1, playlist.len(), url);

        match self.decoder.switch(url).await {
            Ok(()) => {
                self.state.is_playing = true;
                Ok(())
            }
            Err(e) => {
                self.state.is_playing = false;
                Err(e.into())
            }
        }
    }

    async fn halt(&mut self) {
        self.decoder.stop().await;
        self.state.is_playing = false;
    }
}

pub struct Dispatcher {
    core: Mutex<Core>,
    playlist: PlaylistSource,
    mixer: Mixer,
    snapshot: SnapshotWriter,
    quit: CancellationToken,
}

impl Dispatcher {
    /// `events` is where decoder parser tasks deliver metadata; `tasks` ends
    /// them at shutdown; `quit` is cancelled by the `quit` command.
    pub fn new(
        config: &Config,
        events: mpsc::Sender<MetadataEvent>,
        tasks: CancellationToken,
        quit: CancellationToken,
    ) -> Self {
        let decoder = DecoderSupervisor::new(&config.decoder, events, tasks);
        Self {
            core: Mutex::new(Core {
                state: PlaybackState::new(config.audio.default_volume),
                decoder,
                accepting: true,
            }),
            playlist: PlaylistSource::new(&config.playlist.path),
            mixer: Mixer::from_config(&config.audio),
            snapshot: SnapshotWriter::new(&config.daemon.snapshot_file),
            quit,
        }
    }

    /// Parse and run one command line.  Never panics and never returns an
    /// error: failures are reported in the outcome.
    pub async fn execute(&self, line: &str) -> CommandOutcome {
        match line.parse::<Command>() {
            Ok(command) => self.run(command).await,
            Err(e) => {
                debug!("rejected command {:?}: {}", line.trim(), e);
                let core = self.core.lock().await;
                let playlist = self.load_playlist();
                let err = CommandError::from(e);
                CommandOutcome::failure(err.kind(), err.to_string(), core.state.report(playlist.len()))
            }
        }
    }

    pub async fn run(&self, command: Command) -> CommandOutcome {
        let mut core = self.core.lock().await;
        let playlist = self.load_playlist();

        let result = if core.accepting {
            debug!("command: {}", command);
            let before = core.state.metadata.clone();
            let result = self.handle(&mut core, command, &playlist).await;
            if core.state.metadata != before {
                self.persist(&core.state.metadata).await;
            }
            result
        } else {
            Err(CommandError::ShuttingDown)
        };

        let report = core.state.report(playlist.len());
        match result {
            Ok(message) => {
                let mut outcome = CommandOutcome::success(message, report);
                if command == Command::List {
                    outcome.stations = core.state.station_entries(&playlist);
                }
                outcome
            }
            Err(e) => {
                warn!("command '{}' failed: {}", command, e);
                CommandOutcome::failure(e.kind(), e.to_string(), report)
            }
        }
    }

    async fn handle(
        &self,
        core: &mut Core,
        command: Command,
        playlist: &[String],
    ) -> Result<String, CommandError> {
        let len = playlist.len();
        match command {
            Command::Play => {
                if core.state.is_playing && core.decoder.is_running() {
                    return Ok("already playing".into());
                }
                let index = core.state.resolved_index(len).ok_or(CommandError::EmptyPlaylist)?;
                core.switch_to(index, playlist).await?;
                Ok("playback started".into())
            }
            Command::Stop => {
                if !core.state.is_playing && !core.decoder.is_running() {
                    return Ok("already stopped".into());
                }
                core.halt().await;
                Ok("playback stopped".into())
            }
            Command::Pause => {
                if core.state.is_playing {
                    core.halt().await;
                    Ok("paused".into())
                } else {
                    let index = core.state.resolved_index(len).ok_or(CommandError::EmptyPlaylist)?;
                    core.switch_to(index, playlist).await?;
                    Ok("playing".into())
                }
            }
            Command::Next => {
                let index = core.state.next_index(len).ok_or(CommandError::EmptyPlaylist)?;
                core.switch_to(index, playlist).await?;
                Ok(format!("next station ({})", index + 1))
            }
            Command::Prev => {
                let index = core.state.prev_index(len).ok_or(CommandError::EmptyPlaylist)?;
                core.switch_to(index, playlist).await?;
                Ok(format!("previous station ({})", index + 1))
            }
            Command::Station(Some(n)) => {
                let index =
                    PlaybackState::station_index(n, len).ok_or(CommandError::EmptyPlaylist)?;
                core.switch_to(index, playlist).await?;
                Ok(format!("station {} started", index + 1))
            }
            Command::Station(None) => {
                Ok(format!("current station: {}", core.state.display_station(len)))
            }
            Command::Volume(Some(change)) => self.change_volume(core, change).await,
            Command::Volume(None) => Ok(format!("current volume: {}%", core.state.volume())),
            Command::Status => Ok(format!(
                "station {}/{}, volume: {}%, status: {}",
                core.state.display_station(len),
                len,
                core.state.volume(),
                if core.state.is_playing { "playing" } else { "stopped" }
            )),
            Command::Info => Ok(serde_json::to_string_pretty(&core.state.metadata)?),
            Command::List => Ok(format_station_list(core.state.resolved_index(len), playlist)),
            Command::Quit => {
                info!("quit requested");
                self.quit.cancel();
                Ok("shutting down".into())
            }
        }
    }

    /// The new volume is kept even when the mixer call fails.
    async fn change_volume(
        &self,
        core: &mut Core,
        change: VolumeChange,
    ) -> Result<String, CommandError> {
        let volume = core.state.apply_volume(change);
        self.mixer
            .set_volume(volume)
            .await
            .map_err(|source| CommandError::Mixer { volume, source })?;
        Ok(format!("volume: {}%", volume))
    }

    /// Apply a parser update if it belongs to the current decoder.  Returns
    /// whether it was applied.
    pub async fn apply_metadata(&self, event: MetadataEvent) -> bool {
        let mut core = self.core.lock().await;
        if event.generation != core.decoder.generation() {
            debug!(
                "dropping metadata from generation {} (current {})",
                event.generation,
                core.decoder.generation()
            );
            return false;
        }
        event.update.apply_to(&mut core.state.metadata);
        core.state.metadata.last_updated = Some(chrono::Local::now());
        self.persist(&core.state.metadata).await;
        true
    }

    /// Drain parser events until the channel closes or `cancel` fires.
    pub fn spawn_metadata_applier(
        self: &Arc<Self>,
        mut events: mpsc::Receiver<MetadataEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => {
                            dispatcher.apply_metadata(event).await;
                        }
                        None => break,
                    },
                }
            }
            debug!("metadata applier stopped");
        })
    }

    /// Push the stored volume to the mixer, e.g. at startup.
    pub async fn sync_mixer(&self) {
        let core = self.core.lock().await;
        if let Err(e) = self.mixer.set_volume(core.state.volume()).await {
            warn!("mixer: initial volume not applied: {}", e);
        }
    }

    /// Refuse further commands and stop the decoder.  Safe to call again.
    pub async fn close(&self) {
        let mut core = self.core.lock().await;
        core.accepting = false;
        core.halt().await;
    }

    pub async fn metadata(&self) -> StreamMetadata {
        self.core.lock().await.state.metadata.clone()
    }

    pub async fn state(&self) -> PlaybackState {
        self.core.lock().await.state.clone()
    }

    pub async fn decoder_status(&self) -> DecoderStatus {
        let mut core = self.core.lock().await;
        DecoderStatus {
            generation: core.decoder.generation(),
            spawned: core.decoder.spawned(),
            pid: core.decoder.live_pid(),
            running: core.decoder.is_running(),
        }
    }

    /// Stations are re-read for every command.  An unreadable file counts as
    /// an empty playlist.
    fn load_playlist(&self) -> Vec<String> {
        match self.playlist.load() {
            Ok(stations) => stations,
            Err(e) => {
                warn!("playlist {:?} unreadable: {}", self.playlist.path(), e);
                Vec::new()
            }
        }
    }

    /// Rewrite the snapshot from the current record, ordered with every
    /// other write by the dispatcher lock.
    pub async fn persist_current(&self) {
        let core = self.core.lock().await;
        self.persist(&core.state.metadata).await;
    }

    /// Called with the lock held so the file follows state order.
    async fn persist(&self, metadata: &StreamMetadata) {
        if let Err(e) = self.snapshot.write(metadata).await {
            warn!("snapshot: write to {:?} failed: {}", self.snapshot.path(), e);
        }
    }
}

fn format_station_list(active: Option<usize>, playlist: &[String]) -> String {
    if playlist.is_empty() {
        return "stations: (playlist is empty)".into();
    }
    let mut out = String::from("stations:");
    for (i, url) in playlist.iter().enumerate() {
        let marker = if Some(i) == active { '*' } else { ' ' };
        out.push_str(&format!("\n {} {}: {}", marker, i + 1, url));
    }
    out
}
