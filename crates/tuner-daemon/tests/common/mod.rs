//! Shared fixtures: a scratch directory with a playlist and a `/bin/sh`
//! stand-in decoder that records its pid and prints one ICY header.
#![allow(dead_code)]

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tuner_daemon::dispatcher::Dispatcher;
use tuner_daemon::metadata::MetadataEvent;
use tuner_proto::config::Config;

pub const STATIONS: [&str; 3] = ["http://a.test/live", "http://b.test/live", "http://c.test/live"];

pub struct Fixture {
    pub dir: TempDir,
    pub config: Config,
}

impl Fixture {
    pub fn new(stations: &[&str]) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();

        let mut config = Config::default();
        config.daemon.pid_file = root.join("tuner.pid");
        config.daemon.control_socket = root.join("control.sock");
        config.daemon.snapshot_file = root.join("current_stream.json");
        config.daemon.autoplay = false;
        config.http.enabled = false;
        config.playlist.path = root.join("playlist.m3u");
        config.audio.mixer_enabled = false;
        config.decoder.stop_timeout_ms = 2000;

        let mut fixture = Self { dir, config };
        fixture.write_playlist(stations);
        let script = format!(
            "echo $$ >> '{}'; echo \"ICY-NAME: station $1\"; exec sleep 30",
            fixture.pids_path().display()
        );
        fixture.set_decoder_script(&script);
        fixture
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Every stand-in decoder appends its pid here once it is running.
    pub fn pids_path(&self) -> PathBuf {
        self.dir.path().join("decoder.pids")
    }

    pub fn write_playlist(&self, stations: &[&str]) {
        let mut content = String::from("#EXTM3U\n");
        for url in stations {
            content.push_str(url);
            content.push('\n');
        }
        std::fs::write(&self.config.playlist.path, content).expect("write playlist");
    }

    /// The station URL arrives as `$1`.
    pub fn set_decoder_script(&mut self, script: &str) {
        self.config.decoder.program = "/bin/sh".into();
        self.config.decoder.args = vec![
            "-c".into(),
            script.to_string(),
            "tuner-test-decoder".into(),
        ];
    }

    pub fn recorded_pids(&self) -> Vec<i32> {
        std::fs::read_to_string(self.pids_path())
            .unwrap_or_default()
            .lines()
            .filter_map(|l| l.trim().parse().ok())
            .collect()
    }
}

pub struct Harness {
    pub dispatcher: Arc<Dispatcher>,
    pub events: Option<mpsc::Receiver<MetadataEvent>>,
    pub tasks: CancellationToken,
    pub quit: CancellationToken,
}

impl Harness {
    pub fn new(config: &Config) -> Self {
        let (tx, rx) = mpsc::channel(64);
        let tasks = CancellationToken::new();
        let quit = CancellationToken::new();
        let dispatcher = Arc::new(Dispatcher::new(config, tx, tasks.clone(), quit.clone()));
        Self {
            dispatcher,
            events: Some(rx),
            tasks,
            quit,
        }
    }

    /// Start applying parser output to the dispatcher.
    pub fn start_applier(&mut self) -> tokio::task::JoinHandle<()> {
        let rx = self.events.take().expect("applier already started");
        self.dispatcher.spawn_metadata_applier(rx, self.tasks.clone())
    }

    pub async fn close(&self) {
        self.dispatcher.close().await;
        self.tasks.cancel();
    }
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn wait_for<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// True while `pid` names a process that has not been reaped.
pub fn process_alive(pid: i32) -> bool {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok()
}
