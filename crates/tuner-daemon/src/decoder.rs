/// Supervision of the external decoder process.
///
/// ```text
///   DecoderSupervisor::switch(url)
///         │
///         ├── stop()          ← SIGTERM, wait up to the grace period, SIGKILL, reap
///         ├── generation += 1
///         └── spawn `<program> <args...> <url>`
///                 └── parser task (stdout + stderr) → MetadataEvent channel
/// ```
///
/// The supervisor has no lock of its own.  Every `&mut self` method assumes
/// the caller holds the dispatcher lock, which is what guarantees that at most
/// one decoder is ever alive.
use crate::metadata::{self, MetadataEvent};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tuner_proto::config::DecoderConfig;

#[derive(Debug, Error)]
pub enum DecoderError {
    #[error("failed to start decoder '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("decoder output pipe was not captured")]
    MissingPipe,
}

struct LiveDecoder {
    child: Child,
    generation: u64,
    url: String,
    parser: JoinHandle<()>,
}

pub struct DecoderSupervisor {
    program: String,
    args: Vec<String>,
    grace: Duration,
    generation: u64,
    spawned: u64,
    live: Option<LiveDecoder>,
    events: mpsc::Sender<MetadataEvent>,
    cancel: CancellationToken,
}

impl DecoderSupervisor {
    /// `cancel` ends every parser task at daemon shutdown.
    pub fn new(
        config: &DecoderConfig,
        events: mpsc::Sender<MetadataEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            grace: config.stop_timeout(),
            generation: 0,
            spawned: 0,
            live: None,
            events,
            cancel,
        }
    }

    /// Replace the current decoder (if any) with one playing `url`.
    ///
    /// The old process has exited and been reaped before the new one is
    /// spawned.  On error no decoder is running.
    pub async fn switch(&mut self, url: &str) -> Result<(), DecoderError> {
        self.stop().await;
        self.generation += 1;
        let generation = self.generation;

        debug!("decoder: spawning {} {:?} {}", self.program, self.args, url);
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DecoderError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            let _ = child.kill().await;
            return Err(DecoderError::MissingPipe);
        };

        let parser = metadata::spawn_parser(
            generation,
            stdout,
            stderr,
            self.events.clone(),
            self.cancel.child_token(),
        );
        self.spawned += 1;
        info!(
            "decoder: started generation {} (pid {:?}) for {}",
            generation,
            child.id(),
            url
        );
        self.live = Some(LiveDecoder {
            child,
            generation,
            url: url.to_string(),
            parser,
        });
        Ok(())
    }

    /// Terminate the current decoder without replacing it.  Returns whether
    /// there was one.  Output still in flight from it is discarded.
    pub async fn stop(&mut self) -> bool {
        let Some(mut live) = self.live.take() else {
            return false;
        };
        // Anything the old parser still delivers now carries a stale tag.
        self.generation += 1;

        terminate(&mut live.child, self.grace).await;
        live.parser.abort();
        debug!(
            "decoder: generation {} stopped ({})",
            live.generation, live.url
        );
        true
    }

    /// True while a decoder process exists and has not exited on its own.
    pub fn is_running(&mut self) -> bool {
        match self.live.as_mut() {
            Some(live) => matches!(live.child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Generation of the most recent decoder (or of the stop that followed
    /// it).  Only events carrying this value are current.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Total number of processes started over the supervisor's lifetime.
    pub fn spawned(&self) -> u64 {
        self.spawned
    }

    pub fn live_pid(&self) -> Option<u32> {
        self.live.as_ref().and_then(|live| live.child.id())
    }

    pub fn current_url(&self) -> Option<&str> {
        self.live.as_ref().map(|live| live.url.as_str())
    }
}

/// SIGTERM, bounded wait, then SIGKILL.  The child is always reaped.
async fn terminate(child: &mut Child, grace: Duration) {
    if let Ok(Some(status)) = child.try_wait() {
        debug!("decoder: already exited with {}", status);
        return;
    }

    if let Some(pid) = child.id().and_then(|id| i32::try_from(id).ok()) {
        if let Err(e) = signal::kill(Pid::from_raw(pid), Signal::SIGTERM) {
            warn!("decoder: SIGTERM to {} failed: {}", pid, e);
        }
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => debug!("decoder: exited with {}", status),
        Ok(Err(e)) => warn!("decoder: wait failed: {}", e),
        Err(_) => {
            warn!("decoder: no exit after {:?}, sending SIGKILL", grace);
            // kill() also waits for the process.
            if let Err(e) = child.kill().await {
                warn!("decoder: SIGKILL failed: {}", e);
            }
        }
    }
}
