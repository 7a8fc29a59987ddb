use crate::dispatcher::Dispatcher;
use crate::hardware::{self, GestureTracker};
use crate::metadata::MetadataEvent;
use crate::pidfile::PidFile;
use crate::{http, snapshot, socket};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tuner_proto::config::Config;
use tuner_proto::platform;

const METADATA_QUEUE: usize = 64;
const TASK_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// A running daemon: the dispatcher plus every background task that feeds
/// it.
pub struct Daemon {
    dispatcher: Arc<Dispatcher>,
    pid_file: PidFile,
    socket_path: PathBuf,
    /// Cancelled by the `quit` command.
    quit: CancellationToken,
    /// Cancelled during shutdown to stop background tasks.
    tasks: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl Daemon {
    /// Claim the pid file, bind both listeners and start every task.  On a
    /// bind failure everything already acquired is released again.
    pub async fn start(config: Config) -> anyhow::Result<Self> {
        let pid_file = PidFile::acquire(&config.daemon.pid_file)?;
        info!("pid file {:?}", pid_file.path());

        let quit = CancellationToken::new();
        let tasks = CancellationToken::new();
        let (events_tx, events_rx) = mpsc::channel::<MetadataEvent>(METADATA_QUEUE);
        let dispatcher = Arc::new(Dispatcher::new(
            &config,
            events_tx,
            tasks.clone(),
            quit.clone(),
        ));

        let mut handles = Vec::new();
        if config.http.enabled {
            match http::start_server(
                &config.http.bind_address,
                config.http.port,
                dispatcher.clone(),
                tasks.clone(),
            )
            .await
            {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    pid_file.release();
                    return Err(e);
                }
            }
        }

        let listener = match socket::bind(&config.daemon.control_socket) {
            Ok(listener) => listener,
            Err(e) => {
                tasks.cancel();
                join_all(handles).await;
                pid_file.release();
                return Err(e);
            }
        };
        handles.push(socket::serve(listener, dispatcher.clone(), tasks.clone()));
        handles.push(dispatcher.spawn_metadata_applier(events_rx, tasks.clone()));
        handles.push(snapshot::spawn_timer(
            dispatcher.clone(),
            config.daemon.snapshot_interval(),
            tasks.clone(),
        ));

        match &config.hardware.event_source {
            Some(source) => {
                let tracker = GestureTracker::new(
                    config.hardware.double_click_window(),
                    config.audio.volume_step,
                );
                handles.push(hardware::spawn(
                    source.clone(),
                    tracker,
                    dispatcher.clone(),
                    tasks.clone(),
                ));
            }
            None => info!("hardware: no event source configured"),
        }

        if platform::find_program(&config.decoder.program).is_none() {
            warn!("decoder '{}' not found in PATH", config.decoder.program);
        }

        dispatcher.sync_mixer().await;
        if config.daemon.autoplay {
            let outcome = dispatcher.execute("play").await;
            info!("autoplay: {}", outcome.to_reply_line());
        }

        info!("daemon started");
        Ok(Self {
            dispatcher,
            pid_file,
            socket_path: config.daemon.control_socket.clone(),
            quit,
            tasks,
            handles: Mutex::new(handles),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Block until `quit`, SIGINT or SIGTERM.
    pub async fn run_until_quit(&self) -> anyhow::Result<()> {
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = self.quit.cancelled() => info!("quit command received"),
            _ = tokio::signal::ctrl_c() => info!("SIGINT received"),
            _ = sigterm.recv() => info!("SIGTERM received"),
        }
        Ok(())
    }

    /// Stop accepting commands, stop the decoder, stop background tasks, then
    /// remove the socket and pid files.  Later calls do nothing.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("shutting down");

        self.dispatcher.close().await;

        self.tasks.cancel();
        let handles = std::mem::take(&mut *self.handles.lock().await);
        join_all(handles).await;

        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("cannot remove control socket {:?}: {}", self.socket_path, e);
            }
        }
        self.pid_file.release();
        info!("shutdown complete");
    }
}

async fn join_all(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        match tokio::time::timeout(TASK_JOIN_TIMEOUT, handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("background task failed: {}", e),
            Err(_) => warn!("background task did not stop within {:?}", TASK_JOIN_TIMEOUT),
        }
    }
}
