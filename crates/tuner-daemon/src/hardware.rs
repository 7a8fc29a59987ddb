/// Rotary encoder + buttons as a command source.
///
/// A GPIO helper writes one event per line to a FIFO (`rotate <n>`, `press`,
/// `release`, `alarm`).  `GestureTracker` turns the event stream into command
/// lines for the dispatcher:
///
/// | gesture                         | command          |
/// |---------------------------------|------------------|
/// | turn                            | `volume ±step`   |
/// | turn while the knob is held     | `next` / `prev`  |
/// | two presses within the window   | `pause`          |
/// | alarm button released           | `play`           |
use crate::dispatcher::Dispatcher;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::unix::pipe;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareEvent {
    /// Signed encoder steps since the last event.
    Rotated(i32),
    Pressed,
    Released,
    AlarmReleased,
}

pub fn parse_event(line: &str) -> Option<HardwareEvent> {
    let mut parts = line.split_whitespace();
    match parts.next()?.to_lowercase().as_str() {
        "rotate" => parts.next()?.parse().ok().map(HardwareEvent::Rotated),
        "press" => Some(HardwareEvent::Pressed),
        "release" => Some(HardwareEvent::Released),
        "alarm" => Some(HardwareEvent::AlarmReleased),
        _ => None,
    }
}

#[derive(Debug)]
pub struct GestureTracker {
    double_click: Duration,
    volume_step: u8,
    last_press: Option<Instant>,
    held: bool,
    double_clicked: bool,
}

impl GestureTracker {
    pub fn new(double_click: Duration, volume_step: u8) -> Self {
        Self {
            double_click,
            volume_step,
            last_press: None,
            held: false,
            double_clicked: false,
        }
    }

    /// Feed one event observed at `now`; returns the command to run, if any.
    pub fn on_event(&mut self, event: HardwareEvent, now: Instant) -> Option<String> {
        match event {
            HardwareEvent::Rotated(0) => None,
            HardwareEvent::Rotated(steps) => Some(match (self.held, steps > 0) {
                (true, true) => "next".to_string(),
                (true, false) => "prev".to_string(),
                (false, true) => format!("volume +{}", self.volume_step),
                (false, false) => format!("volume -{}", self.volume_step),
            }),
            HardwareEvent::Pressed => {
                let quick = self
                    .last_press
                    .is_some_and(|last| now.saturating_duration_since(last) < self.double_click);
                self.last_press = Some(now);
                if quick {
                    self.double_clicked = true;
                    Some("pause".to_string())
                } else {
                    self.held = true;
                    None
                }
            }
            HardwareEvent::Released => {
                // The release that ends a double click leaves the hold state alone.
                if self.double_clicked {
                    self.double_clicked = false;
                } else {
                    self.held = false;
                }
                None
            }
            HardwareEvent::AlarmReleased => Some("play".to_string()),
        }
    }
}

/// Read events from `source` until cancelled.  The FIFO is reopened whenever
/// its writer goes away.
pub fn spawn(
    source: PathBuf,
    mut tracker: GestureTracker,
    dispatcher: Arc<Dispatcher>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("hardware: reading events from {:?}", source);
        loop {
            // Read-write keeps the FIFO open across writer restarts.
            let receiver = match pipe::OpenOptions::new()
                .read_write(true)
                .open_receiver(&source)
            {
                Ok(r) => r,
                Err(e) => {
                    warn!("hardware: cannot open {:?}: {}", source, e);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_secs(5)) => continue,
                    }
                }
            };

            let mut lines = BufReader::new(receiver).lines();
            loop {
                let line = tokio::select! {
                    _ = cancel.cancelled() => return,
                    line = lines.next_line() => line,
                };
                match line {
                    Ok(Some(line)) => {
                        let Some(event) = parse_event(&line) else {
                            if !line.trim().is_empty() {
                                warn!("hardware: unknown event {:?}", line);
                            }
                            continue;
                        };
                        if let Some(command) = tracker.on_event(event, Instant::now()) {
                            let outcome = dispatcher.execute(&command).await;
                            debug!("hardware: {} -> {}", command, outcome.to_reply_line());
                        }
                    }
                    Ok(None) => {
                        debug!("hardware: event source closed, reopening");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        break;
                    }
                    Err(e) => {
                        warn!("hardware: read error: {}", e);
                        break;
                    }
                }
            }
        }
        debug!("hardware: stopped");
    })
}
