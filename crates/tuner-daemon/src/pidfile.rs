use nix::errno::Errno;
use nix::sys::signal;
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PidFileError {
    #[error("daemon already running with pid {0}")]
    AlreadyRunning(i32),
    #[error("pid file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Ownership of the PID file for the lifetime of the daemon.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Claim `path` for this process.  A file naming a dead process is
    /// treated as stale and replaced.
    pub fn acquire(path: &Path) -> Result<Self, PidFileError> {
        if let Some(pid) = running_pid(path) {
            return Err(PidFileError::AlreadyRunning(pid));
        }
        if path.exists() {
            info!("removing stale pid file {:?}", path);
        }
        std::fs::write(path, format!("{}\n", std::process::id())).map_err(|source| {
            PidFileError::Io {
                path: path.to_path_buf(),
                source,
            }
        })?;
        debug!("pid file {:?} written", path);
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(&self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("cannot remove pid file {:?}: {}", self.path, e);
            }
        }
    }
}

/// PID recorded in `path`, if that process is still alive.
pub fn running_pid(path: &Path) -> Option<i32> {
    let pid: i32 = std::fs::read_to_string(path).ok()?.trim().parse().ok()?;
    if pid <= 0 {
        return None;
    }
    match signal::kill(Pid::from_raw(pid), None) {
        Ok(()) | Err(Errno::EPERM) => Some(pid),
        Err(_) => None,
    }
}
