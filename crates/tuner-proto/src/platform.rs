use std::path::PathBuf;

pub const DEFAULT_HTTP_PORT: u16 = 8080;

const CONTROL_SOCKET_NAME: &str = "tuner-control.sock";
const PID_FILE_NAME: &str = "tuner.pid";
const SNAPSHOT_FILE_NAME: &str = "current_stream.json";

pub fn data_dir() -> PathBuf {
    // ~/.local/share/tuner/ (XDG), same layout on every unix
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".local")
        .join("share")
        .join("tuner")
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("tuner")
}

pub fn temp_dir() -> PathBuf {
    std::env::temp_dir()
}

/// Fixed rendezvous point for the local command channel.
pub fn control_socket_path() -> PathBuf {
    temp_dir().join(CONTROL_SOCKET_NAME)
}

pub fn pid_file_path() -> PathBuf {
    temp_dir().join(PID_FILE_NAME)
}

/// Where the "now playing" snapshot is published for other programs.
pub fn snapshot_path() -> PathBuf {
    temp_dir().join(SNAPSHOT_FILE_NAME)
}

pub fn playlist_path() -> PathBuf {
    config_dir().join("playlist.m3u")
}

/// Resolve a program name the way `execvp` would, so startup can warn early
/// when the decoder or mixer binary is missing.  Paths containing a separator
/// are checked as-is.
pub fn find_program(name: &str) -> Option<PathBuf> {
    if name.contains('/') {
        let p = PathBuf::from(name);
        return p.exists().then_some(p);
    }
    let path = std::env::var("PATH").ok()?;
    for dir in path.split(':') {
        let p = PathBuf::from(dir).join(name);
        if p.exists() {
            return Some(p);
        }
    }
    None
}
