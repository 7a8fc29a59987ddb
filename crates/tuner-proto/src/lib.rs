//! Types shared by the tuner daemon and its command-line client: the command
//! grammar and reply records, the playback state aggregate, configuration,
//! the playlist source and platform paths.

pub mod config;
pub mod platform;
pub mod playlist;
pub mod protocol;
pub mod state;
