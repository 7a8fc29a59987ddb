pub mod client;
pub mod daemon;
pub mod decoder;
pub mod dispatcher;
pub mod hardware;
pub mod http;
pub mod metadata;
pub mod mixer;
pub mod pidfile;
pub mod snapshot;
pub mod socket;
