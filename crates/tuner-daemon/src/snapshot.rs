use crate::dispatcher::Dispatcher;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tuner_proto::protocol::StreamMetadata;

/// Writes the now-playing record to a JSON file for other local programs
/// (displays, scripts).  Readers never observe a partial file.
#[derive(Debug)]
pub struct SnapshotWriter {
    path: PathBuf,
    writes: AtomicU64,
}

impl SnapshotWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writes: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stamp the record with the current time and replace the file.  Each
    /// call stages into its own temp file, so overlapping calls never rename
    /// each other's data away.
    pub async fn write(&self, metadata: &StreamMetadata) -> anyhow::Result<()> {
        let mut record = metadata.clone();
        record.last_updated = Some(chrono::Local::now());
        let json = serde_json::to_string_pretty(&record)?;

        let seq = self.writes.fetch_add(1, Ordering::Relaxed);
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(format!(".{}.{}.tmp", std::process::id(), seq));
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, json).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

/// Rewrite the snapshot every `interval` until cancelled.  The write goes
/// through the dispatcher so it is ordered with every other update.
pub fn spawn_timer(
    dispatcher: Arc<Dispatcher>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => dispatcher.persist_current().await,
            }
        }
        debug!("snapshot: timer stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("current_stream.json");
        let writer = SnapshotWriter::new(&path);

        let mut meta = StreamMetadata::for_stream("http://a");
        meta.title = "first".into();
        writer.write(&meta).await.unwrap();
        meta.title = "second".into();
        writer.write(&meta).await.unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["title"], "second");
        assert_eq!(value["stream_url"], "http://a");
        assert!(value["timestamp"].is_string());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_overlapping_writes_all_land() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("current_stream.json");
        let writer = Arc::new(SnapshotWriter::new(&path));

        let mut long = StreamMetadata::for_stream("http://a");
        long.title = "x".repeat(4096);
        let short = StreamMetadata::for_stream("http://b");

        for _ in 0..100 {
            let (a, b) = tokio::join!(
                tokio::spawn({
                    let writer = writer.clone();
                    let long = long.clone();
                    async move { writer.write(&long).await }
                }),
                tokio::spawn({
                    let writer = writer.clone();
                    let short = short.clone();
                    async move { writer.write(&short).await }
                }),
            );
            a.unwrap().unwrap();
            b.unwrap().unwrap();

            let value: serde_json::Value =
                serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
            let url = value["stream_url"].as_str().unwrap();
            assert!(url == "http://a" || url == "http://b");
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_write_into_missing_dir_fails() {
        let writer = SnapshotWriter::new("/nonexistent/dir/current_stream.json");
        assert!(writer.write(&StreamMetadata::default()).await.is_err());
    }
}
