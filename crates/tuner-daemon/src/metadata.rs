/// Decoder output → typed "now playing" updates.
///
/// ```text
///   decoder stdout ─┐
///                   ├── parser task (one per decoder generation)
///   decoder stderr ─┘        │ parse_line() per line
///                            └── MetadataEvent { generation, update } → applier
/// ```
///
/// The matchers are pure.  The parser task never touches playback state; the
/// dispatcher decides whether an event is still current.
use regex::Regex;
use std::sync::LazyLock;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tuner_proto::protocol::StreamMetadata;

// Constant patterns; `test_patterns_compile` keeps them valid.
static STREAM_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"StreamTitle='(.*?)'").expect("StreamTitle pattern"));
static ICY_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ICY-NAME:\s*(.*)").expect("ICY-NAME pattern"));
static ICY_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ICY-URL:\s*(.*)").expect("ICY-URL pattern"));
static MPEG_FORMAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"MPEG.*?(\d+\s*kbit/s),\s*(\d+\s*kHz)\s*(Mono|Stereo|Joint-Stereo|Dual-Channel)")
        .expect("MPEG format pattern")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataUpdate {
    Title(String),
    StationName(String),
    StationUrl(String),
    Format {
        bitrate: String,
        sample_rate: String,
        channels: String,
    },
}

impl MetadataUpdate {
    pub fn apply_to(self, meta: &mut StreamMetadata) {
        match self {
            MetadataUpdate::Title(title) => meta.title = title,
            MetadataUpdate::StationName(name) => meta.station_name = name,
            MetadataUpdate::StationUrl(url) => meta.station_url = url,
            MetadataUpdate::Format {
                bitrate,
                sample_rate,
                channels,
            } => {
                meta.bitrate = bitrate;
                meta.sample_rate = sample_rate;
                meta.channels = channels;
            }
        }
    }
}

/// An update tagged with the decoder generation that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataEvent {
    pub generation: u64,
    pub update: MetadataUpdate,
}

/// Match one output line.  The first matcher that hits wins, in the order
/// title, station name, station URL, format.
pub fn parse_line(line: &str) -> Option<MetadataUpdate> {
    let line = line.trim();

    if let Some(caps) = STREAM_TITLE.captures(line) {
        return Some(MetadataUpdate::Title(caps[1].to_string()));
    }
    if let Some(caps) = ICY_NAME.captures(line) {
        return Some(MetadataUpdate::StationName(caps[1].trim().to_string()));
    }
    if let Some(caps) = ICY_URL.captures(line) {
        return Some(MetadataUpdate::StationUrl(caps[1].trim().to_string()));
    }
    if let Some(caps) = MPEG_FORMAT.captures(line) {
        return Some(MetadataUpdate::Format {
            bitrate: caps[1].to_string(),
            sample_rate: caps[2].to_string(),
            channels: caps[3].to_string(),
        });
    }
    None
}

/// Read both pipes of one decoder until they close or `cancel` fires.
pub fn spawn_parser(
    generation: u64,
    stdout: ChildStdout,
    stderr: ChildStderr,
    events: mpsc::Sender<MetadataEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let pumps = async {
            tokio::join!(
                pump(stdout, generation, events.clone()),
                pump(stderr, generation, events),
            )
        };
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("metadata[{}]: cancelled", generation);
            }
            _ = pumps => {
                debug!("metadata[{}]: decoder output closed", generation);
            }
        }
    })
}

async fn pump<R>(reader: R, generation: u64, events: mpsc::Sender<MetadataEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let Some(update) = parse_line(&line) else {
                    continue;
                };
                debug!("metadata[{}]: {:?}", generation, update);
                if events.send(MetadataEvent { generation, update }).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("metadata[{}]: read error: {}", generation, e);
                break;
            }
        }
    }
}
