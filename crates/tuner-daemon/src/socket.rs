use crate::dispatcher::Dispatcher;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Longest command line accepted from a client.
const MAX_COMMAND_LEN: usize = 1024;
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Bind the control socket, replacing a leftover socket file from an earlier
/// run.  Failure here is fatal for the daemon.
pub fn bind(path: &Path) -> anyhow::Result<UnixListener> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    let listener = UnixListener::bind(path)
        .map_err(|e| anyhow::anyhow!("cannot bind control socket {:?}: {}", path, e))?;
    info!("control socket listening at {:?}", path);
    Ok(listener)
}

/// Accept connections until cancelled.  Each connection carries exactly one
/// command and one reply.
pub fn serve(
    listener: UnixListener,
    dispatcher: Arc<Dispatcher>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut client_id = 0usize;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        client_id += 1;
                        let id = client_id;
                        let dispatcher = dispatcher.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_client(stream, &dispatcher, id).await {
                                warn!("control client {}: {}", id, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("control socket accept failed: {}", e);
                    }
                },
            }
        }
        debug!("control socket server stopped");
    })
}

async fn handle_client(
    stream: UnixStream,
    dispatcher: &Dispatcher,
    client_id: usize,
) -> anyhow::Result<()> {
    let (mut read_half, mut write_half) = stream.into_split();

    let line = match tokio::time::timeout(READ_TIMEOUT, read_command(&mut read_half)).await {
        Ok(result) => result?,
        Err(_) => {
            write_half.write_all(b"ERROR: timed out waiting for command\n").await?;
            return Ok(());
        }
    };

    debug!("control client {}: {:?}", client_id, line);
    let outcome = dispatcher.execute(&line).await;
    let mut reply = outcome.to_reply_line();
    reply.push('\n');
    write_half.write_all(reply.as_bytes()).await?;
    write_half.shutdown().await?;
    Ok(())
}

/// Read up to the first newline or until the client half-closes.
async fn read_command<R>(reader: &mut R) -> anyhow::Result<String>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf: Vec<u8> = Vec::new();
    let mut tmp = [0u8; 256];
    loop {
        let n = reader.read(&mut tmp).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&tmp[..n]);
        if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
            buf.truncate(pos);
            break;
        }
        if buf.len() > MAX_COMMAND_LEN {
            anyhow::bail!("command longer than {} bytes", MAX_COMMAND_LEN);
        }
    }
    Ok(String::from_utf8_lossy(&buf).trim().to_string())
}
