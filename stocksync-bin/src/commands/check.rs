use std::path::Path;

use anyhow::{Context, Result};
use bytes::{Bytes, BytesMut};
use log::{info, warn};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::codec::Decoder;

use stocksync_lib::spreadsheet::Inventory;
use stocksync_lib::stream::{FrameCodec, StreamEnd};

use crate::options::Config;
use crate::ExitCode;

/// Frames buffered between the stream and the terminal
const FRAME_BUFFER: usize = 16;

/// Compare the spreadsheet at `file` once and print every frame payload to
/// stdout, one per line.
pub(crate) async fn check(config: &Config, file: &Path) -> Result<ExitCode> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Cannot read spreadsheet `{}`", file.display()))?;
    let inventory = Inventory::from_xlsx(bytes)
        .with_context(|| format!("Cannot parse spreadsheet `{}`", file.display()))?;
    info!(
        "Read {} rows for {} item numbers from {}",
        inventory.len(),
        inventory.item_count(),
        file.display()
    );

    let session = config.session()?;
    let tasks = session
        .prepare(&inventory)
        .await
        .context("Cannot fetch products and stores")?;

    let (sink, frames) = mpsc::channel(FRAME_BUFFER);
    let (end, printed) = tokio::join!(
        session.stream(tasks, sink),
        print_until_interrupted(frames)
    );
    printed?;
    Ok(exit_code(end?))
}

const fn exit_code(end: StreamEnd) -> ExitCode {
    match end {
        StreamEnd::Completed => ExitCode::Success,
        StreamEnd::TimedOut => ExitCode::StreamTimeout,
        StreamEnd::Disconnected | StreamEnd::Stopped => ExitCode::UnexpectedFailure,
    }
}

// Ctrl-C drops the receiver, which the stream sees as a disconnect.
async fn print_until_interrupted(frames: mpsc::Receiver<Bytes>) -> Result<()> {
    tokio::select! {
        printed = print_frames(frames, tokio::io::stdout()) => printed,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping the stream");
            Ok(())
        }
    }
}

/// Decode length-prefixed frames from the channel and write one payload per line
async fn print_frames<W>(mut frames: mpsc::Receiver<Bytes>, mut out: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut codec = FrameCodec;
    let mut buf = BytesMut::new();
    while let Some(chunk) = frames.recv().await {
        buf.extend_from_slice(&chunk);
        while let Some(frame) = codec.decode(&mut buf)? {
            out.write_all(frame.payload().as_bytes()).await?;
            out.write_all(b"\n").await?;
        }
        out.flush().await?;
    }
    Ok(())
}
