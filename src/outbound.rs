//! Bounded frame queue feeding a connection's single writer task.
//!
//! Both ends of a connection write this way: server workers submit
//! finished responses, client calls submit requests. Producers run
//! concurrently but a connection has one write half, so encoded
//! frames funnel through a bounded mpsc channel into one writer task.
//! A frame crosses the channel whole: a producer whose future is
//! dropped while waiting for queue space has sent nothing, so partial
//! frames never reach the wire.
//!
//! The channel is also the backpressure mechanism: when it is full,
//! producers wait in `send` until the writer drains; when it is
//! closed, `send` fails with [`WirecallError::ChannelClosed`] and the
//! frame is dropped.
//!
//! ```text
//! producer 1 ─┐
//! producer 2 ─┼─► mpsc::Sender<Bytes> ─► writer task ─► socket
//! producer N ─┘
//! ```
//!
//! The writer batches whatever is already queued into a single
//! `write_vectored` call. Once every sender is gone it drains the
//! queue, shuts the stream down, and exits; a failed socket write
//! ends it early with the error.

use std::io::IoSlice;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Result, WirecallError};

/// Default bound on queued frames per connection.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 1024;

/// Maximum frames folded into a single vectored write.
const MAX_BATCH_SIZE: usize = 64;

/// Sending side of a connection's frame queue.
///
/// Cheap to clone; one clone per producer.
#[derive(Debug, Clone)]
pub(crate) struct OutboundQueue {
    tx: mpsc::Sender<Bytes>,
}

impl OutboundQueue {
    /// Queue an encoded frame for writing.
    ///
    /// The frame is handed over whole or not at all; cancelling a
    /// `send` that is still waiting for capacity queues nothing.
    /// Fails with [`WirecallError::ChannelClosed`] once the writer
    /// task is gone.
    pub(crate) async fn send(&self, frame: Bytes) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| WirecallError::ChannelClosed)
    }
}

/// Spawn the writer task for one connection.
///
/// `capacity` bounds the number of queued frames; producers beyond it
/// block in [`OutboundQueue::send`].
pub(crate) fn spawn_outbound_writer<W>(
    writer: W,
    capacity: usize,
) -> (OutboundQueue, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity);
    let task = tokio::spawn(writer_loop(rx, writer));
    (OutboundQueue { tx }, task)
}

async fn writer_loop<W>(mut rx: mpsc::Receiver<Bytes>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let first = match rx.recv().await {
            Some(frame) => frame,
            // Every sender dropped and the queue is drained.
            None => {
                writer.shutdown().await?;
                return Ok(());
            }
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        write_batch(&mut writer, &batch).await?;
    }
}

/// Write a batch of frames with scatter/gather I/O.
///
/// Each frame is one `IoSlice`; a partial write rebuilds the slice
/// list from the unwritten tail and continues.
async fn write_batch<W>(writer: &mut W, batch: &[Bytes]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return Ok(());
    }

    let total: usize = batch.iter().map(|frame| frame.len()).sum();
    let slices: Vec<IoSlice<'_>> = batch.iter().map(|frame| IoSlice::new(frame)).collect();

    let mut written = writer.write_vectored(&slices).await?;
    if written == 0 && total > 0 {
        return Err(write_zero());
    }

    while written < total {
        let remaining = remaining_slices(batch, written);
        let n = writer.write_vectored(&remaining).await?;
        if n == 0 {
            return Err(write_zero());
        }
        written += n;
    }

    writer.flush().await?;
    Ok(())
}

fn write_zero() -> WirecallError {
    WirecallError::Io(std::io::Error::new(
        std::io::ErrorKind::WriteZero,
        "write_vectored returned 0",
    ))
}

/// Slices covering the batch bytes past `skip`.
fn remaining_slices(batch: &[Bytes], mut skip: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len());
    for frame in batch {
        if skip >= frame.len() {
            skip -= frame.len();
            continue;
        }
        slices.push(IoSlice::new(&frame[skip..]));
        skip = 0;
    }
    slices
}
