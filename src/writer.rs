//! Dedicated reply-writer task for each connection.
//!
//! Sessions queue encoded replies on a bounded mpsc channel; a per-connection
//! writer task drains the channel and writes to the socket. The bounded
//! channel doubles as backpressure against slow readers: once the client
//! stops draining its socket and the queue fills, `send` suspends until
//! capacity frees up. Partial transport writes are absorbed by `write_all`,
//! so buffered reply bytes are never dropped mid-frame.

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{BridgeError, Result};
use crate::protocol::{EvalOutcome, REPLY_HEADER_SIZE};

/// Default reply queue capacity per connection.
pub const DEFAULT_REPLY_QUEUE_CAPACITY: usize = 64;

/// Maximum replies to coalesce into a single flush.
const MAX_BATCH_SIZE: usize = 16;

/// A reply frame ready to be written to the socket.
#[derive(Debug)]
pub struct OutboundReply {
    /// Pre-encoded header: outcome tag + payload length.
    header: [u8; REPLY_HEADER_SIZE],
    /// Payload bytes (may be empty).
    payload: Bytes,
}

impl OutboundReply {
    /// Encode an outcome into a wire-ready reply frame.
    pub fn from_outcome(outcome: &EvalOutcome) -> Self {
        let payload = outcome.payload().as_bytes();
        let mut header = [0u8; REPLY_HEADER_SIZE];
        header[0] = outcome.tag();
        header[1..5].copy_from_slice(&(payload.len() as u32).to_be_bytes());
        Self {
            header,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    /// Total size of this frame on the wire.
    #[inline]
    pub fn size(&self) -> usize {
        REPLY_HEADER_SIZE + self.payload.len()
    }
}

/// Handle for queueing replies onto a connection's writer task.
#[derive(Clone)]
pub struct ReplyWriterHandle {
    tx: mpsc::Sender<OutboundReply>,
}

impl ReplyWriterHandle {
    /// Queue a reply for writing.
    ///
    /// Suspends while the queue is full (slow reader). Fails with
    /// [`BridgeError::ConnectionClosed`] once the writer task has ended.
    pub async fn send(&self, reply: OutboundReply) -> Result<()> {
        self.tx
            .send(reply)
            .await
            .map_err(|_| BridgeError::ConnectionClosed)
    }
}

/// Spawn the writer task for one connection.
///
/// Returns the sending handle and the task's join handle. Dropping every
/// handle closes the queue; the task drains what is already queued and
/// exits cleanly.
pub fn spawn_reply_writer<W>(
    writer: W,
    queue_capacity: usize,
) -> (ReplyWriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(queue_capacity);
    let task = tokio::spawn(writer_loop(rx, writer));
    (ReplyWriterHandle { tx }, task)
}

/// Receive replies and write them out, batching when several are ready.
async fn writer_loop<W>(mut rx: mpsc::Receiver<OutboundReply>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let first = match rx.recv().await {
            Some(reply) => reply,
            None => return Ok(()),
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(reply) => batch.push(reply),
                Err(_) => break,
            }
        }

        for reply in &batch {
            writer.write_all(&reply.header).await?;
            if !reply.payload.is_empty() {
                writer.write_all(&reply.payload).await?;
            }
        }
        writer.flush().await?;
    }
}
