//! Per-connection session: read, frame, evaluate, reply.
//!
//! One session task owns one accepted connection. The read half feeds a
//! [`RequestBuffer`]; every complete request is evaluated through the shared
//! [`Gateway`] in arrival order, and the encoded reply is queued on this
//! connection's writer task. No further frame from the connection is
//! evaluated until the current reply has been queued, so replies always come
//! back in request order.
//!
//! Frame decode errors and transport errors end this session only; the
//! listener and every other session keep running.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use crate::engine::Gateway;
use crate::error::BridgeError;
use crate::protocol::RequestBuffer;
use crate::server::ServerConfig;
use crate::writer::{spawn_reply_writer, OutboundReply, ReplyWriterHandle};

/// Read buffer size for socket reads.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Service one connection until peer closure or error.
pub(crate) async fn run_session<S>(stream: S, gateway: Gateway, config: ServerConfig, peer: String)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (reader, write_half) = tokio::io::split(stream);
    let (writer, writer_task) = spawn_reply_writer(write_half, config.reply_queue_capacity);

    match read_loop(reader, gateway, &config, &writer).await {
        Ok(()) => tracing::debug!("session {peer}: peer closed connection"),
        Err(BridgeError::Frame(msg)) => {
            tracing::warn!("session {peer}: closing on malformed frame: {msg}")
        }
        Err(BridgeError::ConnectionClosed) => {
            tracing::debug!("session {peer}: reply writer gone, closing")
        }
        Err(e) => tracing::warn!("session {peer}: transport error: {e}"),
    }

    // Dropping the last handle lets the writer drain queued replies and exit.
    drop(writer);
    if let Ok(Err(e)) = writer_task.await {
        tracing::debug!("session {peer}: writer ended with error: {e}");
    }
}

async fn read_loop<R>(
    mut reader: R,
    gateway: Gateway,
    config: &ServerConfig,
    writer: &ReplyWriterHandle,
) -> crate::error::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut frames = RequestBuffer::with_max_frame_size(config.max_frame_size);
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = match reader.read(&mut buf).await {
            // Zero-length read is peer closure, not an empty frame. Any
            // partially buffered frame is discarded without evaluation.
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) => return Err(BridgeError::Io(e)),
        };

        // Drain every complete frame before suspending on the next read.
        let requests = frames.push(&buf[..n])?;
        for request in requests {
            let outcome = gateway.evaluate(request.source).await;
            writer.send(OutboundReply::from_outcome(&outcome)).await?;
        }
    }
}
