//! Inbound buffers for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for buffer management. Each buffer runs a small
//! state machine over fragmented frames:
//! - waiting for the length prefix (request) or tag + length (reply)
//! - header parsed, waiting for the remaining payload bytes
//!
//! Buffered bytes are only consumed once a complete frame is present, so a
//! frame split across any number of reads decodes identically to the same
//! frame delivered whole.

use bytes::BytesMut;

use super::wire_format::{
    EvalOutcome, EvalRequest, DEFAULT_MAX_FRAME_SIZE, OUTCOME_FAILURE, OUTCOME_SUCCESS,
    REPLY_HEADER_SIZE, REQUEST_HEADER_SIZE,
};
use crate::error::{BridgeError, Result};

/// Parsing state for [`RequestBuffer`].
#[derive(Debug, Clone)]
enum RequestState {
    /// Waiting for the 4-byte length prefix.
    WaitingForLength,
    /// Length parsed, waiting for that many source bytes.
    WaitingForSource { remaining: u32 },
}

/// Buffer for accumulating request bytes and extracting complete requests.
pub struct RequestBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: RequestState,
    /// Maximum allowed source text size.
    max_frame_size: u32,
}

impl RequestBuffer {
    /// Create a new request buffer with the default frame-size limit.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a new request buffer with a custom frame-size limit.
    pub fn with_max_frame_size(max_frame_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8 * 1024),
            state: RequestState::WaitingForLength,
            max_frame_size,
        }
    }

    /// Push freshly read bytes and extract every complete request present.
    ///
    /// Requests are returned in arrival order. If the trailing data is a
    /// partial frame it stays buffered for the next push; a partial frame
    /// never produces a request.
    ///
    /// # Errors
    ///
    /// Returns an error if a declared length exceeds the configured maximum
    /// or the source text is not valid UTF-8. The caller is expected to
    /// close the connection; the buffer contents are unspecified afterwards.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<EvalRequest>> {
        self.buffer.extend_from_slice(data);

        let mut requests = Vec::new();
        while let Some(request) = self.try_extract_one()? {
            requests.push(request);
        }
        Ok(requests)
    }

    fn try_extract_one(&mut self) -> Result<Option<EvalRequest>> {
        loop {
            match self.state {
                RequestState::WaitingForLength => {
                    if self.buffer.len() < REQUEST_HEADER_SIZE {
                        return Ok(None);
                    }
                    let len = u32::from_be_bytes([
                        self.buffer[0],
                        self.buffer[1],
                        self.buffer[2],
                        self.buffer[3],
                    ]);
                    if len > self.max_frame_size {
                        return Err(BridgeError::Frame(format!(
                            "declared request length {} exceeds maximum {}",
                            len, self.max_frame_size
                        )));
                    }
                    let _ = self.buffer.split_to(REQUEST_HEADER_SIZE);
                    self.state = RequestState::WaitingForSource { remaining: len };
                }
                RequestState::WaitingForSource { remaining } => {
                    let remaining = remaining as usize;
                    if self.buffer.len() < remaining {
                        return Ok(None);
                    }
                    let raw = self.buffer.split_to(remaining);
                    self.state = RequestState::WaitingForLength;
                    let source = String::from_utf8(raw.to_vec()).map_err(|e| {
                        BridgeError::Frame(format!("request source is not valid UTF-8: {e}"))
                    })?;
                    return Ok(Some(EvalRequest { source }));
                }
            }
        }
    }

    /// Number of buffered (not yet framed) bytes.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Check whether a partial frame is pending.
    pub fn has_partial_frame(&self) -> bool {
        !self.buffer.is_empty()
            || matches!(self.state, RequestState::WaitingForSource { remaining } if remaining > 0)
    }
}

impl Default for RequestBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Parsing state for [`ReplyBuffer`].
#[derive(Debug, Clone)]
enum ReplyState {
    /// Waiting for the 5-byte outcome tag + length prefix.
    WaitingForHeader,
    /// Header parsed, waiting for that many payload bytes.
    WaitingForPayload { tag: u8, remaining: u32 },
}

/// Client-side buffer for accumulating reply bytes.
///
/// Symmetric to [`RequestBuffer`]: the reply stream is framed with the same
/// length-prefix convention, so a client drains complete outcomes the same
/// way the server drains requests.
pub struct ReplyBuffer {
    buffer: BytesMut,
    state: ReplyState,
    max_frame_size: u32,
}

impl ReplyBuffer {
    /// Create a new reply buffer with the default frame-size limit.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a new reply buffer with a custom frame-size limit.
    pub fn with_max_frame_size(max_frame_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8 * 1024),
            state: ReplyState::WaitingForHeader,
            max_frame_size,
        }
    }

    /// Push freshly read bytes and extract every complete outcome present,
    /// in arrival order.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<EvalOutcome>> {
        self.buffer.extend_from_slice(data);

        let mut outcomes = Vec::new();
        while let Some(outcome) = self.try_extract_one()? {
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    fn try_extract_one(&mut self) -> Result<Option<EvalOutcome>> {
        loop {
            match self.state {
                ReplyState::WaitingForHeader => {
                    if self.buffer.len() < REPLY_HEADER_SIZE {
                        return Ok(None);
                    }
                    let tag = self.buffer[0];
                    if tag != OUTCOME_SUCCESS && tag != OUTCOME_FAILURE {
                        return Err(BridgeError::Frame(format!(
                            "unknown outcome tag 0x{tag:02x}"
                        )));
                    }
                    let len = u32::from_be_bytes([
                        self.buffer[1],
                        self.buffer[2],
                        self.buffer[3],
                        self.buffer[4],
                    ]);
                    if len > self.max_frame_size {
                        return Err(BridgeError::Frame(format!(
                            "declared reply length {} exceeds maximum {}",
                            len, self.max_frame_size
                        )));
                    }
                    let _ = self.buffer.split_to(REPLY_HEADER_SIZE);
                    self.state = ReplyState::WaitingForPayload {
                        tag,
                        remaining: len,
                    };
                }
                ReplyState::WaitingForPayload { tag, remaining } => {
                    let remaining = remaining as usize;
                    if self.buffer.len() < remaining {
                        return Ok(None);
                    }
                    let raw = self.buffer.split_to(remaining);
                    self.state = ReplyState::WaitingForHeader;
                    let payload = String::from_utf8(raw.to_vec()).map_err(|e| {
                        BridgeError::Frame(format!("reply payload is not valid UTF-8: {e}"))
                    })?;
                    let outcome = if tag == OUTCOME_SUCCESS {
                        EvalOutcome::Success(payload)
                    } else {
                        EvalOutcome::Failure(payload)
                    };
                    return Ok(Some(outcome));
                }
            }
        }
    }
}

impl Default for ReplyBuffer {
    fn default() -> Self {
        Self::new()
    }
}
