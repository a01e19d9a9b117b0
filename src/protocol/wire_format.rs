//! Wire format encoding and decoding.
//!
//! Requests and replies are length-prefixed. All multi-byte integers are
//! Big Endian.
//!
//! Request frame:
//! ```text
//! ┌──────────┬──────────────┐
//! │ Length   │ Source text  │
//! │ 4 bytes  │ N bytes UTF-8│
//! │ uint32 BE│              │
//! └──────────┴──────────────┘
//! ```
//!
//! Reply frame:
//! ```text
//! ┌─────────┬──────────┬──────────────┐
//! │ Outcome │ Length   │ Payload      │
//! │ 1 byte  │ 4 bytes  │ N bytes UTF-8│
//! │ 0x00/01 │ uint32 BE│              │
//! └─────────┴──────────┴──────────────┘
//! ```
//!
//! Outcome `0x00` is success (payload is the serialized value), `0x01` is
//! failure (payload is the error description). Because every frame is
//! length-prefixed, source text may contain any byte sequence without
//! escaping; there is no sentinel to collide with.

use crate::error::{BridgeError, Result};

/// Request header size in bytes (length prefix only).
pub const REQUEST_HEADER_SIZE: usize = 4;

/// Reply header size in bytes (outcome tag + length prefix).
pub const REPLY_HEADER_SIZE: usize = 5;

/// Outcome tag for a successful evaluation.
pub const OUTCOME_SUCCESS: u8 = 0x00;

/// Outcome tag for a failed evaluation.
pub const OUTCOME_FAILURE: u8 = 0x01;

/// Default maximum frame payload size (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// One decoded evaluation request.
///
/// Produced by the frame codec from a complete request frame; handed to the
/// evaluation gateway and not retained afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalRequest {
    /// Source text to evaluate.
    pub source: String,
}

impl EvalRequest {
    /// Create a request from source text.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// Result of one evaluation, as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalOutcome {
    /// Engine returned a value; payload is its serialized representation.
    Success(String),
    /// Engine raised an error; payload is the error description.
    Failure(String),
}

impl EvalOutcome {
    /// Outcome tag byte for this variant.
    #[inline]
    pub fn tag(&self) -> u8 {
        match self {
            EvalOutcome::Success(_) => OUTCOME_SUCCESS,
            EvalOutcome::Failure(_) => OUTCOME_FAILURE,
        }
    }

    /// Payload text for this outcome.
    #[inline]
    pub fn payload(&self) -> &str {
        match self {
            EvalOutcome::Success(s) | EvalOutcome::Failure(s) => s,
        }
    }

    /// Check if this outcome is a success.
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, EvalOutcome::Success(_))
    }
}

/// Encode a request frame for the given source text.
pub fn encode_request(source: &str) -> Vec<u8> {
    let bytes = source.as_bytes();
    let mut buf = Vec::with_capacity(REQUEST_HEADER_SIZE + bytes.len());
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
    buf
}

/// Encode a reply frame for the given outcome.
pub fn encode_reply(outcome: &EvalOutcome) -> Vec<u8> {
    let payload = outcome.payload().as_bytes();
    let mut buf = Vec::with_capacity(REPLY_HEADER_SIZE + payload.len());
    buf.push(outcome.tag());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Try to decode one request frame from the front of `buf` without
/// consuming it.
///
/// Returns `Ok(Some((request, bytes_consumed)))` for a complete frame,
/// `Ok(None)` if more data is needed, and an error for an oversized length
/// prefix or invalid UTF-8 source text.
pub fn decode_request(buf: &[u8], max_frame_size: u32) -> Result<Option<(EvalRequest, usize)>> {
    if buf.len() < REQUEST_HEADER_SIZE {
        return Ok(None);
    }
    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if len > max_frame_size {
        return Err(BridgeError::Frame(format!(
            "declared request length {len} exceeds maximum {max_frame_size}"
        )));
    }
    let total = REQUEST_HEADER_SIZE + len as usize;
    if buf.len() < total {
        return Ok(None);
    }
    let source = std::str::from_utf8(&buf[REQUEST_HEADER_SIZE..total])
        .map_err(|e| BridgeError::Frame(format!("request source is not valid UTF-8: {e}")))?;
    Ok(Some((EvalRequest::new(source), total)))
}

/// Try to decode one reply frame from the front of `buf` without consuming
/// it.
///
/// Symmetric counterpart to [`decode_request`], used by clients of the
/// protocol (and by tests) to frame replies the same way the server frames
/// requests.
pub fn decode_reply(buf: &[u8], max_frame_size: u32) -> Result<Option<(EvalOutcome, usize)>> {
    if buf.len() < REPLY_HEADER_SIZE {
        return Ok(None);
    }
    let tag = buf[0];
    if tag != OUTCOME_SUCCESS && tag != OUTCOME_FAILURE {
        return Err(BridgeError::Frame(format!("unknown outcome tag 0x{tag:02x}")));
    }
    let len = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
    if len > max_frame_size {
        return Err(BridgeError::Frame(format!(
            "declared reply length {len} exceeds maximum {max_frame_size}"
        )));
    }
    let total = REPLY_HEADER_SIZE + len as usize;
    if buf.len() < total {
        return Ok(None);
    }
    let payload = std::str::from_utf8(&buf[REPLY_HEADER_SIZE..total])
        .map_err(|e| BridgeError::Frame(format!("reply payload is not valid UTF-8: {e}")))?
        .to_string();
    let outcome = if tag == OUTCOME_SUCCESS {
        EvalOutcome::Success(payload)
    } else {
        EvalOutcome::Failure(payload)
    };
    Ok(Some((outcome, total)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_roundtrip() {
        let encoded = encode_request("(+ 1 2)");
        let (req, consumed) = decode_request(&encoded, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .unwrap();
        assert_eq!(req.source, "(+ 1 2)");
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn test_request_length_prefix_big_endian() {
        let encoded = encode_request("hi");
        assert_eq!(&encoded[..4], &[0, 0, 0, 2]);
        assert_eq!(&encoded[4..], b"hi");
    }

    #[test]
    fn test_request_empty_source() {
        let encoded = encode_request("");
        assert_eq!(encoded.len(), REQUEST_HEADER_SIZE);
        let (req, consumed) = decode_request(&encoded, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .unwrap();
        assert_eq!(req.source, "");
        assert_eq!(consumed, REQUEST_HEADER_SIZE);
    }

    #[test]
    fn test_request_incomplete_header() {
        assert!(decode_request(&[0, 0, 0], DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_request_incomplete_payload() {
        let encoded = encode_request("(def x 1)");
        let partial = &encoded[..encoded.len() - 1];
        assert!(decode_request(partial, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_request_does_not_consume_trailing_bytes() {
        let mut data = encode_request("first");
        let first_len = data.len();
        data.extend_from_slice(&encode_request("second"));

        let (req, consumed) = decode_request(&data, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .unwrap();
        assert_eq!(req.source, "first");
        assert_eq!(consumed, first_len);
    }

    #[test]
    fn test_request_oversized_rejected() {
        let header = 1000u32.to_be_bytes();
        let result = decode_request(&header, 100);
        assert!(matches!(result, Err(BridgeError::Frame(_))));
    }

    #[test]
    fn test_request_invalid_utf8_rejected() {
        let mut data = 2u32.to_be_bytes().to_vec();
        data.extend_from_slice(&[0xFF, 0xFE]);
        let result = decode_request(&data, DEFAULT_MAX_FRAME_SIZE);
        assert!(matches!(result, Err(BridgeError::Frame(_))));
    }

    #[test]
    fn test_request_source_containing_delimiter_bytes() {
        // Length prefixing means the source may contain anything, including
        // NULs and newlines.
        let source = "line one\nline two\0tail";
        let encoded = encode_request(source);
        let (req, _) = decode_request(&encoded, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .unwrap();
        assert_eq!(req.source, source);
    }

    #[test]
    fn test_reply_roundtrip_success() {
        let outcome = EvalOutcome::Success("3".to_string());
        let encoded = encode_reply(&outcome);
        let (decoded, consumed) = decode_reply(&encoded, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .unwrap();
        assert_eq!(decoded, outcome);
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn test_reply_roundtrip_failure() {
        let outcome = EvalOutcome::Failure("Unable to resolve symbol: x".to_string());
        let encoded = encode_reply(&outcome);
        assert_eq!(encoded[0], OUTCOME_FAILURE);
        let (decoded, _) = decode_reply(&encoded, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .unwrap();
        assert_eq!(decoded, outcome);
        assert!(!decoded.is_success());
    }

    #[test]
    fn test_reply_empty_payload() {
        let outcome = EvalOutcome::Success(String::new());
        let encoded = encode_reply(&outcome);
        assert_eq!(encoded.len(), REPLY_HEADER_SIZE);
        let (decoded, _) = decode_reply(&encoded, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .unwrap();
        assert_eq!(decoded, outcome);
    }

    #[test]
    fn test_reply_unknown_tag_rejected() {
        let mut encoded = encode_reply(&EvalOutcome::Success("ok".to_string()));
        encoded[0] = 0x7F;
        let result = decode_reply(&encoded, DEFAULT_MAX_FRAME_SIZE);
        assert!(matches!(result, Err(BridgeError::Frame(_))));
    }

    #[test]
    fn test_reply_incomplete_header() {
        let buf = [OUTCOME_SUCCESS, 0, 0];
        assert!(decode_reply(&buf, DEFAULT_MAX_FRAME_SIZE).unwrap().is_none());
    }

    #[test]
    fn test_outcome_accessors() {
        let ok = EvalOutcome::Success("42".to_string());
        assert_eq!(ok.tag(), OUTCOME_SUCCESS);
        assert_eq!(ok.payload(), "42");
        assert!(ok.is_success());

        let err = EvalOutcome::Failure("boom".to_string());
        assert_eq!(err.tag(), OUTCOME_FAILURE);
        assert_eq!(err.payload(), "boom");
        assert!(!err.is_success());
    }
}
