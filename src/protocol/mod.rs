//! Protocol layer - wire format and frame accumulation.

mod frame_buffer;
mod wire_format;

pub use frame_buffer::{ReplyBuffer, RequestBuffer};
pub use wire_format::{
    decode_reply, decode_request, encode_reply, encode_request, EvalOutcome, EvalRequest,
    DEFAULT_MAX_FRAME_SIZE, OUTCOME_FAILURE, OUTCOME_SUCCESS, REPLY_HEADER_SIZE,
    REQUEST_HEADER_SIZE,
};
