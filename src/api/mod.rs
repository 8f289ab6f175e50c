//! Transport-agnostic API: message protocol and request handler.

pub mod handler;
pub mod protocol;

pub use handler::{ApiHandler, ErrorCategory, HandlerConfig, HandlerError};
pub use protocol::{
    decode_message, encode_message, encode_response, AnalysisRequest, ApiMessage, ErrorResponse,
    LoginMessage, ProtocolError, RegisterMessage,
};
