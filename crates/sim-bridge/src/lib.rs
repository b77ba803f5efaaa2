//! Socket plumbing for talking to the combat simulator
//!
//! This crate provides:
//! - Length-prefixed framing codec
//! - Wire protocol requests and response envelope
//! - Transport session with connect/disconnect/send-and-await
//! - TCP and Unix socket streams

pub mod framing;
pub mod protocol;
pub mod tcp;
pub mod transport;
#[cfg(unix)]
pub mod unix;

pub use protocol::{SimRequest, SimResponse, deserialize_response, serialize_request};
pub use transport::{FrameStream, SimAddress, SimTransport, TransportOptions};
