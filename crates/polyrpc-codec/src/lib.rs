//! # polyrpc wire formats
//!
//! Pure codec crate for the polyrpc JSON-RPC engine: no transport code, no
//! dispatch logic. Three generations of the wire format are supported side
//! by side — the pre-1.0 shape the protocol originally shipped with, 1.0,
//! and 2.0 — plus the netstring framing used by the TCP transport.
//!
//! The generation of an incoming request is inferred from its shape; see
//! [`decode_request`].

pub mod envelope;
pub mod fault;
pub mod netstring;

pub use envelope::{
    DecodedRequest, Params, ProtocolVersion, Reply, V2_MARKER, decode_request, decode_response,
    encode_reply, encode_request,
};
pub use fault::{CodecError, Fault, ResponseError, codes};
pub use netstring::{DEFAULT_MAX_LENGTH, NetstringCodec, NetstringError};
