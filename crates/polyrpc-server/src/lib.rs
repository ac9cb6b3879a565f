//! # polyrpc server engine
//!
//! Transport adapters and dispatch for the polyrpc JSON-RPC engine. The
//! crate is organized the way a call flows:
//!
//! - [`dispatch`] — the immutable tree of published methods and
//!   sub-handlers, plus the method trait application code implements.
//! - [`introspect`] — the built-in `system.*` sub-handler.
//! - [`auth`] — the authorization capability seam.
//! - [`engine`] — resolve → authorize → invoke, with every failure folded
//!   into a wire fault.
//! - [`render`] — envelope serialization, the write-once result cache and
//!   gzip compression.
//! - [`http`] / [`netstring`] — the two transport adapters.
//!
//! Methods run asynchronously; a transport-level disconnect cancels the
//! in-flight computation for that request and nothing is written.

use thiserror::Error;

pub mod auth;
pub mod dispatch;
pub mod engine;
pub mod http;
pub mod introspect;
pub mod netstring;
pub mod render;

pub use auth::{AllowAll, Authorizer};
pub use dispatch::{
    CallContext, DispatchNode, DispatchNodeBuilder, FnMethod, Method, MethodDef, MethodEntry,
    MethodError, MethodFuture, MethodOutput, MethodResult, NoSuchFunction, RequestContext,
};
pub use engine::{DEFAULT_FAILURE, DEFAULT_NOT_FOUND, Dispatcher, DispatcherBuilder, FaultMapper};
pub use http::{HttpRpcHandler, HttpRpcServer, HttpServerConfig};
pub use netstring::{NetstringRpcServer, NetstringServerConfig};
pub use render::{COMPRESSION_THRESHOLD, CacheableResult, Rendered, Renderer};

/// Server-side transport errors. These concern the listener itself;
/// per-request failures are faults and never surface here.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;
