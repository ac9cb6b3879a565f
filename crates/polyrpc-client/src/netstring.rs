//! Netstring TCP client proxy.
//!
//! One connection per call: connect, write one frame, read one frame,
//! close. No connection reuse — unlike the HTTP proxy, which may pool
//! connections underneath reqwest.

use std::sync::atomic::{AtomicI64, Ordering};

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::debug;

use polyrpc_codec::{
    DEFAULT_MAX_LENGTH, NetstringCodec, Params, ProtocolVersion, decode_response, encode_request,
};

use crate::error::{ClientError, ClientResult};

/// A proxy for calling a remote JSON-RPC server over netstring-framed TCP.
pub struct NetstringProxy {
    host: String,
    port: u16,
    version: ProtocolVersion,
    max_length: usize,
    next_id: AtomicI64,
}

impl NetstringProxy {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            version: ProtocolVersion::Pre1,
            max_length: DEFAULT_MAX_LENGTH,
            next_id: AtomicI64::new(1),
        }
    }

    /// Default wire format generation for calls through this proxy.
    pub fn version(mut self, version: ProtocolVersion) -> Self {
        self.version = version;
        self
    }

    /// Maximum accepted response frame length.
    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Call `method` with the proxy's default version.
    pub async fn call(&self, method: &str, params: impl Into<Params>) -> ClientResult<Value> {
        self.call_with_version(method, params, self.version).await
    }

    /// Call `method`, overriding the wire format generation for this call.
    pub async fn call_with_version(
        &self,
        method: &str,
        params: impl Into<Params>,
        version: ProtocolVersion,
    ) -> ClientResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let payload = encode_request(method, &params.into(), id, version)?;
        debug!(method, id, ?version, "calling over netstring TCP");

        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        let mut framed = Framed::new(stream, NetstringCodec::new(self.max_length));
        framed.send(payload).await?;
        let frame = framed
            .next()
            .await
            .ok_or_else(|| {
                ClientError::Transport("connection closed before response".to_string())
            })??;
        Ok(decode_response(&frame)?)
    }
}
