//! Netstring TCP transport adapter.
//!
//! One long-lived connection per client, one netstring frame per call.
//! Every decoded frame spawns its own dispatch task and responses are
//! written as they complete — pipelined calls may answer out of arrival
//! order. Pre-1.0 callers have no id to re-associate responses and must not
//! pipeline; 1.0/2.0 callers match on `id`.
//!
//! Framing violations (oversized or malformed frames) are transport errors:
//! the connection is torn down and in-flight dispatches for it are aborted.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use polyrpc_codec::{
    Fault, NetstringCodec, ProtocolVersion, Reply, codes, decode_request, encode_reply,
};

use crate::Result;
use crate::engine::Dispatcher;
use crate::render::Renderer;

/// Configuration for the netstring listener.
#[derive(Debug, Clone)]
pub struct NetstringServerConfig {
    /// Address to bind to.
    pub bind_address: SocketAddr,
    /// Maximum accepted frame length; larger frames reset the connection.
    pub max_frame_length: usize,
}

impl Default for NetstringServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:7847".parse().expect("static address"),
            max_frame_length: 1024,
        }
    }
}

/// The netstring JSON-RPC server.
pub struct NetstringRpcServer {
    listener: TcpListener,
    config: NetstringServerConfig,
    dispatcher: Arc<Dispatcher>,
}

impl NetstringRpcServer {
    /// Bind the configured address. Use port 0 to let the OS pick.
    pub async fn bind(config: NetstringServerConfig, dispatcher: Arc<Dispatcher>) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_address).await?;
        Ok(Self {
            listener,
            config,
            dispatcher,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever, one task per connection.
    pub async fn run(self) -> Result<()> {
        info!(
            "JSON-RPC netstring server listening on {}",
            self.listener.local_addr()?
        );
        loop {
            let (stream, peer_addr) = self.listener.accept().await?;
            debug!("new connection from {peer_addr}");
            let dispatcher = Arc::clone(&self.dispatcher);
            let max_frame_length = self.config.max_frame_length;
            tokio::spawn(async move {
                handle_connection(stream, dispatcher, max_frame_length).await;
                debug!("connection from {peer_addr} closed");
            });
        }
    }
}

async fn handle_connection(stream: TcpStream, dispatcher: Arc<Dispatcher>, max_frame_length: usize) {
    let framed = Framed::new(stream, NetstringCodec::new(max_frame_length));
    let (mut sink, mut frames) = framed.split::<String>();
    let (reply_tx, mut reply_rx) = mpsc::channel::<String>(32);
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            frame = frames.next() => match frame {
                Some(Ok(payload)) => {
                    let dispatcher = Arc::clone(&dispatcher);
                    let reply_tx = reply_tx.clone();
                    in_flight.spawn(async move {
                        let reply = process_frame(&dispatcher, &payload).await;
                        // Send failure only means the connection is gone.
                        let _ = reply_tx.send(reply).await;
                    });
                }
                Some(Err(err)) => {
                    warn!("dropping connection: {err}");
                    break;
                }
                None => break,
            },
            reply = reply_rx.recv() => {
                // The channel cannot close while reply_tx is held above.
                let Some(reply) = reply else { break };
                if let Err(err) = sink.send(reply).await {
                    warn!("dropping connection: {err}");
                    break;
                }
            },
            // Reap finished task handles; a long-lived connection would
            // otherwise accumulate one per call.
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
        }
    }

    // Cancel whatever is still pending; a torn-down connection must not
    // produce responses.
    in_flight.shutdown().await;
}

/// One decode → resolve → invoke → render cycle for a received frame.
async fn process_frame(dispatcher: &Dispatcher, payload: &[u8]) -> String {
    let renderer = Renderer::new(dispatcher.failure_code());
    let decoded = match decode_request(payload) {
        Ok(decoded) => decoded,
        Err(err) => {
            warn!("malformed frame payload: {err}");
            let fault = Fault::new(codes::PARSE_ERROR, err.to_string());
            return encode_reply(&Reply::Fault(fault), None, ProtocolVersion::Pre1)
                .unwrap_or_default();
        }
    };
    debug!(method = %decoded.method, version = ?decoded.version, "dispatching");
    let outcome = dispatcher
        .dispatch(&decoded.method, decoded.params, None, None)
        .await;
    renderer.envelope(&outcome, decoded.id.as_ref(), decoded.version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{DispatchNodeBuilder, MethodDef, MethodOutput};
    use serde_json::{Value, json};

    fn test_dispatcher() -> Dispatcher {
        let root = DispatchNodeBuilder::new()
            .method(MethodDef::from_fn("add", |_ctx, params| {
                Box::pin(async move {
                    let a = params.get(0).and_then(Value::as_i64).unwrap_or(0);
                    let b = params.get(1).and_then(Value::as_i64).unwrap_or(0);
                    Ok(MethodOutput::Value(json!(a + b)))
                })
            }))
            .build();
        Dispatcher::new(root)
    }

    #[tokio::test]
    async fn frame_cycle_answers_in_request_version() {
        let dispatcher = test_dispatcher();
        let reply = process_frame(
            &dispatcher,
            br#"{"jsonrpc":"2.0","method":"add","params":[2,3],"id":9}"#,
        )
        .await;
        assert_eq!(reply, r#"{"jsonrpc":"2.0","result":5,"id":9}"#);

        let reply = process_frame(&dispatcher, br#"{"method":"add","params":[2,3]}"#).await;
        assert_eq!(reply, "[5]");
    }

    #[tokio::test]
    async fn malformed_payload_is_faulted_not_fatal() {
        let dispatcher = test_dispatcher();
        let reply = process_frame(&dispatcher, b"oops").await;
        let value: Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(value["fault"], "Fault");
        assert_eq!(value["faultCode"], codes::PARSE_ERROR);
    }
}
