//! Minimal JSON-RPC server over netstring-framed TCP.
//!
//! Run with `cargo run --example netstring_server` and call it with
//! `polyrpc_client::NetstringProxy::new("127.0.0.1", 7847)`.

use std::sync::Arc;

use serde_json::{Value, json};

use polyrpc_server::{
    DispatchNodeBuilder, Dispatcher, MethodDef, MethodOutput, NetstringRpcServer,
    NetstringServerConfig,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let root = DispatchNodeBuilder::new()
        .method(
            MethodDef::from_fn("add", |_ctx, params| {
                Box::pin(async move {
                    let a = params.get(0).and_then(Value::as_f64).unwrap_or(0.0);
                    let b = params.get(1).and_then(Value::as_f64).unwrap_or(0.0);
                    Ok(MethodOutput::Value(json!(a + b)))
                })
            })
            .help("Add two numbers."),
        )
        .build_with_introspection();

    let server = NetstringRpcServer::bind(
        NetstringServerConfig::default(),
        Arc::new(Dispatcher::new(root)),
    )
    .await?;
    server.run().await?;
    Ok(())
}
