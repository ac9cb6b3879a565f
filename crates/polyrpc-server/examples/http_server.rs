//! Minimal JSON-RPC HTTP server publishing a calculator and introspection.
//!
//! Run with `cargo run --example http_server`, then:
//!
//! ```text
//! curl -d '{"jsonrpc":"2.0","method":"add","params":[3,5],"id":1}' http://127.0.0.1:7080/
//! curl -d '{"jsonrpc":"2.0","method":"system.listMethods","params":[],"id":2}' http://127.0.0.1:7080/
//! ```

use std::sync::Arc;

use serde_json::{Value, json};

use polyrpc_server::{
    DispatchNodeBuilder, Dispatcher, HttpRpcServer, HttpServerConfig, MethodDef, MethodOutput,
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
            .help("Add two numbers.")
            .signature(vec![vec!["double".into(), "double".into(), "double".into()]]),
        )
        .method(
            MethodDef::from_fn("echo", |_ctx, params| {
                Box::pin(async move { Ok(MethodOutput::Value(params.to_value())) })
            })
            .help("Return the parameters unchanged."),
        )
        .build_with_introspection();

    let server = HttpRpcServer::bind(
        HttpServerConfig::default(),
        Arc::new(Dispatcher::new(root)),
    )
    .await?;
    server.run().await?;
    Ok(())
}
