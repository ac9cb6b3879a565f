//! The `system.*` introspection sub-handler.
//!
//! Mounted by [`DispatchNodeBuilder::build_with_introspection`]; each method
//! holds a weak back-reference to the node it describes, so the tree stays
//! a plain `Arc` cycle broken by `Weak`.
//!
//! [`DispatchNodeBuilder::build_with_introspection`]: crate::dispatch::DispatchNodeBuilder::build_with_introspection

use std::sync::Weak;

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::Value;

use polyrpc_codec::Params;

use crate::dispatch::{
    CallContext, DispatchNode, Method, MethodDef, MethodEntry, MethodOutput, MethodResult,
    NoSuchFunction,
};

/// Build the introspection node for `target`. Conventionally mounted under
/// the `system` path segment.
pub fn introspection_node(target: Weak<DispatchNode>) -> DispatchNode {
    DispatchNode::builder()
        .method(
            MethodDef::new("listMethods", ListMethods { target: target.clone() })
                .help("Return a list of the method names implemented by this server."),
        )
        .method(
            MethodDef::new("methodHelp", MethodHelp { target: target.clone() })
                .help("Return a documentation string describing the use of the given method."),
        )
        .method(
            MethodDef::new("methodSignature", MethodSignature { target })
                .help("Return a list of type signatures for the given method."),
        )
        .into_node()
}

struct ListMethods {
    target: Weak<DispatchNode>,
}

struct MethodHelp {
    target: Weak<DispatchNode>,
}

struct MethodSignature {
    target: Weak<DispatchNode>,
}

fn upgrade(target: &Weak<DispatchNode>) -> Result<std::sync::Arc<DispatchNode>, anyhow::Error> {
    target
        .upgrade()
        .ok_or_else(|| anyhow!("introspected handler no longer exists"))
}

fn lookup<'a>(
    node: &'a DispatchNode,
    params: &Params,
    what: &str,
) -> Result<&'a MethodEntry, anyhow::Error> {
    let name = params
        .get(0)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("{what} takes a method name"))?;
    node.resolve(name)
        .map_err(|err: NoSuchFunction| anyhow::Error::new(err))
}

#[async_trait]
impl Method for ListMethods {
    async fn call(&self, _ctx: CallContext, _params: Params) -> MethodResult {
        let node = upgrade(&self.target)?;
        let names = node.method_names().into_iter().map(Value::from).collect();
        Ok(MethodOutput::Value(Value::Array(names)))
    }
}

#[async_trait]
impl Method for MethodHelp {
    async fn call(&self, _ctx: CallContext, params: Params) -> MethodResult {
        let node = upgrade(&self.target)?;
        let entry = lookup(&node, &params, "methodHelp")?;
        Ok(MethodOutput::Value(Value::from(entry.help())))
    }
}

#[async_trait]
impl Method for MethodSignature {
    async fn call(&self, _ctx: CallContext, params: Params) -> MethodResult {
        let node = upgrade(&self.target)?;
        let entry = lookup(&node, &params, "methodSignature")?;
        let value = match entry.signature() {
            Some(signature) => serde_json::to_value(signature).map_err(anyhow::Error::new)?,
            // No signature recorded: the historical wire answer is an empty
            // string, not an empty list.
            None => Value::from(""),
        };
        Ok(MethodOutput::Value(value))
    }
}
