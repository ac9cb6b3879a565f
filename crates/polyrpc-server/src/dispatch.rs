//! Hierarchical method dispatch.
//!
//! A handler is a tree of [`DispatchNode`]s: each node owns its published
//! methods and its named sub-handlers, one tree level per dotted path
//! segment. The tree is assembled once through [`DispatchNodeBuilder`] and
//! immutable afterwards; there is no runtime (un)registration.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use http::HeaderMap;
use serde_json::Value;
use thiserror::Error;

use polyrpc_codec::{Fault, Params};

use crate::render::CacheableResult;

/// A dotted path failed to resolve to a published method.
#[derive(Debug, Clone, Error)]
#[error("function {0} not found")]
pub struct NoSuchFunction(pub String);

/// Transport details exposed to methods registered with `needs_request`.
/// Populated by the HTTP adapter; the netstring transport has none.
#[derive(Debug, Default)]
pub struct RequestContext {
    /// HTTP verb of the carrying request.
    pub method: String,
    /// Request path plus query string.
    pub uri: String,
    pub headers: HeaderMap,
    pub peer: Option<SocketAddr>,
}

impl RequestContext {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Credentials from the `Authorization: Basic` header, if present.
    pub fn basic_auth(&self) -> Option<(String, String)> {
        let header = self.header("authorization")?;
        let encoded = header.strip_prefix("Basic ")?;
        let decoded = BASE64.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (user, password) = decoded.split_once(':')?;
        Some((user.to_string(), password.to_string()))
    }
}

/// Per-call context handed to every method. `request` is populated only for
/// entries registered with `needs_request`.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub request: Option<Arc<RequestContext>>,
}

/// What a method hands back: a plain value serialized on every render, or a
/// [`CacheableResult`] whose wire forms are memoized across calls.
#[derive(Debug, Clone)]
pub enum MethodOutput {
    Value(Value),
    Cacheable(Arc<CacheableResult>),
}

impl From<Value> for MethodOutput {
    fn from(value: Value) -> Self {
        MethodOutput::Value(value)
    }
}

impl From<Arc<CacheableResult>> for MethodOutput {
    fn from(result: Arc<CacheableResult>) -> Self {
        MethodOutput::Cacheable(result)
    }
}

/// Method failure: an explicit fault travels to the caller as-is; anything
/// else is mapped to a fault code by the dispatcher before rendering.
#[derive(Debug, Error)]
pub enum MethodError {
    #[error(transparent)]
    Fault(#[from] Fault),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type MethodResult = Result<MethodOutput, MethodError>;

/// A callable published on a dispatch node. Implementations may suspend;
/// the engine never blocks one dispatch on another.
#[async_trait]
pub trait Method: Send + Sync {
    async fn call(&self, ctx: CallContext, params: Params) -> MethodResult;
}

/// Boxed future returned by closure-backed methods.
pub type MethodFuture = futures::future::BoxFuture<'static, MethodResult>;

/// Adapter publishing a plain closure as a [`Method`].
pub struct FnMethod<F>
where
    F: Fn(CallContext, Params) -> MethodFuture + Send + Sync,
{
    f: F,
}

impl<F> FnMethod<F>
where
    F: Fn(CallContext, Params) -> MethodFuture + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> Method for FnMethod<F>
where
    F: Fn(CallContext, Params) -> MethodFuture + Send + Sync,
{
    async fn call(&self, ctx: CallContext, params: Params) -> MethodResult {
        (self.f)(ctx, params).await
    }
}

/// Registration-time description of a method: callable plus metadata.
pub struct MethodDef {
    name: String,
    callable: Arc<dyn Method>,
    help: String,
    signature: Option<Vec<Vec<String>>>,
    needs_request: bool,
    requires_auth: bool,
}

impl MethodDef {
    pub fn new(name: impl Into<String>, callable: impl Method + 'static) -> Self {
        Self {
            name: name.into(),
            callable: Arc::new(callable),
            help: String::new(),
            signature: None,
            needs_request: false,
            requires_auth: false,
        }
    }

    /// Closure-backed method, the common case in application code.
    pub fn from_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(CallContext, Params) -> MethodFuture + Send + Sync + 'static,
    {
        Self::new(name, FnMethod::new(f))
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = help.into();
        self
    }

    pub fn signature(mut self, signature: Vec<Vec<String>>) -> Self {
        self.signature = Some(signature);
        self
    }

    /// Ask the transport to expose its request context to this method.
    pub fn needs_request(mut self) -> Self {
        self.needs_request = true;
        self
    }

    /// Require the auth capability to admit the call before invocation.
    pub fn requires_auth(mut self) -> Self {
        self.requires_auth = true;
        self
    }
}

/// A published method and its metadata. Owned by exactly one node.
pub struct MethodEntry {
    name: String,
    callable: Arc<dyn Method>,
    help: String,
    signature: Option<Vec<Vec<String>>>,
    needs_request: bool,
    requires_auth: bool,
}

impl std::fmt::Debug for MethodEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodEntry")
            .field("name", &self.name)
            .field("help", &self.help)
            .field("signature", &self.signature)
            .field("needs_request", &self.needs_request)
            .field("requires_auth", &self.requires_auth)
            .finish()
    }
}

impl MethodEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn signature(&self) -> Option<&[Vec<String>]> {
        self.signature.as_deref()
    }

    pub fn needs_request(&self) -> bool {
        self.needs_request
    }

    pub fn requires_auth(&self) -> bool {
        self.requires_auth
    }

    pub async fn call(&self, ctx: CallContext, params: Params) -> MethodResult {
        self.callable.call(ctx, params).await
    }
}

/// One level of the dispatch tree.
pub struct DispatchNode {
    methods: HashMap<String, MethodEntry>,
    children: HashMap<String, Arc<DispatchNode>>,
}

impl DispatchNode {
    pub fn builder() -> DispatchNodeBuilder {
        DispatchNodeBuilder::new()
    }

    /// Resolve a dotted path to a method entry: descend sub-handlers for
    /// every segment but the last, then look the method up in the final
    /// node.
    pub fn resolve(&self, path: &str) -> Result<&MethodEntry, NoSuchFunction> {
        let mut node = self;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                return node
                    .methods
                    .get(segment)
                    .ok_or_else(|| NoSuchFunction(path.to_string()));
            }
            node = node
                .children
                .get(segment)
                .ok_or_else(|| NoSuchFunction(path.to_string()))?;
        }
        Err(NoSuchFunction(path.to_string()))
    }

    /// All published method names reachable from this node, dotted and
    /// sorted.
    pub fn method_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_names("", &mut names);
        names.sort();
        names
    }

    fn collect_names(&self, prefix: &str, into: &mut Vec<String>) {
        for name in self.methods.keys() {
            if prefix.is_empty() {
                into.push(name.clone());
            } else {
                into.push(format!("{prefix}.{name}"));
            }
        }
        for (name, child) in &self.children {
            let child_prefix = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}.{name}")
            };
            child.collect_names(&child_prefix, into);
        }
    }

    pub fn sub_handler(&self, name: &str) -> Option<&Arc<DispatchNode>> {
        self.children.get(name)
    }
}

/// Builds an immutable [`DispatchNode`].
///
/// When a publish prefix is configured, only registrations whose name
/// carries the prefix are published (under the stripped name); everything
/// else is treated as internal and skipped. The convention is applied here,
/// at registration time — resolution only ever sees published entries.
pub struct DispatchNodeBuilder {
    publish_prefix: Option<String>,
    methods: HashMap<String, MethodEntry>,
    children: HashMap<String, Arc<DispatchNode>>,
}

impl DispatchNodeBuilder {
    pub fn new() -> Self {
        Self {
            publish_prefix: None,
            methods: HashMap::new(),
            children: HashMap::new(),
        }
    }

    pub fn publish_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.publish_prefix = Some(prefix.into());
        self
    }

    pub fn method(mut self, def: MethodDef) -> Self {
        let published = match &self.publish_prefix {
            Some(prefix) => match def.name.strip_prefix(prefix) {
                Some(stripped) => stripped.to_string(),
                None => return self,
            },
            None => def.name.clone(),
        };
        self.methods.insert(
            published.clone(),
            MethodEntry {
                name: published,
                callable: def.callable,
                help: def.help,
                signature: def.signature,
                needs_request: def.needs_request,
                requires_auth: def.requires_auth,
            },
        );
        self
    }

    /// Attach a named sub-handler, one dotted segment deep.
    pub fn sub_handler(mut self, name: impl Into<String>, node: Arc<DispatchNode>) -> Self {
        self.children.insert(name.into(), node);
        self
    }

    pub fn build(self) -> Arc<DispatchNode> {
        Arc::new(self.into_node())
    }

    pub(crate) fn into_node(self) -> DispatchNode {
        DispatchNode {
            methods: self.methods,
            children: self.children,
        }
    }

    /// Build the node with the `system` introspection sub-handler mounted
    /// against it.
    pub fn build_with_introspection(self) -> Arc<DispatchNode> {
        Arc::new_cyclic(|root| DispatchNode {
            methods: self.methods,
            children: {
                let mut children = self.children;
                children.insert(
                    "system".to_string(),
                    Arc::new(crate::introspect::introspection_node(root.clone())),
                );
                children
            },
        })
    }
}

impl Default for DispatchNodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
