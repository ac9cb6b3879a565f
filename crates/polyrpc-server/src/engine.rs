//! The dispatch engine shared by both transports.
//!
//! One [`Dispatcher`] owns the dispatch tree, the auth capability, the
//! fault-code configuration and the error-to-code table. Every failure mode
//! that occurs inside a dispatch — unresolved path, denied auth, explicit
//! fault, uncaught method error — is converted to a [`Fault`] here, so
//! nothing but a fault ever reaches the response path.

use std::sync::Arc;

use tracing::{debug, error};

use polyrpc_codec::{Fault, Params, codes};

use crate::auth::{AllowAll, Authorizer};
use crate::dispatch::{
    CallContext, DispatchNode, MethodError, MethodOutput, NoSuchFunction, RequestContext,
};

/// Fault code for an unresolved method path, absent other configuration.
pub const DEFAULT_NOT_FOUND: i64 = 8001;
/// Fault code for uncaught method errors, absent other configuration.
pub const DEFAULT_FAILURE: i64 = 8002;

/// Caller-configurable mapping from application error types to fault codes.
/// Errors matching no entry fall back to the generic failure code.
#[derive(Default)]
pub struct FaultMapper {
    entries: Vec<(Box<dyn Fn(&anyhow::Error) -> bool + Send + Sync>, i64)>,
}

impl FaultMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map errors of type `E` to `code`.
    pub fn map<E>(mut self, code: i64) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.entries.push((Box::new(|err| err.is::<E>()), code));
        self
    }

    fn code_for(&self, err: &anyhow::Error, fallback: i64) -> i64 {
        self.entries
            .iter()
            .find(|(matches, _)| matches(err))
            .map(|(_, code)| *code)
            .unwrap_or(fallback)
    }
}

/// Dispatches decoded requests against a tree of handlers.
pub struct Dispatcher {
    root: Arc<DispatchNode>,
    authorizer: Arc<dyn Authorizer>,
    mapper: FaultMapper,
    not_found_code: i64,
    failure_code: i64,
}

impl Dispatcher {
    pub fn builder(root: Arc<DispatchNode>) -> DispatcherBuilder {
        DispatcherBuilder {
            root,
            authorizer: Arc::new(AllowAll),
            mapper: FaultMapper::new(),
            not_found_code: DEFAULT_NOT_FOUND,
            failure_code: DEFAULT_FAILURE,
        }
    }

    pub fn new(root: Arc<DispatchNode>) -> Self {
        Self::builder(root).build()
    }

    pub fn root(&self) -> &Arc<DispatchNode> {
        &self.root
    }

    /// Fault code used when a result cannot be serialized.
    pub fn failure_code(&self) -> i64 {
        self.failure_code
    }

    /// Resolve, authorize and invoke a method. Every failure comes back as
    /// the fault that should be rendered; nothing propagates past here.
    pub async fn dispatch(
        &self,
        method: &str,
        params: Params,
        request: Option<Arc<RequestContext>>,
        token: Option<&str>,
    ) -> Result<MethodOutput, Fault> {
        let entry = match self.root.resolve(method) {
            Ok(entry) => entry,
            Err(NoSuchFunction(path)) => {
                debug!(method = %path, "method not found");
                return Err(Fault::new(
                    self.not_found_code,
                    format!("function {path} not found"),
                ));
            }
        };

        if entry.requires_auth() && !self.authorizer.authorize(token, method).await {
            debug!(method, "authorization denied");
            return Err(Fault::new(codes::UNAUTHORIZED, "Unauthorized"));
        }

        let ctx = CallContext {
            request: if entry.needs_request() { request } else { None },
        };

        match entry.call(ctx, params).await {
            Ok(output) => Ok(output),
            Err(MethodError::Fault(fault)) => Err(fault),
            Err(MethodError::Other(err)) => Err(self.fault_from_error(method, err)),
        }
    }

    fn fault_from_error(&self, method: &str, err: anyhow::Error) -> Fault {
        if err.is::<NoSuchFunction>() {
            return Fault::new(self.not_found_code, err.to_string());
        }
        error!(method, error = %err, "method failed");
        Fault::new(self.mapper.code_for(&err, self.failure_code), err.to_string())
    }
}

pub struct DispatcherBuilder {
    root: Arc<DispatchNode>,
    authorizer: Arc<dyn Authorizer>,
    mapper: FaultMapper,
    not_found_code: i64,
    failure_code: i64,
}

impl DispatcherBuilder {
    pub fn authorizer(mut self, authorizer: impl Authorizer + 'static) -> Self {
        self.authorizer = Arc::new(authorizer);
        self
    }

    pub fn not_found_code(mut self, code: i64) -> Self {
        self.not_found_code = code;
        self
    }

    pub fn failure_code(mut self, code: i64) -> Self {
        self.failure_code = code;
        self
    }

    /// Map errors of type `E` to `code` instead of the generic failure code.
    pub fn map_error<E>(mut self, code: i64) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.mapper = self.mapper.map::<E>(code);
        self
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher {
            root: self.root,
            authorizer: self.authorizer,
            mapper: self.mapper,
            not_found_code: self.not_found_code,
            failure_code: self.failure_code,
        }
    }
}
