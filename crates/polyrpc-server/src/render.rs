//! Response rendering and the write-once result cache.
//!
//! Method results reach the wire through one funnel: serialize the envelope
//! (reusing the cached form for a [`CacheableResult`]), then let the
//! transport decide on compression. Serialization failures never escape —
//! the renderer substitutes a fault and always produces a response.

use std::io::Write;
use std::sync::OnceLock;

use flate2::Compression;
use flate2::write::GzEncoder;
use serde_json::Value;
use tracing::{debug, warn};

use polyrpc_codec::{Fault, ProtocolVersion, Reply, encode_reply};

use crate::dispatch::MethodOutput;

/// Payloads below this many serialized bytes are never compressed.
pub const COMPRESSION_THRESHOLD: usize = 1000;

/// A write-once memo of a value's serialized and compressed wire forms.
///
/// Owned by application code and handed out per call; the engine only reads
/// and fills the two cache fields. The caches fill independently, are never
/// invalidated, and tolerate racing first writes because recomputation is
/// deterministic. The wrapped value must stay logically immutable for the
/// instance's lifetime.
#[derive(Debug)]
pub struct CacheableResult {
    value: Value,
    serialized: OnceLock<String>,
    compressed: OnceLock<Vec<u8>>,
}

impl CacheableResult {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            serialized: OnceLock::new(),
            compressed: OnceLock::new(),
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// The cached envelope string, if a render has happened.
    pub fn serialized(&self) -> Option<&str> {
        self.serialized.get().map(String::as_str)
    }

    /// The cached gzip bytes, if a compressing render has happened.
    pub fn compressed(&self) -> Option<&[u8]> {
        self.compressed.get().map(Vec::as_slice)
    }

    fn serialized_or_init(
        &self,
        init: impl FnOnce() -> serde_json::Result<String>,
    ) -> serde_json::Result<&str> {
        if let Some(cached) = self.serialized.get() {
            return Ok(cached);
        }
        let fresh = init()?;
        Ok(self.serialized.get_or_init(|| fresh))
    }

    fn compressed_or_init(&self, init: impl FnOnce() -> Vec<u8>) -> &[u8] {
        if let Some(cached) = self.compressed.get() {
            return cached;
        }
        let fresh = init();
        self.compressed.get_or_init(|| fresh)
    }
}

/// A fully framed response body, ready for the transport to write.
#[derive(Debug, PartialEq)]
pub struct Rendered {
    pub body: Vec<u8>,
    pub gzipped: bool,
}

/// Serializes dispatch outcomes into wire envelopes.
#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    failure_code: i64,
}

impl Renderer {
    pub fn new(failure_code: i64) -> Self {
        Self { failure_code }
    }

    /// Serialize a dispatch outcome. Plain values serialize on every call;
    /// cacheable results serialize once per instance.
    pub fn envelope(
        &self,
        outcome: &Result<MethodOutput, Fault>,
        id: Option<&Value>,
        version: ProtocolVersion,
    ) -> String {
        let attempt = match outcome {
            Err(fault) => encode_reply(&Reply::Fault(fault.clone()), id, version),
            Ok(MethodOutput::Value(value)) => {
                encode_reply(&Reply::Result(value.clone()), id, version)
            }
            Ok(MethodOutput::Cacheable(cacheable)) => cacheable
                .serialized_or_init(|| {
                    encode_reply(&Reply::Result(cacheable.value().clone()), id, version)
                })
                .map(str::to_string),
        };
        attempt.unwrap_or_else(|err| {
            warn!(error = %err, "result not serializable, substituting fault");
            self.serialization_fault(id, version)
        })
    }

    /// The substitute envelope for an unserializable result.
    pub fn serialization_fault(&self, id: Option<&Value>, version: ProtocolVersion) -> String {
        let fault = Fault::new(self.failure_code, "can't serialize output");
        encode_reply(&Reply::Fault(fault), id, version).unwrap_or_else(|_| {
            // A fault envelope is made of two scalars; this arm is
            // unreachable but keeps the no-response case impossible.
            format!(
                r#"{{"fault":"Fault","faultCode":{},"faultString":"can't serialize output"}}"#,
                self.failure_code
            )
        })
    }

    /// Apply the transport's compression decision. `wants_gzip` reflects an
    /// exact `Accept-Encoding: gzip`; small payloads pass through untouched.
    /// When `cache` is given, compressed bytes are memoized on it.
    pub fn compress(
        &self,
        envelope: String,
        wants_gzip: bool,
        cache: Option<&CacheableResult>,
    ) -> Rendered {
        if !wants_gzip || envelope.len() < COMPRESSION_THRESHOLD {
            return Rendered {
                body: envelope.into_bytes(),
                gzipped: false,
            };
        }
        let body = match cache {
            Some(cacheable) => cacheable
                .compressed_or_init(|| gzip_bytes(envelope.as_bytes()))
                .to_vec(),
            None => gzip_bytes(envelope.as_bytes()),
        };
        debug!(
            original = envelope.len(),
            compressed = body.len(),
            "compressed response"
        );
        Rendered {
            body,
            gzipped: true,
        }
    }
}

fn gzip_bytes(input: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    // Writing into a Vec cannot fail.
    let _ = encoder.write_all(input);
    encoder.finish().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use flate2::read::GzDecoder;
    use serde_json::json;

    fn gunzip(bytes: &[u8]) -> String {
        let mut decoder = GzDecoder::new(bytes);
        let mut out = String::new();
        decoder.read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn plain_value_serializes_every_call() {
        let renderer = Renderer::new(8002);
        let outcome = Ok(MethodOutput::Value(json!("bar")));
        let first = renderer.envelope(&outcome, None, ProtocolVersion::Pre1);
        let second = renderer.envelope(&outcome, None, ProtocolVersion::Pre1);
        assert_eq!(first, r#"["bar"]"#);
        assert_eq!(first, second);
    }

    #[test]
    fn cacheable_serializes_at_most_once() {
        let cacheable = Arc::new(CacheableResult::new(json!("bar")));
        let invocations = AtomicUsize::new(0);
        let render = || {
            cacheable
                .serialized_or_init(|| {
                    invocations.fetch_add(1, Ordering::SeqCst);
                    encode_reply(&Reply::Result(json!("bar")), None, ProtocolVersion::Pre1)
                })
                .unwrap()
                .to_string()
        };
        let first = render();
        let second = render();
        assert_eq!(first, second);
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cacheable_envelope_is_cached_through_renderer() {
        let renderer = Renderer::new(8002);
        let cacheable = Arc::new(CacheableResult::new(json!("bar")));
        assert!(cacheable.serialized().is_none());
        let outcome = Ok(MethodOutput::Cacheable(cacheable.clone()));
        let first = renderer.envelope(&outcome, None, ProtocolVersion::Pre1);
        assert_eq!(cacheable.serialized(), Some(first.as_str()));
        let second = renderer.envelope(&outcome, None, ProtocolVersion::Pre1);
        assert_eq!(first, second);
    }

    #[test]
    fn small_payload_never_compressed() {
        let renderer = Renderer::new(8002);
        let rendered = renderer.compress("short".to_string(), true, None);
        assert!(!rendered.gzipped);
        assert_eq!(rendered.body, b"short");
    }

    #[test]
    fn large_payload_compressed_when_negotiated() {
        let renderer = Renderer::new(8002);
        let envelope = "0123456789".repeat(100) + "X";
        let rendered = renderer.compress(envelope.clone(), true, None);
        assert!(rendered.gzipped);
        assert_eq!(gunzip(&rendered.body), envelope);
    }

    #[test]
    fn large_payload_untouched_without_negotiation() {
        let renderer = Renderer::new(8002);
        let envelope = "0123456789".repeat(100) + "X";
        let rendered = renderer.compress(envelope.clone(), false, None);
        assert!(!rendered.gzipped);
        assert_eq!(rendered.body, envelope.into_bytes());
    }

    #[test]
    fn compressed_bytes_are_cached_independently() {
        let renderer = Renderer::new(8002);
        let payload = "0123456789".repeat(100) + "X";
        let cacheable = Arc::new(CacheableResult::new(json!(payload.clone())));
        let outcome = Ok(MethodOutput::Cacheable(cacheable.clone()));
        let envelope = renderer.envelope(&outcome, None, ProtocolVersion::V2);
        assert!(cacheable.compressed().is_none());

        let rendered = renderer.compress(envelope.clone(), true, Some(&cacheable));
        assert!(rendered.gzipped);
        let cached = cacheable.compressed().unwrap().to_vec();
        assert_eq!(cached, rendered.body);
        assert_eq!(gunzip(&cached), envelope);

        // Second compressing render reuses the cached bytes.
        let again = renderer.compress(envelope, true, Some(&cacheable));
        assert_eq!(again.body, cached);
    }

    #[test]
    fn fault_renders_through_normal_path() {
        let renderer = Renderer::new(8002);
        let outcome = Err(Fault::new(12, "hello"));
        let envelope = renderer.envelope(&outcome, None, ProtocolVersion::V2);
        assert_eq!(
            envelope,
            r#"{"jsonrpc":"2.0","error":{"message":"hello","code":12,"data":""},"id":null}"#
        );
    }

    #[test]
    fn serialization_fault_carries_failure_code() {
        let renderer = Renderer::new(666);
        let envelope = renderer.serialization_fault(None, ProtocolVersion::Pre1);
        assert_eq!(
            envelope,
            r#"{"fault":"Fault","faultCode":666,"faultString":"can't serialize output"}"#
        );
    }
}
