//! Version-aware JSON-RPC envelope encoding and decoding.
//!
//! Three wire generations are supported. Pre-1.0 has no `id` and no version
//! marker; 1.0 adds `id` and paired `result`/`error` keys; 2.0 adds the
//! `jsonrpc` marker and exactly one of `result`/`error`. The fault object
//! changed shape between 1.0 and 2.0, and both shapes are recognized on the
//! way back in.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::fault::{CodecError, Fault, ResponseError};

/// Version marker emitted by 2.0 envelopes.
pub const V2_MARKER: &str = "2.0";

/// Which generation of the wire format a message uses. Fixed per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolVersion {
    /// The original release wire format: no `id`, bare response bodies.
    #[default]
    Pre1,
    /// JSON-RPC 1.0: `id` plus paired `result`/`error` keys.
    V1,
    /// JSON-RPC 2.0: `jsonrpc` marker, exactly one of `result`/`error`.
    V2,
}

/// Call parameters: positional or named.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Params {
    Positional(Vec<Value>),
    Named(Map<String, Value>),
}

impl Params {
    pub fn none() -> Self {
        Params::Positional(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Params::Positional(values) => values.is_empty(),
            Params::Named(map) => map.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Params::Positional(values) => values.len(),
            Params::Named(map) => map.len(),
        }
    }

    /// Positional parameter by index; `None` for named parameters.
    pub fn get(&self, index: usize) -> Option<&Value> {
        match self {
            Params::Positional(values) => values.get(index),
            Params::Named(_) => None,
        }
    }

    /// Named parameter by key; `None` for positional parameters.
    pub fn get_named(&self, key: &str) -> Option<&Value> {
        match self {
            Params::Named(map) => map.get(key),
            Params::Positional(_) => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Params::Positional(values) => Value::Array(values.clone()),
            Params::Named(map) => Value::Object(map.clone()),
        }
    }
}

impl Default for Params {
    fn default() -> Self {
        Params::none()
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Params::Positional(values)
    }
}

impl From<Map<String, Value>> for Params {
    fn from(map: Map<String, Value>) -> Self {
        Params::Named(map)
    }
}

/// A parsed request envelope, with the wire generation inferred from its
/// shape.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRequest {
    pub method: String,
    pub params: Params,
    /// Request correlation id; absent for pre-1.0 callers.
    pub id: Option<Value>,
    pub version: ProtocolVersion,
}

/// A response body prior to encoding: a computed result or a fault. Both
/// must produce wire bytes under every version.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Result(Value),
    Fault(Fault),
}

impl Reply {
    pub fn is_fault(&self) -> bool {
        matches!(self, Reply::Fault(_))
    }
}

impl From<Fault> for Reply {
    fn from(fault: Fault) -> Self {
        Reply::Fault(fault)
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Reply::Result(value)
    }
}

/// Encode a response envelope for the given version.
///
/// Pre-1.0 results are wrapped in a one-element array before serialization.
/// That is how the original wire looked and peers depend on it; it is not
/// ours to fix.
pub fn encode_reply(
    reply: &Reply,
    id: Option<&Value>,
    version: ProtocolVersion,
) -> serde_json::Result<String> {
    let id_value = id.cloned().unwrap_or(Value::Null);
    let envelope = match (version, reply) {
        (ProtocolVersion::Pre1, Reply::Result(value)) => Value::Array(vec![value.clone()]),
        (ProtocolVersion::Pre1, Reply::Fault(fault)) => fault.to_legacy_object(),
        (ProtocolVersion::V1, Reply::Result(value)) => {
            let mut map = Map::new();
            map.insert("result".to_string(), value.clone());
            map.insert("error".to_string(), Value::Null);
            map.insert("id".to_string(), id_value);
            Value::Object(map)
        }
        (ProtocolVersion::V1, Reply::Fault(fault)) => {
            let mut map = Map::new();
            map.insert("result".to_string(), Value::Null);
            map.insert("error".to_string(), fault.to_legacy_object());
            map.insert("id".to_string(), id_value);
            Value::Object(map)
        }
        (ProtocolVersion::V2, Reply::Result(value)) => {
            let mut map = Map::new();
            map.insert("jsonrpc".to_string(), Value::from(V2_MARKER));
            map.insert("result".to_string(), value.clone());
            map.insert("id".to_string(), id_value);
            Value::Object(map)
        }
        (ProtocolVersion::V2, Reply::Fault(fault)) => {
            let mut map = Map::new();
            map.insert("jsonrpc".to_string(), Value::from(V2_MARKER));
            map.insert("error".to_string(), fault.to_v2_object());
            map.insert("id".to_string(), id_value);
            Value::Object(map)
        }
    };
    serde_json::to_string(&envelope)
}

/// Encode a request envelope for the given version. Pre-1.0 requests carry
/// no `id`; later versions always do.
pub fn encode_request(
    method: &str,
    params: &Params,
    id: i64,
    version: ProtocolVersion,
) -> serde_json::Result<String> {
    let mut map = Map::new();
    if version == ProtocolVersion::V2 {
        map.insert("jsonrpc".to_string(), Value::from(V2_MARKER));
    }
    map.insert("method".to_string(), Value::from(method));
    map.insert("params".to_string(), params.to_value());
    if version != ProtocolVersion::Pre1 {
        map.insert("id".to_string(), Value::from(id));
    }
    serde_json::to_string(&Value::Object(map))
}

/// Parse a request envelope, inferring the wire generation from its shape.
///
/// A `jsonrpc` key means 2.0; otherwise a non-null `id` means 1.0; otherwise
/// pre-1.0. The heuristic is ambiguous for a pre-1.0 caller that happens to
/// send an `id`-named parameter key at the top level — a historical wart the
/// engine preserves rather than fixes.
pub fn decode_request(bytes: &[u8]) -> Result<DecodedRequest, CodecError> {
    let value: Value = serde_json::from_slice(bytes)?;
    let Value::Object(mut map) = value else {
        return Err(CodecError::MalformedRequest(
            "request envelope is not an object".to_string(),
        ));
    };

    let method = match map.get("method") {
        Some(Value::String(method)) => method.clone(),
        Some(_) => {
            return Err(CodecError::MalformedRequest(
                "method is not a string".to_string(),
            ));
        }
        None => {
            return Err(CodecError::MalformedRequest(
                "missing method field".to_string(),
            ));
        }
    };

    let params = match map.remove("params") {
        Some(Value::Array(values)) => Params::Positional(values),
        Some(Value::Object(named)) => Params::Named(named),
        Some(Value::Null) | None => Params::none(),
        Some(_) => {
            return Err(CodecError::MalformedRequest(
                "params must be an array or an object".to_string(),
            ));
        }
    };

    let id = match map.remove("id") {
        Some(Value::Null) | None => None,
        Some(id) => Some(id),
    };

    let version = if map.contains_key("jsonrpc") {
        ProtocolVersion::V2
    } else if id.is_some() {
        ProtocolVersion::V1
    } else {
        ProtocolVersion::Pre1
    };

    Ok(DecodedRequest {
        method,
        params,
        id,
        version,
    })
}

/// Decode a response body, whatever generation produced it.
///
/// Any of the three fault shapes surfaces as [`ResponseError::Fault`];
/// otherwise the result is unwrapped from its envelope: `result` key for
/// 1.0/2.0, the one-element array for pre-1.0. Anything else is handed back
/// untouched.
pub fn decode_response(bytes: &[u8]) -> Result<Value, ResponseError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|err| ResponseError::Protocol(err.to_string()))?;

    match value {
        Value::Object(map) => {
            if map.get("fault").and_then(Value::as_str) == Some("Fault") {
                return Err(fault_from_object(&map).into());
            }
            if let Some(error) = map.get("error")
                && !error.is_null()
            {
                let fault = error
                    .as_object()
                    .map(|error_map| {
                        if error_map.get("fault").and_then(Value::as_str) == Some("Fault") {
                            fault_from_object(error_map)
                        } else {
                            fault_from_v2_object(error_map)
                        }
                    })
                    .unwrap_or_else(|| Fault::new(0, error.to_string()));
                return Err(fault.into());
            }
            if let Some(result) = map.get("result") {
                return Ok(result.clone());
            }
            Ok(Value::Object(map))
        }
        // The pre-1.0 single-element wrap.
        Value::Array(items) if items.len() == 1 => {
            Ok(items.into_iter().next().unwrap_or(Value::Null))
        }
        other => Ok(other),
    }
}

fn fault_from_object(map: &Map<String, Value>) -> Fault {
    let code = map.get("faultCode").and_then(Value::as_i64).unwrap_or(0);
    let message = map
        .get("faultString")
        .and_then(Value::as_str)
        .unwrap_or_default();
    Fault::new(code, message)
}

fn fault_from_v2_object(map: &Map<String, Value>) -> Fault {
    let code = map.get("code").and_then(Value::as_i64).unwrap_or(0);
    let message = map
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default();
    Fault::new(code, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encode_result_pre1_wraps_single_element() {
        let reply = Reply::Result(json!({"some": "data"}));
        let encoded = encode_reply(&reply, None, ProtocolVersion::Pre1).unwrap();
        assert_eq!(encoded, r#"[{"some":"data"}]"#);
    }

    #[test]
    fn encode_fault_pre1() {
        let reply = Reply::Fault(Fault::new(12, "hello"));
        let encoded = encode_reply(&reply, None, ProtocolVersion::Pre1).unwrap();
        assert_eq!(
            encoded,
            r#"{"fault":"Fault","faultCode":12,"faultString":"hello"}"#
        );
    }

    #[test]
    fn encode_result_v1_carries_null_error() {
        let reply = Reply::Result(json!({"some": "data"}));
        let encoded = encode_reply(&reply, None, ProtocolVersion::V1).unwrap();
        assert_eq!(encoded, r#"{"result":{"some":"data"},"error":null,"id":null}"#);
    }

    #[test]
    fn encode_fault_v1() {
        let reply = Reply::Fault(Fault::new(12, "hello"));
        let encoded = encode_reply(&reply, None, ProtocolVersion::V1).unwrap();
        assert_eq!(
            encoded,
            r#"{"result":null,"error":{"fault":"Fault","faultCode":12,"faultString":"hello"},"id":null}"#
        );
    }

    #[test]
    fn encode_result_v2() {
        let reply = Reply::Result(json!({"some": "data"}));
        let encoded = encode_reply(&reply, Some(&json!(7)), ProtocolVersion::V2).unwrap();
        assert_eq!(encoded, r#"{"jsonrpc":"2.0","result":{"some":"data"},"id":7}"#);
    }

    #[test]
    fn encode_fault_v2() {
        let reply = Reply::Fault(Fault::new(12, "hello"));
        let encoded = encode_reply(&reply, None, ProtocolVersion::V2).unwrap();
        assert_eq!(
            encoded,
            r#"{"jsonrpc":"2.0","error":{"message":"hello","code":12,"data":""},"id":null}"#
        );
    }

    #[test]
    fn encode_request_shapes() {
        let params = Params::Positional(vec![json!(2), json!(3)]);
        assert_eq!(
            encode_request("add", &params, 1, ProtocolVersion::Pre1).unwrap(),
            r#"{"method":"add","params":[2,3]}"#
        );
        assert_eq!(
            encode_request("add", &params, 1, ProtocolVersion::V1).unwrap(),
            r#"{"method":"add","params":[2,3],"id":1}"#
        );
        assert_eq!(
            encode_request("add", &params, 1, ProtocolVersion::V2).unwrap(),
            r#"{"jsonrpc":"2.0","method":"add","params":[2,3],"id":1}"#
        );
    }

    #[test]
    fn decode_request_infers_v2_from_marker() {
        let decoded =
            decode_request(br#"{"jsonrpc":"2.0","method":"add","params":[2,3],"id":1}"#).unwrap();
        assert_eq!(decoded.version, ProtocolVersion::V2);
        assert_eq!(decoded.method, "add");
        assert_eq!(decoded.id, Some(json!(1)));
    }

    #[test]
    fn decode_request_infers_v1_from_id() {
        let decoded = decode_request(br#"{"method":"add","params":[2,3],"id":1}"#).unwrap();
        assert_eq!(decoded.version, ProtocolVersion::V1);
    }

    #[test]
    fn decode_request_infers_pre1_without_id() {
        let decoded = decode_request(br#"{"method":"add","params":[2,3]}"#).unwrap();
        assert_eq!(decoded.version, ProtocolVersion::Pre1);
        assert_eq!(decoded.id, None);
    }

    #[test]
    fn decode_request_null_id_is_pre1() {
        let decoded = decode_request(br#"{"method":"add","params":[],"id":null}"#).unwrap();
        assert_eq!(decoded.version, ProtocolVersion::Pre1);
    }

    #[test]
    fn decode_request_named_params() {
        let decoded = decode_request(br#"{"method":"add","params":{"a":2,"b":3}}"#).unwrap();
        assert_eq!(decoded.params.get_named("a"), Some(&json!(2)));
        assert_eq!(decoded.params.get(0), None);
    }

    #[test]
    fn decode_request_missing_method() {
        let err = decode_request(br#"{"params":[]}"#).unwrap_err();
        assert!(matches!(err, CodecError::MalformedRequest(_)));
    }

    #[test]
    fn decode_request_invalid_json() {
        let err = decode_request(b"oops").unwrap_err();
        assert!(matches!(err, CodecError::MalformedRequest(_)));
    }

    #[test]
    fn decode_response_unwraps_each_version() {
        for version in [
            ProtocolVersion::Pre1,
            ProtocolVersion::V1,
            ProtocolVersion::V2,
        ] {
            let reply = Reply::Result(json!({"a": ["b", "c", 12, []], "D": "foo"}));
            let encoded = encode_reply(&reply, Some(&json!(1)), version).unwrap();
            let decoded = decode_response(encoded.as_bytes()).unwrap();
            assert_eq!(decoded, json!({"a": ["b", "c", 12, []], "D": "foo"}));
        }
    }

    #[test]
    fn decode_response_raises_fault_for_each_version() {
        for version in [
            ProtocolVersion::Pre1,
            ProtocolVersion::V1,
            ProtocolVersion::V2,
        ] {
            let reply = Reply::Fault(Fault::new(123, "message"));
            let encoded = encode_reply(&reply, None, version).unwrap();
            match decode_response(encoded.as_bytes()) {
                Err(ResponseError::Fault(fault)) => {
                    assert_eq!(fault.code, 123);
                    assert_eq!(fault.message, "message");
                }
                other => panic!("expected fault, got {:?}", other),
            }
        }
    }

    #[test]
    fn decode_response_passes_foreign_json_through() {
        let decoded = decode_response(br#"{"something":1}"#).unwrap();
        assert_eq!(decoded, json!({"something": 1}));
    }

    #[test]
    fn decode_response_rejects_garbage() {
        let err = decode_response(b"oops").unwrap_err();
        assert!(matches!(err, ResponseError::Protocol(_)));
    }

    #[test]
    fn round_trip_preserves_list_results() {
        // A method legitimately returning a one-element list still round-trips
        // under the pre-1.0 wrap.
        let reply = Reply::Result(json!([5]));
        let encoded = encode_reply(&reply, None, ProtocolVersion::Pre1).unwrap();
        assert_eq!(encoded, "[[5]]");
        assert_eq!(decode_response(encoded.as_bytes()).unwrap(), json!([5]));
    }
}
