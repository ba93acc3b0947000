// ! Request validation
// !
// ! Turns one raw JSON document into a request envelope, rejecting anything
// ! that is not a single well-formed JSON-RPC 2.0 request before routing.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::core::error::{McpError, McpResult};
use crate::protocol::types::{
    JSONRPC_VERSION, JsonRpcError, JsonRpcReply, JsonRpcRequest, RequestId,
};

/// A document that could not become a request. Carries the ID to answer
/// with: the request's own ID when it could be read, `null` otherwise.
#[derive(Debug, Clone)]
pub struct RequestRejection {
    pub id: RequestId,
    pub error: McpError,
}

impl RequestRejection {
    fn new(id: RequestId, error: McpError) -> Self {
        Self { id, error }
    }

    /// Error reply for the rejected document
    pub fn into_reply(self) -> JsonRpcReply {
        JsonRpcReply::Error(JsonRpcError::new(self.id, self.error.to_error_object()))
    }
}

/// Parse one JSON document into a request envelope.
///
/// Malformed JSON and top-level arrays (batches) are parse errors. A missing or
/// wrong `jsonrpc` member, a missing `method`, or an ID that is neither a string
/// nor a number are invalid requests.
pub fn parse_request(raw: &[u8]) -> Result<JsonRpcRequest, RequestRejection> {
    let value: Value = serde_json::from_slice(raw).map_err(|err| {
        RequestRejection::new(Value::Null, McpError::parse(err.to_string()))
    })?;

    let mut object = match value {
        Value::Object(object) => object,
        Value::Array(_) => {
            return Err(RequestRejection::new(
                Value::Null,
                McpError::parse("batch requests are not supported"),
            ));
        }
        _ => {
            return Err(RequestRejection::new(
                Value::Null,
                McpError::invalid_request("request must be a JSON object"),
            ));
        }
    };

    let id = take_id(&mut object)?;
    let reply_id = id.clone().unwrap_or(Value::Null);

    match object.remove("jsonrpc") {
        Some(Value::String(version)) if version == JSONRPC_VERSION => {}
        Some(_) => {
            return Err(RequestRejection::new(
                reply_id,
                McpError::invalid_request("jsonrpc must be \"2.0\""),
            ));
        }
        None => {
            return Err(RequestRejection::new(
                reply_id,
                McpError::invalid_request("missing jsonrpc version"),
            ));
        }
    }

    let method = match object.remove("method") {
        Some(Value::String(method)) if !method.is_empty() => method,
        Some(_) => {
            return Err(RequestRejection::new(
                reply_id,
                McpError::invalid_request("method must be a non-empty string"),
            ));
        }
        None => {
            return Err(RequestRejection::new(
                reply_id,
                McpError::invalid_request("missing method"),
            ));
        }
    };

    let params = match object.remove("params") {
        None | Some(Value::Null) => None,
        Some(params @ (Value::Object(_) | Value::Array(_))) => Some(params),
        Some(_) => {
            return Err(RequestRejection::new(
                reply_id,
                McpError::invalid_request("params must be an object or an array"),
            ));
        }
    };

    Ok(JsonRpcRequest {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id,
        method,
        params,
    })
}

fn take_id(object: &mut Map<String, Value>) -> Result<Option<RequestId>, RequestRejection> {
    match object.remove("id") {
        None | Some(Value::Null) => Ok(None),
        Some(id @ (Value::String(_) | Value::Number(_))) => Ok(Some(id)),
        Some(_) => Err(RequestRejection::new(
            Value::Null,
            McpError::invalid_request("id must be a string or a number"),
        )),
    }
}

/// Decode method params, reporting failures as InvalidParams
pub fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> McpResult<T> {
    let params = params.ok_or_else(|| McpError::invalid_params("missing params"))?;
    serde_json::from_value(params).map_err(|err| McpError::invalid_params(err.to_string()))
}

/// Like [`parse_params`], with absent params meaning the type's default
pub fn parse_optional_params<T: DeserializeOwned + Default>(params: Option<Value>) -> McpResult<T> {
    match params {
        None => Ok(T::default()),
        Some(params) => {
            serde_json::from_value(params).map_err(|err| McpError::invalid_params(err.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::error_codes;
    use serde_json::json;

    fn rejection(raw: &str) -> RequestRejection {
        parse_request(raw.as_bytes()).expect_err("document should be rejected")
    }

    #[test]
    fn test_ids_are_kept_verbatim() {
        for (raw, expected) in [
            (r#"{"jsonrpc":"2.0","id":123,"method":"ping"}"#, json!(123)),
            (
                r#"{"jsonrpc":"2.0","id":"test-id-456","method":"ping"}"#,
                json!("test-id-456"),
            ),
            (r#"{"jsonrpc":"2.0","id":789.0,"method":"ping"}"#, json!(789.0)),
        ] {
            let request = parse_request(raw.as_bytes()).unwrap();
            assert_eq!(request.id, Some(expected));
        }
    }

    #[test]
    fn test_notification_has_no_id() {
        let request =
            parse_request(br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).unwrap();
        assert!(request.is_notification());
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let rejected = rejection(r#"{"jsonrpc":"2.0","id":1,"method":"#);
        assert_eq!(rejected.error.code(), error_codes::PARSE_ERROR);
        assert_eq!(rejected.id, Value::Null);
    }

    #[test]
    fn test_batch_is_parse_error() {
        let rejected = rejection(r#"[{"jsonrpc":"2.0","id":1,"method":"ping"}]"#);
        assert_eq!(rejected.error.code(), error_codes::PARSE_ERROR);
    }

    #[test]
    fn test_version_problems_are_invalid_request() {
        let wrong = rejection(r#"{"jsonrpc":"1.0","id":5,"method":"ping"}"#);
        assert_eq!(wrong.error.code(), error_codes::INVALID_REQUEST);
        assert_eq!(wrong.id, json!(5));

        let missing = rejection(r#"{"id":6,"method":"ping"}"#);
        assert_eq!(missing.error.code(), error_codes::INVALID_REQUEST);
        assert_eq!(missing.id, json!(6));
    }

    #[test]
    fn test_missing_method_is_invalid_request() {
        let rejected = rejection(r#"{"jsonrpc":"2.0","id":"x"}"#);
        assert_eq!(rejected.error.code(), error_codes::INVALID_REQUEST);
        assert_eq!(rejected.id, json!("x"));
    }

    #[test]
    fn test_object_id_is_invalid_request() {
        let rejected = rejection(r#"{"jsonrpc":"2.0","id":{"a":1},"method":"ping"}"#);
        assert_eq!(rejected.error.code(), error_codes::INVALID_REQUEST);
        assert_eq!(rejected.id, Value::Null);
    }

    #[test]
    fn test_params_errors_are_invalid_params() {
        #[derive(serde::Deserialize, Debug)]
        struct Needs {
            #[allow(dead_code)]
            name: String,
        }

        let err = parse_params::<Needs>(Some(json!({"other": 1}))).unwrap_err();
        assert_eq!(err.code(), error_codes::INVALID_PARAMS);
        let err = parse_params::<Needs>(None).unwrap_err();
        assert_eq!(err.code(), error_codes::INVALID_PARAMS);
    }
}
