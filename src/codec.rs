use crate::errors::{AppError, AppResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type JsonObject = Map<String, Value>;

pub fn encode<T: Serialize>(value: &T) -> AppResult<String> {
    serde_json::to_string(value).map_err(|error| AppError::Serialization(error.to_string()))
}

/// Parses a JSON document whose top level must be an object.
pub fn decode_object(input: &str) -> AppResult<JsonObject> {
    match decode_value(input)? {
        Value::Object(map) => Ok(map),
        other => Err(AppError::Corrupted(format!(
            "expected a JSON object, found {}",
            value_kind(&other)
        ))),
    }
}

/// Parses a JSON document whose top level must be an array.
pub fn decode_array(input: &str) -> AppResult<Vec<Value>> {
    match decode_value(input)? {
        Value::Array(values) => Ok(values),
        other => Err(AppError::Corrupted(format!(
            "expected a JSON array, found {}",
            value_kind(&other)
        ))),
    }
}

/// Converts an already-parsed tree into a typed record, naming the record
/// in the error so a corrupted file can be traced back.
pub fn decode_as<T: DeserializeOwned>(value: &Value, entity: &str) -> AppResult<T> {
    <T as Deserialize>::deserialize(value)
        .map_err(|error| AppError::Corrupted(format!("invalid {} payload: {}", entity, error)))
}

fn decode_value(input: &str) -> AppResult<Value> {
    if input.trim().is_empty() {
        return Err(AppError::Corrupted("empty JSON input".to_string()));
    }
    serde_json::from_str(input).map_err(|error| AppError::Corrupted(format!("malformed JSON: {}", error)))
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_containers_roundtrip() {
        assert_eq!(encode(&json!([])).expect("encode"), "[]");
        assert_eq!(encode(&json!({})).expect("encode"), "{}");
        assert!(decode_array("[]").expect("array").is_empty());
        assert!(decode_object("{}").expect("object").is_empty());
    }

    #[test]
    fn arrays_decode_mixed_values() {
        assert_eq!(encode(&json!([1, 2, 3])).expect("encode"), "[1,2,3]");
        let values = decode_array("[1,\"test\",\"nil\",3]").expect("array");
        assert_eq!(values, vec![json!(1), json!("test"), json!("nil"), json!(3)]);
    }

    #[test]
    fn malformed_arrays_fail() {
        for input in ["[1,2,3", "1,2,3", "[1,\"test\",nil,3]", "", "   "] {
            let error = decode_array(input).expect_err(input);
            assert!(error.blocks_mutation(), "{input}");
        }
    }

    #[test]
    fn objects_decode_and_encode_in_key_order() {
        let encoded = encode(&json!({"key2": 2, "key1": "1"})).expect("encode");
        assert_eq!(encoded, "{\"key1\":\"1\",\"key2\":2}");
        let object = decode_object("{\"key1\":1,\"key2\":2}").expect("object");
        assert_eq!(object.len(), 2);
        assert_eq!(object["key1"], json!(1));
    }

    #[test]
    fn malformed_objects_fail() {
        for input in ["{\"key1\":\"1,\"key2\":2}", "{key1:1}", "{\"a\":1} trailing"] {
            assert!(decode_object(input).is_err(), "{input}");
        }
    }

    #[test]
    fn bare_scalars_are_not_containers() {
        assert!(decode_object("[1]").is_err());
        assert!(decode_array("{}").is_err());
        assert!(decode_array("1").is_err());
        assert!(decode_object("\"text\"").is_err());
    }
}
