//! Payload text for outbound calls and decoding of inbound replies.

use serde::Serialize;
use serde_json::Value;

use crate::error::{ChannelError, Result};

/// Reply body meaning "no value".
pub const UNDEFINED: &[u8] = b"undefined";

/// What a request callback receives: the decoded reply, `Ok(None)` for
/// `undefined`, or the decode error for a malformed body.
pub type Reply = Result<Option<Value>>;

/// Decode a reply body.
pub fn decode_reply(body: &[u8]) -> Reply {
    if body == UNDEFINED {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(ChannelError::Decode)
}

/// Render one call argument.
///
/// Arrays and objects become compact JSON. Everything else is passed as
/// quoted text: strings as themselves, numbers and booleans in their display
/// form, `null` as the empty string.
pub fn encode_argument(arg: &Value) -> String {
    match arg {
        Value::Array(_) | Value::Object(_) => arg.to_string(),
        Value::String(text) => quote(text),
        Value::Number(number) => quote(&number.to_string()),
        Value::Bool(flag) => quote(if *flag { "true" } else { "false" }),
        Value::Null => quote(""),
    }
}

/// Build `<bridge>.<method>(<args>);`.
pub fn encode_call(bridge: &str, method: &str, args: &[Value]) -> Result<String> {
    validate_identifier(bridge, true)?;
    validate_identifier(method, false)?;

    let args = args
        .iter()
        .map(encode_argument)
        .collect::<Vec<_>>()
        .join(",");
    Ok(format!("{bridge}.{method}({args});"))
}

/// Serialize `data` as compact JSON.
pub fn to_compact_json<T: Serialize + ?Sized>(data: &T) -> Result<String> {
    serde_json::to_string(data).map_err(|err| ChannelError::Encoding(err.to_string()))
}

/// Check that `name` is a script identifier, or a dotted path of them when
/// `allow_path` is set.
pub fn validate_identifier(name: &str, allow_path: bool) -> Result<()> {
    let valid_segment = |segment: &str| {
        let mut chars = segment.chars();
        chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
    };

    let valid = if allow_path {
        name.split('.').all(valid_segment)
    } else {
        valid_segment(name)
    };

    if valid {
        Ok(())
    } else {
        Err(ChannelError::Encoding(format!(
            "'{name}' is not a valid identifier"
        )))
    }
}

fn quote(text: &str) -> String {
    Value::String(text.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;

    #[test]
    fn undefined_is_no_value() {
        assert!(decode_reply(b"undefined").unwrap().is_none());
    }

    #[test]
    fn json_replies_decode() {
        assert_eq!(decode_reply(b"[1,2]").unwrap(), Some(json!([1, 2])));
        assert_eq!(decode_reply(b"{\"a\":true}").unwrap(), Some(json!({"a": true})));
        assert_eq!(decode_reply(b"42").unwrap(), Some(json!(42)));
        assert_eq!(decode_reply(b"null").unwrap(), Some(Value::Null));
    }

    #[test]
    fn malformed_reply_is_a_decode_error() {
        assert!(matches!(
            decode_reply(b"{not json"),
            Err(ChannelError::Decode(_))
        ));
        assert!(matches!(decode_reply(b""), Err(ChannelError::Decode(_))));
        assert!(matches!(
            decode_reply(b"undefined "),
            Err(ChannelError::Decode(_))
        ));
    }

    #[test]
    fn scalar_arguments_are_quoted() {
        assert_eq!(encode_argument(&json!("text")), "\"text\"");
        assert_eq!(encode_argument(&json!(7)), "\"7\"");
        assert_eq!(encode_argument(&json!(1.5)), "\"1.5\"");
        assert_eq!(encode_argument(&json!(false)), "\"false\"");
        assert_eq!(encode_argument(&Value::Null), "\"\"");
        assert_eq!(encode_argument(&json!("say \"hi\"")), r#""say \"hi\"""#);
    }

    #[test]
    fn container_arguments_are_compact_json() {
        assert_eq!(encode_argument(&json!([1, "two"])), r#"[1,"two"]"#);
        assert_eq!(encode_argument(&json!({"k": [true]})), r#"{"k":[true]}"#);
    }

    #[test]
    fn call_expression_layout() {
        let call = encode_call(
            "__fbBatchedBridge",
            "callFunctionReturnFlushedQueue",
            &[json!("AppRegistry"), json!("runApplication"), json!([1, {"x": 2}])],
        )
        .unwrap();
        assert_eq!(
            call,
            r#"__fbBatchedBridge.callFunctionReturnFlushedQueue("AppRegistry","runApplication",[1,{"x":2}]);"#
        );

        assert_eq!(
            encode_call("bridge", "flushedQueue", &[]).unwrap(),
            "bridge.flushedQueue();"
        );
    }

    #[test]
    fn bad_method_names_fail_fast() {
        for name in ["", "1st", "a.b", "call()", "x y"] {
            assert!(
                matches!(encode_call("bridge", name, &[]), Err(ChannelError::Encoding(_))),
                "{name:?} should be rejected"
            );
        }
        assert!(encode_call("window..bridge", "m", &[]).is_err());
        assert!(encode_call("window.bridge", "$m_1", &[]).is_ok());
    }

    #[test]
    fn unserializable_data_is_an_encoding_error() {
        let mut data = HashMap::new();
        data.insert((1, 2), "tuple keys are not JSON object keys");
        assert!(matches!(
            to_compact_json(&data),
            Err(ChannelError::Encoding(_))
        ));
        assert_eq!(to_compact_json(&json!({"a": 1})).unwrap(), r#"{"a":1}"#);
    }
}
