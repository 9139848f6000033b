//! Where script payloads run.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde_json::Value;
use tracing::debug;

use crate::value::UNDEFINED;

/// Receives the raw result text of one payload.
pub type Completion = Box<dyn FnOnce(Bytes)>;

/// An environment that runs script payloads.
///
/// `run` may invoke `completion` before returning or hold on to it and
/// invoke it later. Either way it must be invoked exactly once. A
/// [`ScriptHost`] writes the reply the next time it flushes, so a held
/// completion needs the host's driver to call
/// [`ScriptHost::flush_replies`] after releasing it.
///
/// [`ScriptHost`]: crate::host::ScriptHost
/// [`ScriptHost::flush_replies`]: crate::host::ScriptHost::flush_replies
pub trait ExecutionTarget {
    /// Run `payload` and report its result through `completion`.
    fn run(&mut self, payload: Bytes, completion: Completion);

    /// Bind `name` to the value encoded in `serialized` (compact JSON).
    fn set_value(&mut self, name: &str, serialized: &str);
}

impl<T: ExecutionTarget + ?Sized> ExecutionTarget for Box<T> {
    fn run(&mut self, payload: Bytes, completion: Completion) {
        (**self).run(payload, completion)
    }

    fn set_value(&mut self, name: &str, serialized: &str) {
        (**self).set_value(name, serialized)
    }
}

/// Diagnostic target that evaluates nothing.
///
/// - empty payload: `undefined`
/// - `name=<json>;`: stores the global, replies `undefined`
/// - a stored global's name: its JSON
/// - anything else: the payload echoed back as a JSON string
#[derive(Debug, Default)]
pub struct EchoEngine {
    globals: BTreeMap<String, Value>,
}

impl EchoEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn globals(&self) -> &BTreeMap<String, Value> {
        &self.globals
    }

    fn evaluate(&mut self, script: &str) -> String {
        let script = script.trim();
        if script.is_empty() {
            return undefined();
        }

        if let Some((name, rhs)) = parse_assignment(script) {
            if let Ok(value) = serde_json::from_str::<Value>(rhs) {
                debug!(name, "global assigned");
                self.globals.insert(name.to_string(), value);
                return undefined();
            }
        }

        let lookup = script.strip_suffix(';').unwrap_or(script);
        if let Some(value) = self.globals.get(lookup) {
            return value.to_string();
        }

        Value::String(script.to_string()).to_string()
    }
}

impl ExecutionTarget for EchoEngine {
    fn run(&mut self, payload: Bytes, completion: Completion) {
        let reply = self.evaluate(&String::from_utf8_lossy(&payload));
        completion(Bytes::from(reply));
    }

    fn set_value(&mut self, name: &str, serialized: &str) {
        match serde_json::from_str(serialized) {
            Ok(value) => {
                self.globals.insert(name.to_string(), value);
            }
            Err(_) => {
                self.globals
                    .insert(name.to_string(), Value::String(serialized.to_string()));
            }
        }
    }
}

fn undefined() -> String {
    String::from_utf8_lossy(UNDEFINED).into_owned()
}

/// Split `<name>=<json>;` where `name` may be a dotted path.
fn parse_assignment(script: &str) -> Option<(&str, &str)> {
    let body = script.strip_suffix(';')?;
    let (name, rhs) = body.split_once('=')?;
    let name = name.trim();
    crate::value::validate_identifier(name, true).ok()?;
    Some((name, rhs.trim()))
}
