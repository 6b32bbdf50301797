//! Secret redaction for log output and error messages.
//!
//! A [`Redactor`] holds an ordered list of secrets, each with a placeholder
//! naming its role. Strings are scrubbed directly; structured values are
//! deep-copied as [`LogValue`] graphs. Graph nodes are shared (`Rc`), so a
//! value may reference itself. Any node reached a second time during one
//! redaction call is replaced by [`LogValue::Circular`], which bounds the walk
//! on arbitrary graphs.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

/// Marker emitted in place of a revisited node.
pub const CIRCULAR: &str = "CIRCULAR";

type Node<T> = Rc<RefCell<T>>;

/// A loggable value graph.
#[derive(Debug, Clone)]
pub enum LogValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Node<Vec<LogValue>>),
    Object(Node<Vec<(String, LogValue)>>),
    Circular,
}

impl LogValue {
    pub fn list(items: Vec<LogValue>) -> Self {
        LogValue::List(Rc::new(RefCell::new(items)))
    }

    pub fn object<K: Into<String>>(fields: Vec<(K, LogValue)>) -> Self {
        LogValue::Object(Rc::new(RefCell::new(
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        )))
    }

    /// Append a field to an object node. Returns `false` for non-objects.
    pub fn insert(&self, key: impl Into<String>, value: LogValue) -> bool {
        match self {
            LogValue::Object(node) => {
                node.borrow_mut().push((key.into(), value));
                true
            }
            _ => false,
        }
    }

    /// Append an element to a list node. Returns `false` for non-lists.
    pub fn push(&self, value: LogValue) -> bool {
        match self {
            LogValue::List(node) => {
                node.borrow_mut().push(value);
                true
            }
            _ => false,
        }
    }

    /// Convert to JSON. Revisited nodes become the `"CIRCULAR"` string.
    pub fn to_json(&self) -> Value {
        let mut seen = HashSet::new();
        self.to_json_inner(&mut seen)
    }

    fn to_json_inner(&self, seen: &mut HashSet<usize>) -> Value {
        match self {
            LogValue::Null => Value::Null,
            LogValue::Bool(b) => Value::Bool(*b),
            LogValue::Number(n) => Value::Number(n.clone()),
            LogValue::String(s) => Value::String(s.clone()),
            LogValue::Circular => Value::String(CIRCULAR.to_string()),
            LogValue::List(node) => {
                if !seen.insert(Rc::as_ptr(node) as *const () as usize) {
                    return Value::String(CIRCULAR.to_string());
                }
                Value::Array(
                    node.borrow()
                        .iter()
                        .map(|item| item.to_json_inner(seen))
                        .collect(),
                )
            }
            LogValue::Object(node) => {
                if !seen.insert(Rc::as_ptr(node) as *const () as usize) {
                    return Value::String(CIRCULAR.to_string());
                }
                let mut map = serde_json::Map::new();
                for (key, value) in node.borrow().iter() {
                    map.insert(key.clone(), value.to_json_inner(seen));
                }
                Value::Object(map)
            }
        }
    }
}

impl From<&str> for LogValue {
    fn from(s: &str) -> Self {
        LogValue::String(s.to_string())
    }
}

impl From<String> for LogValue {
    fn from(s: String) -> Self {
        LogValue::String(s)
    }
}

impl From<Value> for LogValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => LogValue::Null,
            Value::Bool(b) => LogValue::Bool(b),
            Value::Number(n) => LogValue::Number(n),
            Value::String(s) => LogValue::String(s),
            Value::Array(items) => LogValue::list(items.into_iter().map(LogValue::from).collect()),
            Value::Object(map) => {
                LogValue::object(map.into_iter().map(|(k, v)| (k, LogValue::from(v))).collect())
            }
        }
    }
}

#[derive(Clone)]
struct Secret {
    value: String,
    placeholder: String,
}

/// Replaces configured secrets with role placeholders.
#[derive(Clone, Default)]
pub struct Redactor {
    secrets: Vec<Secret>,
}

// Never print secret values, even in debug output.
impl fmt::Debug for Redactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Redactor")
            .field(
                "placeholders",
                &self
                    .secrets
                    .iter()
                    .map(|s| s.placeholder.as_str())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Redactor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a secret. Empty secrets are ignored. Secrets are applied in
    /// registration order.
    pub fn with_secret(mut self, value: &str, placeholder: &str) -> Self {
        if !value.is_empty() {
            self.secrets.push(Secret {
                value: value.to_string(),
                placeholder: placeholder.to_string(),
            });
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    pub fn redact_str(&self, text: &str) -> String {
        let mut out = text.to_string();
        for secret in &self.secrets {
            if out.contains(&secret.value) {
                out = out.replace(&secret.value, &secret.placeholder);
            }
        }
        out
    }

    /// Deep-copy `value` with secrets replaced and revisited nodes marked
    /// circular. Key order and structure are preserved.
    pub fn redact(&self, value: &LogValue) -> LogValue {
        let mut seen = HashSet::new();
        self.redact_inner(value, &mut seen)
    }

    fn redact_inner(&self, value: &LogValue, seen: &mut HashSet<usize>) -> LogValue {
        match value {
            LogValue::String(s) => LogValue::String(self.redact_str(s)),
            LogValue::List(node) => {
                if !seen.insert(Rc::as_ptr(node) as *const () as usize) {
                    return LogValue::Circular;
                }
                let items = node
                    .borrow()
                    .iter()
                    .map(|item| self.redact_inner(item, seen))
                    .collect();
                LogValue::list(items)
            }
            LogValue::Object(node) => {
                if !seen.insert(Rc::as_ptr(node) as *const () as usize) {
                    return LogValue::Circular;
                }
                let fields = node
                    .borrow()
                    .iter()
                    .map(|(key, item)| (key.clone(), self.redact_inner(item, seen)))
                    .collect::<Vec<_>>();
                LogValue::object(fields)
            }
            other => other.clone(),
        }
    }

    /// Redact a JSON document.
    pub fn redact_json(&self, value: &Value) -> Value {
        self.redact(&LogValue::from(value.clone())).to_json()
    }
}
