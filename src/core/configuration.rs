//! Configurations - immutable key/value environments.
//!
//! A Configuration is what a target "sees" while it is evaluated. It is never
//! mutated in place: [`Configuration::derive`] layers a [`Delta`] over an
//! existing configuration and returns a new one.
//!
//! Every configuration carries a short content digest. The digest is the
//! primary sort key between configurations and is injected into output
//! paths so that one target built two ways never collides on disk.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::util::hash::Fingerprint;

/// A single configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<String>),
}

impl Value {
    /// Build a list value.
    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    /// Get the list contents, if this is a list.
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Get the string contents, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Short name of the value's type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::List(_) => "list",
        }
    }

    /// Render as command-line arguments: lists expand to one argument per item.
    pub fn to_args(&self) -> Vec<String> {
        match self {
            Value::Bool(b) => vec![b.to_string()],
            Value::Int(n) => vec![n.to_string()],
            Value::Str(s) => vec![s.clone()],
            Value::List(items) => items.clone(),
        }
    }

    fn fingerprint(&self, fp: &mut Fingerprint) {
        match self {
            Value::Bool(b) => {
                fp.update_tag(0).update_bool(*b);
            }
            Value::Int(n) => {
                fp.update_tag(1).update_i64(*n);
            }
            Value::Str(s) => {
                fp.update_tag(2).update_str(s);
            }
            Value::List(items) => {
                fp.update_tag(3).update_strs(items.iter().map(String::as_str));
            }
        }
    }

    /// Parse a value from command-line text.
    ///
    /// Tries bool, then integer; text containing a comma becomes a list,
    /// anything else a string.
    pub fn parse_cli(text: &str) -> Value {
        if let Ok(b) = text.parse::<bool>() {
            return Value::Bool(b);
        }
        if let Ok(n) = text.parse::<i64>() {
            return Value::Int(n);
        }
        if text.contains(',') {
            return Value::list(text.split(',').map(str::trim).filter(|s| !s.is_empty()));
        }
        Value::Str(text.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::List(items) => write!(f, "{:?}", items),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

/// One step of a [`Delta`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum DeltaOp {
    /// Replace the value at `key`.
    Set { key: String, value: Value },

    /// Extend the list at `key`.
    Append { key: String, items: Vec<String> },

    /// Insert items at the front of the list at `key`.
    Prepend { key: String, items: Vec<String> },

    /// Delete `key`.
    Remove { key: String },
}

impl DeltaOp {
    fn apply(&self, values: &mut BTreeMap<String, Value>) {
        match self {
            DeltaOp::Set { key, value } => {
                values.insert(key.clone(), value.clone());
            }
            DeltaOp::Append { key, items } => {
                let mut list = take_list(values, key);
                list.extend(items.iter().cloned());
                values.insert(key.clone(), Value::List(list));
            }
            DeltaOp::Prepend { key, items } => {
                let mut list = items.clone();
                list.extend(take_list(values, key));
                values.insert(key.clone(), Value::List(list));
            }
            DeltaOp::Remove { key } => {
                values.remove(key);
            }
        }
    }
}

/// Remove `key` and coerce it to a list: strings become one-element lists,
/// other scalars are dropped.
fn take_list(values: &mut BTreeMap<String, Value>, key: &str) -> Vec<String> {
    match values.remove(key) {
        Some(Value::List(items)) => items,
        Some(Value::Str(s)) => vec![s],
        Some(Value::Bool(_)) | Some(Value::Int(_)) | None => Vec::new(),
    }
}

/// An incremental change to a configuration.
///
/// Deltas are totally ordered so they can take part in sort keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Delta(Vec<DeltaOp>);

impl Delta {
    /// Create an empty delta.
    pub fn new() -> Self {
        Delta(Vec::new())
    }

    /// Add a `set` step.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.push(DeltaOp::Set {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Add an `append` step.
    pub fn append<I, S>(mut self, key: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0.push(DeltaOp::Append {
            key: key.into(),
            items: items.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Add a `prepend` step.
    pub fn prepend<I, S>(mut self, key: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0.push(DeltaOp::Prepend {
            key: key.into(),
            items: items.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Add a `remove` step.
    pub fn remove(mut self, key: impl Into<String>) -> Self {
        self.0.push(DeltaOp::Remove { key: key.into() });
        self
    }

    /// Append all steps of `other` after this delta's steps.
    pub fn then(mut self, other: &Delta) -> Self {
        self.0.extend(other.0.iter().cloned());
        self
    }

    /// The steps, in application order.
    pub fn ops(&self) -> &[DeltaOp] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<DeltaOp>> for Delta {
    fn from(ops: Vec<DeltaOp>) -> Self {
        Delta(ops)
    }
}

/// An immutable, content-hashed key/value environment.
///
/// Cloning is cheap (the contents are shared). Equality compares contents,
/// never identity.
#[derive(Clone)]
pub struct Configuration {
    inner: Arc<ConfigurationInner>,
}

#[derive(Debug)]
struct ConfigurationInner {
    values: BTreeMap<String, Value>,
    digest: String,
}

impl Configuration {
    /// Create a configuration from a set of values.
    pub fn new(values: BTreeMap<String, Value>) -> Self {
        let mut fp = Fingerprint::new();
        for (key, value) in &values {
            fp.update_str(key);
            value.fingerprint(&mut fp);
        }
        let digest = fp.finish_short();

        Configuration {
            inner: Arc::new(ConfigurationInner { values, digest }),
        }
    }

    /// The empty configuration.
    pub fn empty() -> Self {
        Self::new(BTreeMap::new())
    }

    /// Look up a value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.inner.values.get(key)
    }

    /// Look up a value, falling back to `default`.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a Value) -> &'a Value {
        self.get(key).unwrap_or(default)
    }

    /// Produce a new configuration with `delta` layered over this one.
    pub fn derive(&self, delta: &Delta) -> Configuration {
        if delta.is_empty() {
            return self.clone();
        }

        let mut values = self.inner.values.clone();
        for op in delta.ops() {
            op.apply(&mut values);
        }
        Configuration::new(values)
    }

    /// Shorthand for deriving with a single `set`.
    pub fn with(&self, key: impl Into<String>, value: impl Into<Value>) -> Configuration {
        self.derive(&Delta::new().set(key, value))
    }

    /// Stable short content digest.
    pub fn digest(&self) -> &str {
        &self.inner.digest
    }

    /// All entries, sorted by key.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.inner.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.inner.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.values.is_empty()
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for Configuration {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
            || (self.inner.digest == other.inner.digest && self.inner.values == other.inner.values)
    }
}

impl Eq for Configuration {}

impl Hash for Configuration {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Equal contents always produce equal digests.
        self.inner.digest.hash(state)
    }
}

impl PartialOrd for Configuration {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Configuration {
    fn cmp(&self, other: &Self) -> Ordering {
        self.inner
            .digest
            .cmp(&other.inner.digest)
            .then_with(|| self.inner.values.cmp(&other.inner.values))
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("digest", &self.inner.digest)
            .field("values", &self.inner.values)
            .finish()
    }
}

impl Serialize for Configuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.inner.values.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Configuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        BTreeMap::<String, Value>::deserialize(deserializer).map(Configuration::new)
    }
}
