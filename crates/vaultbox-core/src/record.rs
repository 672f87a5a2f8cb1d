use std::collections::BTreeMap;

use uuid::Uuid;

/// Field under which stores keep a record's identifier unless configured otherwise.
pub const DEFAULT_IDENTIFIER_FIELD: &str = "id";

/// A single serializable value. The set of kinds is closed; anything that
/// cannot be expressed here cannot be persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Integer(i64),
    Real(f64),
    String(String),
    Data(Vec<u8>),
    Array(Vec<Value>),
    Record(Record),
}

impl Value {
    /// Short name of the value kind, used in error messages and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::String(_) => "string",
            Value::Data(_) => "data",
            Value::Array(_) => "array",
            Value::Record(_) => "record",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Walks the value tree and returns the path of the first value rejected
    /// by `accept`, together with the reason it gave.
    pub fn find_unsupported<F>(&self, accept: &F) -> Option<(String, &'static str)>
    where
        F: Fn(&Value) -> Result<(), &'static str>,
    {
        find_unsupported_at(self, "$".to_string(), accept)
    }
}

fn find_unsupported_at<F>(value: &Value, path: String, accept: &F) -> Option<(String, &'static str)>
where
    F: Fn(&Value) -> Result<(), &'static str>,
{
    if let Err(reason) = accept(value) {
        return Some((path, reason));
    }
    match value {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .find_map(|(i, item)| find_unsupported_at(item, format!("{path}[{i}]"), accept)),
        Value::Record(record) => record
            .iter()
            .find_map(|(k, v)| find_unsupported_at(v, format!("{path}.{k}"), accept)),
        _ => None,
    }
}

/// Rejects reals no encoder can represent faithfully.
pub fn reject_non_finite(value: &Value) -> Result<(), &'static str> {
    match value {
        Value::Real(r) if !r.is_finite() => Err("non-finite real"),
        _ => Ok(()),
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Value::Record(v)
    }
}

/// Unordered string-keyed mapping persisted by a store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

/// Why a record's identifier field could not be used as its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifierProblem {
    Empty,
    NotAString { kind: &'static str },
}

/// Returns the record's id, generating a UUID v4 and injecting it under
/// `field` when the field is absent. Existing string ids are reused verbatim.
pub fn get_or_assign_id(record: &mut Record, field: &str) -> Result<String, IdentifierProblem> {
    match record.get(field) {
        Some(Value::String(id)) if id.is_empty() => Err(IdentifierProblem::Empty),
        Some(Value::String(id)) => Ok(id.clone()),
        Some(other) => Err(IdentifierProblem::NotAString { kind: other.kind() }),
        None => {
            let id = Uuid::new_v4().to_string();
            record.insert(field, id.clone());
            Ok(id)
        }
    }
}
