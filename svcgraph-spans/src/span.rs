use std::collections::BTreeMap;
use std::fmt;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// A typed attribute value as it appears on an OpenTelemetry resource.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    /// A UTF-8 string.
    String(String),
    /// A boolean.
    Bool(bool),
    /// A signed 64-bit integer.
    Int(i64),
    /// A double precision float.
    Double(f64),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// A list of values.
    Array(Vec<AttributeValue>),
    /// A nested list of key-value pairs.
    KvList(BTreeMap<String, AttributeValue>),
}

impl AttributeValue {
    /// Returns the string if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl Serialize for AttributeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::String(s) => serializer.serialize_str(s),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Double(d) => serializer.serialize_f64(*d),
            Self::Bytes(bytes) => serializer.serialize_str(&hex::encode(bytes)),
            Self::Array(values) => {
                let mut seq = serializer.serialize_seq(Some(values.len()))?;
                for value in values {
                    seq.serialize_element(value)?;
                }
                seq.end()
            }
            Self::KvList(map) => {
                let mut ser = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    ser.serialize_entry(key, value)?;
                }
                ser.end()
            }
        }
    }
}

/// Attributes describing the process that produced a batch of spans.
///
/// Values keep their original type. Lookups of well-known keys through [`get_str`](Self::get_str)
/// only accept string values, any other type counts as absent.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResourceAttributes(BTreeMap<String, AttributeValue>);

impl ResourceAttributes {
    /// Creates an empty set of resource attributes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the typed value for `key`.
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.0.get(key)
    }

    /// Returns the value for `key` if it is present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(AttributeValue::as_str)
    }

    /// Inserts a value, replacing an earlier one under the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Returns the number of attributes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no attributes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over all attributes in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K, V> FromIterator<(K, V)> for ResourceAttributes
where
    K: Into<String>,
    V: Into<AttributeValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A normalized span: the operation name and a flat map of string attributes.
///
/// Typed attribute values are reduced to strings when the span is created, see
/// [`normalize`](crate::normalize).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Span {
    operation_name: String,
    attributes: BTreeMap<String, String>,
}

impl Span {
    /// Creates a span from its operation name and flattened attributes.
    pub fn new(operation_name: impl Into<String>, attributes: BTreeMap<String, String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            attributes,
        }
    }

    /// The name of the operation this span describes.
    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }

    /// All attributes of the span.
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Returns a single attribute.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// The workload that owns a service in the cluster.
///
/// All fields are empty when ownership could not be resolved.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WorkloadOwnership {
    /// Namespace of the workload.
    pub namespace: String,
    /// Kind of the owning object, for example `Deployment` or `ReplicaSet`.
    pub owner_kind: String,
    /// Name of the owning object.
    pub owner_name: String,
    /// Unique identifier of the owning object, if known.
    pub owner_id: String,
}

impl WorkloadOwnership {
    /// Returns `true` once an owner kind has been determined.
    pub fn is_resolved(&self) -> bool {
        !self.owner_kind.is_empty()
    }
}

impl fmt::Display for WorkloadOwnership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_resolved() {
            return write!(f, "<unresolved>");
        }
        write!(f, "{}/{}", self.owner_kind, self.owner_name)?;
        if !self.namespace.is_empty() {
            write!(f, " in {}", self.namespace)?;
        }
        Ok(())
    }
}

/// A span annotated with the call edge it represents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EnrichedSpan {
    /// The normalized span.
    pub span: Span,
    /// Name of the service that reported the span.
    pub service_name: String,
    /// Key identifying the caller to callee edge.
    pub dedup_key: String,
    /// The calling service.
    pub caller_service: String,
    /// The called service.
    pub callee_service: String,
    /// The owning workload, filled by the ownership resolver.
    pub ownership: WorkloadOwnership,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_str_ignores_other_types() {
        let resource = ResourceAttributes::from_iter([
            ("service.name", AttributeValue::from("checkout")),
            ("k8s.namespace.name", AttributeValue::Int(3)),
        ]);

        assert_eq!(resource.get_str("service.name"), Some("checkout"));
        assert_eq!(resource.get_str("k8s.namespace.name"), None);
        assert_eq!(
            resource.get("k8s.namespace.name"),
            Some(&AttributeValue::Int(3))
        );
    }

    #[test]
    fn test_serialize_resource_attributes() {
        let mut resource = ResourceAttributes::new();
        resource.insert("service.name", "checkout");
        resource.insert("process.pid", 42i64);
        resource.insert("raw", AttributeValue::Bytes(vec![0xde, 0xad]));
        resource.insert(
            "tags",
            AttributeValue::Array(vec!["a".into(), AttributeValue::Double(1.5)]),
        );

        let json = serde_json::to_string(&resource).unwrap();
        insta::assert_snapshot!(json, @r#"{"process.pid":42,"raw":"dead","service.name":"checkout","tags":["a",1.5]}"#);
    }

    #[test]
    fn test_ownership_display() {
        let mut ownership = WorkloadOwnership::default();
        assert!(!ownership.is_resolved());
        assert_eq!(ownership.to_string(), "<unresolved>");

        ownership.owner_kind = "Deployment".to_owned();
        ownership.owner_name = "billing".to_owned();
        ownership.namespace = "shop".to_owned();
        assert!(ownership.is_resolved());
        assert_eq!(ownership.to_string(), "Deployment/billing in shop");
    }
}
