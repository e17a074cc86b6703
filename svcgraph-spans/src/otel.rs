use std::sync::Arc;

use opentelemetry_proto::tonic::common::v1::any_value::Value as OtelValue;
use opentelemetry_proto::tonic::common::v1::{AnyValue, KeyValue};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::{Span as OtelSpan, TracesData};

use crate::{AttributeValue, ResourceAttributes, Span};

/// Converts an OpenTelemetry span into a [`Span`].
///
/// Every attribute value is reduced to a string, which loses its type. Strings are kept as-is,
/// booleans and numbers use their display form, bytes are decoded as UTF-8 or hex-encoded if
/// they are not valid UTF-8, and arrays and key-value lists are serialized to compact JSON.
/// Attributes without a value are dropped.
pub fn normalize(span: &OtelSpan) -> Span {
    let attributes = span
        .attributes
        .iter()
        .filter_map(|kv| {
            let value = kv.value.as_ref()?.value.as_ref()?;
            Some((kv.key.clone(), value_to_string(value)))
        })
        .collect();

    Span::new(span.name.clone(), attributes)
}

/// Walks all spans in an OTLP traces payload.
///
/// The callback receives each span together with the attributes of the resource it was
/// reported under. The resource is shared by all of its spans and can be cloned cheaply to keep
/// it past the callback. Spans are visited in payload order.
pub fn for_each_span<F>(traces: TracesData, mut f: F)
where
    F: FnMut(&Arc<ResourceAttributes>, OtelSpan),
{
    for resource_spans in traces.resource_spans {
        let resource = Arc::new(ResourceAttributes::from_resource(
            resource_spans.resource.as_ref(),
        ));
        for scope_spans in resource_spans.scope_spans {
            for span in scope_spans.spans {
                f(&resource, span);
            }
        }
    }
}

impl ResourceAttributes {
    /// Collects the attributes of an OpenTelemetry resource, preserving their types.
    pub fn from_resource(resource: Option<&Resource>) -> Self {
        let Some(resource) = resource else {
            return Self::default();
        };

        resource
            .attributes
            .iter()
            .filter_map(|kv| Some((kv.key.as_str(), convert_value(kv.value.as_ref()?)?)))
            .collect()
    }
}

fn convert_value(value: &AnyValue) -> Option<AttributeValue> {
    Some(match value.value.as_ref()? {
        OtelValue::StringValue(s) => AttributeValue::String(s.clone()),
        OtelValue::BoolValue(b) => AttributeValue::Bool(*b),
        OtelValue::IntValue(i) => AttributeValue::Int(*i),
        OtelValue::DoubleValue(d) => AttributeValue::Double(*d),
        OtelValue::BytesValue(bytes) => AttributeValue::Bytes(bytes.clone()),
        OtelValue::ArrayValue(array) => {
            AttributeValue::Array(array.values.iter().filter_map(convert_value).collect())
        }
        OtelValue::KvlistValue(kvlist) => AttributeValue::KvList(
            kvlist
                .values
                .iter()
                .filter_map(|kv| Some((kv.key.clone(), convert_value(kv.value.as_ref()?)?)))
                .collect(),
        ),
    })
}

fn value_to_string(value: &OtelValue) -> String {
    match value {
        OtelValue::StringValue(s) => s.clone(),
        OtelValue::BoolValue(b) => b.to_string(),
        OtelValue::IntValue(i) => i.to_string(),
        OtelValue::DoubleValue(d) => d.to_string(),
        OtelValue::BytesValue(bytes) => bytes_to_string(bytes),
        OtelValue::ArrayValue(array) => {
            let values = array
                .values
                .iter()
                .filter_map(|v| scalar_to_json(v.value.as_ref()?))
                .collect();
            serde_json::Value::Array(values).to_string()
        }
        OtelValue::KvlistValue(kvlist) => {
            let object = kvlist_to_json(&kvlist.values);
            serde_json::Value::Object(object).to_string()
        }
    }
}

fn bytes_to_string(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_owned(),
        Err(_) => hex::encode(bytes),
    }
}

fn kvlist_to_json(values: &[KeyValue]) -> serde_json::Map<String, serde_json::Value> {
    values
        .iter()
        .filter_map(|kv| {
            let value = scalar_to_json(kv.value.as_ref()?.value.as_ref()?)?;
            Some((kv.key.clone(), value))
        })
        .collect()
}

/// Converts a scalar value to JSON. Nested arrays and key-value lists are skipped.
fn scalar_to_json(value: &OtelValue) -> Option<serde_json::Value> {
    Some(match value {
        OtelValue::StringValue(s) => serde_json::Value::String(s.clone()),
        OtelValue::BoolValue(b) => serde_json::Value::Bool(*b),
        OtelValue::IntValue(i) => serde_json::Value::from(*i),
        OtelValue::DoubleValue(d) => serde_json::Value::Number(serde_json::Number::from_f64(*d)?),
        OtelValue::BytesValue(bytes) => serde_json::Value::String(bytes_to_string(bytes)),
        OtelValue::ArrayValue(_) | OtelValue::KvlistValue(_) => return None,
    })
}

#[cfg(test)]
mod tests {
    use opentelemetry_proto::tonic::common::v1::{ArrayValue, KeyValueList};

    use super::*;

    fn kv(key: &str, value: OtelValue) -> KeyValue {
        KeyValue {
            key: key.to_owned(),
            value: Some(AnyValue { value: Some(value) }),
        }
    }

    fn span_with(attributes: Vec<KeyValue>) -> OtelSpan {
        OtelSpan {
            name: "GET /orders".to_owned(),
            attributes,
            ..Default::default()
        }
    }

    #[test]
    fn test_normalize_scalars() {
        let span = span_with(vec![
            kv("http.route", OtelValue::StringValue("/orders".to_owned())),
            kv("error", OtelValue::BoolValue(false)),
            kv("http.status_code", OtelValue::IntValue(200)),
            kv("ratio", OtelValue::DoubleValue(0.25)),
            kv("whole", OtelValue::DoubleValue(2.0)),
            kv("utf8", OtelValue::BytesValue(b"hello".to_vec())),
            kv("binary", OtelValue::BytesValue(vec![0xff, 0x00])),
        ]);

        let normalized = normalize(&span);
        assert_eq!(normalized.operation_name(), "GET /orders");
        insta::assert_debug_snapshot!(normalized.attributes(), @r#"
        {
            "binary": "ff00",
            "error": "false",
            "http.route": "/orders",
            "http.status_code": "200",
            "ratio": "0.25",
            "utf8": "hello",
            "whole": "2",
        }
        "#);
    }

    #[test]
    fn test_normalize_complex_values() {
        let array = ArrayValue {
            values: vec![
                AnyValue {
                    value: Some(OtelValue::StringValue("a".to_owned())),
                },
                AnyValue {
                    value: Some(OtelValue::IntValue(1)),
                },
                AnyValue {
                    value: Some(OtelValue::ArrayValue(ArrayValue::default())),
                },
            ],
        };
        let kvlist = KeyValueList {
            values: vec![
                kv("retry", OtelValue::BoolValue(true)),
                kv("nested", OtelValue::KvlistValue(KeyValueList::default())),
            ],
        };
        let span = span_with(vec![
            kv("list", OtelValue::ArrayValue(array)),
            kv("map", OtelValue::KvlistValue(kvlist)),
        ]);

        let normalized = normalize(&span);
        assert_eq!(normalized.attribute("list"), Some(r#"["a",1]"#));
        assert_eq!(normalized.attribute("map"), Some(r#"{"retry":true}"#));
    }

    #[test]
    fn test_normalize_drops_empty_values() {
        let span = span_with(vec![
            KeyValue {
                key: "missing".to_owned(),
                value: None,
            },
            KeyValue {
                key: "empty".to_owned(),
                value: Some(AnyValue { value: None }),
            },
        ]);

        assert!(normalize(&span).attributes().is_empty());
    }

    #[test]
    fn test_for_each_span_from_json() {
        let json = r#"{
            "resourceSpans": [
                {
                    "resource": {
                        "attributes": [
                            {"key": "service.name", "value": {"stringValue": "checkout"}},
                            {"key": "process.pid", "value": {"intValue": "1234"}}
                        ]
                    },
                    "scopeSpans": [
                        {
                            "scope": {"name": "tracer"},
                            "spans": [
                                {
                                    "traceId": "89143b0763095bd9c9955e8175d1fb23",
                                    "spanId": "e342abb1214ca181",
                                    "name": "first",
                                    "kind": 3,
                                    "startTimeUnixNano": "1697620454980000000",
                                    "endTimeUnixNano": "1697620454980078800"
                                },
                                {
                                    "traceId": "89143b0763095bd9c9955e8175d1fb23",
                                    "spanId": "e342abb1214ca182",
                                    "name": "second",
                                    "kind": 2,
                                    "startTimeUnixNano": "1697620454980000000",
                                    "endTimeUnixNano": "1697620454980078800"
                                }
                            ]
                        }
                    ]
                }
            ]
        }"#;

        let traces: TracesData = serde_json::from_str(json).unwrap();
        let mut seen = Vec::new();
        for_each_span(traces, |resource, span| {
            seen.push((
                resource.get_str("service.name").map(str::to_owned),
                resource.get("process.pid").cloned(),
                span.name,
            ));
        });

        similar_asserts::assert_eq!(
            seen,
            vec![
                (
                    Some("checkout".to_owned()),
                    Some(AttributeValue::Int(1234)),
                    "first".to_owned()
                ),
                (
                    Some("checkout".to_owned()),
                    Some(AttributeValue::Int(1234)),
                    "second".to_owned()
                ),
            ]
        );
    }

    #[test]
    fn test_resource_without_attributes() {
        assert!(ResourceAttributes::from_resource(None).is_empty());
    }
}
