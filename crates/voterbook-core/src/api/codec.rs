//! Typed-value JSON encoding used by the document store's REST surface.
//!
//! Store documents carry every value wrapped in a one-key object naming its
//! type (`{"stringValue": "x"}`, `{"integerValue": "42"}`, ...). The
//! repositories work with plain `serde_json` maps; this module converts
//! between the two shapes and builds the query and commit request bodies.

use serde::Deserialize;
use serde_json::{json, Map, Number, Value};

use super::ApiError;
use crate::store::{Document, FieldFilter, Write};

/// Encode a plain JSON value into the store's typed form.
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                json!({ "integerValue": i.to_string() })
            } else if let Some(u) = n.as_u64() {
                json!({ "integerValue": u.to_string() })
            } else {
                json!({ "doubleValue": n.as_f64().unwrap_or_default() })
            }
        }
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            if items.is_empty() {
                json!({ "arrayValue": {} })
            } else {
                let values: Vec<Value> = items.iter().map(encode_value).collect();
                json!({ "arrayValue": { "values": values } })
            }
        }
        Value::Object(fields) => json!({ "mapValue": { "fields": encode_fields(fields) } }),
    }
}

pub fn encode_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(k, v)| (k.clone(), encode_value(v)))
        .collect()
}

/// Decode one typed value. Timestamps and references decode to strings.
pub fn decode_value(value: &Value) -> Result<Value, ApiError> {
    let Some(obj) = value.as_object() else {
        return Err(ApiError::InvalidResponse(format!("expected typed value, got {}", value)));
    };
    let Some((kind, inner)) = obj.iter().next() else {
        return Err(ApiError::InvalidResponse("empty typed value".to_string()));
    };

    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" => inner
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| bad_value(kind, inner)),
        "integerValue" => {
            // Encoded as a decimal string, but accept a bare number too
            let parsed = match inner {
                Value::String(s) => s.parse::<i64>().ok(),
                Value::Number(n) => n.as_i64(),
                _ => None,
            };
            parsed
                .map(|i| Value::Number(i.into()))
                .ok_or_else(|| bad_value(kind, inner))
        }
        "doubleValue" => {
            let parsed = match inner {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.parse::<f64>().ok(),
                _ => None,
            };
            // NaN and infinities have no JSON number form
            Ok(parsed.and_then(Number::from_f64).map(Value::Number).unwrap_or(Value::Null))
        }
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner
            .as_str()
            .map(|s| Value::String(s.to_string()))
            .ok_or_else(|| bad_value(kind, inner)),
        "geoPointValue" => Ok(inner.clone()),
        "arrayValue" => {
            let values = inner.get("values").and_then(Value::as_array);
            let decoded = values
                .map(|vs| vs.iter().map(decode_value).collect::<Result<Vec<_>, _>>())
                .transpose()?
                .unwrap_or_default();
            Ok(Value::Array(decoded))
        }
        "mapValue" => {
            let fields = inner.get("fields").and_then(Value::as_object);
            let decoded = fields.map(decode_fields).transpose()?.unwrap_or_default();
            Ok(Value::Object(decoded))
        }
        other => Err(ApiError::InvalidResponse(format!("unknown value type {}", other))),
    }
}

pub fn decode_fields(fields: &Map<String, Value>) -> Result<Map<String, Value>, ApiError> {
    fields
        .iter()
        .map(|(k, v)| decode_value(v).map(|d| (k.clone(), d)))
        .collect()
}

fn bad_value(kind: &str, inner: &Value) -> ApiError {
    ApiError::InvalidResponse(format!("malformed {}: {}", kind, inner))
}

/// A document as returned by the REST API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDocument {
    pub name: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub update_time: Option<String>,
}

impl RawDocument {
    /// The document id is the last segment of its resource name.
    pub fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    pub fn into_document(self) -> Result<Document, ApiError> {
        let fields = decode_fields(&self.fields)?;
        Ok(Document {
            id: self.id().to_string(),
            fields,
        })
    }
}

/// One element of a `:runQuery` response stream. Elements without a
/// document only report progress.
#[derive(Debug, Deserialize)]
pub struct RunQueryItem {
    #[serde(default)]
    pub document: Option<RawDocument>,
}

/// Body for `:runQuery` with AND-composed equality filters.
pub fn run_query_body(collection: &str, filters: &[FieldFilter]) -> Value {
    let field_filters: Vec<Value> = filters
        .iter()
        .map(|f| {
            json!({
                "fieldFilter": {
                    "field": { "fieldPath": f.field },
                    "op": "EQUAL",
                    "value": encode_value(&f.value),
                }
            })
        })
        .collect();

    let mut query = json!({ "from": [{ "collectionId": collection }] });
    let where_clause = match field_filters.len() {
        0 => None,
        1 => field_filters.into_iter().next(),
        _ => Some(json!({ "compositeFilter": { "op": "AND", "filters": field_filters } })),
    };
    if let (Some(w), Some(obj)) = (where_clause, query.as_object_mut()) {
        obj.insert("where".to_string(), w);
    }
    json!({ "structuredQuery": query })
}

/// Body for `:commit`. `database_path` is the documents root resource name
/// (`projects/{p}/databases/(default)/documents`).
pub fn commit_body(database_path: &str, writes: &[Write]) -> Value {
    let writes: Vec<Value> = writes
        .iter()
        .map(|w| match w {
            Write::Create { collection, id, fields } => json!({
                "update": {
                    "name": format!("{}/{}/{}", database_path, collection, id),
                    "fields": encode_fields(fields),
                },
                "currentDocument": { "exists": false },
            }),
            Write::Update {
                collection,
                id,
                fields,
                mask,
            } => json!({
                "update": {
                    "name": format!("{}/{}/{}", database_path, collection, id),
                    "fields": encode_fields(fields),
                },
                "updateMask": { "fieldPaths": mask },
                "currentDocument": { "exists": true },
            }),
            Write::Delete { collection, id } => json!({
                "delete": format!("{}/{}/{}", database_path, collection, id),
            }),
        })
        .collect();
    json!({ "writes": writes })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_encodes_as_decimal_string() {
        assert_eq!(encode_value(&json!(42)), json!({ "integerValue": "42" }));
        assert_eq!(decode_value(&json!({ "integerValue": "42" })).unwrap(), json!(42));
        assert_eq!(encode_value(&json!(1.5)), json!({ "doubleValue": 1.5 }));
    }

    #[test]
    fn test_nested_map_round_trip() {
        let plain = json!({
            "voter_name": "Rahim Uddin",
            "age": 45,
            "needs_transport": true,
            "tags": ["elder", "volunteer"],
            "meta": { "source": "import", "row": 7, "empty": [] },
            "note": null,
        });
        let fields = plain.as_object().unwrap();
        let encoded = encode_fields(fields);
        assert_eq!(encoded["meta"]["mapValue"]["fields"]["row"], json!({ "integerValue": "7" }));
        assert_eq!(decode_fields(&encoded).unwrap(), *fields);
    }

    #[test]
    fn test_decode_timestamp_and_unknown() {
        assert_eq!(
            decode_value(&json!({ "timestampValue": "2024-01-02T03:04:05Z" })).unwrap(),
            json!("2024-01-02T03:04:05Z")
        );
        assert!(decode_value(&json!({ "mysteryValue": 1 })).is_err());
        assert!(decode_value(&json!({ "integerValue": "forty" })).is_err());
    }

    #[test]
    fn test_raw_document_id_from_name() {
        let raw: RawDocument = serde_json::from_value(json!({
            "name": "projects/p/databases/(default)/documents/voters/abc123",
            "fields": { "voter_name": { "stringValue": "Karim" } },
        }))
        .unwrap();
        let doc = raw.into_document().unwrap();
        assert_eq!(doc.id, "abc123");
        assert_eq!(doc.fields["voter_name"], json!("Karim"));
    }

    #[test]
    fn test_run_query_body_shapes() {
        let none = run_query_body("voters", &[]);
        assert!(none["structuredQuery"].get("where").is_none());

        let one = run_query_body("voters", &[FieldFilter::eq("division_id", "6")]);
        assert_eq!(one["structuredQuery"]["where"]["fieldFilter"]["op"], "EQUAL");

        let two = run_query_body(
            "voters",
            &[FieldFilter::eq("division_id", "6"), FieldFilter::eq("district_id", "47")],
        );
        let composite = &two["structuredQuery"]["where"]["compositeFilter"];
        assert_eq!(composite["op"], "AND");
        assert_eq!(composite["filters"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_commit_body_preconditions() {
        let body = commit_body(
            "projects/p/databases/(default)/documents",
            &[
                Write::Create { collection: "voters".into(), id: "a".into(), fields: Map::new() },
                Write::Update {
                    collection: "voters".into(),
                    id: "b".into(),
                    fields: Map::new(),
                    mask: vec!["age".into()],
                },
                Write::Delete { collection: "voters".into(), id: "c".into() },
            ],
        );
        let writes = body["writes"].as_array().unwrap();
        assert_eq!(writes[0]["currentDocument"]["exists"], false);
        assert_eq!(writes[1]["updateMask"]["fieldPaths"], json!(["age"]));
        assert_eq!(writes[2]["delete"], "projects/p/databases/(default)/documents/voters/c");
    }
}
