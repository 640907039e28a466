//! Conversion between native [`Value`]s and their wire representation.
//!
//! Serialization is always pure. Deserialization is split in two: [`Marshaller::decode`]
//! turns JSON into values and leaves pointers unresolved, and the client's resolution
//! step fetches the referenced resources. Pointer resolution is the only marshalling
//! path that performs I/O.

use chrono::{DateTime, Utc};
use serde_json::{Number, Value as JsonValue};
use std::collections::BTreeMap;

use crate::{
    error::{DocumentError, DocumentResult},
    object::Object,
    types::{Bytes, File, GeoPoint, JsonMap, Pointer, TYPE_KEY, WireType},
    value::Value,
};

/// Stateless converter between native values and wire JSON.
pub struct Marshaller;

impl Marshaller {
    /// Converts a native value to its wire form.
    ///
    /// A resource converted with `as_pointer == false` becomes a map of its editable
    /// attributes, each converted as a pointer-eligible value. With `as_pointer == true`
    /// a resource becomes a `Pointer`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::UnsavedReference`] when a resource without an object id
    /// has to be written as a pointer.
    pub fn to_wire(value: &Value, as_pointer: bool) -> DocumentResult<JsonValue> {
        Ok(match value {
            Value::Object(object) if !as_pointer => JsonValue::Object(Self::object_to_wire(object)?),
            Value::Object(object) => JsonValue::Object(object.as_pointer()?.to_wire()),
            Value::Pointer(pointer) => JsonValue::Object(pointer.to_wire()),
            Value::Date(date) => JsonValue::Object(date.to_wire()),
            Value::Bytes(bytes) => JsonValue::Object(bytes.to_wire()),
            Value::GeoPoint(point) => JsonValue::Object(point.to_wire()),
            Value::File(file) => JsonValue::Object(file.to_wire()),
            Value::Null => JsonValue::Null,
            Value::Bool(value) => JsonValue::Bool(*value),
            Value::Number(number) => JsonValue::Number(number.clone()),
            Value::String(value) => JsonValue::String(value.clone()),
            Value::Array(values) => JsonValue::Array(
                values
                    .iter()
                    .map(|value| Self::to_wire(value, true))
                    .collect::<DocumentResult<Vec<_>>>()?,
            ),
            Value::Map(map) => JsonValue::Object(
                map.iter()
                    .map(|(key, value)| Ok((key.clone(), Self::to_wire(value, true)?)))
                    .collect::<DocumentResult<JsonMap>>()?,
            ),
        })
    }

    /// Converts the editable attributes of a resource to a wire JSON object.
    pub fn object_to_wire(object: &Object) -> DocumentResult<JsonMap> {
        object
            .editable_attrs()
            .map(|(key, value)| Ok((key.clone(), Self::to_wire(value, true)?)))
            .collect()
    }

    /// Converts wire JSON to a native value without resolving pointers.
    ///
    /// Maps with a recognized `__type` are rebuilt through the matching [`WireType`].
    /// `Relation` values and unknown tags pass through as plain maps.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Parse`] for malformed tagged payloads.
    pub fn decode(json: &JsonValue) -> DocumentResult<Value> {
        Ok(match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(value) => Value::Bool(*value),
            JsonValue::Number(number) => Value::Number(number.clone()),
            JsonValue::String(value) => Value::String(value.clone()),
            JsonValue::Array(values) => Value::Array(
                values
                    .iter()
                    .map(Self::decode)
                    .collect::<DocumentResult<Vec<_>>>()?,
            ),
            JsonValue::Object(map) => match map.get(TYPE_KEY).and_then(JsonValue::as_str) {
                Some(Pointer::TAG) => Value::Pointer(Pointer::from_wire(map)?),
                Some(<DateTime<Utc> as WireType>::TAG) => Value::Date(DateTime::<Utc>::from_wire(map)?),
                Some(Bytes::TAG) => Value::Bytes(Bytes::from_wire(map)?),
                Some(GeoPoint::TAG) => Value::GeoPoint(GeoPoint::from_wire(map)?),
                Some(File::TAG) => Value::File(File::from_wire(map)?),
                // Relation has no native form; unknown tags are kept as they came.
                Some(_) => Self::passthrough(map),
                None => Value::Map(
                    map.iter()
                        .map(|(key, value)| Ok((key.clone(), Self::decode(value)?)))
                        .collect::<DocumentResult<BTreeMap<_, _>>>()?,
                ),
            },
        })
    }

    /// Decodes every field of a wire object.
    pub fn decode_fields(map: &JsonMap) -> DocumentResult<BTreeMap<String, Value>> {
        map.iter()
            .map(|(key, value)| Ok((key.clone(), Self::decode(value)?)))
            .collect()
    }

    /// Rebuilds native values that were written in their wire shape, such as a map
    /// carrying `__type: "Date"`.
    pub fn normalize(value: Value) -> DocumentResult<Value> {
        match value {
            Value::Map(map) if map.get(TYPE_KEY).and_then(Value::as_str).is_some() => {
                Self::decode(&Self::to_wire(&Value::Map(map), true)?)
            }
            Value::Map(map) => Ok(Value::Map(
                map.into_iter()
                    .map(|(key, value)| Ok((key, Self::normalize(value)?)))
                    .collect::<DocumentResult<BTreeMap<_, _>>>()?,
            )),
            Value::Array(values) => Ok(Value::Array(
                values
                    .into_iter()
                    .map(Self::normalize)
                    .collect::<DocumentResult<Vec<_>>>()?,
            )),
            other => Ok(other),
        }
    }

    fn passthrough(map: &JsonMap) -> Value {
        Value::Map(
            map.iter()
                .map(|(key, value)| (key.clone(), Self::plain(value)))
                .collect(),
        )
    }

    fn plain(json: &JsonValue) -> Value {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(value) => Value::Bool(*value),
            JsonValue::Number(number) => Value::Number(number.clone()),
            JsonValue::String(value) => Value::String(value.clone()),
            JsonValue::Array(values) => Value::Array(values.iter().map(Self::plain).collect()),
            JsonValue::Object(map) => Self::passthrough(map),
        }
    }

    /// Adds `amount` to a numeric value, treating a missing value as zero.
    pub(crate) fn add(value: Option<&Value>, amount: i64) -> DocumentResult<Value> {
        match value {
            None | Some(Value::Null) => Ok(Value::from(amount)),
            Some(Value::Number(number)) => match number.as_i64() {
                Some(current) => current
                    .checked_add(amount)
                    .map(|next| Value::Number(Number::from(next)))
                    .ok_or_else(|| {
                        DocumentError::InvalidPayload(format!("increment of {current} by {amount} overflows"))
                    }),
                None => Ok(Value::from(number.as_f64().unwrap_or_default() + amount as f64)),
            },
            Some(other) => Err(DocumentError::InvalidPayload(format!(
                "can not increment non-numeric value {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Arc;

    use crate::schema::SchemaBuilder;

    fn saved(class_name: &str, id: &str) -> Object {
        let schema = Arc::new(SchemaBuilder::new(class_name).build().unwrap());
        let mut object = Object::new(schema).unwrap();
        object.set_object_id(id).unwrap();
        object
    }

    #[test]
    fn tagged_values_round_trip() {
        let date = Utc.with_ymd_and_hms(2021, 1, 19, 7, 0, 0).unwrap() + chrono::Duration::microseconds(42);
        let values = vec![
            Value::Date(date),
            Value::GeoPoint(GeoPoint::new(-23.5, -46.6167)),
            Value::Bytes(Bytes(vec![0, 159, 146, 150])),
            Value::Pointer(Pointer::new("Game", "g1")),
            Value::File(File::new("scores.csv")),
        ];

        for value in values {
            let wire = Marshaller::to_wire(&value, true).unwrap();
            assert_eq!(Marshaller::decode(&wire).unwrap(), value);
        }
    }

    #[test]
    fn resource_is_a_map_or_a_pointer() {
        let mut game = saved("Game", "g1");
        game.set("name", "chess").unwrap();
        game.set("opponent", Value::from(saved("User", "u7"))).unwrap();

        let full = Marshaller::to_wire(&Value::from(&game), false).unwrap();
        assert_eq!(full, json!({
            "name": "chess",
            "opponent": { "__type": "Pointer", "className": "_User", "objectId": "u7" },
        }));

        let pointer = Marshaller::to_wire(&Value::from(&game), true).unwrap();
        assert_eq!(pointer, json!({ "__type": "Pointer", "className": "Game", "objectId": "g1" }));
    }

    #[test]
    fn unsaved_resource_can_not_be_a_pointer() {
        let schema = Arc::new(SchemaBuilder::new("Game").build().unwrap());
        let game = Object::new(schema).unwrap();
        assert_eq!(
            Marshaller::to_wire(&Value::from(game), true),
            Err(DocumentError::UnsavedReference("Game".to_string())),
        );
    }

    #[test]
    fn nested_values_are_converted() {
        let location = json!({ "city": { "__type": "GeoPoint", "latitude": 1.5, "longitude": 2.5 } });
        let decoded = Marshaller::decode(&location).unwrap();
        assert_eq!(
            decoded.as_map().unwrap()["city"],
            Value::GeoPoint(GeoPoint::new(1.5, 2.5)),
        );
        assert_eq!(Marshaller::to_wire(&decoded, false).unwrap(), location);
    }

    #[test]
    fn relation_passes_through() {
        let relation = json!({ "__type": "Relation", "className": "Player" });
        let decoded = Marshaller::decode(&relation).unwrap();
        assert!(matches!(decoded, Value::Map(_)));
        assert_eq!(Marshaller::to_wire(&decoded, true).unwrap(), relation);
    }

    #[test]
    fn malformed_payloads_are_parse_errors() {
        let date = json!({ "__type": "Date", "iso": "2024-13-45" });
        assert!(matches!(Marshaller::decode(&date), Err(DocumentError::Parse(_))));
        let bytes = json!({ "__type": "Bytes", "base64": "***" });
        assert!(matches!(Marshaller::decode(&bytes), Err(DocumentError::Parse(_))));
    }

    #[test]
    fn wire_shaped_values_are_normalized() {
        let mut map = BTreeMap::new();
        map.insert("__type".to_string(), Value::from("Date"));
        map.insert("iso".to_string(), Value::from("2020-12-04T00:00:00.000Z"));

        let normalized = Marshaller::normalize(Value::Map(map)).unwrap();
        assert_eq!(normalized, Value::Date(Utc.with_ymd_and_hms(2020, 12, 4, 0, 0, 0).unwrap()));
    }

    #[test]
    fn increments_numbers() {
        assert_eq!(Marshaller::add(Some(&Value::from(4)), 1).unwrap(), Value::from(5));
        assert_eq!(Marshaller::add(None, 3).unwrap(), Value::from(3));
        assert_eq!(Marshaller::add(Some(&Value::from(1.5)), 1).unwrap(), Value::from(2.5));
        assert!(Marshaller::add(Some(&Value::from("x")), 1).is_err());
        assert!(matches!(
            Marshaller::add(Some(&Value::from(i64::MAX)), 1),
            Err(DocumentError::InvalidPayload(_))
        ));
        assert_eq!(
            Marshaller::add(Some(&Value::from(i64::MIN)), i64::MAX).unwrap(),
            Value::from(-1)
        );
    }
}
