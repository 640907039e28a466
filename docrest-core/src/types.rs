//! Wire-tagged value types.
//!
//! Values that have no direct JSON representation travel as JSON objects carrying a
//! `__type` discriminator. Each such type implements [`WireType`], which knows its tag
//! and how to convert itself to and from the tagged object.
//!
//! | Type | Tag | Fields |
//! |---|---|---|
//! | [`Pointer`] | `Pointer` | `className`, `objectId` |
//! | `DateTime<Utc>` | `Date` | `iso` |
//! | [`Bytes`] | `Bytes` | `base64` |
//! | [`GeoPoint`] | `GeoPoint` | `latitude`, `longitude` |
//! | [`File`] | `File` | `name`, `url` (read only) |
//!
//! `Relation` values are recognized but have no native form.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Map, Value as JsonValue, json};
use std::ops::Deref;

use crate::error::{DocumentError, DocumentResult};

/// A JSON object as sent over the wire.
pub type JsonMap = Map<String, JsonValue>;

/// Key holding the type discriminator of a wire-tagged value.
pub const TYPE_KEY: &str = "__type";

/// Wire tag of the `Relation` variant, which has no native form.
pub const RELATION_TAG: &str = "Relation";

/// In-memory class name of the built-in user resource.
pub const USER_CLASS: &str = "User";

/// Class name the service uses for the user resource.
pub const WIRE_USER_CLASS: &str = "_User";

/// Maps an in-memory class name to the name used on the wire.
pub fn wire_class_name(class_name: &str) -> &str {
    if class_name == USER_CLASS { WIRE_USER_CLASS } else { class_name }
}

/// Maps a class name read from the wire to the in-memory class name.
pub fn native_class_name(class_name: &str) -> &str {
    if class_name == WIRE_USER_CLASS { USER_CLASS } else { class_name }
}

/// Conversion between a native type and its `__type`-tagged JSON object.
pub trait WireType: Sized {
    /// The `__type` discriminator for this type.
    const TAG: &'static str;

    /// Produces the tagged JSON object, including the `__type` key.
    fn to_wire(&self) -> JsonMap;

    /// Rebuilds the native value from the fields of a tagged JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Parse`] if a declared field is missing or malformed.
    fn from_wire(fields: &JsonMap) -> DocumentResult<Self>;
}

fn tagged(tag: &str) -> JsonMap {
    let mut map = JsonMap::new();
    map.insert(TYPE_KEY.to_string(), JsonValue::String(tag.to_string()));
    map
}

fn required_str<'a>(fields: &'a JsonMap, tag: &str, key: &str) -> DocumentResult<&'a str> {
    fields
        .get(key)
        .and_then(JsonValue::as_str)
        .ok_or_else(|| DocumentError::Parse(format!("{tag} value is missing string field `{key}`")))
}

fn required_f64(fields: &JsonMap, tag: &str, key: &str) -> DocumentResult<f64> {
    fields
        .get(key)
        .and_then(JsonValue::as_f64)
        .ok_or_else(|| DocumentError::Parse(format!("{tag} value is missing numeric field `{key}`")))
}

/// A reference to a stored resource by class name and object id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pointer {
    /// Class name of the referenced resource.
    pub class_name: String,
    /// Object id of the referenced resource.
    pub object_id: String,
}

impl Pointer {
    pub fn new(class_name: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self { class_name: class_name.into(), object_id: object_id.into() }
    }
}

impl WireType for Pointer {
    const TAG: &'static str = "Pointer";

    fn to_wire(&self) -> JsonMap {
        let mut map = tagged(Self::TAG);
        map.insert("className".into(), json!(wire_class_name(&self.class_name)));
        map.insert("objectId".into(), json!(self.object_id));
        map
    }

    fn from_wire(fields: &JsonMap) -> DocumentResult<Self> {
        Ok(Pointer::new(
            native_class_name(required_str(fields, Self::TAG, "className")?),
            required_str(fields, Self::TAG, "objectId")?,
        ))
    }
}

/// Formats a timestamp the way the service stores dates.
pub fn format_iso(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses an ISO-8601 timestamp, normalizing it to UTC.
///
/// Strings without an offset are taken to be UTC.
///
/// # Errors
///
/// Returns [`DocumentError::Parse`] for malformed input.
pub fn parse_iso(input: &str) -> DocumentResult<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(input) {
        Ok(date) => Ok(date.with_timezone(&Utc)),
        Err(_) => Ok(NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f")?.and_utc()),
    }
}

impl WireType for DateTime<Utc> {
    const TAG: &'static str = "Date";

    fn to_wire(&self) -> JsonMap {
        let mut map = tagged(Self::TAG);
        map.insert("iso".into(), json!(format_iso(self)));
        map
    }

    fn from_wire(fields: &JsonMap) -> DocumentResult<Self> {
        parse_iso(required_str(fields, Self::TAG, "iso")?)
    }
}

/// A binary payload, transported base64 encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Bytes(pub Vec<u8>);

impl Bytes {
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl Deref for Bytes {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(bytes: Vec<u8>) -> Self {
        Bytes(bytes)
    }
}

impl From<&[u8]> for Bytes {
    fn from(bytes: &[u8]) -> Self {
        Bytes(bytes.to_vec())
    }
}

impl WireType for Bytes {
    const TAG: &'static str = "Bytes";

    fn to_wire(&self) -> JsonMap {
        let mut map = tagged(Self::TAG);
        map.insert("base64".into(), json!(BASE64.encode(&self.0)));
        map
    }

    fn from_wire(fields: &JsonMap) -> DocumentResult<Self> {
        Ok(Bytes(BASE64.decode(required_str(fields, Self::TAG, "base64")?)?))
    }
}

/// A latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

impl From<(f64, f64)> for GeoPoint {
    fn from((latitude, longitude): (f64, f64)) -> Self {
        GeoPoint { latitude, longitude }
    }
}

impl From<GeoPoint> for (f64, f64) {
    fn from(point: GeoPoint) -> Self {
        (point.latitude, point.longitude)
    }
}

impl WireType for GeoPoint {
    const TAG: &'static str = "GeoPoint";

    fn to_wire(&self) -> JsonMap {
        let mut map = tagged(Self::TAG);
        map.insert("latitude".into(), json!(self.latitude));
        map.insert("longitude".into(), json!(self.longitude));
        map
    }

    fn from_wire(fields: &JsonMap) -> DocumentResult<Self> {
        Ok(GeoPoint::new(
            required_f64(fields, Self::TAG, "latitude")?,
            required_f64(fields, Self::TAG, "longitude")?,
        ))
    }
}

/// A file previously uploaded to the service.
///
/// Only the name is written back; the download url is populated on read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    name: String,
    url: Option<String>,
}

impl File {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), url: None }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The download url reported by the service, if this file was read from it.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// The API url addressing this file under the given API root.
    pub fn absolute_url(&self, api_root: &str) -> String {
        format!("{}/files/{}", api_root.trim_end_matches('/'), self.name)
    }
}

impl WireType for File {
    const TAG: &'static str = "File";

    fn to_wire(&self) -> JsonMap {
        let mut map = tagged(Self::TAG);
        map.insert("name".into(), json!(self.name));
        map
    }

    fn from_wire(fields: &JsonMap) -> DocumentResult<Self> {
        Ok(File {
            name: required_str(fields, Self::TAG, "name")?.to_string(),
            url: fields.get("url").and_then(JsonValue::as_str).map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn user_pointer_uses_service_class_name() {
        let wire = Pointer::new("User", "abc").to_wire();
        assert_eq!(wire["className"], "_User");
        assert_eq!(Pointer::new("Game", "abc").to_wire()["className"], "Game");
        assert_eq!(Pointer::from_wire(&wire).unwrap(), Pointer::new("User", "abc"));
    }

    #[test]
    fn date_keeps_microseconds() {
        let date = Utc.with_ymd_and_hms(2024, 3, 17, 8, 30, 5).unwrap()
            + chrono::Duration::microseconds(123_456);
        let wire = date.to_wire();
        assert_eq!(wire["iso"], "2024-03-17T08:30:05.123456Z");
        assert_eq!(DateTime::<Utc>::from_wire(&wire).unwrap(), date);
    }

    #[test]
    fn date_offsets_are_normalized() {
        let parsed = parse_iso("2024-03-17T10:30:05.000+02:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 17, 8, 30, 5).unwrap());
        assert_eq!(parse_iso("2024-03-17T08:30:05.5").unwrap().timestamp_subsec_millis(), 500);
    }

    #[test]
    fn malformed_date_is_a_parse_error() {
        let mut fields = tagged("Date");
        fields.insert("iso".into(), json!("yesterday"));
        assert!(matches!(DateTime::<Utc>::from_wire(&fields), Err(DocumentError::Parse(_))));
    }

    #[test]
    fn bytes_are_base64() {
        let wire = Bytes::from(b"hello".as_slice()).to_wire();
        assert_eq!(wire["base64"], "aGVsbG8=");

        let mut broken = tagged("Bytes");
        broken.insert("base64".into(), json!("not base64!"));
        assert!(matches!(Bytes::from_wire(&broken), Err(DocumentError::Parse(_))));
        assert!(matches!(Bytes::from_wire(&tagged("Bytes")), Err(DocumentError::Parse(_))));
    }

    #[test]
    fn file_url_is_read_only() {
        let mut fields = tagged("File");
        fields.insert("name".into(), json!("a.txt"));
        fields.insert("url".into(), json!("http://files.example/a.txt"));

        let file = File::from_wire(&fields).unwrap();
        assert_eq!(file.url(), Some("http://files.example/a.txt"));
        assert_eq!(file.absolute_url("https://api.example/1/"), "https://api.example/1/files/a.txt");
        assert!(!file.to_wire().contains_key("url"));
    }
}
