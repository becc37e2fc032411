use super::{Result, SyncError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// JSON field names as they appear on the wire and in patches.
pub mod fields {
    pub const ID: &str = "id";
    pub const NAME: &str = "name";
    pub const STATUS: &str = "status";
    pub const NOTES: &str = "notes";
    pub const GEOMETRY: &str = "geometry";
    pub const ACRES: &str = "acres";
    pub const SIZE: &str = "size";
    pub const SUBMARKET: &str = "submarket";
    pub const CONTACT_NAME: &str = "contactName";
    pub const CONTACT_EMAIL: &str = "contactEmail";
    pub const CONTACT_PHONE: &str = "contactPhone";
    pub const CONTACT_COMPANY: &str = "contactCompany";
    pub const FOLLOW_UP_TIMEFRAME: &str = "followUpTimeframe";
    pub const FOLLOW_UP_DATE: &str = "followUpDate";
    pub const CREATED_AT: &str = "createdAt";
    pub const UPDATED_AT: &str = "updatedAt";
}

pub const DEFAULT_STATUS: &str = "prospect";

// ============================================================================
// Identifiers
// ============================================================================

/// Stable opaque prospect identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProspectId(String);

impl ProspectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Locally generated id used when no server assigns one.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ProspectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProspectId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ProspectId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identifier of a grouping parent (e.g. a workspace or listing).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParentId(String);

impl ParentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// ============================================================================
// Geometry
// ============================================================================

/// A `[lng, lat]` pair, serialized in GeoJSON order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Coordinate {
    pub lng: f64,
    pub lat: f64,
}

impl Coordinate {
    pub const fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }
}

impl From<[f64; 2]> for Coordinate {
    fn from([lng, lat]: [f64; 2]) -> Self {
        Self { lng, lat }
    }
}

impl From<Coordinate> for [f64; 2] {
    fn from(value: Coordinate) -> Self {
        [value.lng, value.lat]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Coordinate),
    /// Rings of `[lng, lat]` pairs; the first ring is the outer boundary.
    Polygon(Vec<Vec<Coordinate>>),
}

impl Geometry {
    pub const fn point(lng: f64, lat: f64) -> Self {
        Self::Point(Coordinate::new(lng, lat))
    }

    /// Builds a single-ring polygon, closing the ring if it is open.
    pub fn polygon(ring: Vec<Coordinate>) -> Self {
        Self::Polygon(vec![close_ring(ring)])
    }

    pub fn outer_ring(&self) -> Option<&[Coordinate]> {
        match self {
            Self::Point(_) => None,
            Self::Polygon(rings) => rings.first().map(Vec::as_slice),
        }
    }
}

/// Appends the first vertex when the ring does not already end on it.
pub fn close_ring(mut ring: Vec<Coordinate>) -> Vec<Coordinate> {
    if let (Some(first), Some(last)) = (ring.first().copied(), ring.last().copied()) {
        if ring.len() > 1 && first != last {
            ring.push(first);
        }
    }
    ring
}

// ============================================================================
// Prospect
// ============================================================================

fn default_status() -> String {
    DEFAULT_STATUS.to_string()
}

/// A map-attached prospect record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prospect {
    pub id: ProspectId,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Geometry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acres: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submarket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_timeframe: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Fields this crate does not model; carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Prospect {
    pub fn new(id: impl Into<ProspectId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: default_status(),
            notes: None,
            geometry: None,
            contact_name: None,
            contact_email: None,
            contact_phone: None,
            contact_company: None,
            size: None,
            acres: None,
            submarket: None,
            follow_up_timeframe: None,
            follow_up_date: None,
            created_at: None,
            updated_at: None,
            extra: Map::new(),
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    /// Builds a prospect from a JSON payload plus an id.
    pub fn from_payload(id: ProspectId, payload: &FieldPatch) -> Result<Self> {
        let mut object = payload.as_map().clone();
        object.insert(fields::ID.to_string(), Value::String(id.into_string()));
        Ok(serde_json::from_value(Value::Object(object))?)
    }

    /// Current value of a top-level field, `Value::Null` when absent.
    pub fn field(&self, field: &str) -> Result<Value> {
        let value = serde_json::to_value(self)?;
        Ok(value.get(field).cloned().unwrap_or(Value::Null))
    }

    /// Returns a copy with the patch merged in; `null` clears a field.
    pub fn apply_patch(&self, patch: &FieldPatch) -> Result<Self> {
        if patch.is_empty() {
            return Ok(self.clone());
        }

        let Value::Object(mut object) = serde_json::to_value(self)? else {
            return Err(SyncError::InvalidPatch(
                "prospect did not serialize to an object".to_string(),
            ));
        };

        for (field, value) in patch.iter() {
            if field == fields::ID {
                return Err(SyncError::InvalidPatch("'id' cannot be patched".to_string()));
            }
            if value.is_null() {
                object.remove(field);
            } else {
                object.insert(field.clone(), value.clone());
            }
        }

        serde_json::from_value(Value::Object(object))
            .map_err(|err| SyncError::InvalidPatch(format!("patch does not fit prospect: {}", err)))
    }
}

// ============================================================================
// Field patch
// ============================================================================

/// Insertion-ordered partial update, `field name -> new value`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldPatch(Map<String, Value>);

impl FieldPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut patch = Self::new();
        for (field, value) in pairs {
            patch.set(field, value);
        }
        patch
    }

    /// Last write wins per field.
    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    pub fn with(mut self, field: impl Into<String>, value: Value) -> Self {
        self.set(field, value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    pub fn merge(&mut self, other: FieldPatch) {
        for (field, value) in other.0 {
            self.0.insert(field, value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn field_names(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for FieldPatch {
    fn from(value: Map<String, Value>) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_geometry_geojson_shape() {
        let point = Geometry::point(-97.74, 30.27);
        assert_eq!(
            serde_json::to_value(&point).unwrap(),
            json!({"type": "Point", "coordinates": [-97.74, 30.27]})
        );

        let polygon = Geometry::polygon(vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(1.0, 0.0),
            Coordinate::new(1.0, 1.0),
        ]);
        let ring = polygon.outer_ring().unwrap();
        assert_eq!(ring.len(), 4);
        assert_eq!(ring.first(), ring.last());

        let decoded: Geometry = serde_json::from_value(json!({
            "type": "Polygon",
            "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]
        }))
        .unwrap();
        assert_eq!(decoded, polygon);
    }

    #[test]
    fn test_apply_patch_merges_and_clears() {
        let mut prospect = Prospect::new("p1", "Old name");
        prospect.notes = Some("call back".to_string());

        let patch = FieldPatch::new()
            .with(fields::NAME, json!("123 Main St"))
            .with(fields::NOTES, Value::Null)
            .with(fields::ACRES, json!(2.5));
        let updated = prospect.apply_patch(&patch).unwrap();

        assert_eq!(updated.name, "123 Main St");
        assert_eq!(updated.notes, None);
        assert_eq!(updated.acres, Some(2.5));
        assert_eq!(prospect.name, "Old name");
    }

    #[test]
    fn test_apply_patch_rejects_id_and_bad_types() {
        let prospect = Prospect::new("p1", "Acme");
        let err = prospect
            .apply_patch(&FieldPatch::new().with(fields::ID, json!("p2")))
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidPatch(_)));

        let err = prospect
            .apply_patch(&FieldPatch::new().with(fields::ACRES, json!("lots")))
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidPatch(_)));
    }

    #[test]
    fn test_unknown_fields_round_trip() {
        let raw = json!({"id": "p9", "name": "Depot", "status": "listing", "xpAwarded": 15});
        let prospect: Prospect = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(prospect.extra.get("xpAwarded"), Some(&json!(15)));
        assert_eq!(serde_json::to_value(&prospect).unwrap(), raw);
    }

    #[test]
    fn test_patch_last_write_wins() {
        let mut patch = FieldPatch::new();
        patch.set(fields::NAME, json!("1"));
        patch.set(fields::STATUS, json!("contacted"));
        patch.set(fields::NAME, json!("12"));
        assert_eq!(patch.len(), 2);
        assert_eq!(patch.get(fields::NAME), Some(&json!("12")));
        assert_eq!(patch.field_names(), vec!["name", "status"]);
    }
}
