//! GeoJSON serializer: geometry model ⇄ `FeatureCollection` documents.
//!
//! DESIGN
//! ======
//! Export is strict and canonical: one `Feature` per complete shape,
//! `[longitude, latitude]` positions, closed polygon rings, and the shape's
//! property bag as `properties`.
//!
//! Import is deliberately lenient because stored documents come from several
//! generations of the client. It reads through `serde_json::Value` rather than
//! typed structs so that one bad feature cannot fail the whole parse.
//!
//! ERROR HANDLING
//! ==============
//! Whole-document problems (not JSON, no `features`, `features` that is an
//! undecodable string) are fatal and returned as [`DocumentError`]. Problems
//! with a single feature are logged, recorded in [`ImportReport::skipped`],
//! and the rest of the document still imports.

#[cfg(test)]
#[path = "geojson_test.rs"]
mod geojson_test;

use std::borrow::Cow;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::doc::{Coord, Geometry, GeometryModel, Props, Shape, ShapeKind};
use crate::error::ErrorCode;

const FEATURE_COLLECTION: &str = "FeatureCollection";
const FEATURE: &str = "Feature";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("document is not a JSON object")]
    NotAnObject,
    #[error("document has no `features` field")]
    MissingFeatures,
    #[error("`features` is not an array")]
    FeaturesNotArray,
    #[error("`features` holds undecodable embedded JSON: {0}")]
    EmbeddedJson(#[source] serde_json::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl ErrorCode for DocumentError {
    fn error_code(&self) -> &'static str {
        "E_MALFORMED_DOCUMENT"
    }

    fn user_message(&self) -> String {
        "The map file is damaged and could not be opened.".to_owned()
    }
}

/// Why a single feature was left out of an import.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SkipReason {
    #[error("feature is not an object")]
    NotAnObject,
    #[error("feature has no geometry")]
    MissingGeometry,
    #[error("geometry has no type")]
    MissingType,
    #[error("unsupported geometry type `{0}`")]
    UnsupportedType(String),
    #[error("coordinates do not match the geometry type")]
    BadCoordinates,
    #[error("{kind:?} needs at least {min} points, found {found}")]
    TooFewPoints { kind: ShapeKind, min: usize, found: usize },
}

/// A feature that was dropped during import, with its position in the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFeature {
    pub index: usize,
    pub reason: SkipReason,
}

/// Result of a successful import.
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    /// Reconstructed shapes in document order.
    pub shapes: Vec<Shape>,
    /// Features that could not be reconstructed.
    pub skipped: Vec<SkippedFeature>,
}

/// Canonical `FeatureCollection` produced on export.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub type_field: &'static str,
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub type_field: &'static str,
    pub geometry: GeoJsonGeometry,
    pub properties: Props,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum GeoJsonGeometry {
    Point { coordinates: [f64; 2] },
    LineString { coordinates: Vec<[f64; 2]> },
    Polygon { coordinates: Vec<Vec<[f64; 2]>> },
}

// =============================================================================
// EXPORT
// =============================================================================

/// Build a `FeatureCollection` from the model. Incomplete lines and polygons are left out.
#[must_use]
pub fn export_document(model: &GeometryModel) -> FeatureCollection {
    let features = model
        .iter()
        .filter_map(|shape| {
            if !shape.geometry.is_complete() {
                warn!(id = %shape.id, kind = ?shape.kind(), "not exporting incomplete shape");
                return None;
            }
            Some(Feature { type_field: FEATURE, geometry: export_geometry(&shape.geometry), properties: shape.props.clone() })
        })
        .collect();
    FeatureCollection { type_field: FEATURE_COLLECTION, features }
}

/// Export the model as a JSON value, ready for the file store.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn export_value(model: &GeometryModel) -> Result<Value, DocumentError> {
    Ok(serde_json::to_value(export_document(model))?)
}

/// Export the model as pretty-printed JSON text.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn export_string(model: &GeometryModel) -> Result<String, DocumentError> {
    Ok(serde_json::to_string_pretty(&export_document(model))?)
}

fn export_geometry(geometry: &Geometry) -> GeoJsonGeometry {
    match geometry {
        Geometry::Point(c) => GeoJsonGeometry::Point { coordinates: c.position() },
        Geometry::LineString(points) => {
            GeoJsonGeometry::LineString { coordinates: points.iter().map(|c| c.position()).collect() }
        }
        Geometry::Polygon(ring) => {
            let mut closed: Vec<[f64; 2]> = ring.iter().map(|c| c.position()).collect();
            if let Some(first) = closed.first().copied() {
                closed.push(first);
            }
            GeoJsonGeometry::Polygon { coordinates: vec![closed] }
        }
    }
}

// =============================================================================
// IMPORT
// =============================================================================

/// Parse JSON text and import it.
///
/// # Errors
///
/// Returns an error if the text is not JSON or the document is unusable as a whole.
pub fn import_str(text: &str) -> Result<ImportReport, DocumentError> {
    let value: Value = serde_json::from_str(text)?;
    import_document(&value)
}

/// Import a stored document. Bad features are skipped, not fatal.
///
/// # Errors
///
/// Returns an error if the document has no usable feature sequence.
pub fn import_document(document: &Value) -> Result<ImportReport, DocumentError> {
    let document = decode_embedded(document)?;
    let features = feature_list(&document)?;

    let mut report = ImportReport::default();
    for (index, feature) in features.iter().enumerate() {
        match import_feature(feature) {
            Ok(shape) => report.shapes.push(shape),
            Err(reason) => {
                warn!(index, %reason, "skipping malformed feature");
                report.skipped.push(SkippedFeature { index, reason });
            }
        }
    }
    debug!(shapes = report.shapes.len(), skipped = report.skipped.len(), "imported document");
    Ok(report)
}

/// Decode a value that may have been stored as a JSON-encoded string.
///
/// Non-string values are borrowed unchanged.
///
/// # Errors
///
/// Returns an error if the value is a string that does not hold valid JSON.
pub fn decode_embedded(value: &Value) -> Result<Cow<'_, Value>, serde_json::Error> {
    match value {
        Value::String(text) => Ok(Cow::Owned(serde_json::from_str(text)?)),
        other => Ok(Cow::Borrowed(other)),
    }
}

fn feature_list(document: &Value) -> Result<Vec<Value>, DocumentError> {
    let raw = match document {
        // Legacy saves stored the bare feature array.
        Value::Array(items) => return Ok(items.clone()),
        Value::Object(map) => match map.get("features") {
            None | Some(Value::Null) => return Err(DocumentError::MissingFeatures),
            Some(raw) => raw,
        },
        _ => return Err(DocumentError::NotAnObject),
    };

    let decoded = decode_embedded(raw).map_err(DocumentError::EmbeddedJson)?;
    match decoded.into_owned() {
        Value::Array(items) => Ok(items),
        _ => Err(DocumentError::FeaturesNotArray),
    }
}

fn import_feature(feature: &Value) -> Result<Shape, SkipReason> {
    let feature = feature.as_object().ok_or(SkipReason::NotAnObject)?;
    let geometry = feature
        .get("geometry")
        .and_then(Value::as_object)
        .ok_or(SkipReason::MissingGeometry)?;
    let type_name = geometry.get("type").and_then(Value::as_str).ok_or(SkipReason::MissingType)?;
    let kind = ShapeKind::from_geojson_type(type_name).ok_or_else(|| SkipReason::UnsupportedType(type_name.to_owned()))?;
    let coordinates = geometry.get("coordinates").ok_or(SkipReason::BadCoordinates)?;

    let geometry = match kind {
        ShapeKind::Point => Geometry::Point(parse_position(coordinates).ok_or(SkipReason::BadCoordinates)?),
        ShapeKind::LineString => {
            let points = parse_positions(coordinates).ok_or(SkipReason::BadCoordinates)?;
            require_points(kind, points.len())?;
            Geometry::LineString(points)
        }
        ShapeKind::Polygon => {
            let ring = coordinates
                .as_array()
                .and_then(|rings| rings.first())
                .ok_or(SkipReason::BadCoordinates)?;
            let mut ring = parse_positions(ring).ok_or(SkipReason::BadCoordinates)?;
            if ring.len() > 1 && ring.first() == ring.last() {
                ring.pop();
            }
            require_points(kind, ring.len())?;
            Geometry::Polygon(ring)
        }
    };

    let props = parse_props(feature.get("properties"), kind);
    Ok(Shape::with_props(geometry, props))
}

fn require_points(kind: ShapeKind, found: usize) -> Result<(), SkipReason> {
    let min = kind.min_points();
    if found < min {
        return Err(SkipReason::TooFewPoints { kind, min, found });
    }
    Ok(())
}

/// `[lng, lat]` or `[lng, lat, alt]`; altitude is dropped.
fn parse_position(value: &Value) -> Option<Coord> {
    let items = value.as_array()?;
    if !(2..=3).contains(&items.len()) {
        return None;
    }
    let lng = items[0].as_f64().filter(|v| v.is_finite())?;
    let lat = items[1].as_f64().filter(|v| v.is_finite())?;
    Some(Coord::new(lng, lat))
}

fn parse_positions(value: &Value) -> Option<Vec<Coord>> {
    value.as_array()?.iter().map(parse_position).collect()
}

fn parse_props(raw: Option<&Value>, kind: ShapeKind) -> Props {
    let mut props = Props::named(kind.default_name());
    let Some(raw) = raw else {
        return props;
    };
    let decoded = match decode_embedded(raw) {
        Ok(decoded) => decoded,
        Err(e) => {
            warn!(error = %e, "ignoring undecodable feature properties");
            return props;
        }
    };
    let Some(map) = decoded.as_object() else {
        return props;
    };

    for (key, value) in map {
        match key.as_str() {
            "name" => {
                if let Some(name) = value.as_str().filter(|n| !n.trim().is_empty()) {
                    props.name = name.to_owned();
                }
            }
            "length" if kind == ShapeKind::LineString => props.length = finite_number(value),
            "area" if kind == ShapeKind::Polygon => props.area = finite_number(value),
            // A measurement of another kind is kept verbatim with the other extras.
            _ => {
                props.extra.insert(key.clone(), value.clone());
            }
        }
    }
    props
}

fn finite_number(value: &Value) -> Option<f64> {
    value.as_f64().filter(|v| v.is_finite())
}

