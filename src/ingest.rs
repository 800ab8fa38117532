//! Turns converted GeoPackage features into heat points.
use geojson::{FeatureCollection, JsonObject, JsonValue, Value};
use tracing::debug;

use crate::models::{Bounds, HeatmapPointCreate};

pub const DEFAULT_INTENSITY: f64 = 0.5;

const KNOWN_PROPERTIES: [&str; 3] = ["intensity", "temperature", "humidity"];

#[derive(Debug, Default)]
pub struct Extracted {
    pub points: Vec<HeatmapPointCreate>,
    pub skipped: usize,
    /// Envelope of the accepted points.
    pub extent: Option<Bounds>,
}

pub fn extract_points(collection: &FeatureCollection) -> Extracted {
    let mut extracted = Extracted::default();

    for (index, feature) in collection.features.iter().enumerate() {
        let coordinates = match feature.geometry.as_ref().map(|g| &g.value) {
            Some(Value::Point(coordinates)) if coordinates.len() >= 2 => coordinates,
            _ => {
                debug!("Skipping feature {index}: not a point");
                extracted.skipped += 1;
                continue;
            }
        };

        let empty = JsonObject::new();
        let properties = feature.properties.as_ref().unwrap_or(&empty);

        let point = HeatmapPointCreate {
            latitude: coordinates[1],
            longitude: coordinates[0],
            intensity: number(properties, "intensity")
                .unwrap_or(DEFAULT_INTENSITY)
                .clamp(0.0, 1.0),
            temperature: number(properties, "temperature"),
            humidity: number(properties, "humidity"),
            source: None,
            meta_data: extra_properties(properties),
        };

        if let Err(e) = point.validate() {
            debug!("Skipping feature {index}: {e}");
            extracted.skipped += 1;
            continue;
        }

        extracted.extent = Some(grow(extracted.extent, &point));
        extracted.points.push(point);
    }

    extracted
}

fn number(properties: &JsonObject, key: &str) -> Option<f64> {
    match properties.get(key)? {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn extra_properties(properties: &JsonObject) -> Option<String> {
    let extra: JsonObject = properties
        .iter()
        .filter(|(key, _)| !KNOWN_PROPERTIES.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    if extra.is_empty() {
        None
    } else {
        Some(JsonValue::Object(extra).to_string())
    }
}

fn grow(extent: Option<Bounds>, point: &HeatmapPointCreate) -> Bounds {
    match extent {
        None => Bounds {
            min_lat: point.latitude,
            max_lat: point.latitude,
            min_lon: point.longitude,
            max_lon: point.longitude,
        },
        Some(b) => Bounds {
            min_lat: b.min_lat.min(point.latitude),
            max_lat: b.max_lat.max(point.latitude),
            min_lon: b.min_lon.min(point.longitude),
            max_lon: b.max_lon.max(point.longitude),
        },
    }
}
