//! # GeoPackage
//!
//! Reads feature layers out of a GeoPackage and turns them into GeoJSON.
//!
//! A GeoPackage is an SQLite file. Feature layers are listed in
//! `gpkg_contents`, their geometry column in `gpkg_geometry_columns`, and
//! geometries are stored as GeoPackage binary (a small header followed by
//! WKB). Decoding the geometry blobs is left to `geozero`.
//!
//! ## Property mapping
//!
//! - `INTEGER` primary key → feature id
//! - `INTEGER`, `REAL`, `TEXT` → JSON number / string
//! - `NULL` → `null`
//! - other `BLOB` columns are not representable in GeoJSON and are skipped
use std::{
    fs,
    path::{Path, PathBuf},
};

use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue, feature::Id};
use geozero::{ToJson, wkb::GpkgWkb};
use sqlx::{
    Column, ConnectOptions, Row, SqliteConnection, TypeInfo, ValueRef,
    sqlite::{SqliteConnectOptions, SqliteRow},
};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum GpkgError {
    #[error("Cannot open file: {0}")]
    Open(String),

    #[error("Layer '{0}' not found")]
    LayerNotFound(String),

    #[error("GeoPackage contains no feature layers")]
    NoLayers,

    #[error("Layer '{layer}' has no geometry column")]
    NoGeometryColumn { layer: String },

    #[error("Invalid geometry in layer '{layer}': {reason}")]
    Geometry { layer: String, reason: String },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub struct GpkgConverter {
    path: String,
    connection: SqliteConnection,
}

impl GpkgConverter {
    /// Opens `path` read-only and checks that it is a GeoPackage.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, GpkgError> {
        let path = path.as_ref().display().to_string();

        let connection = SqliteConnectOptions::new()
            .filename(&path)
            .read_only(true)
            .create_if_missing(false)
            .connect()
            .await
            .map_err(|e| {
                debug!("sqlite open failed for {path}: {e}");
                GpkgError::Open(path.clone())
            })?;

        let mut converter = Self { path, connection };

        // every GeoPackage has gpkg_contents; a plain SQLite file does not
        sqlx::query("SELECT 1 FROM gpkg_contents LIMIT 1")
            .fetch_optional(&mut converter.connection)
            .await
            .map_err(|_| GpkgError::Open(converter.path.clone()))?;

        Ok(converter)
    }

    pub async fn list_layers(&mut self) -> Result<Vec<String>, GpkgError> {
        let layers = sqlx::query_scalar::<_, String>(
            "SELECT table_name FROM gpkg_contents WHERE data_type = 'features' ORDER BY rowid",
        )
        .fetch_all(&mut self.connection)
        .await?;

        Ok(layers)
    }

    /// Resolves `layer`, defaulting to the first feature layer.
    pub async fn resolve_layer(&mut self, layer: Option<&str>) -> Result<String, GpkgError> {
        let layers = self.list_layers().await?;

        match layer {
            Some(name) => layers
                .into_iter()
                .find(|candidate| candidate == name)
                .ok_or_else(|| GpkgError::LayerNotFound(name.to_string())),
            None => layers.into_iter().next().ok_or(GpkgError::NoLayers),
        }
    }

    pub async fn convert(&mut self, layer: Option<&str>) -> Result<FeatureCollection, GpkgError> {
        let layer = self.resolve_layer(layer).await?;

        let geometry_column = sqlx::query_scalar::<_, String>(
            "SELECT column_name FROM gpkg_geometry_columns WHERE table_name = ?",
        )
        .bind(&layer)
        .fetch_optional(&mut self.connection)
        .await?
        .ok_or_else(|| GpkgError::NoGeometryColumn {
            layer: layer.clone(),
        })?;

        let fid_column = self.primary_key(&layer).await?;

        let rows = sqlx::query(&format!("SELECT * FROM {}", quote_identifier(&layer)))
            .fetch_all(&mut self.connection)
            .await?;

        let features = rows
            .iter()
            .map(|row| read_feature(row, &layer, &geometry_column, fid_column.as_deref()))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            "Converted layer '{layer}' of {}: {} features",
            self.path,
            features.len()
        );

        Ok(FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        })
    }

    async fn primary_key(&mut self, layer: &str) -> Result<Option<String>, GpkgError> {
        let columns = sqlx::query(&format!("PRAGMA table_info({})", quote_identifier(layer)))
            .fetch_all(&mut self.connection)
            .await?;

        for column in columns {
            let pk: i64 = column.try_get("pk")?;
            let kind: String = column.try_get("type")?;

            if pk == 1 && kind.eq_ignore_ascii_case("INTEGER") {
                return Ok(Some(column.try_get("name")?));
            }
        }

        Ok(None)
    }
}

fn read_feature(
    row: &SqliteRow,
    layer: &str,
    geometry_column: &str,
    fid_column: Option<&str>,
) -> Result<Feature, GpkgError> {
    let mut geometry = None;
    let mut id = None;
    let mut properties = JsonObject::new();

    for (index, column) in row.columns().iter().enumerate() {
        let name = column.name();
        let raw = row.try_get_raw(index)?;

        if raw.is_null() {
            if name != geometry_column && Some(name) != fid_column {
                properties.insert(name.to_string(), JsonValue::Null);
            }
            continue;
        }

        let kind = raw.type_info().name().to_ascii_uppercase();

        if name == geometry_column {
            let blob: Vec<u8> = row.try_get(index)?;
            if !is_empty_geometry(&blob) {
                geometry = Some(decode_geometry(blob, layer)?);
            }
            continue;
        }

        if Some(name) == fid_column {
            let fid: i64 = row.try_get(index)?;
            id = Some(Id::Number(fid.into()));
            continue;
        }

        let value = match kind.as_str() {
            "INTEGER" | "BOOLEAN" => JsonValue::from(row.try_get::<i64, _>(index)?),
            "REAL" | "NUMERIC" => JsonValue::from(row.try_get::<f64, _>(index)?),
            "TEXT" | "DATE" | "DATETIME" | "TIME" => {
                JsonValue::from(row.try_get::<String, _>(index)?)
            }
            _ => continue,
        };

        properties.insert(name.to_string(), value);
    }

    Ok(Feature {
        bbox: None,
        geometry,
        id,
        properties: Some(properties),
        foreign_members: None,
    })
}

/// Header flag bit 4 marks an empty geometry, e.g. `POINT EMPTY`.
fn is_empty_geometry(blob: &[u8]) -> bool {
    blob.starts_with(b"GP") && blob.get(3).is_some_and(|flags| flags & 0x10 != 0)
}

fn decode_geometry(blob: Vec<u8>, layer: &str) -> Result<Geometry, GpkgError> {
    let invalid = |reason: String| GpkgError::Geometry {
        layer: layer.to_string(),
        reason,
    };

    let json = GpkgWkb(blob)
        .to_json()
        .map_err(|e| invalid(e.to_string()))?;

    serde_json::from_str(&json).map_err(|e| invalid(e.to_string()))
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Result of [`GpkgConverter::export`].
#[derive(Debug)]
pub struct Export {
    pub layer: String,
    /// `true` when no layer was asked for and the first one was used.
    pub first_layer: bool,
    pub output: PathBuf,
    pub features: usize,
}

impl GpkgConverter {
    /// Converts `layer` and writes it to `output`, or next to the input
    /// file when no output is given.
    pub async fn export(
        &mut self,
        output: Option<&Path>,
        layer: Option<&str>,
    ) -> Result<Export, GpkgError> {
        let resolved = self.resolve_layer(layer).await?;
        let output = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| default_output(Path::new(&self.path)));

        let collection = self.convert(Some(resolved.as_str())).await?;
        write_geojson(&collection, &output)?;

        Ok(Export {
            layer: resolved,
            first_layer: layer.is_none(),
            output,
            features: collection.features.len(),
        })
    }
}

/// `input` with a `.geojson` extension.
pub fn default_output(input: &Path) -> PathBuf {
    input.with_extension("geojson")
}

/// Layer listing printed by `gpkg2geojson --list`.
pub fn layer_listing(layers: &[String]) -> String {
    let mut listing = String::from("Available layers:\n");
    for layer in layers {
        listing.push_str(&format!("  - {layer}\n"));
    }
    listing
}

/// Writes `collection` to `output`, replacing any existing file.
pub fn write_geojson(
    collection: &FeatureCollection,
    output: impl AsRef<Path>,
) -> Result<(), GpkgError> {
    let output = output.as_ref();

    if output.exists() {
        fs::remove_file(output)?;
    }

    fs::write(output, serde_json::to_string(collection)?)?;

    Ok(())
}


#[cfg(test)]
mod tests {
    use geojson::Value;

    use super::*;

    async fn sample() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.gpkg");
        fixtures::write_sample(&path).await;
        (dir, path)
    }

    #[tokio::test]
    async fn test_list_layers() {
        let (_dir, path) = sample().await;
        let mut converter = GpkgConverter::open(&path).await.unwrap();

        assert_eq!(converter.list_layers().await.unwrap(), vec!["measurements", "streets"]);
    }

    #[tokio::test]
    async fn test_convert_first_layer() {
        let (_dir, path) = sample().await;
        let mut converter = GpkgConverter::open(&path).await.unwrap();

        let collection = converter.convert(None).await.unwrap();
        assert_eq!(collection.features.len(), 3);

        let first = &collection.features[0];
        assert_eq!(first.id, Some(Id::Number(1.into())));
        match &first.geometry.as_ref().unwrap().value {
            Value::Point(coordinates) => assert_eq!(coordinates, &vec![16.37, 48.21]),
            other => panic!("expected point, got {other:?}"),
        }

        let properties = first.properties.as_ref().unwrap();
        assert_eq!(properties["intensity"], 0.8);
        assert_eq!(properties["station"], "stephansplatz");
        assert_eq!(properties["humidity"], JsonValue::Null);
        assert!(!properties.contains_key("raw"));
        assert!(!properties.contains_key("fid"));
        assert!(!properties.contains_key("geom"));
    }

    #[tokio::test]
    async fn test_convert_named_layer() {
        let (_dir, path) = sample().await;
        let mut converter = GpkgConverter::open(&path).await.unwrap();

        let collection = converter.convert(Some("streets")).await.unwrap();
        assert_eq!(collection.features.len(), 1);
        assert!(matches!(
            collection.features[0].geometry.as_ref().unwrap().value,
            Value::LineString(_)
        ));
    }

    #[tokio::test]
    async fn test_empty_geometry_is_kept_without_geometry() {
        let (_dir, path) = sample().await;
        fixtures::append_empty_point(&path).await;
        let mut converter = GpkgConverter::open(&path).await.unwrap();

        let collection = converter.convert(Some("measurements")).await.unwrap();
        assert_eq!(collection.features.len(), 4);

        let empty = &collection.features[3];
        assert!(empty.geometry.is_none());
        assert_eq!(empty.properties.as_ref().unwrap()["station"], "offline");

        let extracted = crate::ingest::extract_points(&collection);
        assert_eq!(extracted.points.len(), 3);
        assert_eq!(extracted.skipped, 1);
    }

    #[test]
    fn test_is_empty_geometry() {
        assert!(is_empty_geometry(&fixtures::gpkg_empty_point()));
        assert!(!is_empty_geometry(&fixtures::gpkg_point(1.0, 2.0)));
        assert!(!is_empty_geometry(b"GP"));
    }

    #[tokio::test]
    async fn test_unknown_layer() {
        let (_dir, path) = sample().await;
        let mut converter = GpkgConverter::open(&path).await.unwrap();

        let error = converter.convert(Some("buildings")).await.unwrap_err();
        assert_eq!(error.to_string(), "Layer 'buildings' not found");
    }

    #[tokio::test]
    async fn test_open_rejects_non_geopackage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.gpkg");
        fs::write(&path, b"definitely not sqlite").unwrap();

        assert!(matches!(
            GpkgConverter::open(&path).await,
            Err(GpkgError::Open(_))
        ));
        assert!(matches!(
            GpkgConverter::open(dir.path().join("missing.gpkg")).await,
            Err(GpkgError::Open(_))
        ));
    }

    #[tokio::test]
    async fn test_write_geojson_overwrites() {
        let (dir, path) = sample().await;
        let output = dir.path().join("sample.geojson");
        fs::write(&output, "stale").unwrap();

        let mut converter = GpkgConverter::open(&path).await.unwrap();
        let collection = converter.convert(None).await.unwrap();
        write_geojson(&collection, &output).unwrap();

        let written: FeatureCollection =
            serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(written.features.len(), 3);
    }

    #[tokio::test]
    async fn test_export_defaults() {
        let (dir, path) = sample().await;
        let mut converter = GpkgConverter::open(&path).await.unwrap();

        let export = converter.export(None, None).await.unwrap();
        assert_eq!(export.layer, "measurements");
        assert!(export.first_layer);
        assert_eq!(export.output, dir.path().join("sample.geojson"));
        assert_eq!(export.features, 3);

        let written: FeatureCollection =
            serde_json::from_str(&fs::read_to_string(&export.output).unwrap()).unwrap();
        assert_eq!(written.features.len(), 3);
    }

    #[tokio::test]
    async fn test_export_named_layer_and_output() {
        let (dir, path) = sample().await;
        let output = dir.path().join("ring.json");
        let mut converter = GpkgConverter::open(&path).await.unwrap();

        let export = converter
            .export(Some(output.as_path()), Some("streets"))
            .await
            .unwrap();
        assert_eq!(export.layer, "streets");
        assert!(!export.first_layer);
        assert_eq!(export.output, output);
        assert_eq!(export.features, 1);
        assert!(!dir.path().join("sample.geojson").exists());

        assert!(matches!(
            converter.export(None, Some("buildings")).await,
            Err(GpkgError::LayerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_layer_listing() {
        let (_dir, path) = sample().await;
        let mut converter = GpkgConverter::open(&path).await.unwrap();

        let layers = converter.list_layers().await.unwrap();
        assert_eq!(
            layer_listing(&layers),
            "Available layers:\n  - measurements\n  - streets\n"
        );
    }

    #[test]
    fn test_default_output() {
        assert_eq!(
            default_output(Path::new("data/vienna.gpkg")),
            PathBuf::from("data/vienna.geojson")
        );
        assert_eq!(
            default_output(Path::new("stations")),
            PathBuf::from("stations.geojson")
        );
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }
}
