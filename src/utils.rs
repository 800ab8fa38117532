//! Extractors whose rejections use the JSON error envelope.
use axum::{
    Json,
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Multipart, Path, Query},
};

use crate::error::AppError;

#[derive(FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(AppError))]
pub struct AppQuery<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(Path), rejection(AppError))]
pub struct AppPath<T>(pub T);

#[derive(FromRequest)]
#[from_request(rejection(AppError))]
pub struct AppMultipart(pub Multipart);

/// A file taken from a multipart body.
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Reads the first multipart field named `field`, skipping the others.
pub async fn read_file_field(
    multipart: &mut Multipart,
    field: &str,
) -> Result<Option<UploadedFile>, AppError> {
    while let Some(part) = multipart.next_field().await? {
        if part.name() != Some(field) {
            continue;
        }

        let filename = part.file_name().unwrap_or_default().to_string();
        let content_type = part.content_type().map(str::to_string);
        let data = part.bytes().await?;

        return Ok(Some(UploadedFile {
            filename,
            content_type,
            data,
        }));
    }

    Ok(None)
}

/// `true` when `filename` has a `.gpkg` extension, ignoring case.
pub fn is_gpkg_filename(filename: &str) -> bool {
    filename.to_ascii_lowercase().ends_with(".gpkg")
}

/// Dataset name derived from an uploaded file name.
pub fn dataset_name(filename: &str, max_len: usize) -> String {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let stem = if is_gpkg_filename(name) {
        &name[..name.len() - ".gpkg".len()]
    } else {
        name
    };

    stem.chars().take(max_len).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpkg_filename() {
        assert!(is_gpkg_filename("vienna.gpkg"));
        assert!(is_gpkg_filename("VIENNA.GPKG"));
        assert!(!is_gpkg_filename("vienna.geojson"));
        assert!(!is_gpkg_filename("gpkg"));
    }

    #[test]
    fn test_dataset_name() {
        assert_eq!(dataset_name("uploads/vienna_2024.gpkg", 200), "vienna_2024");
        assert_eq!(dataset_name("C:\\data\\Graz.GPKG", 200), "Graz");
        assert_eq!(dataset_name("abcdef.gpkg", 3), "abc");
    }
}
