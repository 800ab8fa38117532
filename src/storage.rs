//! # Object Storage
//!
//! S3-compatible (MinIO) storage for raw uploads.
//!
//! ## Client
//!
//! - One `AmazonS3` store per bucket, path-style requests
//! - Connect timeout 2s, request timeout 8s, no retries: a dead MinIO
//!   surfaces as a 502 right away instead of hanging the request
//! - Plain HTTP is only allowed when the endpoint itself is `http://`
//!
//! `object_store` has no bucket management, so bucket checks and creation
//! are signed SigV4 requests sent through `reqwest`.
use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use futures::TryStreamExt;
use object_store::{
    Attribute, Attributes, ClientOptions, ObjectStore, PutOptions, PutPayload, RetryConfig,
    aws::{AmazonS3Builder, AwsAuthorizer, AwsCredential},
    path::Path,
    signer::Signer,
};
use reqwest::{Client, Method, Request, StatusCode};
use serde::Serialize;
use serde_json::json;
use tokio::{net::TcpStream, time::timeout};
use tracing::{error, info};
use url::Url;

use crate::{
    config::{Config, MinioEndpoint},
    error::{AppError, FieldError},
};

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
pub const DEFAULT_PRESIGN_EXPIRY: u64 = 600;
pub const MAX_PRESIGN_EXPIRY: u64 = 7 * 24 * 60 * 60;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(8);
const PING_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub ok: bool,
    pub endpoint: String,
    pub buckets: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub ok: bool,
    pub bucket: String,
    pub object: String,
    pub size: u64,
    pub etag: Option<String>,
    pub content_type: String,
}

#[derive(Debug, Serialize)]
pub struct PresignedResponse {
    pub ok: bool,
    pub url: String,
    pub expires_in: u64,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub bucket: String,
    pub objects: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub ok: bool,
    pub deleted: String,
    pub bucket: String,
}

/// Bucket-level operations `object_store` does not cover.
#[derive(Debug)]
pub struct BucketAdmin {
    client: Client,
    endpoint: MinioEndpoint,
    credential: AwsCredential,
    region: String,
}

impl BucketAdmin {
    pub fn new(config: &Config, endpoint: MinioEndpoint) -> Result<Self, AppError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::Config(format!("Minio client creation failed: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            credential: AwsCredential {
                key_id: config.minio.root_user.clone(),
                secret_key: config.minio.root_password.clone(),
                token: None,
            },
            region: config.minio.region.clone(),
        })
    }

    fn bucket_url(&self, bucket: &str) -> Result<Url, AppError> {
        Url::parse(&format!("{}/{bucket}", self.endpoint.url))
            .map_err(|e| AppError::Config(format!("Invalid bucket URL for '{bucket}': {e}")))
    }

    async fn send(&self, method: Method, bucket: &str) -> Result<StatusCode, AppError> {
        let mut request = Request::new(method, self.bucket_url(bucket)?);
        AwsAuthorizer::new(&self.credential, "s3", &self.region).authorize(&mut request, None);

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| AppError::bad_gateway(format!("Minio error: {e}")))?;

        Ok(response.status())
    }

    pub async fn bucket_exists(&self, bucket: &str) -> Result<bool, AppError> {
        match self.send(Method::HEAD, bucket).await? {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(AppError::bad_gateway(format!(
                "Minio error: HEAD bucket '{bucket}' returned {status}"
            ))),
        }
    }

    pub async fn ensure_bucket_exists(&self, bucket: &str) -> Result<(), AppError> {
        if self.bucket_exists(bucket).await? {
            info!("Minio Bucket '{bucket}' is available.");
            return Ok(());
        }

        match self.send(Method::PUT, bucket).await? {
            status if status.is_success() => {
                info!("Minio Bucket '{bucket}' created.");
                Ok(())
            }
            status => {
                error!("Minio, failed existing check: PUT bucket '{bucket}' returned {status}");
                Err(AppError::bad_gateway(format!(
                    "Minio error: could not create bucket '{bucket}' ({status})"
                )))
            }
        }
    }
}

pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    signer: Option<Arc<dyn Signer>>,
    admin: Option<BucketAdmin>,
    bucket: String,
    buckets: Vec<String>,
    endpoint: MinioEndpoint,
}

impl ObjectStorage {
    /// Builds the S3 client for the raw bucket of `config`.
    pub fn connect(config: &Config) -> Result<Self, AppError> {
        let endpoint = config.minio_endpoint()?;
        info!("Minio endpoint in use: {}", endpoint.url);

        let options = ClientOptions::new()
            .with_connect_timeout(CONNECT_TIMEOUT)
            .with_timeout(REQUEST_TIMEOUT);

        let s3 = AmazonS3Builder::new()
            .with_endpoint(&endpoint.url)
            .with_region(&config.minio.region)
            .with_bucket_name(&config.minio.bucket_raw)
            .with_access_key_id(&config.minio.root_user)
            .with_secret_access_key(&config.minio.root_password)
            .with_virtual_hosted_style_request(false)
            .with_retry(RetryConfig {
                max_retries: 0,
                ..Default::default()
            })
            .with_client_options(options)
            .with_allow_http(!endpoint.secure)
            .build()
            .map_err(|e| {
                error!("Minio client creation failed: {e}");
                AppError::Config(format!("Minio client creation failed: {e}"))
            })?;

        let s3 = Arc::new(s3);
        let admin = BucketAdmin::new(config, endpoint.clone())?;

        Ok(Self {
            store: s3.clone(),
            signer: Some(s3),
            admin: Some(admin),
            bucket: config.minio.bucket_raw.clone(),
            buckets: vec![
                config.minio.bucket_raw.clone(),
                config.minio.bucket_processed.clone(),
            ],
            endpoint,
        })
    }

    /// Wraps an arbitrary store, e.g. `object_store::memory::InMemory`.
    pub fn from_store(store: Arc<dyn ObjectStore>, bucket: &str, endpoint: MinioEndpoint) -> Self {
        Self {
            store,
            signer: None,
            admin: None,
            bucket: bucket.to_string(),
            buckets: vec![bucket.to_string()],
            endpoint,
        }
    }

    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn endpoint(&self) -> &MinioEndpoint {
        &self.endpoint
    }

    /// Creates every configured bucket that does not exist yet.
    pub async fn ensure_buckets(&self) -> Result<(), AppError> {
        let Some(admin) = &self.admin else {
            return Ok(());
        };

        for bucket in &self.buckets {
            admin.ensure_bucket_exists(bucket).await?;
        }

        Ok(())
    }

    async fn probe_socket(&self) -> Result<(), String> {
        let address = (self.endpoint.host.as_str(), self.endpoint.port);

        match timeout(PING_TIMEOUT, TcpStream::connect(address)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("connection timed out after {PING_TIMEOUT:?}")),
        }
    }

    pub async fn is_reachable(&self) -> bool {
        self.probe_socket().await.is_ok()
    }

    pub async fn ping(&self) -> Result<PingResponse, AppError> {
        let MinioEndpoint {
            url,
            secure,
            host,
            port,
        } = &self.endpoint;
        info!("Minio ping {host}:{port}");

        if let Err(socket_error) = self.probe_socket().await {
            error!("minio socket error: {socket_error}");
            return Err(AppError::BadGateway {
                message: "Minio is not reachable".into(),
                details: json!({
                    "step": "socket",
                    "details": {
                        "configured_endpoint": url,
                        "host": host,
                        "port": port,
                        "secure": secure,
                        "socket_ok": false,
                        "socket_error": socket_error,
                    }
                }),
            });
        }

        let buckets = match &self.admin {
            Some(admin) => {
                let mut available = Vec::new();
                for bucket in &self.buckets {
                    if admin.bucket_exists(bucket).await? {
                        available.push(bucket.clone());
                    }
                }
                available
            }
            None => self.buckets.clone(),
        };

        Ok(PingResponse {
            ok: true,
            endpoint: url.clone(),
            buckets,
        })
    }

    pub async fn upload(
        &self,
        object_name: &str,
        content_type: Option<&str>,
        data: Bytes,
    ) -> Result<UploadResponse, AppError> {
        if data.is_empty() {
            return Err(AppError::BadRequest("Empty file or no file".into()));
        }

        let path = object_path(object_name)?;
        let content_type = content_type
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.clone().into());
        let options = PutOptions {
            attributes,
            ..Default::default()
        };

        let result = self
            .store
            .put_opts(&path, PutPayload::from(data), options)
            .await
            .map_err(minio_error)?;

        // stat the object so a silently dropped write is reported
        let meta = self.store.head(&path).await.map_err(minio_error)?;

        info!("Upload verified: {}/{} size={}", self.bucket, path, meta.size);

        Ok(UploadResponse {
            ok: true,
            bucket: self.bucket.clone(),
            object: path.to_string(),
            size: meta.size as u64,
            etag: result.e_tag.or(meta.e_tag),
            content_type,
        })
    }

    pub async fn presigned_url(
        &self,
        object_name: &str,
        expires_seconds: u64,
    ) -> Result<PresignedResponse, AppError> {
        if expires_seconds == 0 || expires_seconds > MAX_PRESIGN_EXPIRY {
            return Err(AppError::Validation(vec![FieldError::new(
                "expires_seconds",
                format!("must be between 1 and {MAX_PRESIGN_EXPIRY}"),
            )]));
        }

        let path = object_path(object_name)?;
        let signer = self.signer.as_ref().ok_or_else(|| {
            AppError::Internal("Failed to get presigned url: store cannot sign URLs".into())
        })?;

        // signing is local, so check the object exists first
        self.store.head(&path).await.map_err(|e| match e {
            object_store::Error::NotFound { .. } => {
                error!("Minio error for presigned url: {e}");
                AppError::not_found(format!("Object not found / no permission: {e}"))
            }
            e => minio_error(e),
        })?;

        let url = signer
            .signed_url(Method::GET, &path, Duration::from_secs(expires_seconds))
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get presigned url: {e}")))?;

        info!("Created presigned url: {path}");

        Ok(PresignedResponse {
            ok: true,
            url: url.to_string(),
            expires_in: expires_seconds,
        })
    }

    /// Lists objects whose name starts with `prefix` (a plain string prefix,
    /// not only whole path segments).
    pub async fn list(&self, prefix: &str) -> Result<ListResponse, AppError> {
        let directory = prefix.rsplit_once('/').map(|(directory, _)| Path::from(directory));

        let mut objects: Vec<String> = self
            .store
            .list(directory.as_ref())
            .map_ok(|meta| meta.location.to_string())
            .try_filter(|name| futures::future::ready(name.starts_with(prefix)))
            .try_collect()
            .await
            .map_err(minio_error)?;
        objects.sort();

        Ok(ListResponse {
            bucket: self.bucket.clone(),
            objects,
        })
    }

    pub async fn delete(&self, object_name: &str) -> Result<DeleteResponse, AppError> {
        let path = object_path(object_name)?;

        self.store.delete(&path).await.map_err(|e| {
            error!("Minio error while deleting: {e}");
            AppError::not_found(format!("Object not found or access denied: {e}"))
        })?;

        info!("Object deleted: {}/{}", self.bucket, path);

        Ok(DeleteResponse {
            ok: true,
            deleted: path.to_string(),
            bucket: self.bucket.clone(),
        })
    }
}

fn object_path(object_name: &str) -> Result<Path, AppError> {
    if object_name.trim().is_empty() {
        return Err(AppError::Validation(vec![FieldError::new(
            "object_name",
            "must not be empty",
        )]));
    }

    Path::parse(object_name).map_err(|e| {
        AppError::Validation(vec![FieldError::new("object_name", e.to_string())])
    })
}

fn minio_error(e: object_store::Error) -> AppError {
    error!("Minio error: {e}");
    AppError::bad_gateway(format!("Minio error: {e}"))
}
