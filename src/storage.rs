use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::presigning::PresigningConfig;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// How long a receipt upload URL stays valid.
const UPLOAD_URL_TTL: Duration = Duration::from_secs(600);

// 1. StorageService Contract
/// StorageService
///
/// Contract for the object store holding expense receipt images. The real S3
/// client and the in-memory mock are interchangeable behind it.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Creates the configured bucket if missing. Only called for local
    /// S3-compatible endpoints.
    async fn ensure_bucket_exists(&self);

    /// Generates a temporary signed URL allowing a client to PUT one object
    /// directly into the bucket.
    ///
    /// # Arguments
    /// * `key`: The object key in the bucket.
    /// * `content_type`: The MIME type the upload must declare.
    async fn get_presigned_upload_url(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, String>;
}

// 2. The Real Implementation (S3)
/// S3StorageClient
///
/// Uses the default AWS credential chain. With an explicit endpoint (MinIO,
/// LocalStack) path-style addressing is forced.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
}

impl S3StorageClient {
    pub async fn new(region: &str, endpoint: Option<&str>, bucket: &str) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(s3::config::Region::new(region.to_string()))
            .load()
            .await;

        let mut builder = s3::config::Builder::from(&sdk_config);
        if let Some(url) = endpoint {
            builder = builder.endpoint_url(url).force_path_style(true);
        }

        Self {
            client: s3::Client::from_conf(builder.build()),
            bucket_name: bucket.to_string(),
        }
    }

    pub fn from_client(client: s3::Client, bucket: &str) -> Self {
        Self {
            client,
            bucket_name: bucket.to_string(),
        }
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    async fn ensure_bucket_exists(&self) {
        // CreateBucket on an existing bucket fails harmlessly.
        if let Err(e) = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
        {
            tracing::debug!(bucket = %self.bucket_name, error = %e, "create_bucket skipped");
        }
    }

    async fn get_presigned_upload_url(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, String> {
        let presigning = PresigningConfig::expires_in(UPLOAD_URL_TTL).map_err(|e| e.to_string())?;

        let presigned_req = self
            .client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            // The upload must declare exactly this Content-Type.
            .content_type(content_type)
            .presigned(presigning)
            .await
            .map_err(|e| e.to_string())?;

        Ok(presigned_req.uri().to_string())
    }
}

/// sanitize_key
///
/// Removes empty, `.` and `..` segments from a user-provided key fragment.
pub fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// receipt_key
///
/// Object key for a new receipt of `group_id`: `receipts/<group>/<uuid>[.<ext>]`,
/// keeping only an alphanumeric extension from `filename`.
pub fn receipt_key(group_id: &str, filename: &str) -> String {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()));

    let group = sanitize_key(group_id).replace('/', "-");
    match extension {
        Some(ext) => format!("receipts/{group}/{}.{ext}", Uuid::new_v4()),
        None => format!("receipts/{group}/{}", Uuid::new_v4()),
    }
}

// 3. The Mock Implementation (For Tests and Local Runs)
/// MockStorageService
///
/// Returns deterministic local-style URLs, or fails when asked to.
#[derive(Clone)]
pub struct MockStorageService {
    /// When true, all operations return a simulated failure.
    pub should_fail: bool,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self { should_fail: false }
    }

    pub fn new_failing() -> Self {
        Self { should_fail: true }
    }
}

impl Default for MockStorageService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) {}

    async fn get_presigned_upload_url(
        &self,
        key: &str,
        _content_type: &str,
    ) -> Result<String, String> {
        if self.should_fail {
            return Err("Mock Storage Error: Simulation requested".to_string());
        }

        Ok(format!(
            "http://localhost:9000/mock-bucket/{}?signature=fake",
            sanitize_key(key)
        ))
    }
}

/// StorageState
///
/// Shared handle to the storage service held in the application state.
pub type StorageState = Arc<dyn StorageService>;
