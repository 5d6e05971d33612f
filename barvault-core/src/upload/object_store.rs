//! Object storage seam: an S3-compatible bucket (Cloudflare R2) or memory.

use crate::config::R2Config;
use crate::error::DataError;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

pub trait ObjectStore {
    fn bucket(&self) -> &str;

    /// Store `body` under `key` in one put, replacing any existing object.
    fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), DataError>;
}

/// R2 through the AWS S3 SDK.
///
/// The SDK is async; calls are driven on a private current-thread runtime so
/// callers stay blocking.
pub struct R2ObjectStore {
    client: Client,
    bucket: String,
    runtime: tokio::runtime::Runtime,
}

impl R2ObjectStore {
    pub fn new(config: &R2Config) -> Result<Self, DataError> {
        let endpoint = config
            .endpoint_url
            .clone()
            .ok_or_else(|| DataError::Config("R2 endpoint URL is not set".into()))?;
        let access_key = config
            .access_key_id
            .clone()
            .ok_or_else(|| DataError::Config("R2 access key id is not set".into()))?;
        let secret_key = config
            .secret_access_key
            .clone()
            .ok_or_else(|| DataError::Config("R2 secret access key is not set".into()))?;

        let credentials = Credentials::new(access_key, secret_key, None, None, "barvault-r2");
        let s3_config = aws_sdk_s3::Config::builder()
            .endpoint_url(endpoint)
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .behavior_version(BehaviorVersion::latest())
            .force_path_style(true)
            .build();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
            runtime,
        })
    }
}

impl ObjectStore for R2ObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), DataError> {
        let size = body.len();
        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send();
        self.runtime.block_on(request).map_err(|e| {
            let code = e.as_service_error().and_then(|se| se.code());
            put_error(&self.bucket, key, code, DisplayErrorContext(&e).to_string())
        })?;
        tracing::debug!(bucket = %self.bucket, key, size, "object stored");
        Ok(())
    }
}

/// Map an S3 error code to a `DataError`. Credential and bucket problems
/// will not fix themselves on retry; everything else is an upload failure.
fn put_error(bucket: &str, key: &str, code: Option<&str>, detail: String) -> DataError {
    match code {
        Some("AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch") => {
            DataError::AuthenticationRequired(format!("{key}: {detail}"))
        }
        Some("NoSuchBucket") => DataError::Config(format!("bucket {bucket} does not exist")),
        _ => DataError::Upload(format!("{key}: {detail}")),
    }
}

/// In-process bucket with scriptable failures.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    bucket: String,
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    fail_next: Mutex<Vec<String>>,
    fail_keys: Mutex<HashMap<String, String>>,
    fail_always: Mutex<Option<String>>,
    denied: AtomicBool,
    puts: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Self::default()
        }
    }

    /// Fail the next `count` puts with `error`.
    pub fn fail_next(&self, count: usize, error: &str) {
        if let Ok(mut queue) = self.fail_next.lock() {
            queue.extend(std::iter::repeat(error.to_string()).take(count));
        }
    }

    /// Fail every put to `key`.
    pub fn fail_key(&self, key: &str, error: &str) {
        if let Ok(mut keys) = self.fail_keys.lock() {
            keys.insert(key.to_string(), error.to_string());
        }
    }

    /// Fail every put.
    pub fn fail_always(&self, error: &str) {
        if let Ok(mut always) = self.fail_always.lock() {
            *always = Some(error.to_string());
        }
    }

    /// Reject every put as a credentials failure.
    pub fn deny_access(&self) {
        self.denied.store(true, Ordering::SeqCst);
    }

    /// Puts attempted, successful or not.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().ok()?.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn scripted_failure(&self, key: &str) -> Option<String> {
        if let Some(error) = self.fail_always.lock().ok().and_then(|a| a.clone()) {
            return Some(error);
        }
        if let Some(error) = self.fail_keys.lock().ok().and_then(|k| k.get(key).cloned()) {
            return Some(error);
        }
        let mut queue = self.fail_next.lock().ok()?;
        if queue.is_empty() {
            None
        } else {
            Some(queue.remove(0))
        }
    }
}

impl ObjectStore for MemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), DataError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.denied.load(Ordering::SeqCst) {
            return Err(DataError::AuthenticationRequired(format!(
                "access denied for {}/{key}",
                self.bucket
            )));
        }
        if let Some(error) = self.scripted_failure(key) {
            return Err(DataError::Upload(error));
        }
        self.objects
            .lock()
            .map_err(|_| DataError::Other("object map lock poisoned".into()))?
            .insert(key.to_string(), body);
        Ok(())
    }
}
