use std::sync::Arc;
use bytes::Bytes;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use object_store::{ClientOptions, ObjectStore, PutPayload, aws::AmazonS3Builder, http::HttpBuilder,
                   local::LocalFileSystem, memory::InMemory, path::Path as ObjectPath};
use url::Url;

/// Cache key for S3 stores that distinguishes between authenticated and anonymous access
#[derive(Hash, Eq, PartialEq, Clone, Debug)]
struct S3CacheKey {
    bucket: String,
    anonymous: bool,
}

/// S3 stores keyed by (bucket, anonymous).
///
/// Building an S3 store resolves credentials (possibly through the instance
/// metadata service), so a process that re-fetches after a failed episode
/// reuses the store it already has.
static S3_STORE_CACHE: Lazy<DashMap<S3CacheKey, Arc<dyn ObjectStore>>> =
    Lazy::new(DashMap::new);

/// HTTP stores keyed by origin (`scheme://host[:port]`).
static HTTP_STORE_CACHE: Lazy<DashMap<String, Arc<dyn ObjectStore>>> =
    Lazy::new(DashMap::new);

/// Process-wide store behind every `memory://` URI.
static MEMORY_STORE: Lazy<Arc<InMemory>> = Lazy::new(|| Arc::new(InMemory::new()));

/// Gets or creates a cached S3 store for the given bucket.
///
/// # Arguments
///
/// * `bucket` - S3 bucket name (without "s3://" prefix)
/// * `anonymous` - If true, uses unsigned requests (for public buckets)
pub fn get_cached_s3_store(
    bucket: &str,
    anonymous: bool
) -> Result<Arc<dyn ObjectStore>, Box<dyn std::error::Error + Send + Sync>> {
    let cache_key = S3CacheKey {
        bucket: bucket.to_string(),
        anonymous,
    };
    let store = S3_STORE_CACHE
        .entry(cache_key)
        .or_try_insert_with(|| create_s3_store(bucket, anonymous))?;
    Ok(Arc::clone(store.value()))
}

/// Creates an S3 store using the AWS credential chain from the environment.
///
/// With `anonymous` set, request signing is skipped so public buckets can be
/// read without credentials.
pub fn create_s3_store(
    bucket: &str,
    anonymous: bool
) -> Result<Arc<dyn ObjectStore>, Box<dyn std::error::Error + Send + Sync>> {
    let mut builder = AmazonS3Builder::from_env()
        .with_bucket_name(bucket);

    if anonymous {
        builder = builder.with_skip_signature(true);
    }

    Ok(Arc::new(builder.build()?))
}

/// Gets or creates a cached HTTP(S) store rooted at `url`'s origin.
///
/// Plain `http://` origins are allowed explicitly; `object_store` refuses
/// them by default.
pub fn get_cached_http_store(
    url: &Url,
) -> Result<Arc<dyn ObjectStore>, Box<dyn std::error::Error + Send + Sync>> {
    let origin = url.origin().ascii_serialization();
    let store = HTTP_STORE_CACHE.entry(origin.clone()).or_try_insert_with(|| {
        let options = ClientOptions::new().with_allow_http(url.scheme() == "http");
        let store = HttpBuilder::new()
            .with_url(origin.as_str())
            .with_client_options(options)
            .build()?;
        Ok::<Arc<dyn ObjectStore>, Box<dyn std::error::Error + Send + Sync>>(Arc::new(store))
    })?;
    Ok(Arc::clone(store.value()))
}

/// Registers `bytes` under a `memory://` URI so it can be used as a dataset
/// origin or a local path without touching the network or disk.
pub async fn register_memory_file(
    uri: &str,
    bytes: Bytes,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let key = uri.strip_prefix("memory://")
        .ok_or_else(|| format!("not a memory:// uri: {}", uri))?;
    MEMORY_STORE.put(&ObjectPath::from(key), PutPayload::from(bytes)).await?;
    Ok(())
}

/// Resolves a URI or path into an `ObjectStore` plus the object's path inside it.
///
/// # Supported Forms
///
/// * `https://host/path/file.parquet` and `http://...` - HTTP GET against the origin (cached per origin)
/// * `s3://bucket/key` or `s3://bucket/key?anon=true` - AWS S3 (cached per bucket and signing mode)
/// * `memory://name` - the process-wide in-memory store
/// * anything else - a local filesystem path, absolute or relative to the working directory
///
/// # Errors
///
/// Returns an error if the URI is malformed, the S3 URI has no bucket, or the
/// store cannot be constructed.
pub async fn get_object_store(
    file_path: &str,
) -> Result<(Arc<dyn ObjectStore>, ObjectPath), Box<dyn std::error::Error + Send + Sync>> {
    if file_path.starts_with("http://") || file_path.starts_with("https://") {
        let url = Url::parse(file_path)?;
        let store = get_cached_http_store(&url)?;
        let path = ObjectPath::from_url_path(url.path())?;
        Ok((store, path))
    } else if file_path.starts_with("s3://") {
        let url = Url::parse(file_path)?;
        let bucket = url.host_str()
            .ok_or("Invalid S3 URL - no bucket specified")?;
        let key = url.path().trim_start_matches('/');

        let anonymous = url.query_pairs()
            .any(|(k, v)| k == "anon" && (v == "true" || v == "1"));

        let store = get_cached_s3_store(bucket, anonymous)?;
        Ok((store, ObjectPath::from(key)))
    } else if let Some(key) = file_path.strip_prefix("memory://") {
        let store: Arc<dyn ObjectStore> = Arc::<InMemory>::clone(&MEMORY_STORE);
        Ok((store, ObjectPath::from(key)))
    } else {
        local_object_store(file_path)
    }
}

fn local_object_store(
    file_path: &str,
) -> Result<(Arc<dyn ObjectStore>, ObjectPath), Box<dyn std::error::Error + Send + Sync>> {
    use std::path::Path as StdPath;

    let std_path = StdPath::new(file_path);
    let absolute_path = if std_path.is_absolute() {
        std_path.to_path_buf()
    } else {
        std::env::current_dir()?.join(std_path)
    };

    #[cfg(windows)]
    let (root, relative) = {
        let path_str = absolute_path.to_string_lossy();
        let pos = path_str.find(":\\").ok_or("Invalid Windows path")?;
        let root = format!("{}:\\", &path_str[..pos]);
        let relative = path_str[pos + 2..].trim_start_matches('\\').replace('\\', "/");
        (root, relative)
    };

    #[cfg(not(windows))]
    let (root, relative) = {
        let path_str = absolute_path.to_string_lossy();
        ("/".to_string(), path_str.trim_start_matches('/').to_string())
    };

    let store: Arc<dyn ObjectStore> = Arc::new(LocalFileSystem::new_with_prefix(root)?);
    Ok((store, ObjectPath::from(relative)))
}
