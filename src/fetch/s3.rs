//! S3 backend
//!
//! Fetches objects with the instance's IAM credentials when they can be
//! resolved, falling back to anonymous access when the role request
//! fails. The bucket's region is discovered up front so the request is
//! issued against the right partition and region.

use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::SdkError;
use tokio::fs;
use tracing::debug;
use url::Url;

use crate::error::IgnitionError;
use crate::fetch::Fetcher;

const DEFAULT_REGION_HINT: &str = "us-east-1";

/// Fetch the object named by an `s3://bucket/key?versionId=...` URL into
/// `dest`. The destination is written whole; hashing happens afterwards
/// in the dispatcher because chunked downloads preclude in-stream hashing.
pub(crate) async fn fetch(
    fetcher: &Fetcher,
    url: &Url,
    dest: &mut fs::File,
) -> Result<(), IgnitionError> {
    let bucket = url
        .host_str()
        .ok_or_else(|| IgnitionError::failed(format!("s3 URL has no bucket: {url}")))?
        .to_string();
    let key = url.path().trim_start_matches('/').to_string();
    let version_id = url
        .query_pairs()
        .find(|(name, _)| name == "versionId")
        .map(|(_, value)| value.into_owned());

    let hint = fetcher
        .s3_region_hint
        .clone()
        .unwrap_or_else(|| DEFAULT_REGION_HINT.to_string());
    let region = bucket_region(fetcher, &bucket, &hint).await?;
    debug!("bucket {:?} is in region {:?}", bucket, region);

    let shared = fetcher.aws_config().await;
    let config = aws_sdk_s3::config::Builder::from(shared)
        .region(Region::new(region.clone()))
        .build();
    let client = aws_sdk_s3::Client::from_conf(config);

    match get_object(&client, &bucket, &key, version_id.as_deref(), fetcher, dest).await {
        Ok(()) => Ok(()),
        // Credential resolution failed (no instance role); retry the
        // request anonymously before giving up.
        Err(err) if credentials_failure(&err) => {
            debug!("instance credentials unavailable, retrying anonymously");
            let anon = aws_config::defaults(aws_config::BehaviorVersion::latest())
                .no_credentials()
                .region(Region::new(region))
                .load()
                .await;
            let client = aws_sdk_s3::Client::new(&anon);
            get_object(&client, &bucket, &key, version_id.as_deref(), fetcher, dest)
                .await
                .map_err(|e| IgnitionError::failed(e.to_string()))
        }
        Err(err) => Err(IgnitionError::failed(err.to_string())),
    }
}

enum GetError {
    Sdk(SdkError<aws_sdk_s3::operation::get_object::GetObjectError>),
    Io(std::io::Error),
    Timeout,
}

impl std::fmt::Display for GetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sdk(e) => write!(f, "s3 GetObject failed: {e}"),
            Self::Io(e) => write!(f, "writing s3 object failed: {e}"),
            Self::Timeout => write!(f, "s3 transfer timed out"),
        }
    }
}

fn credentials_failure(err: &GetError) -> bool {
    matches!(
        err,
        GetError::Sdk(SdkError::ConstructionFailure(_)) | GetError::Sdk(SdkError::DispatchFailure(_))
    )
}

async fn get_object(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
    version_id: Option<&str>,
    fetcher: &Fetcher,
    dest: &mut fs::File,
) -> Result<(), GetError> {
    let mut request = client.get_object().bucket(bucket).key(key);
    if let Some(version_id) = version_id {
        request = request.version_id(version_id);
    }

    let transfer = async {
        let output = request.send().await.map_err(GetError::Sdk)?;
        let mut body = output.body.into_async_read();
        tokio::io::copy(&mut body, dest).await.map_err(GetError::Io)?;
        Ok(())
    };
    tokio::time::timeout(fetcher.timeout(), transfer)
        .await
        .map_err(|_| GetError::Timeout)?
}

/// Discover the region a bucket lives in via a HEAD against the hinted
/// regional endpoint; S3 names the owning region in a response header
/// regardless of the status code.
async fn bucket_region(
    fetcher: &Fetcher,
    bucket: &str,
    hint: &str,
) -> Result<String, IgnitionError> {
    let client = reqwest::Client::builder()
        .timeout(fetcher.timeout())
        .build()?;
    let endpoint = format!("https://{bucket}.s3.{hint}.amazonaws.com/");
    let response = client.head(&endpoint).send().await?;
    response
        .headers()
        .get("x-amz-bucket-region")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .ok_or_else(|| {
            IgnitionError::failed(format!("couldn't determine the region for bucket {bucket:?}"))
        })
}
