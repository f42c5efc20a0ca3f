//! Resource fetching
//!
//! URL-to-bytes retrieval for configuration and file contents. The
//! fetcher dispatches on the URL scheme, streams the bytes through an
//! optional gzip decompressor, and verifies an optional hash over the
//! decompressed stream before the caller may trust the destination.

pub mod http;
pub mod oem;
pub mod s3;
pub mod tftp;

use std::io::SeekFrom;
use std::time::Duration;

use async_compression::tokio::bufread::GzipDecoder;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use percent_encoding::percent_decode_str;
use sha2::{Digest, Sha256, Sha512};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};
use tracing::debug;
use url::Url;

use crate::config::{Config, HttpHeader, Resource};
use crate::error::IgnitionError;
use http::HttpClient;
use oem::OemMount;

/// Default duration for which to wait for a config.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(120);

/// HTTP headers used when the provisioning config itself is fetched.
pub fn config_headers() -> Vec<HttpHeader> {
    vec![
        HttpHeader {
            name: "Accept-Encoding".to_string(),
            value: "identity".to_string(),
        },
        HttpHeader {
            name: "Accept".to_string(),
            value: "application/vnd.coreos.ignition+json; version=2.2.0, \
                    application/vnd.coreos.ignition+json; version=1; q=0.5, */*; q=0.1"
                .to_string(),
        },
    ]
}

/// Supported stream compressions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Compression {
    #[default]
    None,
    Gzip,
}

impl Compression {
    pub fn parse(value: Option<&str>) -> Result<Self, IgnitionError> {
        match value {
            None | Some("") => Ok(Self::None),
            Some("gzip") => Ok(Self::Gzip),
            Some(other) => Err(IgnitionError::CompressionInvalid(other.to_string())),
        }
    }
}

/// Supported hash algorithms for fetch verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Sha512,
}

enum Hasher {
    Sha256(Sha256),
    Sha512(Sha512),
}

impl Hasher {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            HashAlgorithm::Sha512 => Self::Sha512(Sha512::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
        }
    }

    fn finalize(self) -> Vec<u8> {
        match self {
            Self::Sha256(h) => h.finalize().to_vec(),
            Self::Sha512(h) => h.finalize().to_vec(),
        }
    }
}

/// A parsed verification hash: the algorithm plus the expected digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashSpec {
    pub algorithm: HashAlgorithm,
    pub expected: Vec<u8>,
}

impl HashSpec {
    /// Parse a `<algorithm>-<hex digest>` verification string.
    pub fn parse(hash: &str) -> Result<Self, IgnitionError> {
        let (alg, digest) = hash
            .split_once('-')
            .ok_or_else(|| IgnitionError::Config(format!("malformed verification hash: {hash}")))?;
        let algorithm = match alg {
            "sha256" => HashAlgorithm::Sha256,
            "sha512" => HashAlgorithm::Sha512,
            other => {
                return Err(IgnitionError::Config(format!(
                    "unsupported hash algorithm: {other}"
                )))
            }
        };
        let expected = hex::decode(digest)
            .map_err(|e| IgnitionError::Config(format!("invalid hash digest: {e}")))?;
        Ok(Self {
            algorithm,
            expected,
        })
    }

    fn verify(&self, calculated: &[u8]) -> Result<(), IgnitionError> {
        if calculated != self.expected {
            return Err(IgnitionError::HashMismatch {
                calculated: hex::encode(calculated),
                expected: hex::encode(&self.expected),
            });
        }
        debug!("contents match expected sum {}", hex::encode(&self.expected));
        Ok(())
    }
}

/// Options applied to a single fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// HTTP headers sent with http(s) fetches. No effect on other schemes.
    pub headers: Vec<HttpHeader>,
    pub hash: Option<HashSpec>,
    pub compression: Compression,
}

impl FetchOptions {
    /// Build the options described by a configured resource.
    pub fn for_resource(resource: &Resource) -> Result<Self, IgnitionError> {
        let hash = match &resource.verification.hash {
            Some(h) => Some(HashSpec::parse(h)?),
            None => None,
        };
        Ok(Self {
            headers: resource.http_headers.clone(),
            hash,
            compression: Compression::parse(resource.compression.as_deref())?,
        })
    }
}

/// Holds settings and lazily-initialized shared state for fetching
/// resources from URLs. Constructed once per run; the HTTP client, AWS
/// configuration, and OEM mount come into existence on first use and the
/// OEM mount is released when the fetcher is dropped.
pub struct Fetcher {
    timeout: Duration,
    http: Option<HttpClient>,
    authorities: Vec<reqwest::Certificate>,
    aws: tokio::sync::OnceCell<aws_config::SdkConfig>,
    /// Hint for locating the right S3 partition and region.
    pub s3_region_hint: Option<String>,
    oem_mount: Option<OemMount>,
}

impl Fetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            http: None,
            authorities: Vec::new(),
            aws: tokio::sync::OnceCell::new(),
            s3_region_hint: None,
            oem_mount: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Stream the bytes of `source` into `dest`, decompressing and hash
    /// verifying per `opts`. A source with no scheme (including the
    /// empty string) is a successful no-op that writes nothing. On a
    /// hash mismatch the destination contents must not be trusted.
    pub async fn fetch(
        &mut self,
        source: &str,
        dest: &mut fs::File,
        opts: FetchOptions,
    ) -> Result<(), IgnitionError> {
        let url = match Url::parse(source) {
            Ok(url) => url,
            // no scheme at all, nothing to fetch
            Err(url::ParseError::RelativeUrlWithoutBase) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        match url.scheme() {
            "http" | "https" => self.fetch_from_http(&url, dest, &opts).await,
            "tftp" => self.fetch_from_tftp(&url, dest, &opts).await,
            "data" => self.fetch_from_data_url(source, dest, &opts).await,
            "oem" => self.fetch_from_oem(&url, dest, &opts).await,
            "s3" => self.fetch_from_s3(&url, dest, &opts).await,
            other => Err(IgnitionError::SchemeUnsupported(other.to_string())),
        }
    }

    /// Fetch `source` into a temporary file and return its contents.
    pub async fn fetch_to_buffer(
        &mut self,
        source: &str,
        opts: FetchOptions,
    ) -> Result<Vec<u8>, IgnitionError> {
        let mut dest = fs::File::from_std(tempfile::tempfile()?);
        self.fetch(source, &mut dest, opts).await?;
        dest.seek(SeekFrom::Start(0)).await?;
        let mut buf = Vec::new();
        dest.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    /// Fetch the configured certificate authorities and fold them into
    /// the trust set of subsequent HTTPS fetches. Each authority is
    /// fetched with the trust set as augmented so far, so an authority
    /// served from a host signed by an earlier one resolves.
    pub async fn update_authorities(&mut self, config: &Config) -> Result<(), IgnitionError> {
        let authorities = config.ignition.security.tls.certificate_authorities.clone();
        for ca in &authorities {
            let pem = self
                .fetch_to_buffer(&ca.source, FetchOptions::for_resource(ca)?)
                .await?;
            let certs = reqwest::Certificate::from_pem_bundle(&pem)?;
            self.authorities.extend(certs);
            // force a rebuild so the next fetch sees the new roots
            self.http = None;
        }
        Ok(())
    }

    fn http_client(&mut self) -> Result<&HttpClient, IgnitionError> {
        if self.http.is_none() {
            self.http = Some(HttpClient::new(self.timeout, &self.authorities)?);
        }
        Ok(self.http.as_ref().expect("client just initialized"))
    }

    async fn fetch_from_http(
        &mut self,
        url: &Url,
        dest: &mut fs::File,
        opts: &FetchOptions,
    ) -> Result<(), IgnitionError> {
        let client = self.http_client()?;
        let response = client.get(url.as_str(), &opts.headers).await?;
        match response.status().as_u16() {
            200 | 204 => {}
            404 => return Err(IgnitionError::NotFound),
            status => {
                return Err(IgnitionError::failed(format!(
                    "GET {url} returned status {status}"
                )))
            }
        }
        let reader = http::body_reader(response);
        decompress_hash_and_copy(dest, reader, opts).await
    }

    async fn fetch_from_tftp(
        &mut self,
        url: &Url,
        dest: &mut fs::File,
        opts: &FetchOptions,
    ) -> Result<(), IgnitionError> {
        let host = url
            .host_str()
            .ok_or_else(|| IgnitionError::failed(format!("tftp URL has no host: {url}")))?;
        let addr = format!("{}:{}", host, url.port().unwrap_or(69));
        let path = url.path().to_string();

        // The TFTP client pushes into a writer while the decompressor
        // pulls from a reader; an in-memory pipe plus one worker task
        // connects the two.
        let (read_half, write_half) = tokio::io::duplex(64 * 1024);
        let (done_tx, mut done_rx) = tokio::sync::mpsc::channel::<std::io::Result<()>>(1);
        tokio::spawn(async move {
            let mut writer = write_half;
            let res = tftp::receive(&addr, &path, &mut writer).await;
            let shutdown = writer.shutdown().await;
            let _ = done_tx.send(res.and(shutdown)).await;
        });

        if let Err(read_err) = decompress_hash_and_copy(dest, read_half, opts).await {
            // An error from the worker writing into the pipe is the root
            // cause and overrides whatever the reader observed afterwards.
            return match done_rx.try_recv() {
                Ok(Err(write_err)) => Err(write_err.into()),
                _ => Err(read_err),
            };
        }
        match done_rx.recv().await {
            Some(Err(write_err)) => Err(write_err.into()),
            _ => Ok(()),
        }
    }

    async fn fetch_from_data_url(
        &mut self,
        source: &str,
        dest: &mut fs::File,
        opts: &FetchOptions,
    ) -> Result<(), IgnitionError> {
        if opts.compression != Compression::None {
            return Err(IgnitionError::CompressionUnsupported);
        }
        let data = decode_data_url(source)?;
        decompress_hash_and_copy(dest, data.as_slice(), opts).await
    }

    async fn fetch_from_oem(
        &mut self,
        url: &Url,
        dest: &mut fs::File,
        opts: &FetchOptions,
    ) -> Result<(), IgnitionError> {
        let file = oem::open(self, url).await?;
        decompress_hash_and_copy(dest, file, opts).await
    }

    async fn fetch_from_s3(
        &mut self,
        url: &Url,
        dest: &mut fs::File,
        opts: &FetchOptions,
    ) -> Result<(), IgnitionError> {
        if opts.compression != Compression::None {
            return Err(IgnitionError::CompressionUnsupported);
        }
        s3::fetch(self, url, dest).await?;

        // S3 downloads may be written in chunks out of order, so the
        // stream cannot be hashed in flight; hash the materialized file.
        if let Some(spec) = &opts.hash {
            dest.flush().await?;
            dest.seek(SeekFrom::Start(0)).await?;
            let mut hasher = Hasher::new(spec.algorithm);
            let mut buf = vec![0u8; 64 * 1024];
            loop {
                let n = dest.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            spec.verify(&hasher.finalize())?;
        }
        Ok(())
    }

    pub(crate) async fn aws_config(&self) -> &aws_config::SdkConfig {
        self.aws
            .get_or_init(|| async { aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await })
            .await
    }

    pub(crate) fn oem_mount(&mut self) -> &mut Option<OemMount> {
        &mut self.oem_mount
    }
}

/// Copy `src` into `dest`, decompressing per `opts` and verifying the
/// optional hash over the decompressed bytes.
async fn decompress_hash_and_copy<R>(
    dest: &mut fs::File,
    src: R,
    opts: &FetchOptions,
) -> Result<(), IgnitionError>
where
    R: AsyncRead + Unpin,
{
    match opts.compression {
        Compression::None => copy_and_verify(dest, src, opts).await,
        Compression::Gzip => {
            let decoder = GzipDecoder::new(BufReader::new(src));
            copy_and_verify(dest, decoder, opts).await
        }
    }
}

async fn copy_and_verify<R>(
    dest: &mut fs::File,
    mut src: R,
    opts: &FetchOptions,
) -> Result<(), IgnitionError>
where
    R: AsyncRead + Unpin,
{
    let mut hasher = opts.hash.as_ref().map(|spec| Hasher::new(spec.algorithm));
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = src.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        if let Some(hasher) = &mut hasher {
            hasher.update(&buf[..n]);
        }
        dest.write_all(&buf[..n]).await?;
    }
    dest.flush().await?;
    if let (Some(spec), Some(hasher)) = (&opts.hash, hasher) {
        spec.verify(&hasher.finalize())?;
    }
    Ok(())
}

/// Decode an RFC 2397 `data:` URL into its payload bytes.
fn decode_data_url(source: &str) -> Result<Vec<u8>, IgnitionError> {
    let rest = source
        .strip_prefix("data:")
        .ok_or_else(|| IgnitionError::failed(format!("malformed data URL: {source}")))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| IgnitionError::failed(format!("data URL has no payload: {source}")))?;
    let decoded: Vec<u8> = percent_decode_str(payload).collect();
    if meta.ends_with(";base64") {
        let text = String::from_utf8(decoded)
            .map_err(|e| IgnitionError::failed(format!("invalid base64 payload: {e}")))?;
        BASE64
            .decode(text.trim())
            .map_err(|e| IgnitionError::failed(format!("invalid base64 payload: {e}")))
    } else {
        Ok(decoded)
    }
}
