//! HTTP(S) backend
//!
//! One client is built per fetcher, on first use, and rebuilt whenever
//! the config contributes additional certificate authorities. The client
//! carries a single total-fetch timeout: one deadline bounding the whole
//! transfer, not a per-read timeout.

use std::time::Duration;

use futures::TryStreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Certificate, Client, Response};
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tracing::debug;

use crate::config::HttpHeader;
use crate::error::IgnitionError;

/// The HTTP client used when fetching http(s) resources.
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Build a client with the given total-fetch timeout and any extra
    /// trust roots. Redirects are followed with the caller's headers.
    pub fn new(timeout: Duration, authorities: &[Certificate]) -> Result<Self, IgnitionError> {
        let mut builder = Client::builder().timeout(timeout);
        for ca in authorities {
            builder = builder.add_root_certificate(ca.clone());
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    /// Issue a GET with the supplied headers and return the response
    /// once its headers have arrived; the body is still streaming.
    pub async fn get(
        &self,
        url: &str,
        headers: &[HttpHeader],
    ) -> Result<Response, IgnitionError> {
        debug!("GET {}", url);
        let mut header_map = HeaderMap::new();
        for header in headers {
            let name = HeaderName::from_bytes(header.name.as_bytes())
                .map_err(|e| IgnitionError::failed(format!("invalid header name: {e}")))?;
            let value = HeaderValue::from_str(&header.value)
                .map_err(|e| IgnitionError::failed(format!("invalid header value: {e}")))?;
            header_map.insert(name, value);
        }
        let response = self.client.get(url).headers(header_map).send().await?;
        Ok(response)
    }
}

/// Adapt a response body into an async reader for the fetch pipeline.
pub fn body_reader(response: Response) -> impl AsyncRead + Unpin {
    StreamReader::new(
        response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
    )
}
