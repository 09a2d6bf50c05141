//! tus 1.0.0 transport over HTTP.
//!
//! Async client using `reqwest`. Every request carries `Tus-Resumable`
//! plus any caller-supplied default headers (authorization and the like).

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Url;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, LOCATION};
use tracing::{debug, trace};

use uploadtus_protocol::constants::{
    HEADER_TUS_RESUMABLE, HEADER_UPLOAD_CHECKSUM, HEADER_UPLOAD_LENGTH, HEADER_UPLOAD_METADATA,
    HEADER_UPLOAD_OFFSET, OFFSET_OCTET_STREAM, TUS_VERSION,
};
use uploadtus_protocol::encode_metadata;

use crate::error::{TransportError, UploadError};
use crate::transport::{RemoteOffset, Transport, TransportFuture};

/// HTTP implementation of [`Transport`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
}

/// Builder for [`HttpTransport`].
#[derive(Debug, Clone, Default)]
pub struct HttpTransportBuilder {
    headers: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl HttpTransportBuilder {
    /// Adds a header sent with every request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets a per-request timeout. A timed-out exchange is a network error.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<HttpTransport, UploadError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            HEADER_TUS_RESUMABLE,
            HeaderValue::from_static(TUS_VERSION),
        );
        for (name, value) in &self.headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| UploadError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            let header_value =
                HeaderValue::from_str(value).map_err(|e| UploadError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            headers.insert(header_name, header_value);
        }

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(HttpTransport {
            http: builder.build()?,
        })
    }
}

impl HttpTransport {
    /// Creates a transport with no extra headers and no timeout.
    pub fn new() -> Result<Self, UploadError> {
        Self::builder().build()
    }

    pub fn builder() -> HttpTransportBuilder {
        HttpTransportBuilder::default()
    }
}

/// Returns the response if its status is 2xx, otherwise a classified error.
async fn expect_success(
    resp: reqwest::Response,
    exchange: &str,
) -> Result<reqwest::Response, TransportError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(TransportError::from_status(
        status.as_u16(),
        format!("{exchange} failed: {}", body.trim()),
    ))
}

fn header_u64(resp: &reqwest::Response, name: &str) -> Option<u64> {
    resp.headers()
        .get(name)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Resolves a `Location` header against the creation endpoint.
fn resolve_location(endpoint: &str, location: &str) -> Result<String, TransportError> {
    let base = Url::parse(endpoint)
        .map_err(|e| TransportError::protocol(format!("invalid endpoint {endpoint}: {e}")))?;
    let resolved = base
        .join(location)
        .map_err(|e| TransportError::protocol(format!("invalid Location {location}: {e}")))?;
    Ok(resolved.to_string())
}

impl Transport for HttpTransport {
    fn create<'a>(
        &'a self,
        endpoint: &'a str,
        upload_length: u64,
        metadata: &'a BTreeMap<String, String>,
    ) -> TransportFuture<'a, String> {
        Box::pin(async move {
            let mut req = self
                .http
                .post(endpoint)
                .header(HEADER_UPLOAD_LENGTH, upload_length.to_string());
            if !metadata.is_empty() {
                req = req.header(HEADER_UPLOAD_METADATA, encode_metadata(metadata));
            }

            let resp = req.body(Vec::new()).send().await?;
            let resp = expect_success(resp, "create").await?;

            let location = resp
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| TransportError::protocol("create response has no Location header"))?;
            let upload_url = resolve_location(endpoint, location)?;

            debug!(%endpoint, %upload_url, upload_length, "upload created");
            Ok(upload_url)
        })
    }

    fn patch<'a>(
        &'a self,
        upload_url: &'a str,
        offset: u64,
        data: &'a [u8],
        checksum: Option<&'a str>,
    ) -> TransportFuture<'a, u64> {
        Box::pin(async move {
            let mut req = self
                .http
                .patch(upload_url)
                .header(HEADER_UPLOAD_OFFSET, offset.to_string())
                .header(CONTENT_TYPE, OFFSET_OCTET_STREAM);
            if let Some(checksum) = checksum {
                req = req.header(HEADER_UPLOAD_CHECKSUM, checksum);
            }

            let resp = req.body(data.to_vec()).send().await?;
            let resp = expect_success(resp, "patch").await?;

            let new_offset = header_u64(&resp, HEADER_UPLOAD_OFFSET).ok_or_else(|| {
                TransportError::protocol("patch response has no valid Upload-Offset header")
            })?;
            trace!(%upload_url, offset, new_offset, "chunk patched");
            Ok(new_offset)
        })
    }

    fn head<'a>(&'a self, upload_url: &'a str) -> TransportFuture<'a, RemoteOffset> {
        Box::pin(async move {
            let resp = self.http.head(upload_url).send().await?;
            let resp = expect_success(resp, "head").await?;

            let offset = header_u64(&resp, HEADER_UPLOAD_OFFSET).ok_or_else(|| {
                TransportError::protocol("head response has no valid Upload-Offset header")
            })?;
            let length = header_u64(&resp, HEADER_UPLOAD_LENGTH);
            Ok(RemoteOffset { offset, length })
        })
    }

    fn terminate<'a>(&'a self, upload_url: &'a str) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            let resp = self.http.delete(upload_url).send().await?;
            expect_success(resp, "terminate").await?;
            debug!(%upload_url, "upload terminated");
            Ok(())
        })
    }
}
