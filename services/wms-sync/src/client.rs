//! Remote WMS access.
//!
//! [`StructuredClient`] speaks the protocol the way the server advertises it
//! (version, GetMap endpoint, KVP encoding). [`DirectClient`] builds a fixed
//! WMS 1.1.1 GetMap URL on the resource's base URI and is used as the
//! preview fallback.

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, instrument};

use wms_common::{Credentials, WmsResult};
use wms_protocol::{exceptions::service_error, Capabilities, GetMapRequest};

use crate::http::{capabilities_url, parse_url, HttpTransport};

/// Capabilities and map retrieval against a remote WMS.
#[async_trait]
pub trait WmsService: Send + Sync {
    /// Fetch and parse the capabilities document of the WMS at `uri`.
    async fn capabilities(
        &self,
        uri: &str,
        credentials: Option<&Credentials>,
    ) -> WmsResult<Capabilities>;

    /// Fetch a rendered map. Returns the raw response body.
    async fn get_map(
        &self,
        uri: &str,
        credentials: Option<&Credentials>,
        request: &GetMapRequest,
    ) -> WmsResult<Bytes>;
}

async fn fetch_capabilities(
    http: &HttpTransport,
    uri: &str,
    credentials: Option<&Credentials>,
) -> WmsResult<Capabilities> {
    let url = capabilities_url(uri)?;
    let response = http.get(url, credentials).await?;
    let caps = Capabilities::parse(&response.text())?;

    debug!(
        version = caps.version.as_str(),
        layers = caps.layers.len(),
        "Parsed capabilities"
    );
    Ok(caps)
}

/// Client following the server's advertised version and GetMap endpoint.
#[derive(Clone)]
pub struct StructuredClient {
    http: HttpTransport,
}

impl StructuredClient {
    pub fn new(http: HttpTransport) -> Self {
        Self { http }
    }
}

#[async_trait]
impl WmsService for StructuredClient {
    #[instrument(skip(self, credentials))]
    async fn capabilities(
        &self,
        uri: &str,
        credentials: Option<&Credentials>,
    ) -> WmsResult<Capabilities> {
        fetch_capabilities(&self.http, uri, credentials).await
    }

    #[instrument(skip(self, credentials, request), fields(layers = %request.layers.join(",")))]
    async fn get_map(
        &self,
        uri: &str,
        credentials: Option<&Credentials>,
        request: &GetMapRequest,
    ) -> WmsResult<Bytes> {
        let mut url = parse_url(request.endpoint.as_deref().unwrap_or(uri))?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in request.to_kvp() {
                query.append_pair(key, &value);
            }
        }

        let response = self.http.get(url, credentials).await?;

        // Servers commonly report GetMap failures as XML with HTTP 200.
        if response.is_exception() {
            return Err(service_error(&response.text()));
        }

        Ok(response.body)
    }
}

/// Client that appends GetMap parameters to the base URI as-is.
#[derive(Clone)]
pub struct DirectClient {
    http: HttpTransport,
}

impl DirectClient {
    pub fn new(http: HttpTransport) -> Self {
        Self { http }
    }
}

#[async_trait]
impl WmsService for DirectClient {
    #[instrument(skip(self, credentials))]
    async fn capabilities(
        &self,
        uri: &str,
        credentials: Option<&Credentials>,
    ) -> WmsResult<Capabilities> {
        fetch_capabilities(&self.http, uri, credentials).await
    }

    #[instrument(skip(self, credentials, request), fields(layers = %request.layers.join(",")))]
    async fn get_map(
        &self,
        uri: &str,
        credentials: Option<&Credentials>,
        request: &GetMapRequest,
    ) -> WmsResult<Bytes> {
        let url = parse_url(&request.direct_url(uri.trim()))?;
        let response = self.http.get(url, credentials).await?;
        Ok(response.body)
    }
}
