//! HTTP transport to remote WMS servers.

use bytes::Bytes;
use reqwest::{header, Client, Url};
use tracing::{debug, instrument};

use wms_common::{Credentials, WmsError, WmsResult};
use wms_protocol::{exceptions::service_error, is_exception_response, WmsVersion};

use crate::config::HttpConfig;

/// A successful (2xx) response body with its content type.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl HttpResponse {
    /// True if the body is an OGC exception report instead of the payload.
    pub fn is_exception(&self) -> bool {
        is_exception_response(self.content_type.as_deref(), &self.body)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Shared reqwest client with bounded timeouts.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &HttpConfig) -> WmsResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| WmsError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// GET `url`, with HTTP basic auth when credentials are given.
    ///
    /// Network failures, timeouts and non-2xx statuses are `Transport`
    /// errors, except that an error status carrying an exception report
    /// becomes the `Service` error it describes.
    #[instrument(skip(self, credentials), fields(host = url.host_str().unwrap_or_default()))]
    pub async fn get(&self, url: Url, credentials: Option<&Credentials>) -> WmsResult<HttpResponse> {
        let mut request = self.client.get(url.clone());
        if let Some(credentials) = credentials {
            request = request.basic_auth(&credentials.username, credentials.password.as_deref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| WmsError::Transport(format!("GET {} failed: {}", url.path(), e)))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response
            .bytes()
            .await
            .map_err(|e| WmsError::Transport(format!("Reading response body failed: {}", e)))?;

        debug!(status = %status, size = body.len(), content_type = ?content_type, "Received response");

        let response = HttpResponse { content_type, body };
        if !status.is_success() {
            if response.is_exception() {
                return Err(service_error(&response.text()));
            }
            return Err(WmsError::Transport(format!(
                "Server returned HTTP {}",
                status
            )));
        }

        Ok(response)
    }
}

/// Parse a base URI. Unparseable URIs are reported as `Transport` errors
/// because they fail at the point of connecting.
pub fn parse_url(uri: &str) -> WmsResult<Url> {
    Url::parse(uri.trim()).map_err(|e| WmsError::Transport(format!("Invalid URL '{}': {}", uri, e)))
}

/// GetCapabilities URL for a base URI.
///
/// Existing query parameters are kept except SERVICE, REQUEST and VERSION,
/// which are replaced.
pub fn capabilities_url(uri: &str) -> WmsResult<Url> {
    let mut url = parse_url(uri)?;

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| {
            !matches!(
                key.to_ascii_uppercase().as_str(),
                "SERVICE" | "REQUEST" | "VERSION"
            )
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("SERVICE", "WMS")
        .append_pair("REQUEST", "GetCapabilities")
        .append_pair("VERSION", WmsVersion::V1_1_1.as_str());

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_url_plain() {
        let url = capabilities_url("http://maps.example.com/wms").unwrap();
        assert_eq!(
            url.as_str(),
            "http://maps.example.com/wms?SERVICE=WMS&REQUEST=GetCapabilities&VERSION=1.1.1"
        );
    }

    #[test]
    fn test_capabilities_url_keeps_other_params() {
        let url =
            capabilities_url("http://maps.example.com/ows?map=flood&request=GetMap&version=1.3.0")
                .unwrap();
        assert_eq!(
            url.query(),
            Some("map=flood&SERVICE=WMS&REQUEST=GetCapabilities&VERSION=1.1.1")
        );
    }

    #[test]
    fn test_invalid_uri_is_transport_error() {
        assert!(matches!(
            capabilities_url("not a url"),
            Err(WmsError::Transport(_))
        ));
    }

    #[test]
    fn test_exception_detection() {
        let response = HttpResponse {
            content_type: Some("application/vnd.ogc.se_xml".to_string()),
            body: Bytes::from_static(b"<ServiceExceptionReport/>"),
        };
        assert!(response.is_exception());

        let response = HttpResponse {
            content_type: Some("image/png".to_string()),
            body: Bytes::from_static(b"\x89PNG"),
        };
        assert!(!response.is_exception());
    }
}
