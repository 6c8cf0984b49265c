// plain pass-through to the relay api. nothing here is signed or cached, it just forwards the
// request and cleans the response up so clients never see an encoding they didn't ask for
use axum::{
    Extension, Router,
    body::Bytes,
    extract::{Path, RawQuery},
    http::{HeaderMap, HeaderName, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use std::io::Read;

use flate2::read::GzDecoder;
use tracing::{debug, error};
use url::Url;

use crate::server::{
    error::{AppResult, Error},
    services::edge_services::EdgeServices,
};

const RELAY_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// response headers that describe the upstream framing, not the body we send back
const HOP_HEADERS: [HeaderName; 4] = [
    header::CONTENT_ENCODING,
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::CONNECTION,
];

#[derive(Debug, Clone, Copy, PartialEq)]
enum ContentEncoding {
    Zstd,
    Gzip,
    None,
}

impl ContentEncoding {
    fn from_header(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("zstd") => Self::Zstd,
            Some("gzip") | Some("x-gzip") => Self::Gzip,
            _ => Self::None,
        }
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
        match self {
            Self::Zstd => zstd::decode_all(data),
            Self::Gzip => {
                let mut decoder = GzDecoder::new(data);
                let mut decoded = Vec::new();
                decoder.read_to_end(&mut decoded)?;
                Ok(decoded)
            }
            Self::None => Ok(data.to_vec()),
        }
    }
}

pub struct ProxyController;

impl ProxyController {
    pub fn app() -> Router {
        Router::new().route(
            "/{*path}",
            get(Self::relay).post(Self::relay).options(Self::preflight),
        )
    }

    async fn preflight() -> StatusCode {
        StatusCode::OK
    }

    async fn relay(
        Extension(services): Extension<EdgeServices>,
        Path(path): Path<String>,
        RawQuery(query): RawQuery,
        method: Method,
        body: Bytes,
    ) -> AppResult<Response> {
        let target = Self::target_url(&services.config.relay_base_url, &path, query.as_deref())?;
        debug!("relaying {} {}", method, target);

        let mut request = services
            .http
            .request(method.clone(), target.as_str())
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::USER_AGENT, RELAY_USER_AGENT);

        if method == Method::POST && !body.is_empty() {
            // only json goes upstream
            serde_json::from_slice::<serde_json::Value>(&body)
                .map_err(|e| Error::BadRequest(format!("invalid JSON body: {}", e)))?;
            request = request.body(body);
        }

        let upstream = request.send().await.map_err(|e| {
            error!("relay request to {} failed: {}", target, e);
            Error::BadGateway(format!("Request failed: {}", e))
        })?;

        let status = upstream.status();
        let encoding = ContentEncoding::from_header(
            upstream
                .headers()
                .get(header::CONTENT_ENCODING)
                .and_then(|v| v.to_str().ok()),
        );

        let mut response_headers = HeaderMap::new();
        for (name, value) in upstream.headers() {
            if !HOP_HEADERS.contains(name) {
                response_headers.append(name.clone(), value.clone());
            }
        }

        let bytes = upstream.bytes().await.map_err(|e| {
            error!("failed to read relay response: {}", e);
            Error::BadGateway(format!("Failed to read response: {}", e))
        })?;

        let decoded = encoding.decode(&bytes).map_err(|e| {
            error!("failed to decode {:?} relay response: {}", encoding, e);
            Error::BadGateway("Failed to decompress response".to_string())
        })?;

        debug!(
            "relay answered {} ({} bytes, {} decoded)",
            status,
            bytes.len(),
            decoded.len()
        );

        Ok((status, response_headers, decoded).into_response())
    }

    /// `{base}/{path}?{query}`. `..` segments are refused, url parsing would resolve them
    /// out of the relay base
    fn target_url(base: &str, path: &str, query: Option<&str>) -> AppResult<Url> {
        if path.split('/').any(|segment| segment == "..") {
            return Err(Error::BadRequest("Invalid relay path".to_string()));
        }

        let joined = format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        let mut url = Url::parse(&joined).map_err(|e| {
            error!("relay base {} produced an invalid url: {}", base, e);
            Error::InternalServerErrorWithContext("Invalid relay target".to_string())
        })?;

        url.set_query(query.filter(|q| !q.is_empty()));
        Ok(url)
    }
}
