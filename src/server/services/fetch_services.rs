use std::io::Read;
use std::sync::Arc;

use flate2::read::GzDecoder;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::server::{
    error::{DramaboxError, DramaboxResult},
    utils::{device_profile::DeviceProfile, signature_utils::SignatureUtil},
};

const BODY_EXCERPT_CHARS: usize = 200;

/// `{status, message, data}` for the signed api, `{success, message, data}` for the web one
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    status: Option<i64>,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

/// wraps every call to the signed mobile api: sign, attach the device bundle, classify
#[derive(Clone)]
pub struct AuthenticatedFetcher {
    http: reqwest::Client,
    base_url: String,
    device: Arc<DeviceProfile>,
    signatures: Arc<SignatureUtil>,
}

impl AuthenticatedFetcher {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        device: DeviceProfile,
        signatures: Arc<SignatureUtil>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            device: Arc::new(device),
            signatures,
        }
    }

    /// same transport and signer, different identity (used after a session bootstrap)
    pub fn with_device(&self, device: DeviceProfile) -> Self {
        Self {
            device: Arc::new(device),
            ..self.clone()
        }
    }

    pub fn device(&self) -> &DeviceProfile {
        &self.device
    }

    /// POST `base + endpoint?timestamp=` with the signed body and unwrap `data` on success
    pub async fn call<P: Serialize + ?Sized + Sync>(
        &self,
        endpoint: &str,
        payload: &P,
        extra_headers: Option<&HeaderMap>,
    ) -> DramaboxResult<Value> {
        // the signature is bound to this timestamp, a retry has to come back through here
        let signed = self.signatures.sign(payload, &self.device).await?;
        let url = format!(
            "{}{}?timestamp={}",
            self.base_url, endpoint, signed.timestamp
        );

        let mut request = self.http.post(&url);
        for (name, value) in self.device.headers() {
            request = request.header(name, value);
        }
        request = request.header("sn", &signed.signature);
        if let Some(extra) = extra_headers {
            request = request.headers(extra.clone());
        }

        debug!("calling {} ({} byte body)", endpoint, signed.body.len());

        let response = request.body(signed.body).send().await.map_err(|e| {
            error!("request to {} failed: {}", endpoint, e);
            record_request(endpoint, "transport_error");
            DramaboxError::Transport(e.to_string())
        })?;

        let data = Self::classify(endpoint, response, EnvelopeKind::Status).await?;
        record_request(endpoint, "ok");
        Ok(data)
    }

    /// plain GET against the unsigned web api
    pub async fn get_unsigned(&self, url: &str) -> DramaboxResult<Value> {
        let response = self.http.get(url).send().await.map_err(|e| {
            error!("request to {} failed: {}", url, e);
            record_request("unsigned", "transport_error");
            DramaboxError::Transport(e.to_string())
        })?;

        let data = Self::classify("unsigned", response, EnvelopeKind::Success).await?;
        record_request("unsigned", "ok");
        Ok(data)
    }

    async fn classify(
        endpoint: &str,
        response: reqwest::Response,
        kind: EnvelopeKind,
    ) -> DramaboxResult<Value> {
        let status = response.status();

        let bytes = response.bytes().await.map_err(|e| {
            error!("failed to read body from {}: {}", endpoint, e);
            record_request(endpoint, "transport_error");
            DramaboxError::Transport(format!("failed to read response body: {}", e))
        })?;
        let body = decode_body(&bytes)?;

        if !status.is_success() {
            let body_excerpt: String = String::from_utf8_lossy(&body)
                .chars()
                .take(BODY_EXCERPT_CHARS)
                .collect();

            if status.as_u16() == 401 || status.as_u16() == 403 {
                warn!("{} rejected the request signature ({})", endpoint, status);
            } else {
                error!("{} returned {}", endpoint, status);
            }
            record_request(endpoint, "http_error");

            return Err(DramaboxError::Upstream {
                status: status.as_u16(),
                body_excerpt,
            });
        }

        let envelope: Envelope = serde_json::from_slice(&body).map_err(|e| {
            error!("failed to parse {} response: {}", endpoint, e);
            record_request(endpoint, "decode_error");
            DramaboxError::Decode(e.to_string())
        })?;

        let failed = match kind {
            // no status at all is not a success, it's a body we don't understand
            EnvelopeKind::Status if envelope.status.is_none() => {
                error!("{} answered without a status field", endpoint);
                record_request(endpoint, "decode_error");
                return Err(DramaboxError::Decode(
                    "response envelope has no status".to_string(),
                ));
            }
            EnvelopeKind::Status => envelope.status != Some(0),
            EnvelopeKind::Success => envelope.success != Some(true),
        };

        if failed {
            let message = envelope
                .message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| format!("status {}", envelope.status.unwrap_or(-1)));
            warn!("{} answered with an api error: {}", endpoint, message);
            record_request(endpoint, "api_error");
            return Err(DramaboxError::Api { message });
        }

        Ok(envelope.data.unwrap_or(Value::Null))
    }
}

#[derive(Debug, Clone, Copy)]
enum EnvelopeKind {
    Status,
    Success,
}

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];

/// the bundle asks for compressed bodies and reqwest isn't decompressing for us, so sniff the
/// magic bytes rather than trust `content-encoding`
pub fn decode_body(bytes: &[u8]) -> DramaboxResult<Vec<u8>> {
    if bytes.starts_with(&GZIP_MAGIC) {
        let mut decoder = GzDecoder::new(bytes);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed).map_err(|e| {
            error!("failed to decompress gzip response: {}", e);
            DramaboxError::Decode(format!("failed to decompress gzip response: {}", e))
        })?;
        Ok(decompressed)
    } else if bytes.starts_with(&ZSTD_MAGIC) {
        zstd::decode_all(bytes).map_err(|e| {
            error!("failed to decompress zstd response: {}", e);
            DramaboxError::Decode(format!("failed to decompress zstd response: {}", e))
        })
    } else {
        Ok(bytes.to_vec())
    }
}

fn record_request(endpoint: &str, outcome: &'static str) {
    metrics::counter!(
        "dramabox_upstream_requests_total",
        "endpoint" => endpoint.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}
