use serde::Serialize;

use crate::server::{
    error::{DramaboxError, DramaboxResult},
    services::signer_services::DynSigner,
    utils::device_profile::DeviceProfile,
};

/// ephemeral, never stored. `body` is the exact byte string that was signed and has to be the
/// exact byte string that gets sent
#[derive(Debug, Clone, PartialEq)]
pub struct SignedRequest {
    pub timestamp: i64,
    pub signature: String,
    pub body: String,
}

pub struct SignatureUtil {
    signer: DynSigner,
}

impl SignatureUtil {
    pub fn new(signer: DynSigner) -> Self {
        Self { signer }
    }

    pub fn signer(&self) -> &DynSigner {
        &self.signer
    }

    /// order matters: timestamp marker, body, device id, android id, token. the upstream
    /// rebuilds the same string and rejects the request on any mismatch
    pub fn canonical_string(
        timestamp: i64,
        body: &str,
        device_id: &str,
        android_id: &str,
        token: &str,
    ) -> String {
        format!(
            "timestamp={}{}{}{}{}",
            timestamp, body, device_id, android_id, token
        )
    }

    /// compact json, keys in insertion/declaration order
    pub fn serialize_payload<P: Serialize + ?Sized>(payload: &P) -> DramaboxResult<String> {
        serde_json::to_string(payload)
            .map_err(|e| DramaboxError::Signature(format!("failed to serialize payload: {}", e)))
    }

    pub fn current_timestamp_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// signs with a fresh timestamp, call this once per outgoing request
    pub async fn sign<P: Serialize + ?Sized>(
        &self,
        payload: &P,
        device: &DeviceProfile,
    ) -> DramaboxResult<SignedRequest> {
        self.sign_at(payload, device, Self::current_timestamp_ms())
            .await
    }

    pub async fn sign_at<P: Serialize + ?Sized>(
        &self,
        payload: &P,
        device: &DeviceProfile,
        timestamp: i64,
    ) -> DramaboxResult<SignedRequest> {
        let body = Self::serialize_payload(payload)?;
        let canonical = Self::canonical_string(
            timestamp,
            &body,
            &device.device_id,
            &device.android_id,
            &device.token,
        );

        let signature = self.signer.sign(&canonical).await?;
        if signature.trim().is_empty() {
            return Err(DramaboxError::Signature(format!(
                "{} signer returned an empty signature",
                self.signer.name()
            )));
        }

        Ok(SignedRequest {
            timestamp,
            signature,
            body,
        })
    }
}
