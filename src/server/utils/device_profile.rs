use rand::Rng;

use crate::config::DeviceOverrides;

const DEFAULT_DEVICE_ID: &str = "dab6c1c5-7248-4c54-898d-37f045b1acff";
const DEFAULT_ANDROID_ID: &str = "ffffffffbc03a54ebc03a54e00000000";
const DEFAULT_USER_ID: &str = "";
const DEFAULT_CID: &str = "DAUAG1050238";
const DEFAULT_BRAND: &str = "vivo";
const DEFAULT_MODEL: &str = "V2309A";
const DEFAULT_MANUFACTURER: &str = "VIVO";
const DEFAULT_VERSION: &str = "492";
const DEFAULT_VERSION_NAME: &str = "4.9.2";

/// headers the mobile client sends on every call that nobody ever needs to override. the
/// upstream only looks at a few of them but a request missing the rest looks off
const STATIC_HEADERS: &[(&str, &str)] = &[
    ("accept-encoding", "gzip"),
    ("active-time", "48610"),
    ("afid", "1765426707100-3399426610238547736"),
    ("apn", "0"),
    ("build", "Build/PQ3A.190705.09121607"),
    ("content-type", "application/json; charset=UTF-8"),
    ("country-code", "ID"),
    ("current-language", "in"),
    ("device-score", "55"),
    ("ins", "1765426707269"),
    ("instanceid", "8f1ff8f305a5fe5a1a09cb6f0e6f1864"),
    ("is_emulator", "0"),
    ("is_root", "1"),
    ("is_vpn", "1"),
    ("language", "in"),
    ("lat", "0"),
    ("local-time", "2025-12-11 12:32:12.278 +0800"),
    ("locale", "in_ID"),
    ("mbid", "60000000000"),
    ("mcc", "510"),
    ("nchid", "DRA1000042"),
    ("ov", "9"),
    ("over-flow", "new-fly"),
    ("p", "51"),
    ("package-name", "com.storymatrix.drama"),
    ("pline", "ANDROID"),
    ("srn", "900x1600"),
    ("store-source", "store_google"),
    ("time-zone", "+0800"),
    ("tz", "-480"),
    ("user-agent", "okhttp/4.10.0"),
];

/// resolved device identity. the three signed fields (device id, android id, token) are kept
/// apart from the opaque header bundle because they also feed the canonical signing string
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceProfile {
    pub device_id: String,
    pub android_id: String,
    /// full header value, `Bearer ...` included
    pub token: String,
    pub user_id: String,
    pub cid: String,
    pub brand: String,
    pub model: String,
    pub manufacturer: String,
    pub version: String,
    pub version_name: String,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self::from_overrides(&DeviceOverrides::default())
    }
}

impl DeviceProfile {
    pub fn from_overrides(overrides: &DeviceOverrides) -> Self {
        let pick = |value: &Option<String>, default: &str| {
            value
                .as_deref()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(default)
                .to_string()
        };

        Self {
            device_id: pick(&overrides.device_id, DEFAULT_DEVICE_ID),
            android_id: pick(&overrides.android_id, DEFAULT_ANDROID_ID),
            token: pick(&overrides.tn, ""),
            user_id: pick(&overrides.user_id, DEFAULT_USER_ID),
            cid: pick(&overrides.cid, DEFAULT_CID),
            brand: pick(&overrides.brand, DEFAULT_BRAND),
            model: pick(&overrides.model, DEFAULT_MODEL),
            manufacturer: pick(&overrides.manufacturer, DEFAULT_MANUFACTURER),
            version: pick(&overrides.version, DEFAULT_VERSION),
            version_name: pick(&overrides.version_name, DEFAULT_VERSION_NAME),
        }
    }

    pub fn has_token(&self) -> bool {
        !self.token.trim().is_empty()
    }

    /// identity for a freshly bootstrapped session: new ids, the issued token
    pub fn with_session_token(&self, raw_token: &str) -> Self {
        Self {
            device_id: uuid::Uuid::new_v4().to_string(),
            android_id: random_android_id(),
            token: format!("Bearer {}", raw_token),
            ..self.clone()
        }
    }

    /// full header bundle in the order the mobile client sends it, `sn` is added per request
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers: Vec<(&'static str, String)> = STATIC_HEADERS
            .iter()
            .map(|(name, value)| (*name, value.to_string()))
            .collect();

        headers.extend([
            ("android-id", self.android_id.clone()),
            ("brand", self.brand.clone()),
            ("cid", self.cid.clone()),
            ("device-id", self.device_id.clone()),
            ("mchid", self.cid.clone()),
            ("md", self.model.clone()),
            ("mf", self.manufacturer.clone()),
            ("tn", self.token.clone()),
            ("userid", self.user_id.clone()),
            ("version", self.version.clone()),
            ("vn", self.version_name.clone()),
        ]);

        headers
    }
}

/// same shape as the ids real devices report, 8 f's then 24 hex chars
pub fn random_android_id() -> String {
    let mut rng = rand::rng();
    let tail: String = (0..12)
        .map(|_| format!("{:02x}", rng.random::<u8>()))
        .collect();
    format!("ffffffff{}", tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_defaults() {
        let profile = DeviceProfile::from_overrides(&DeviceOverrides {
            device_id: Some("dev-1".to_string()),
            brand: Some("  ".to_string()),
            ..Default::default()
        });

        assert_eq!(profile.device_id, "dev-1");
        assert_eq!(profile.brand, DEFAULT_BRAND);
        assert_eq!(profile.android_id, DEFAULT_ANDROID_ID);
    }

    #[test]
    fn android_id_has_device_shape() {
        let id = random_android_id();
        assert_eq!(id.len(), 32);
        assert!(id.starts_with("ffffffff"));
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
