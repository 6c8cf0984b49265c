#[derive(clap::ValueEnum, Clone, Debug, Copy)]
pub enum CargoEnv {
    Development,
    Production,
}

/// which implementation produces the `sn` header
#[derive(clap::ValueEnum, Clone, Debug, Copy, PartialEq, Eq)]
pub enum SignerMode {
    /// RSA-SHA256 with a private key held in process
    Local,
    /// POST the canonical string to a signing microservice
    Remote,
}

/// device identity overrides, anything left out falls back to the mobile client defaults in
/// `DeviceProfile`
#[derive(clap::Args, Clone, Debug, Default)]
pub struct DeviceOverrides {
    #[clap(long, env = "DRAMABOX_TN")]
    pub tn: Option<String>,

    #[clap(long, env = "DRAMABOX_USER_ID")]
    pub user_id: Option<String>,

    #[clap(long, env = "DRAMABOX_DEVICE_ID")]
    pub device_id: Option<String>,

    #[clap(long, env = "DRAMABOX_ANDROID_ID")]
    pub android_id: Option<String>,

    #[clap(long, env = "DRAMABOX_CID")]
    pub cid: Option<String>,

    #[clap(long, env = "DRAMABOX_BRAND")]
    pub brand: Option<String>,

    #[clap(long, env = "DRAMABOX_MODEL")]
    pub model: Option<String>,

    #[clap(long, env = "DRAMABOX_MANUFACTURER")]
    pub manufacturer: Option<String>,

    #[clap(long, env = "DRAMABOX_VERSION")]
    pub version: Option<String>,

    #[clap(long, env = "DRAMABOX_VERSION_NAME")]
    pub version_name: Option<String>,
}

#[derive(clap::Parser, Clone, Debug)]
pub struct AppConfig {
    // production or development
    #[clap(long, env, value_enum)]
    pub cargo_env: CargoEnv,

    // port that the app will bind to
    #[clap(long, env, default_value = "5000")]
    pub port: u16,

    // redis backs the persisted cache tier, leave it out and only the in-process tier is used
    #[clap(long, env)]
    pub redis_url: Option<String>,

    // this should be either * for allowing everything, or a comma seperated list of domains like
    // example.com,something.com
    #[clap(long, env, default_value = "*")]
    pub cors_origin: String,

    // optional sentry integration
    #[clap(long, env)]
    pub sentry_dsn: Option<String>,

    // signed mobile api, every authenticated call goes here
    #[clap(long, env, default_value = "https://sapi.dramaboxdb.com/drama-box")]
    pub upstream_base_url: String,

    // unsigned web api used for book detail lookups
    #[clap(long, env, default_value = "https://www.webfic.com/webfic")]
    pub detail_base_url: String,

    #[clap(long, env, default_value = "in")]
    pub detail_language: String,

    // plain pass-through target for the relay endpoints
    #[clap(long, env, default_value = "https://dramabox.sansekai.my.id/api/dramabox")]
    pub relay_base_url: String,

    #[clap(long, env, value_enum, default_value = "local")]
    pub signer: SignerMode,

    // base url of the signing microservice, only read when signer=remote
    #[clap(long, env)]
    pub signer_url: Option<String>,

    // PKCS#8 PEM, either inline or as a path. inline wins if both are set
    #[clap(long, env)]
    pub signing_key: Option<String>,

    #[clap(long, env)]
    pub signing_key_path: Option<String>,

    // grab a fresh session token from /ap001/bootstrap on startup. this also happens when no
    // token is configured at all
    #[clap(long, env)]
    pub bootstrap_token: bool,

    #[command(flatten)]
    pub device: DeviceOverrides,
}

impl AppConfig {
    /// resolve the local signing key, inline PEM first and then the key file
    pub fn signing_key_pem(&self) -> anyhow::Result<Option<String>> {
        use anyhow::Context;

        if let Some(pem) = self.signing_key.as_ref().filter(|s| !s.trim().is_empty()) {
            return Ok(Some(pem.clone()));
        }

        match &self.signing_key_path {
            Some(path) => std::fs::read_to_string(path)
                .map(Some)
                .with_context(|| format!("failed to read signing key from {}", path)),
            None => Ok(None),
        }
    }
}

impl Default for AppConfig {
    // defaults aren't really needed here but it's here as a bad fallback
    fn default() -> Self {
        Self {
            cargo_env: CargoEnv::Development,
            port: 5000,
            redis_url: None,
            cors_origin: "*".to_string(),
            sentry_dsn: None,
            upstream_base_url: "https://sapi.dramaboxdb.com/drama-box".to_string(),
            detail_base_url: "https://www.webfic.com/webfic".to_string(),
            detail_language: "in".to_string(),
            relay_base_url: "https://dramabox.sansekai.my.id/api/dramabox".to_string(),
            signer: SignerMode::Local,
            signer_url: None,
            signing_key: None,
            signing_key_path: None,
            bootstrap_token: false,
            device: DeviceOverrides::default(),
        }
    }
}
