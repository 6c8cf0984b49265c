use std::sync::Arc;

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::{info, warn};

use crate::{
    config::{AppConfig, SignerMode},
    database::RedisDatabase,
    server::{
        services::{
            cache_services::{CacheService, DynCacheService, DynCacheStore, RedisCacheStore},
            chapter_services::{ChapterService, DynChapterService},
            dramabox_services::{DramaboxService, DramaboxServiceTrait, DynDramaboxService},
            fetch_services::AuthenticatedFetcher,
            keyword_services::{DynKeywordService, KeywordService},
            signer_services::{DynSigner, LocalRsaSigner, RemoteSigner, SignerTrait},
        },
        utils::{device_profile::DeviceProfile, signature_utils::SignatureUtil},
    },
};

/// everything a handler can reach, handed out through an axum `Extension`
#[derive(Clone)]
pub struct EdgeServices {
    pub dramabox: DynDramaboxService,
    pub chapters: DynChapterService,
    pub keywords: DynKeywordService,
    pub cache: DynCacheService,
    pub signer: DynSigner,
    pub http: reqwest::Client,
    pub redis: Option<Arc<RedisDatabase>>,
    pub metrics: Option<PrometheusHandle>,
    pub config: Arc<AppConfig>,
}

impl EdgeServices {
    pub async fn new(
        config: Arc<AppConfig>,
        redis_db: Option<RedisDatabase>,
        metrics: Option<PrometheusHandle>,
    ) -> anyhow::Result<Self> {
        info!("starting edge services...");

        let http = reqwest::Client::new();
        let signer = Self::build_signer(&config, http.clone())?;

        if signer.is_available().await {
            info!("{} signer ok", signer.name());
        } else {
            // keep going, /health reports it and every signed call fails with a signature error
            warn!("{} signer is not available, signed calls will fail", signer.name());
        }

        let signatures = Arc::new(SignatureUtil::new(signer.clone()));
        let device = DeviceProfile::from_overrides(&config.device);
        let fetcher = AuthenticatedFetcher::new(
            http.clone(),
            config.upstream_base_url.clone(),
            device,
            signatures,
        );

        let fetcher = if config.bootstrap_token || !fetcher.device().has_token() {
            Self::bootstrap_session(&config, fetcher).await
        } else {
            fetcher
        };

        let dramabox = Arc::new(DramaboxService::new(
            fetcher,
            config.detail_base_url.clone(),
            config.detail_language.clone(),
        )) as DynDramaboxService;

        let redis = redis_db.map(Arc::new);
        let persisted = redis
            .clone()
            .map(|redis| Arc::new(RedisCacheStore::new(redis)) as DynCacheStore);
        if persisted.is_none() {
            info!("no redis configured, caching in process only");
        }
        let cache: DynCacheService = Arc::new(CacheService::new(persisted));

        let chapters =
            Arc::new(ChapterService::new(dramabox.clone(), cache.clone())) as DynChapterService;
        let keywords =
            Arc::new(KeywordService::new(dramabox.clone(), cache.clone())) as DynKeywordService;

        info!("edge services ok");

        Ok(Self {
            dramabox,
            chapters,
            keywords,
            cache,
            signer,
            http,
            redis,
            metrics,
            config,
        })
    }

    fn build_signer(config: &AppConfig, http: reqwest::Client) -> anyhow::Result<DynSigner> {
        match config.signer {
            SignerMode::Local => {
                let pem = config.signing_key_pem()?;
                Ok(Arc::new(LocalRsaSigner::new(pem)) as DynSigner)
            }
            SignerMode::Remote => {
                let url = config
                    .signer_url
                    .clone()
                    .context("signer=remote needs SIGNER_URL")?;
                Ok(Arc::new(RemoteSigner::new(http, url)) as DynSigner)
            }
        }
    }

    /// swaps in a freshly issued session identity. on failure the configured identity is kept
    async fn bootstrap_session(
        config: &AppConfig,
        fetcher: AuthenticatedFetcher,
    ) -> AuthenticatedFetcher {
        info!("requesting a session token...");

        let api = DramaboxService::new(
            fetcher.clone(),
            config.detail_base_url.clone(),
            config.detail_language.clone(),
        );

        match api.bootstrap().await {
            Ok(token) => {
                let device = fetcher.device().with_session_token(&token);
                info!("session bootstrapped for device {}", device.device_id);
                fetcher.with_device(device)
            }
            Err(e) => {
                warn!("session bootstrap failed, keeping configured identity: {}", e);
                fetcher
            }
        }
    }
}
