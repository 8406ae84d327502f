/// Application context and dependency injection
use crate::{
    access::WallpaperService,
    config::{BackendConfig, GalleryConfig},
    controller::{GalleryController, SignalSources},
    download::{AssetDownloader, HttpDownloader},
    error::GalleryResult,
    events::SearchBus,
    fallback,
    gateway::{
        DataGateway, OfflineGateway, RestGateway, RestGatewayConfig, SqliteGateway,
        SqliteGatewayOptions, Table,
    },
    models::Wallpaper,
    session::SessionSource,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<GalleryConfig>,
    pub gateway: Arc<dyn DataGateway>,
    pub service: WallpaperService,
    pub downloader: Arc<dyn AssetDownloader>,
    pub search_bus: SearchBus,
    pub session: SessionSource,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: GalleryConfig) -> GalleryResult<Self> {
        config.validate()?;

        let gateway = Self::build_gateway(&config).await?;
        let downloader: Arc<dyn AssetDownloader> =
            Arc::new(HttpDownloader::new(config.download_directory.clone())?);

        Ok(Self::with_parts(config, gateway, downloader))
    }

    /// Assemble a context around an existing gateway and downloader
    pub fn with_parts(
        config: GalleryConfig,
        gateway: Arc<dyn DataGateway>,
        downloader: Arc<dyn AssetDownloader>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            service: WallpaperService::new(gateway.clone()),
            gateway,
            downloader,
            search_bus: SearchBus::default(),
            session: SessionSource::new(),
        }
    }

    async fn build_gateway(config: &GalleryConfig) -> GalleryResult<Arc<dyn DataGateway>> {
        let gateway: Arc<dyn DataGateway> = match &config.backend {
            BackendConfig::Rest { url, anon_key } => {
                info!("Using REST backend at {}", url);
                Arc::new(RestGateway::new(RestGatewayConfig::new(url, anon_key))?)
            }
            BackendConfig::Sqlite { path } => {
                info!("Using SQLite backend at {}", path.display());
                let gateway = SqliteGateway::connect(path, SqliteGatewayOptions::default()).await?;
                if config.seed_fallback {
                    Self::seed_if_empty(&gateway).await?;
                }
                Arc::new(gateway)
            }
            BackendConfig::Offline => {
                warn!("No backend configured, serving the fallback dataset");
                Arc::new(OfflineGateway::new())
            }
        };

        Ok(gateway)
    }

    async fn seed_if_empty(gateway: &SqliteGateway) -> GalleryResult<()> {
        if gateway.count(Table::Wallpapers, &[]).await? == 0 {
            gateway.seed_wallpapers(&fallback::wallpapers()).await?;
        }
        Ok(())
    }

    /// Controller seeded with `initial`, plus the signal sources it listens to
    pub fn controller(&self, initial: Vec<Wallpaper>) -> (GalleryController, SignalSources) {
        let controller =
            GalleryController::new(self.service.clone(), self.downloader.clone(), initial);
        let sources = SignalSources::new(self.search_bus.subscribe(), self.session.watch());
        (controller, sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::FallbackPolicy;
    use crate::controller::LikeOutcome;
    use crate::models::UserSession;
    use std::collections::HashMap;
    use std::time::Duration;
    use tempfile::tempdir;

    fn sqlite_config(path: &std::path::Path, seed: bool) -> GalleryConfig {
        let vars: HashMap<&str, String> = [
            ("GALLERY_SQLITE_PATH", path.display().to_string()),
            ("GALLERY_SEED_FALLBACK", seed.to_string()),
        ]
        .into_iter()
        .collect();
        GalleryConfig::from_lookup(|key| vars.get(key).cloned()).unwrap()
    }

    #[tokio::test]
    async fn test_sqlite_context_seeds_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db").join("gallery.sqlite");

        let ctx = AppContext::new(sqlite_config(&path, true)).await.unwrap();
        let stats = ctx.service.get_stats().await;
        assert_eq!(stats.total_wallpapers, fallback::wallpapers().len() as u64);
        drop(ctx);

        // Reopening does not seed a second time
        let ctx = AppContext::new(sqlite_config(&path, true)).await.unwrap();
        let stats = ctx.service.get_stats().await;
        assert_eq!(stats.total_wallpapers, fallback::wallpapers().len() as u64);
    }

    #[tokio::test]
    async fn test_offline_context_serves_fallback() {
        let config = GalleryConfig::from_lookup(|_| None).unwrap();
        let ctx = AppContext::new(config).await.unwrap();

        let wallpapers = ctx.service.fetch_all(FallbackPolicy::UseFallback).await.unwrap();
        assert_eq!(wallpapers.len(), fallback::wallpapers().len());

        let (controller, sources) = ctx.controller(wallpapers);
        assert_eq!(controller.displayed().len(), fallback::wallpapers().len());
        assert!(!sources.is_closed());
    }

    #[tokio::test]
    async fn test_controller_picks_up_existing_session() {
        let dir = tempdir().unwrap();
        let ctx = AppContext::new(sqlite_config(&dir.path().join("gallery.sqlite"), true))
            .await
            .unwrap();
        let first = ctx.service.fetch_all(FallbackPolicy::Propagate).await.unwrap()[0].clone();
        ctx.service.toggle_like(&first.id, true, "u1").await.unwrap();

        // Signed in before the controller exists
        ctx.session.sign_in(UserSession::new("u1", "u1@example.com"));
        let initial = ctx.service.fetch_all(FallbackPolicy::UseFallback).await.unwrap();
        let (mut controller, mut sources) = ctx.controller(initial);

        let handled = tokio::time::timeout(
            Duration::from_millis(500),
            controller.handle_next_signal(&mut sources),
        )
        .await
        .unwrap();
        assert!(handled);
        assert_eq!(controller.session().unwrap().id, "u1");
        assert!(controller.displayed()[0].is_liked);

        let second = controller.displayed()[1].id.clone();
        assert!(matches!(
            controller.toggle_like(&second).await,
            LikeOutcome::Settled(_)
        ));
        assert!(!controller.is_auth_prompt_open());
    }
}
