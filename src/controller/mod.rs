/// List Synchronization Controller
///
/// Owns the displayed wallpaper list and the detail view. Mutations are
/// applied optimistically and confirmed through the access layer later;
/// every optimistic mutation carries a pending token so late or superseded
/// confirmations, and reconciliation snapshots taken before them, never
/// overwrite newer local state.

pub mod pending;

pub use pending::{GenerationSnapshot, PendingLedger, PendingToken};

use crate::{
    access::WallpaperService,
    download::AssetDownloader,
    error::{GalleryResult, GatewayResult},
    events::SearchSubscription,
    models::{UserSession, Wallpaper},
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Detail view state machine
#[derive(Debug, Clone, PartialEq)]
pub enum DetailView {
    Closed,
    Open(Wallpaper),
}

/// How a confirmation was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Newest operation for the wallpaper, backend accepted it
    Confirmed,
    /// Newest operation, backend failed; optimistic state is kept
    Failed,
    /// A newer operation superseded this one; result ignored
    Stale,
}

/// Result of starting a like toggle
#[derive(Debug, Clone, PartialEq)]
pub enum LikeStart {
    /// No session; the auth prompt was opened instead
    AuthRequired,
    NotFound,
    Started(LikeIntent),
}

/// A like toggle applied locally, waiting for the backend
#[derive(Debug, Clone, PartialEq)]
pub struct LikeIntent {
    pub token: PendingToken,
    pub user_id: String,
    pub liked: bool,
}

impl LikeIntent {
    /// Send the toggle to the backend
    pub async fn execute(&self, service: &WallpaperService) -> GatewayResult<()> {
        service
            .toggle_like(&self.token.wallpaper_id, self.liked, &self.user_id)
            .await
    }
}

/// A download counted locally, waiting for the backend and the file save
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadIntent {
    pub token: PendingToken,
    pub wallpaper: Wallpaper,
    pub user_id: Option<String>,
}

impl DownloadIntent {
    /// Record or count the download. Authenticated users get a download row.
    pub async fn execute(&self, service: &WallpaperService) -> GatewayResult<()> {
        match &self.user_id {
            Some(user_id) => service.record_download(user_id, &self.wallpaper.id).await,
            None => service.increment_downloads(&self.wallpaper.id).await,
        }
    }

    /// Fetch the asset and save it locally
    pub async fn save(&self, downloader: &dyn AssetDownloader) -> GalleryResult<PathBuf> {
        downloader.save(&self.wallpaper).await
    }
}

/// Outcome of a full like toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeOutcome {
    AuthRequired,
    NotFound,
    Settled(Settlement),
}

/// Outcome of a full download
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadOutcome {
    NotFound,
    Completed {
        settlement: Settlement,
        saved: Option<PathBuf>,
    },
}

/// Signal sources consumed by `handle_next_signal`
pub struct SignalSources {
    pub search: Option<SearchSubscription>,
    pub session: Option<watch::Receiver<Option<UserSession>>>,
}

impl SignalSources {
    /// The current session is delivered as the first session signal
    pub fn new(
        search: SearchSubscription,
        mut session: watch::Receiver<Option<UserSession>>,
    ) -> Self {
        session.mark_changed();
        Self {
            search: Some(search),
            session: Some(session),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.search.is_none() && self.session.is_none()
    }
}

enum Signal {
    Search(Option<String>),
    Session(Option<Option<UserSession>>),
}

/// Holds the displayed list and reconciles it with the backend
pub struct GalleryController {
    service: WallpaperService,
    downloader: Arc<dyn AssetDownloader>,
    /// Filtering universe: membership and order never change after seeding
    seed: Vec<Wallpaper>,
    displayed: Vec<Wallpaper>,
    detail: DetailView,
    auth_prompt_open: bool,
    session: Option<UserSession>,
    pending: PendingLedger,
}

impl GalleryController {
    /// Seed the controller with an initial list
    pub fn new(
        service: WallpaperService,
        downloader: Arc<dyn AssetDownloader>,
        initial: Vec<Wallpaper>,
    ) -> Self {
        Self {
            service,
            downloader,
            displayed: initial.clone(),
            seed: initial,
            detail: DetailView::Closed,
            auth_prompt_open: false,
            session: None,
            pending: PendingLedger::new(),
        }
    }

    pub fn service(&self) -> &WallpaperService {
        &self.service
    }

    pub fn displayed(&self) -> &[Wallpaper] {
        &self.displayed
    }

    pub fn seed(&self) -> &[Wallpaper] {
        &self.seed
    }

    pub fn detail(&self) -> &DetailView {
        &self.detail
    }

    pub fn selected(&self) -> Option<&Wallpaper> {
        match &self.detail {
            DetailView::Open(w) => Some(w),
            DetailView::Closed => None,
        }
    }

    pub fn session(&self) -> Option<&UserSession> {
        self.session.as_ref()
    }

    pub fn is_auth_prompt_open(&self) -> bool {
        self.auth_prompt_open
    }

    pub fn close_auth_prompt(&mut self) {
        self.auth_prompt_open = false;
    }

    pub fn pending(&self) -> &PendingLedger {
        &self.pending
    }

    /// Open the detail view; local state only
    pub fn view(&mut self, wallpaper: Wallpaper) {
        debug!("Viewing wallpaper {}", wallpaper.id);
        self.detail = DetailView::Open(wallpaper);
    }

    pub fn close(&mut self) {
        self.detail = DetailView::Closed;
    }

    /// Filter the seed list client-side. An empty query restores it.
    pub fn apply_search(&mut self, query: &str) {
        let needle = query.to_lowercase();
        if needle.is_empty() {
            self.displayed = self.seed.clone();
            return;
        }

        self.displayed = self
            .seed
            .iter()
            .filter(|w| w.matches_query(&needle))
            .cloned()
            .collect();
        debug!("Search {:?} shows {} of {}", query, self.displayed.len(), self.seed.len());
    }

    /// Track the acting user; a new identity triggers reconciliation.
    /// Returns whether the displayed list was refreshed.
    pub async fn on_session_change(&mut self, session: Option<UserSession>) -> bool {
        if self.session == session {
            return false;
        }

        let Some(user) = session else {
            self.session = None;
            return false;
        };

        info!("Session changed to {}, syncing likes", user.email);
        self.session = Some(user);
        self.reconcile().await
    }

    /// Refetch the user's like-annotated list and merge it into the displayed
    /// one by id. Failures are logged and leave state untouched.
    pub async fn reconcile(&mut self) -> bool {
        let Some(user_id) = self.session.as_ref().map(|s| s.id.clone()) else {
            return false;
        };

        let snapshot = self.pending.snapshot();
        match self.service.fetch_for_user(&user_id).await {
            Ok(fresh) => {
                self.apply_reconciliation(fresh, &snapshot);
                true
            }
            Err(e) => {
                error!("Error syncing user likes: {}", e);
                false
            }
        }
    }

    /// Replace entries present in `fresh`, skipping any wallpaper mutated
    /// locally since `snapshot` was taken or with an operation in flight
    pub fn apply_reconciliation(&mut self, fresh: Vec<Wallpaper>, snapshot: &GenerationSnapshot) {
        let by_id: HashMap<String, Wallpaper> =
            fresh.into_iter().map(|w| (w.id.clone(), w)).collect();
        let pending = &self.pending;

        let refresh = |w: &mut Wallpaper| -> bool {
            match by_id.get(&w.id) {
                Some(f) if pending.is_quiet_since(&w.id, snapshot) => {
                    *w = f.clone();
                    true
                }
                Some(_) => {
                    debug!("Keeping local state for {}, newer than server snapshot", w.id);
                    false
                }
                None => false,
            }
        };

        let refreshed = self.displayed.iter_mut().map(&refresh).filter(|r| *r).count();
        self.seed.iter_mut().for_each(|w| {
            refresh(w);
        });
        if let DetailView::Open(w) = &mut self.detail {
            refresh(w);
        }

        debug!("Reconciled {} displayed wallpapers", refreshed);
    }

    /// Flip the like locally and issue a pending token. Without a session the
    /// auth prompt opens and nothing changes.
    pub fn begin_like(&mut self, wallpaper_id: &str) -> LikeStart {
        let Some(user_id) = self.session.as_ref().map(|s| s.id.clone()) else {
            self.auth_prompt_open = true;
            return LikeStart::AuthRequired;
        };
        let Some(current) = self.find(wallpaper_id) else {
            return LikeStart::NotFound;
        };

        let liked = !current.is_liked;
        let likes = if liked {
            current.likes.saturating_add(1)
        } else {
            current.likes.saturating_sub(1)
        };

        self.patch(wallpaper_id, |w| {
            w.is_liked = liked;
            w.likes = likes;
        });

        LikeStart::Started(LikeIntent {
            token: self.pending.issue(wallpaper_id),
            user_id,
            liked,
        })
    }

    /// Count the download locally and issue a pending token
    pub fn begin_download(&mut self, wallpaper_id: &str) -> Option<DownloadIntent> {
        let current = self.find(wallpaper_id)?;
        let downloads = current.downloads.saturating_add(1);

        self.patch(wallpaper_id, |w| w.downloads = downloads);
        let wallpaper = self.find(wallpaper_id)?.clone();

        Some(DownloadIntent {
            token: self.pending.issue(wallpaper_id),
            wallpaper,
            user_id: self.session.as_ref().map(|s| s.id.clone()),
        })
    }

    /// Apply a backend confirmation. Failures keep the optimistic state.
    pub fn settle<E: std::fmt::Display>(
        &mut self,
        token: &PendingToken,
        result: Result<(), E>,
    ) -> Settlement {
        if !self.pending.settle(token) {
            debug!(
                "Discarding stale confirmation for {} (generation {})",
                token.wallpaper_id, token.generation
            );
            return Settlement::Stale;
        }

        match result {
            Ok(()) => Settlement::Confirmed,
            Err(e) => {
                warn!(
                    "Backend rejected update of {}, keeping local state until next sync: {}",
                    token.wallpaper_id, e
                );
                Settlement::Failed
            }
        }
    }

    /// Optimistic like toggle followed by the backend call
    pub async fn toggle_like(&mut self, wallpaper_id: &str) -> LikeOutcome {
        match self.begin_like(wallpaper_id) {
            LikeStart::AuthRequired => LikeOutcome::AuthRequired,
            LikeStart::NotFound => LikeOutcome::NotFound,
            LikeStart::Started(intent) => {
                let result = intent.execute(&self.service).await;
                LikeOutcome::Settled(self.settle(&intent.token, result))
            }
        }
    }

    /// Optimistic download count, backend update, then fetch-and-save
    pub async fn download(&mut self, wallpaper_id: &str) -> DownloadOutcome {
        let Some(intent) = self.begin_download(wallpaper_id) else {
            return DownloadOutcome::NotFound;
        };

        let result = intent.execute(&self.service).await;
        let settlement = self.settle(&intent.token, result);

        let saved = match intent.save(self.downloader.as_ref()).await {
            Ok(path) => Some(path),
            Err(e) => {
                error!("Error downloading wallpaper {}: {}", wallpaper_id, e);
                None
            }
        };

        DownloadOutcome::Completed { settlement, saved }
    }

    /// Wait for one search or session signal and apply it.
    /// Returns `false` once both sources are closed.
    pub async fn handle_next_signal(&mut self, sources: &mut SignalSources) -> bool {
        if sources.is_closed() {
            return false;
        }

        let SignalSources { search, session } = &mut *sources;
        let signal = tokio::select! {
            query = next_search(search) => Signal::Search(query),
            change = next_session(session) => Signal::Session(change),
        };

        match signal {
            Signal::Search(Some(query)) => self.apply_search(&query),
            Signal::Search(None) => {
                debug!("Search bus closed");
                *search = None;
            }
            Signal::Session(Some(user)) => {
                self.on_session_change(user).await;
            }
            Signal::Session(None) => {
                debug!("Session source closed");
                *session = None;
            }
        }

        !sources.is_closed()
    }

    fn find(&self, wallpaper_id: &str) -> Option<&Wallpaper> {
        self.displayed
            .iter()
            .find(|w| w.id == wallpaper_id)
            .or_else(|| self.selected().filter(|w| w.id == wallpaper_id))
    }

    /// Apply a local mutation to every copy of the wallpaper
    fn patch(&mut self, wallpaper_id: &str, apply: impl Fn(&mut Wallpaper)) {
        let detail = match &mut self.detail {
            DetailView::Open(w) => Some(w),
            DetailView::Closed => None,
        };

        self.displayed
            .iter_mut()
            .chain(self.seed.iter_mut())
            .chain(detail)
            .filter(|w| w.id == wallpaper_id)
            .for_each(apply);
    }
}

async fn next_search(search: &mut Option<SearchSubscription>) -> Option<String> {
    match search {
        Some(sub) => sub.next().await,
        None => std::future::pending().await,
    }
}

async fn next_session(
    session: &mut Option<watch::Receiver<Option<UserSession>>>,
) -> Option<Option<UserSession>> {
    match session {
        Some(rx) => match rx.changed().await {
            Ok(()) => Some(rx.borrow_and_update().clone()),
            Err(_) => None,
        },
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        access::FallbackPolicy,
        download::write_asset,
        events::SearchBus,
        fallback,
        gateway::{OfflineGateway, SqliteGateway, SqliteGatewayOptions},
        session::SessionSource,
    };
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// Saves a fixed payload instead of fetching over HTTP
    struct LocalDownloader {
        dir: TempDir,
    }

    #[async_trait]
    impl AssetDownloader for LocalDownloader {
        async fn save(&self, wallpaper: &Wallpaper) -> GalleryResult<PathBuf> {
            write_asset(self.dir.path(), wallpaper, b"image").await
        }
    }

    fn downloader() -> Arc<dyn AssetDownloader> {
        Arc::new(LocalDownloader {
            dir: tempfile::tempdir().unwrap(),
        })
    }

    fn offline_controller() -> GalleryController {
        let service = WallpaperService::new(Arc::new(OfflineGateway::new()));
        GalleryController::new(service, downloader(), fallback::wallpapers())
    }

    async fn sqlite_controller() -> GalleryController {
        let gateway = SqliteGateway::in_memory(SqliteGatewayOptions::default())
            .await
            .unwrap();
        gateway.seed_wallpapers(&fallback::wallpapers()).await.unwrap();

        let service = WallpaperService::new(Arc::new(gateway));
        let initial = service.fetch_all(FallbackPolicy::Propagate).await.unwrap();
        GalleryController::new(service, downloader(), initial)
    }

    fn user() -> UserSession {
        UserSession::new("u1", "u1@example.com")
    }

    #[test]
    fn test_search_filters_seed_and_empty_restores() {
        let mut controller = offline_controller();
        let seed = controller.seed().to_vec();

        controller.apply_search("HACKER");
        let expected: Vec<_> = seed
            .iter()
            .filter(|w| w.category == "Hacker")
            .map(|w| w.id.clone())
            .collect();
        let shown: Vec<_> = controller.displayed().iter().map(|w| w.id.clone()).collect();
        assert_eq!(shown, expected);

        controller.apply_search("no such wallpaper");
        assert!(controller.displayed().is_empty());

        controller.apply_search("");
        assert_eq!(controller.displayed(), seed.as_slice());
    }

    #[tokio::test]
    async fn test_like_without_session_opens_prompt() {
        let mut controller = offline_controller();
        let before = controller.displayed().to_vec();
        let id = before[0].id.clone();

        assert_eq!(controller.toggle_like(&id).await, LikeOutcome::AuthRequired);
        assert!(controller.is_auth_prompt_open());
        assert_eq!(controller.displayed(), before.as_slice());

        controller.close_auth_prompt();
        assert!(!controller.is_auth_prompt_open());
    }

    #[tokio::test]
    async fn test_like_unknown_wallpaper() {
        let mut controller = offline_controller();
        controller.session = Some(user());
        assert_eq!(controller.toggle_like("missing").await, LikeOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_failed_like_keeps_optimistic_state() {
        let mut controller = offline_controller();
        controller.session = Some(user());
        let original = controller.displayed()[0].clone();

        let outcome = controller.toggle_like(&original.id).await;
        assert_eq!(outcome, LikeOutcome::Settled(Settlement::Failed));

        let shown = &controller.displayed()[0];
        assert!(shown.is_liked);
        assert_eq!(shown.likes, original.likes + 1);
        assert_eq!(controller.pending().in_flight(&original.id), 0);
    }

    #[tokio::test]
    async fn test_like_patches_detail_and_seed() {
        let mut controller = offline_controller();
        controller.session = Some(user());
        let original = controller.displayed()[2].clone();

        controller.apply_search("zzz");
        controller.view(original.clone());

        // Not displayed but selected
        let LikeStart::Started(intent) = controller.begin_like(&original.id) else {
            panic!("like should start");
        };
        assert!(intent.liked);
        assert_eq!(controller.selected().unwrap().likes, original.likes + 1);

        controller.apply_search("");
        let restored = controller
            .displayed()
            .iter()
            .find(|w| w.id == original.id)
            .unwrap();
        assert!(restored.is_liked);
    }

    #[test]
    fn test_out_of_order_confirmations() {
        let mut controller = offline_controller();
        controller.session = Some(user());
        let id = controller.displayed()[0].id.clone();

        let LikeStart::Started(first) = controller.begin_like(&id) else {
            panic!("like should start");
        };
        let LikeStart::Started(second) = controller.begin_like(&id) else {
            panic!("like should start");
        };
        assert!(first.liked);
        assert!(!second.liked);

        assert_eq!(controller.settle::<String>(&second.token, Ok(())), Settlement::Confirmed);
        assert_eq!(
            controller.settle(&first.token, Err("late failure")),
            Settlement::Stale
        );

        // Two toggles cancel out locally
        assert!(!controller.displayed()[0].is_liked);
    }

    #[test]
    fn test_reconciliation_skips_mutated_entries() {
        let mut controller = offline_controller();
        controller.session = Some(user());
        let seed = controller.seed().to_vec();
        let (first, second) = (seed[0].id.clone(), seed[1].id.clone());

        let snapshot = controller.pending().snapshot();
        let LikeStart::Started(intent) = controller.begin_like(&first) else {
            panic!("like should start");
        };

        // Server state observed before the like
        let mut fresh = seed.clone();
        fresh[1].likes = 4242;
        controller.apply_reconciliation(fresh.clone(), &snapshot);

        assert!(controller.displayed()[0].is_liked);
        assert_eq!(controller.displayed()[1].likes, 4242);

        // Still newer than the snapshot after settling
        controller.settle::<String>(&intent.token, Ok(()));
        controller.apply_reconciliation(fresh, &snapshot);
        assert!(controller.displayed()[0].is_liked);
        assert_eq!(controller.seed()[1].id, second);
    }

    #[tokio::test]
    async fn test_like_roundtrip_against_sqlite() {
        let mut controller = sqlite_controller().await;
        assert!(controller.on_session_change(Some(user())).await);

        let original = controller.displayed()[0].clone();
        assert!(!original.is_liked);

        let outcome = controller.toggle_like(&original.id).await;
        assert_eq!(outcome, LikeOutcome::Settled(Settlement::Confirmed));

        let server = controller.service().fetch_for_user("u1").await.unwrap();
        let stored = server.iter().find(|w| w.id == original.id).unwrap();
        assert!(stored.is_liked);
        assert_eq!(stored.likes, original.likes + 1);
        assert_eq!(controller.displayed()[0].likes, stored.likes);
    }

    #[tokio::test]
    async fn test_reconcile_preserves_active_filter() {
        let mut controller = sqlite_controller().await;
        let id = controller.seed()[0].id.clone();
        controller.service().toggle_like(&id, true, "u1").await.unwrap();

        controller.apply_search("cyber");
        let filtered: Vec<_> = controller.displayed().iter().map(|w| w.id.clone()).collect();

        controller.on_session_change(Some(user())).await;
        let after: Vec<_> = controller.displayed().iter().map(|w| w.id.clone()).collect();
        assert_eq!(after, filtered);

        // Seed picked up the like, so clearing the filter shows it
        controller.apply_search("");
        assert!(controller.displayed()[0].is_liked);
    }

    #[tokio::test]
    async fn test_same_session_does_not_reconcile() {
        let mut controller = sqlite_controller().await;
        assert!(controller.on_session_change(Some(user())).await);
        assert!(!controller.on_session_change(Some(user())).await);
        assert!(!controller.on_session_change(None).await);
    }

    #[tokio::test]
    async fn test_switching_users_replaces_like_set() {
        let mut controller = sqlite_controller().await;
        let first = controller.seed()[0].id.clone();
        let second = controller.seed()[1].id.clone();
        controller.service().toggle_like(&first, true, "u1").await.unwrap();
        controller.service().toggle_like(&second, true, "u2").await.unwrap();

        assert!(controller.on_session_change(Some(user())).await);
        let liked: Vec<_> = controller
            .displayed()
            .iter()
            .filter(|w| w.is_liked)
            .map(|w| w.id.clone())
            .collect();
        assert_eq!(liked, vec![first.clone()]);

        // Straight to another identity, no sign-out in between
        let other = UserSession::new("u2", "u2@example.com");
        assert!(controller.on_session_change(Some(other)).await);
        let liked: Vec<_> = controller
            .displayed()
            .iter()
            .filter(|w| w.is_liked)
            .map(|w| w.id.clone())
            .collect();
        assert_eq!(liked, vec![second]);
        assert!(!controller.seed().iter().any(|w| w.id == first && w.is_liked));
    }

    #[tokio::test]
    async fn test_download_counts_and_saves() {
        let mut controller = sqlite_controller().await;
        controller.on_session_change(Some(user())).await;
        let original = controller.displayed()[0].clone();

        let DownloadOutcome::Completed { settlement, saved } = controller.download(&original.id).await
        else {
            panic!("download should complete");
        };
        assert_eq!(settlement, Settlement::Confirmed);
        assert!(saved.unwrap().ends_with(original.download_file_name()));
        assert_eq!(controller.displayed()[0].downloads, original.downloads + 1);

        let stats = controller.service().get_stats().await;
        assert_eq!(stats.total_downloads, 1);
        assert_eq!(controller.download("missing").await, DownloadOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_signals_drive_controller_until_closed() {
        let mut controller = offline_controller();
        let bus = SearchBus::default();
        let session = SessionSource::new();
        let mut sources = SignalSources::new(bus.subscribe(), session.watch());

        // Initial session, nobody signed in yet
        assert!(controller.handle_next_signal(&mut sources).await);
        assert!(controller.session().is_none());

        bus.publish("dark");
        assert!(controller.handle_next_signal(&mut sources).await);
        assert!(controller.displayed().iter().all(|w| w.category == "Dark"));

        session.sign_in(user());
        assert!(controller.handle_next_signal(&mut sources).await);
        assert_eq!(controller.session().unwrap().id, "u1");

        drop(bus);
        drop(session);
        let mut handled = 0;
        while controller.handle_next_signal(&mut sources).await {
            handled += 1;
        }
        assert!(handled <= 1);
        assert!(sources.is_closed());
        assert!(!controller.handle_next_signal(&mut sources).await);
    }
}
