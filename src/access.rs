/// Wallpaper Access Layer
///
/// Stateless domain queries composed from gateway calls. Every list result is
/// annotated with `is_liked` relative to the acting user (all `false` when no
/// user is given).
use crate::{
    error::{GatewayError, GatewayResult},
    fallback,
    gateway::{
        DataGateway, Filter, SelectQuery, Table, RPC_DECREMENT_LIKES, RPC_INCREMENT_DOWNLOADS,
        RPC_INCREMENT_LIKES,
    },
    models::{Category, GalleryStats, LikedId, Wallpaper},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// What `fetch_all` does when the backend fails or has nothing to show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Serve the fallback dataset instead of failing
    UseFallback,
    /// Return the gateway error to the caller
    Propagate,
}

/// Counter adjustments on a wallpaper row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterChange {
    LikeAdded,
    LikeRemoved,
    Downloaded,
}

impl CounterChange {
    fn procedure(&self) -> &'static str {
        match self {
            CounterChange::LikeAdded => RPC_INCREMENT_LIKES,
            CounterChange::LikeRemoved => RPC_DECREMENT_LIKES,
            CounterChange::Downloaded => RPC_INCREMENT_DOWNLOADS,
        }
    }

    fn column(&self) -> &'static str {
        match self {
            CounterChange::LikeAdded | CounterChange::LikeRemoved => "likes",
            CounterChange::Downloaded => "downloads",
        }
    }

    /// New counter value; never below zero
    pub fn apply(&self, current: u64) -> u64 {
        match self {
            CounterChange::LikeAdded | CounterChange::Downloaded => current.saturating_add(1),
            CounterChange::LikeRemoved => current.saturating_sub(1),
        }
    }
}

/// Domain operations over the data gateway
#[derive(Clone)]
pub struct WallpaperService {
    gateway: Arc<dyn DataGateway>,
}

impl WallpaperService {
    pub fn new(gateway: Arc<dyn DataGateway>) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Arc<dyn DataGateway> {
        &self.gateway
    }

    /// All wallpapers, newest first, none marked as liked.
    ///
    /// With `FallbackPolicy::UseFallback` this never fails: a gateway error or
    /// an empty table yields the fallback dataset.
    pub async fn fetch_all(&self, policy: FallbackPolicy) -> GatewayResult<Vec<Wallpaper>> {
        let result = self.select_wallpapers(&newest_first()).await;

        match (result, policy) {
            (Ok(wallpapers), FallbackPolicy::UseFallback) if wallpapers.is_empty() => {
                debug!("No wallpapers in backend, serving fallback dataset");
                Ok(fallback::wallpapers())
            }
            (Err(e), FallbackPolicy::UseFallback) => {
                warn!("Backend failed, using fallback dataset: {}", e);
                Ok(fallback::wallpapers())
            }
            (result, _) => result,
        }
    }

    /// All wallpapers merged with the user's like set. Either failure propagates.
    pub async fn fetch_for_user(&self, user_id: &str) -> GatewayResult<Vec<Wallpaper>> {
        let wallpapers = self.select_wallpapers(&newest_first()).await?;
        let liked = self.liked_ids(user_id, None).await?;

        debug!(
            "Merged {} likes for user {} into {} wallpapers",
            liked.len(),
            user_id,
            wallpapers.len()
        );
        Ok(merge_likes(wallpapers, &liked))
    }

    /// Exact category match, newest first
    pub async fn fetch_by_category(
        &self,
        category: &str,
        user_id: Option<&str>,
    ) -> GatewayResult<Vec<Wallpaper>> {
        let query = newest_first().filter(Filter::eq("category", category));
        let wallpapers = self.select_wallpapers(&query).await?;
        self.annotate(wallpapers, user_id).await
    }

    /// Case-insensitive substring match on title or category, newest first
    pub async fn search(&self, query: &str, user_id: Option<&str>) -> GatewayResult<Vec<Wallpaper>> {
        let pattern = Filter::contains_pattern(query);
        let select = newest_first().filter(Filter::Or(vec![
            Filter::ilike("title", pattern.clone()),
            Filter::ilike("category", pattern),
        ]));

        let wallpapers = self.select_wallpapers(&select).await?;
        debug!("Search {:?} matched {} wallpapers", query, wallpapers.len());
        self.annotate(wallpapers, user_id).await
    }

    /// Most liked first, then most downloaded
    pub async fn fetch_popular(
        &self,
        limit: usize,
        user_id: Option<&str>,
    ) -> GatewayResult<Vec<Wallpaper>> {
        let query = SelectQuery::on(Table::Wallpapers)
            .order_by("likes", false)
            .order_by("downloads", false)
            .limit(limit);

        let wallpapers = self.select_wallpapers(&query).await?;
        self.annotate(wallpapers, user_id).await
    }

    /// Set or clear a like.
    ///
    /// The relation row and the counter are written by independent calls; if
    /// the counter update fails the relation change stays in place.
    pub async fn toggle_like(&self, wallpaper_id: &str, liked: bool, user_id: &str) -> GatewayResult<()> {
        let pair = [
            Filter::eq("user_id", user_id),
            Filter::eq("wallpaper_id", wallpaper_id),
        ];

        if liked {
            let existing = self
                .gateway
                .select(&SelectQuery {
                    filters: pair.to_vec(),
                    ..SelectQuery::on(Table::UserLikes).columns(&["id"])
                })
                .await?;
            if !existing.is_empty() {
                debug!("User {} already likes {}", user_id, wallpaper_id);
                return Ok(());
            }

            self.gateway
                .insert(
                    Table::UserLikes,
                    json!({ "user_id": user_id, "wallpaper_id": wallpaper_id }),
                )
                .await
                .inspect_err(|e| error!("Failed to add like on {}: {}", wallpaper_id, e))?;
            self.adjust_counter(wallpaper_id, CounterChange::LikeAdded).await
        } else {
            self.gateway
                .delete(Table::UserLikes, &pair)
                .await
                .inspect_err(|e| error!("Failed to remove like on {}: {}", wallpaper_id, e))?;
            self.adjust_counter(wallpaper_id, CounterChange::LikeRemoved).await
        }
    }

    /// Bump the download counter only; no download row is written
    pub async fn increment_downloads(&self, wallpaper_id: &str) -> GatewayResult<()> {
        self.adjust_counter(wallpaper_id, CounterChange::Downloaded).await
    }

    /// Append a download row for the user, then bump the counter
    pub async fn record_download(&self, user_id: &str, wallpaper_id: &str) -> GatewayResult<()> {
        self.gateway
            .insert(
                Table::UserDownloads,
                json!({ "user_id": user_id, "wallpaper_id": wallpaper_id }),
            )
            .await
            .inspect_err(|e| error!("Failed to record download of {}: {}", wallpaper_id, e))?;

        self.adjust_counter(wallpaper_id, CounterChange::Downloaded).await
    }

    /// Gallery totals. The three counts run concurrently; a failed count reads as zero.
    pub async fn get_stats(&self) -> GalleryStats {
        let (wallpapers, downloads, likes) = futures::join!(
            self.gateway.count(Table::Wallpapers, &[]),
            self.gateway.count(Table::UserDownloads, &[]),
            self.gateway.count(Table::UserLikes, &[]),
        );

        GalleryStats {
            total_wallpapers: count_or_zero(Table::Wallpapers, wallpapers),
            total_downloads: count_or_zero(Table::UserDownloads, downloads),
            total_likes: count_or_zero(Table::UserLikes, likes),
        }
    }

    /// Wallpapers the user likes, most recently liked first
    pub async fn get_user_favorites(&self, user_id: &str) -> GatewayResult<Vec<Wallpaper>> {
        let likes_query = SelectQuery::on(Table::UserLikes)
            .columns(&["wallpaper_id"])
            .filter(Filter::eq("user_id", user_id))
            .order_by("created_at", false);
        let likes: Vec<LikedId> = decode_rows(self.gateway.select(&likes_query).await?)?;
        if likes.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<&str> = likes.iter().map(|l| l.wallpaper_id.as_str()).collect();
        let query = SelectQuery::on(Table::Wallpapers).filter(Filter::is_in("id", ids));
        let mut by_id: HashMap<String, Wallpaper> = self
            .select_wallpapers(&query)
            .await?
            .into_iter()
            .map(|w| (w.id.clone(), w))
            .collect();

        Ok(likes
            .iter()
            .filter_map(|l| by_id.remove(&l.wallpaper_id))
            .map(|mut w| {
                w.is_liked = true;
                w
            })
            .collect())
    }

    /// Category summary over everything the gallery would show
    pub async fn fetch_categories(&self) -> Vec<Category> {
        let wallpapers = self
            .fetch_all(FallbackPolicy::UseFallback)
            .await
            .unwrap_or_else(|_| fallback::wallpapers());
        fallback::summarize_categories(&wallpapers)
    }

    /// Remote counter procedure first, manual read-modify-write if it fails.
    ///
    /// The manual path can lose updates when callers race.
    async fn adjust_counter(&self, wallpaper_id: &str, change: CounterChange) -> GatewayResult<()> {
        let procedure = change.procedure();
        let rpc = self
            .gateway
            .rpc(procedure, json!({ "wallpaper_id": wallpaper_id }))
            .await;

        let Err(rpc_error) = rpc else {
            return Ok(());
        };
        warn!(
            "{} failed for {}, updating manually: {}",
            procedure, wallpaper_id, rpc_error
        );

        let column = change.column();
        let query = SelectQuery::on(Table::Wallpapers)
            .columns(&[column])
            .filter(Filter::eq("id", wallpaper_id))
            .limit(1);
        let rows = self.gateway.select(&query).await?;
        let Some(row) = rows.first() else {
            debug!("Wallpaper {} not found, counter left alone", wallpaper_id);
            return Ok(());
        };

        let current = row.get(column).and_then(Value::as_u64).unwrap_or(0);
        let mut patch = serde_json::Map::new();
        patch.insert(column.to_string(), json!(change.apply(current)));
        patch.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));
        self.gateway
            .update(
                Table::Wallpapers,
                Value::Object(patch),
                &[Filter::eq("id", wallpaper_id)],
            )
            .await
            .inspect_err(|e| error!("Manual {} update failed for {}: {}", column, wallpaper_id, e))?;

        Ok(())
    }

    async fn select_wallpapers(&self, query: &SelectQuery) -> GatewayResult<Vec<Wallpaper>> {
        let mut wallpapers: Vec<Wallpaper> = decode_rows(self.gateway.select(query).await?)?;
        for wallpaper in &mut wallpapers {
            wallpaper.is_liked = false;
        }
        Ok(wallpapers)
    }

    /// Liked wallpaper ids for a user, optionally restricted to `scope`
    async fn liked_ids(&self, user_id: &str, scope: Option<&[Wallpaper]>) -> GatewayResult<HashSet<String>> {
        let mut query = SelectQuery::on(Table::UserLikes)
            .columns(&["wallpaper_id"])
            .filter(Filter::eq("user_id", user_id));
        if let Some(scope) = scope {
            query = query.filter(Filter::is_in(
                "wallpaper_id",
                scope.iter().map(|w| w.id.as_str()),
            ));
        }

        let rows: Vec<LikedId> = decode_rows(self.gateway.select(&query).await?)?;
        Ok(rows.into_iter().map(|r| r.wallpaper_id).collect())
    }

    async fn annotate(
        &self,
        wallpapers: Vec<Wallpaper>,
        user_id: Option<&str>,
    ) -> GatewayResult<Vec<Wallpaper>> {
        let Some(user_id) = user_id else {
            return Ok(wallpapers);
        };
        if wallpapers.is_empty() {
            return Ok(wallpapers);
        }

        let liked = self.liked_ids(user_id, Some(&wallpapers)).await?;
        Ok(merge_likes(wallpapers, &liked))
    }
}

fn newest_first() -> SelectQuery {
    SelectQuery::on(Table::Wallpapers).order_by("created_at", false)
}

fn merge_likes(wallpapers: Vec<Wallpaper>, liked: &HashSet<String>) -> Vec<Wallpaper> {
    wallpapers
        .into_iter()
        .map(|mut w| {
            w.is_liked = liked.contains(&w.id);
            w
        })
        .collect()
}

fn decode_rows<T: for<'de> Deserialize<'de>>(rows: Vec<Value>) -> GatewayResult<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(GatewayError::from))
        .collect()
}

fn count_or_zero(table: Table, result: GatewayResult<u64>) -> u64 {
    result.unwrap_or_else(|e| {
        error!("Error counting {}: {}", table.as_str(), e);
        0
    })
}
