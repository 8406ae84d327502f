/// Wallpaper Gallery
///
/// Data side of a browsable, searchable wallpaper gallery: a backend gateway,
/// the wallpaper access layer, and the controller that keeps a displayed list
/// in sync with optimistic like/download updates.

pub mod access;
pub mod config;
pub mod context;
pub mod controller;
pub mod download;
pub mod error;
pub mod events;
pub mod fallback;
pub mod gateway;
pub mod models;
pub mod session;

pub use access::{FallbackPolicy, WallpaperService};
pub use context::AppContext;
pub use controller::GalleryController;
pub use error::{GalleryError, GalleryResult, GatewayError, GatewayResult};
pub use models::{Category, GalleryStats, UserSession, Wallpaper};
