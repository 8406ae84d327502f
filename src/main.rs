/// Wallpaper Gallery
///
/// Loads the gallery from the configured backend and prints the totals,
/// the popular list, the categories and the (optionally filtered) listing.
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wallpaper_gallery::{
    config::GalleryConfig, context::AppContext, error::GalleryResult, FallbackPolicy,
};

#[tokio::main]
async fn main() -> GalleryResult<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wallpaper_gallery=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    print_banner();

    let config = GalleryConfig::from_env()?;
    info!("Backend: {}", config.backend.name());
    let popular_limit = config.popular_limit;

    let ctx = AppContext::new(config).await?;

    let wallpapers = ctx.service.fetch_all(FallbackPolicy::UseFallback).await?;
    let stats = ctx.service.get_stats().await;
    println!(
        "{} wallpapers, {} downloads, {} likes",
        stats.total_wallpapers, stats.total_downloads, stats.total_likes
    );

    match ctx.service.fetch_popular(popular_limit, None).await {
        Ok(popular) => {
            println!("\nPopular:");
            for w in popular {
                println!("  {:<24} {:>6} likes {:>7} downloads", w.title, w.likes, w.downloads);
            }
        }
        Err(e) => warn!("Popular wallpapers unavailable: {}", e),
    }

    println!("\nCategories:");
    for category in ctx.service.fetch_categories().await {
        println!("  {:<12} {}", category.name, category.count);
    }

    let (mut controller, mut sources) = ctx.controller(wallpapers);
    // Current session first
    controller.handle_next_signal(&mut sources).await;
    if let Some(query) = std::env::args().nth(1) {
        ctx.search_bus.publish(query);
        controller.handle_next_signal(&mut sources).await;
    }

    println!("\nGallery ({}):", controller.displayed().len());
    for w in controller.displayed() {
        println!(
            "  {}  {:<24} {:<10} {}",
            w.id, w.title, w.category, w.resolution
        );
    }

    Ok(())
}

fn print_banner() {
    println!(
        r#"
  +--------------------------------+
  |   Wallpaper Gallery v{:<9} |
  +--------------------------------+
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
