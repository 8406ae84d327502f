/// Fallback dataset shown when the backend is unreachable or empty
///
/// Generated from a fixed seed, so every call (and every run) yields the same
/// 36 wallpapers spread over the six gallery categories.
use crate::models::{Category, Wallpaper};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use std::sync::OnceLock;

/// Number of generated wallpapers
pub const FALLBACK_SIZE: usize = 36;

/// Gallery categories, as shown on the home page
pub const CATEGORIES: [&str; 6] = ["Cyberpunk", "Hacker", "Minimalist", "Abstract", "Nature", "Dark"];

const SEED: u64 = 0x5741_4c4c_5041_5045;
/// 2025-01-01T00:00:00Z
const BASE_TIMESTAMP: i64 = 1_735_689_600;

const WIDTHS: [u32; 3] = [1920, 2560, 3840];
const HEIGHTS: [u32; 3] = [1080, 1440, 2160];
const COLORS: [&str; 6] = ["FF00FF", "00FF00", "FFFF00", "00FFFF", "FF0000", "000000"];

static DATASET: OnceLock<Vec<Wallpaper>> = OnceLock::new();

/// The fallback wallpapers, none marked as liked
pub fn wallpapers() -> Vec<Wallpaper> {
    DATASET.get_or_init(|| generate(FALLBACK_SIZE, SEED)).clone()
}

/// Category summary over the fallback dataset
pub fn categories() -> Vec<Category> {
    summarize_categories(&wallpapers())
}

/// Count wallpapers per category, ordered by name
pub fn summarize_categories(wallpapers: &[Wallpaper]) -> Vec<Category> {
    let mut counts = std::collections::BTreeMap::<&str, u64>::new();
    for wallpaper in wallpapers {
        *counts.entry(wallpaper.category.as_str()).or_default() += 1;
    }

    counts
        .into_iter()
        .map(|(name, count)| Category {
            id: name.to_lowercase(),
            name: name.to_string(),
            count,
        })
        .collect()
}

fn generate(count: usize, seed: u64) -> Vec<Wallpaper> {
    let mut rng = StdRng::seed_from_u64(seed);
    let base = DateTime::<Utc>::from_timestamp(BASE_TIMESTAMP, 0).unwrap_or_default();

    (0..count)
        .map(|_| {
            let category = *CATEGORIES.choose(&mut rng).unwrap_or(&CATEGORIES[0]);
            let width = *WIDTHS.choose(&mut rng).unwrap_or(&WIDTHS[0]);
            let height = *HEIGHTS.choose(&mut rng).unwrap_or(&HEIGHTS[0]);
            let color = *COLORS.choose(&mut rng).unwrap_or(&COLORS[0]);

            let created_at = base - Duration::minutes(rng.gen_range(60 * 24..=60 * 24 * 365));
            let updated_at = (base - Duration::minutes(rng.gen_range(0..=60 * 24 * 7))).max(created_at);

            Wallpaper {
                id: uuid::Builder::from_random_bytes(rng.gen()).into_uuid().to_string(),
                title: format!("{} {}", category, rng.gen_range(1..=999)),
                description: Some(format!(
                    "Beautiful {} wallpaper for your desktop",
                    category.to_lowercase()
                )),
                category: category.to_string(),
                url: placeholder_url(width, height, color, category),
                alt_text: Some(format!("{} wallpaper", category)),
                width: Some(width),
                height: Some(height),
                file_size: Some(rng.gen_range(1_000_000..=5_000_000)),
                format: Some("webp".to_string()),
                resolution: format!("{}x{}", width, height),
                downloads: rng.gen_range(50..=50_000),
                likes: rng.gen_range(5..=5_000),
                is_liked: false,
                tags: vec![category.to_lowercase(), "wallpaper".to_string(), "hd".to_string()],
                created_at,
                updated_at,
                is_featured: rng.gen_bool(0.2),
            }
        })
        .collect()
}

fn placeholder_url(width: u32, height: u32, color: &str, category: &str) -> String {
    format!(
        "https://img-wrapper.vercel.app/image?url=https://placehold.co/{}x{}/{}/FFFFFF?text={}",
        width,
        height,
        color,
        category.to_uppercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_dataset_shape() {
        let data = wallpapers();
        assert_eq!(data.len(), FALLBACK_SIZE);

        for w in &data {
            assert!(CATEGORIES.contains(&w.category.as_str()));
            assert!(WIDTHS.contains(&w.width.unwrap()));
            assert!(HEIGHTS.contains(&w.height.unwrap()));
            assert_eq!(w.resolution, format!("{}x{}", w.width.unwrap(), w.height.unwrap()));
            assert!((50..=50_000).contains(&w.downloads));
            assert!((5..=5_000).contains(&w.likes));
            assert!(!w.is_liked);
            assert_eq!(w.format.as_deref(), Some("webp"));
            assert_eq!(w.tags[0], w.category.to_lowercase());
            assert!(w.updated_at >= w.created_at);
        }

        let ids: HashSet<_> = data.iter().map(|w| w.id.clone()).collect();
        assert_eq!(ids.len(), FALLBACK_SIZE);
    }

    #[test]
    fn test_dataset_is_deterministic() {
        assert_eq!(wallpapers(), wallpapers());
        assert_eq!(generate(FALLBACK_SIZE, SEED), wallpapers());
        assert_ne!(generate(FALLBACK_SIZE, SEED + 1), wallpapers());
    }

    #[test]
    fn test_category_summary_counts_everything() {
        let summary = categories();
        let total: u64 = summary.iter().map(|c| c.count).sum();
        assert_eq!(total, FALLBACK_SIZE as u64);

        let names: Vec<_> = summary.iter().map(|c| c.name.clone()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert!(summary.iter().all(|c| c.id == c.name.to_lowercase()));
    }
}
