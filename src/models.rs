/// Gallery data models
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A wallpaper row, annotated with the acting user's like state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallpaper {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: String,
    pub url: String,
    #[serde(default)]
    pub alt_text: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub format: Option<String>,
    pub resolution: String,
    #[serde(default)]
    pub downloads: u64,
    #[serde(default)]
    pub likes: u64,
    /// Session-relative; never stored on the row itself
    #[serde(rename = "isLiked", default)]
    pub is_liked: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub is_featured: bool,
}

impl Wallpaper {
    /// Row representation for writes (drops the session-relative flag)
    pub fn to_row(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let Some(obj) = value.as_object_mut() {
            obj.remove("isLiked");
            obj.retain(|_, v| !v.is_null());
        }
        value
    }

    /// File name used when the asset is saved locally
    pub fn download_file_name(&self) -> String {
        let format = self
            .format
            .as_deref()
            .filter(|f| !f.is_empty())
            .unwrap_or("jpg");
        format!("wallpaper-{}.{}", self.id, format)
    }

    /// Case-insensitive substring match on title or category.
    /// `needle` must already be lowercase.
    pub fn matches_query(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle) || self.category.to_lowercase().contains(needle)
    }
}

/// Like relation id projection (`select=wallpaper_id`)
#[derive(Debug, Clone, Deserialize)]
pub struct LikedId {
    pub wallpaper_id: String,
}

/// Like relation row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikeRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub user_id: String,
    pub wallpaper_id: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Download relation row (append-only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub user_id: String,
    pub wallpaper_id: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Authenticated session supplied by the auth provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    pub id: String,
    pub email: String,
}

impl UserSession {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
        }
    }
}

/// Aggregate gallery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryStats {
    pub total_wallpapers: u64,
    pub total_downloads: u64,
    pub total_likes: u64,
}

/// Category summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Wallpaper {
        Wallpaper {
            id: "w1".to_string(),
            title: "Neon Alley".to_string(),
            description: None,
            category: "Cyberpunk".to_string(),
            url: "https://example.com/w1.png".to_string(),
            alt_text: None,
            width: Some(1920),
            height: Some(1080),
            file_size: None,
            format: None,
            resolution: "1920x1080".to_string(),
            downloads: 3,
            likes: 7,
            is_liked: true,
            tags: vec!["cyberpunk".to_string()],
            created_at: Utc::now(),
            updated_at: Utc::now(),
            is_featured: false,
        }
    }

    #[test]
    fn test_row_drops_session_flag_and_nulls() {
        let row = sample().to_row();
        let obj = row.as_object().unwrap();

        assert!(!obj.contains_key("isLiked"));
        assert!(!obj.contains_key("description"));
        assert_eq!(obj["likes"], 7);
    }

    #[test]
    fn test_download_file_name_defaults_to_jpg() {
        let mut w = sample();
        assert_eq!(w.download_file_name(), "wallpaper-w1.jpg");

        w.format = Some("webp".to_string());
        assert_eq!(w.download_file_name(), "wallpaper-w1.webp");
    }

    #[test]
    fn test_matches_query_on_title_or_category() {
        let w = sample();
        assert!(w.matches_query("cyber"));
        assert!(w.matches_query("alley"));
        assert!(!w.matches_query("nature"));
    }

    #[test]
    fn test_row_deserializes_without_optional_fields() {
        let json = serde_json::json!({
            "id": "x",
            "title": "Calm",
            "category": "Nature",
            "url": "https://example.com/x.jpg",
            "resolution": "2560x1440",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-02T00:00:00Z"
        });

        let w: Wallpaper = serde_json::from_value(json).unwrap();
        assert_eq!(w.likes, 0);
        assert!(!w.is_liked);
        assert!(w.tags.is_empty());
    }

    #[test]
    fn test_stats_serialize_camel_case() {
        let stats = GalleryStats::default();
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["totalWallpapers"], 0);
        assert_eq!(json["totalLikes"], 0);
    }
}
