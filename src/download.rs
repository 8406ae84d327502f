/// Asset download facility
///
/// Fetches a wallpaper's image and saves it locally as
/// `wallpaper-{id}.{format}`.
use crate::{
    error::{GalleryError, GalleryResult},
    models::Wallpaper,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Fetch-and-save backend
#[async_trait]
pub trait AssetDownloader: Send + Sync {
    /// Save the wallpaper's asset, returning where it was written
    async fn save(&self, wallpaper: &Wallpaper) -> GalleryResult<PathBuf>;
}

/// Downloads over HTTP into a target directory
#[derive(Clone)]
pub struct HttpDownloader {
    http_client: reqwest::Client,
    target_dir: PathBuf,
}

impl HttpDownloader {
    pub fn new(target_dir: PathBuf) -> GalleryResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(format!("wallpaper-gallery/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GalleryError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            target_dir,
        })
    }

    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    async fn fetch(&self, url: &str) -> GalleryResult<Vec<u8>> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| GalleryError::Download(format!("Failed to fetch {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(GalleryError::Download(format!(
                "Fetching {} returned {}",
                url,
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| GalleryError::Download(format!("Failed to read body of {}: {}", url, e)))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl AssetDownloader for HttpDownloader {
    async fn save(&self, wallpaper: &Wallpaper) -> GalleryResult<PathBuf> {
        debug!("Downloading {} from {}", wallpaper.id, wallpaper.url);
        let data = self.fetch(&wallpaper.url).await?;
        let path = write_asset(&self.target_dir, wallpaper, &data).await?;
        info!("Saved {} ({} bytes)", path.display(), data.len());
        Ok(path)
    }
}

/// Write asset bytes under the wallpaper's download file name
pub async fn write_asset(dir: &Path, wallpaper: &Wallpaper, data: &[u8]) -> GalleryResult<PathBuf> {
    fs::create_dir_all(dir).await?;
    let path = dir.join(wallpaper.download_file_name());
    fs::write(&path, data).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_write_asset_uses_download_name() {
        let dir = tempdir().unwrap();
        let mut wallpaper = fallback::wallpapers().remove(0);
        wallpaper.format = None;

        let path = write_asset(&dir.path().join("saved"), &wallpaper, b"jpeg bytes")
            .await
            .unwrap();

        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            format!("wallpaper-{}.jpg", wallpaper.id)
        );
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"jpeg bytes");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_download_error() {
        let dir = tempdir().unwrap();
        let downloader = HttpDownloader::new(dir.path().to_path_buf()).unwrap();
        let mut wallpaper = fallback::wallpapers().remove(0);
        wallpaper.url = "http://127.0.0.1:9/missing.webp".to_string();

        let err = downloader.save(&wallpaper).await.unwrap_err();
        assert!(matches!(err, GalleryError::Download(_)));
    }
}
