//! Resource store — transient file layout and guaranteed cleanup.
//!
//! Every artifact a cycle produces lands in the panel's working directory
//! under a fixed name: `temp.json` for an API response, `temp.<ext>` for a
//! downloaded image, `screenshot.bmp` for a capture buffer, `temp.png` for a
//! clipboard paste. The store deletes all of them when a cycle completes or
//! fails; files outside the working directory (user-chosen local images) are
//! never touched.

use std::path::{Path, PathBuf};

pub const API_RESPONSE_FILE: &str = "temp.json";
pub const SCREENSHOT_FILE: &str = "screenshot.bmp";
pub const CLIPBOARD_FILE: &str = "temp.png";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to create working directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),
}

/// Handle to the panel's working directory. Cloned into worker threads so
/// they can place artifacts where the driver expects to find them.
#[derive(Debug, Clone)]
pub struct ResourceStore {
    dir: PathBuf,
}

impl ResourceStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: PathBuf) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::CreateDir(dir.clone(), e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path for an API's JSON response.
    pub fn api_response_path(&self) -> PathBuf {
        self.dir.join(API_RESPONSE_FILE)
    }

    /// Path for a downloaded image with the given extension.
    pub fn downloaded_image_path(&self, ext: &str) -> PathBuf {
        self.dir.join(format!("temp.{}", ext))
    }

    /// Path for the capture worker's bitmap.
    pub fn screenshot_path(&self) -> PathBuf {
        self.dir.join(SCREENSHOT_FILE)
    }

    /// Path for a clipboard paste.
    pub fn clipboard_path(&self) -> PathBuf {
        self.dir.join(CLIPBOARD_FILE)
    }

    /// Delete every transient this store may have produced. `ext` is the
    /// extension of the most recent download, if any. Missing files are not
    /// an error — cleanup runs on both success and failure paths.
    pub fn cleanup(&self, ext: Option<&str>) {
        self.remove(&self.api_response_path());
        if let Some(ext) = ext {
            self.remove(&self.downloaded_image_path(ext));
        }
        self.remove(&self.screenshot_path());
        self.remove(&self.clipboard_path());
    }

    /// Delete just the capture buffer, kept separate because capture cycles
    /// clean up per-cycle without disturbing a downloaded image.
    pub fn remove_screenshot(&self) {
        self.remove(&self.screenshot_path());
    }

    fn remove(&self, path: &Path) {
        if path.exists() {
            match std::fs::remove_file(path) {
                Ok(()) => log::debug!("[STORE] removed {}", path.display()),
                Err(e) => log::warn!("[STORE] failed to remove {}: {}", path.display(), e),
            }
        }
    }
}
