// 📷 Media Capture - camera/gallery produce a local file handle

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where the image came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaSource {
    Camera,
    Gallery,
}

/// A captured file, ready to attach to a multipart submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaHandle {
    pub path: PathBuf,
    pub mime: String,
}

impl MediaHandle {
    /// Build a handle, inferring the MIME type from the file extension
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mime = infer_mime(&path).to_string();
        MediaHandle { path, mime }
    }

    /// File name sent in the multipart part
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string())
    }
}

/// Infer MIME type from extension; unknown extensions fall back to JPEG,
/// which is what device cameras produce.
pub fn infer_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "png" => "image/png",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "gif" => "image/gif",
        "pdf" => "application/pdf",
        _ => "image/jpeg",
    }
}

/// Camera / gallery collaborator
///
/// Returns `Ok(None)` when the user dismisses the picker.
#[async_trait]
pub trait MediaCapture: Send + Sync {
    async fn capture(&self, source: MediaSource) -> Result<Option<MediaHandle>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_inference() {
        assert_eq!(infer_mime(Path::new("/tmp/a.PNG")), "image/png");
        assert_eq!(infer_mime(Path::new("/tmp/a.jpeg")), "image/jpeg");
        assert_eq!(infer_mime(Path::new("/tmp/aadhaar.pdf")), "application/pdf");
        assert_eq!(infer_mime(Path::new("/tmp/noext")), "image/jpeg");
    }

    #[test]
    fn test_handle_file_name() {
        let handle = MediaHandle::from_path("/data/cache/profile.webp");
        assert_eq!(handle.mime, "image/webp");
        assert_eq!(handle.file_name(), "profile.webp");
    }
}
