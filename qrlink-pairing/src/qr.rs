use anyhow::Context;
use base64::Engine;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QrImageError {
    #[error("qr payload is not a data uri")]
    NotADataUri,
    #[error("qr payload is not base64 encoded")]
    NotBase64,
    #[error("qr payload has invalid base64: {0}")]
    InvalidBase64(String),
}

/// The decoded image behind a `data:<mime>;base64,<data>` QR payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrImage {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl QrImage {
    pub fn from_data_uri(payload: &str) -> Result<Self, QrImageError> {
        let rest = payload
            .trim()
            .strip_prefix("data:")
            .ok_or(QrImageError::NotADataUri)?;
        let (header, data) = rest.split_once(',').ok_or(QrImageError::NotADataUri)?;

        let mut parts = header.split(';');
        let mime = parts.next().unwrap_or_default();
        if !parts.any(|p| p.eq_ignore_ascii_case("base64")) {
            return Err(QrImageError::NotBase64);
        }

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data.trim())
            .map_err(|e| QrImageError::InvalidBase64(e.to_string()))?;

        Ok(Self {
            mime: if mime.is_empty() {
                "text/plain".to_string()
            } else {
                mime.to_ascii_lowercase()
            },
            bytes,
        })
    }

    /// File extension matching the mime type.
    pub fn extension(&self) -> &str {
        match self.mime.as_str() {
            "image/png" => "png",
            "image/jpeg" | "image/jpg" => "jpg",
            "image/gif" => "gif",
            "image/svg+xml" => "svg",
            "image/webp" => "webp",
            _ => "bin",
        }
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::write(path, &self.bytes).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}
