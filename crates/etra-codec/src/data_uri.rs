use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

/// Largest media file accepted for inlining (5 MiB). Callers check this
/// before encoding; the codec itself does not.
pub const MAX_MEDIA_BYTES: usize = 5 * 1024 * 1024;

/// A decoded `data:<mime>;base64,<payload>` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl DataUri {
    pub fn new(mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime: mime.into(),
            bytes,
        }
    }

    /// Render as a self-contained base64 data URI.
    pub fn to_uri(&self) -> String {
        let mime = if self.mime.is_empty() {
            "application/octet-stream"
        } else {
            &self.mime
        };
        format!("data:{};base64,{}", mime, BASE64.encode(&self.bytes))
    }

    /// Parse a base64 data URI. Returns `None` for anything else,
    /// including percent-encoded (non-base64) data URIs.
    pub fn parse(uri: &str) -> Option<Self> {
        let rest = uri.strip_prefix("data:")?;
        let (meta, data) = rest.split_once(',')?;
        let mime = meta.strip_suffix(";base64")?;
        let bytes = BASE64.decode(data).ok()?;
        Some(Self {
            mime: mime.to_string(),
            bytes,
        })
    }

    pub fn is_image(&self) -> bool {
        self.mime.starts_with("image/")
    }
}
