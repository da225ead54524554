//! The source file a pipeline invocation works on.

use crate::error::DerivativeError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A validated source: an existing, readable regular file and its declared
/// MIME type.
///
/// `id` keys the derivative locations. It defaults to a digest of the
/// canonical path, so two uploads never share derivatives just because their
/// names agree. Explicit ids keep `[A-Za-z0-9]` and encode every other byte
/// as `_xx`, which keeps distinct ids distinct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceDescriptor {
    path: PathBuf,
    mime_type: String,
    id: String,
    uri: Option<String>,
}

impl SourceDescriptor {
    /// Validate `path` and describe it as `mime_type`.
    ///
    /// # Errors
    /// [`DerivativeError::FileNotFound`], [`DerivativeError::NotARegularFile`]
    /// or [`DerivativeError::PermissionDenied`].
    pub fn new(path: impl Into<PathBuf>, mime_type: impl Into<String>) -> Result<Self, DerivativeError> {
        let path = path.into();
        validate(&path)?;

        let id = path_digest(&path);

        debug!("source {} as {}", path.display(), id);
        Ok(Self {
            path,
            mime_type: mime_type.into(),
            id,
            uri: None,
        })
    }

    /// Key derivatives under `id` (encoded) instead of the path digest.
    pub fn with_id(mut self, id: &str) -> Self {
        let id = sanitize_id(id);
        if !id.is_empty() {
            self.id = id;
        }
        self
    }

    /// External reference passed to the text extractor.
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }
}

fn validate(path: &Path) -> Result<(), DerivativeError> {
    let meta = match std::fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(DerivativeError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(_) => {
            return Err(DerivativeError::FileNotFound {
                path: path.to_path_buf(),
            })
        }
    };
    if !meta.is_file() {
        return Err(DerivativeError::NotARegularFile {
            path: path.to_path_buf(),
        });
    }

    // Check read permission by attempting to open
    match std::fs::File::open(path) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(DerivativeError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(_) => Err(DerivativeError::FileNotFound {
            path: path.to_path_buf(),
        }),
    }
}

/// Hex digits of the path digest used as the default id.
const DIGEST_LEN: usize = 16;

fn path_digest(path: &Path) -> String {
    let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let hash = blake3::hash(canonical.as_os_str().as_encoded_bytes());
    hash.to_hex().as_str()[..DIGEST_LEN].to_string()
}

fn sanitize_id(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        if b.is_ascii_alphanumeric() {
            out.push(char::from(b));
        } else {
            out.push_str(&format!("_{b:02x}"));
        }
    }
    out
}
