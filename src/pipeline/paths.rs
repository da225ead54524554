//! Deterministic derivative locations.
//!
//! A location is a pure function of the derivatives root, the source id,
//! the derivative kind, the extension and the optional page index:
//!
//! ```text
//! <root>/ab/c1/23/x-<segment>[-<page:06>].<ext>     (id = "abc123x")
//! ```
//!
//! The id is split into a pair tree so one directory never holds the
//! derivatives of every upload. Re-running generation for the same source
//! resolves to the same paths and overwrites in place. Page numbers are
//! zero-padded to six digits, so lexicographic order is page order for any
//! document under a million pages.
//!
//! The root is made absolute on construction; a relative root would turn
//! into the host part of a `file://` URL.

use crate::error::DerivativeError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// What a derivative is. Determines its path segment and default extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DerivativeKind {
    /// Small preview raster.
    Thumbnail,
    /// Multi-resolution tiled JPEG 2000 for deep-zoom viewers.
    TilePyramid,
    /// Extracted document text.
    FullText,
    /// One rasterised page of a multi-page document.
    PageBitmap,
    /// Audio/video access copy.
    Rendition,
}

impl DerivativeKind {
    pub const ALL: [DerivativeKind; 5] = [
        DerivativeKind::Thumbnail,
        DerivativeKind::TilePyramid,
        DerivativeKind::FullText,
        DerivativeKind::PageBitmap,
        DerivativeKind::Rendition,
    ];

    /// Path segment used in the derivative file name.
    pub fn segment(self) -> &'static str {
        match self {
            DerivativeKind::Thumbnail => "thumbnail",
            DerivativeKind::TilePyramid => "zoomable",
            DerivativeKind::FullText => "fulltext",
            DerivativeKind::PageBitmap => "page",
            DerivativeKind::Rendition => "rendition",
        }
    }

    /// Extension written for this kind; renditions take theirs from config.
    pub fn default_extension(self) -> Option<&'static str> {
        match self {
            DerivativeKind::Thumbnail => Some("jpg"),
            DerivativeKind::TilePyramid => Some("jp2"),
            DerivativeKind::FullText => Some("txt"),
            DerivativeKind::PageBitmap => Some("bmp"),
            DerivativeKind::Rendition => None,
        }
    }

    fn from_segment(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.segment() == segment)
    }
}

impl fmt::Display for DerivativeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DerivativeKind::Thumbnail => "thumbnail",
            DerivativeKind::TilePyramid => "tile-pyramid",
            DerivativeKind::FullText => "full-text",
            DerivativeKind::PageBitmap => "page-bitmap",
            DerivativeKind::Rendition => "rendition",
        };
        f.write_str(s)
    }
}

/// Split an id into two-character directory segments: `abc123x` → `ab/c1/23/x`.
pub fn pair_path(id: &str) -> PathBuf {
    let chars: Vec<char> = id.chars().collect();
    chars
        .chunks(2)
        .map(|pair| pair.iter().collect::<String>())
        .collect()
}

/// Computes and enumerates derivative locations for one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivativePathResolver {
    root: PathBuf,
    scheme: String,
    id: String,
}

impl DerivativePathResolver {
    pub fn new(root: impl Into<PathBuf>, scheme: impl Into<String>, id: impl Into<String>) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        Self {
            root,
            scheme: scheme.into(),
            id: id.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding this source's derivatives, and the file-name prefix
    /// (last pair-tree segment followed by `-`).
    fn base(&self) -> (PathBuf, String) {
        let pairs = pair_path(&self.id);
        let leaf = pairs
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = match pairs.parent() {
            Some(parent) => self.root.join(parent),
            None => self.root.clone(),
        };
        (dir, format!("{leaf}-"))
    }

    /// Location of the `kind` derivative with `extension`, optionally for one page.
    pub fn path_for(&self, kind: DerivativeKind, extension: &str, page: Option<usize>) -> PathBuf {
        let (dir, prefix) = self.base();
        let ext = extension.trim_start_matches('.');
        let name = match page {
            Some(p) => format!("{prefix}{}-{p:06}.{ext}", kind.segment()),
            None => format!("{prefix}{}.{ext}", kind.segment()),
        };
        dir.join(name)
    }

    /// [`Self::path_for`] prefixed with the location scheme.
    pub fn url_for(&self, kind: DerivativeKind, extension: &str, page: Option<usize>) -> String {
        self.to_url(&self.path_for(kind, extension, page))
    }

    fn to_url(&self, path: &Path) -> String {
        format!("{}{}", self.scheme, path.display())
    }

    /// Every derivative file currently on disk for this source.
    ///
    /// Only names of the form produced by [`Self::path_for`] count, so a
    /// stray file in the shared directory never shows up here.
    pub fn derivatives(&self) -> io::Result<Vec<PathBuf>> {
        let (dir, prefix) = self.base();
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut found = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(rest) = name.strip_prefix(&prefix) else {
                continue;
            };
            if is_derivative_name(rest) {
                found.push(entry.path());
            }
        }
        Ok(found)
    }

    /// Sorted, de-duplicated URLs of this source's derivatives with `extension`.
    pub fn enumerate(&self, extension: &str) -> io::Result<Vec<String>> {
        Ok(filter_derivative_urls(
            self.derivatives()?,
            extension,
            &self.scheme,
        ))
    }
}

/// Create the directory `dest` will be written into.
pub fn prepare_destination(dest: &Path) -> Result<(), DerivativeError> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|source| DerivativeError::WriteFailed {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

/// `<segment>[-<digits>].<ext>` with a known segment.
fn is_derivative_name(rest: &str) -> bool {
    let Some((stem, ext)) = rest.rsplit_once('.') else {
        return false;
    };
    if ext.is_empty() {
        return false;
    }
    let segment = match stem.split_once('-') {
        Some((segment, page)) if !page.is_empty() && page.bytes().all(|b| b.is_ascii_digit()) => {
            segment
        }
        Some(_) => return false,
        None => stem,
    };
    DerivativeKind::from_segment(segment).is_some()
}

/// Keep paths whose name ends in exactly `.{extension}`, sort them, drop
/// duplicates, and prefix each with `scheme`.
pub fn filter_derivative_urls<I, P>(paths: I, extension: &str, scheme: &str) -> Vec<String>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let suffix = format!(".{}", extension.trim_start_matches('.'));
    paths
        .into_iter()
        .map(|p| p.as_ref().to_string_lossy().into_owned())
        .filter(|p| p.ends_with(&suffix))
        .collect::<BTreeSet<String>>()
        .into_iter()
        .map(|p| format!("{scheme}{p}"))
        .collect()
}
