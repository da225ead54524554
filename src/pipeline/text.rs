//! Full-text extraction for multi-page documents.
//!
//! Reads the original document, never an intermediate bitmap, so it can run
//! alongside page rasterisation.

use crate::error::DerivativeError;
use crate::pipeline::paths::{prepare_destination, DerivativeKind, DerivativePathResolver};
use crate::pipeline::shell::{CommandTemplate, Shell};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Extract the text of `document` to the resolver's full-text location.
///
/// `source_uri` is bound as `{uri}` for extractors that record provenance;
/// it is empty when the source has no external reference.
pub fn extract_full_text(
    shell: &Shell,
    template: &CommandTemplate,
    resolver: &DerivativePathResolver,
    document: &Path,
    source_uri: Option<&str>,
) -> Result<PathBuf, DerivativeError> {
    let ext = DerivativeKind::FullText.default_extension().unwrap_or("txt");
    let dest = resolver.path_for(DerivativeKind::FullText, ext, None);
    prepare_destination(&dest)?;

    shell.run(
        template,
        &[
            ("input", &*document.to_string_lossy()),
            ("uri", source_uri.unwrap_or_default()),
            ("output", &*dest.to_string_lossy()),
        ],
    )?;
    debug!("full text → {}", dest.display());
    Ok(dest)
}
