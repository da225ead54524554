//! PDF page handling: count pages and rasterise one page to a bitmap.
//!
//! Pages are rendered at a fixed density of [`PAGE_DENSITY`]. The density is
//! policy, not derived from the document, so tile pyramids for every page of
//! every upload have comparable resolution.

use crate::error::DerivativeError;
use crate::pipeline::paths::prepare_destination;
use crate::pipeline::shell::{CommandTemplate, Shell};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

/// Rendering density (pixels per inch) for page bitmaps.
pub const PAGE_DENSITY: u32 = 300;

static RE_PAGES: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^Pages:\s+(\d+)\s*$").unwrap());

/// `path[index]`: the page/frame selection syntax of the raster tools.
pub fn page_selector(path: &Path, index: usize) -> String {
    format!("{}[{index}]", path.display())
}

/// Render page `page_index` (0-based) of `pdf` into `dest`.
pub fn manual_convert(
    shell: &Shell,
    template: &CommandTemplate,
    pdf: &Path,
    page_index: usize,
    dest: &Path,
) -> Result<(), DerivativeError> {
    let density = PAGE_DENSITY.to_string();
    shell.run(
        template,
        &[
            ("density", density.as_str()),
            ("input", page_selector(pdf, page_index).as_str()),
            ("output", &*dest.to_string_lossy()),
        ],
    )?;
    debug!("rasterised page {} of {}", page_index, pdf.display());
    Ok(())
}

/// Place a rasterised page at its derivative location.
///
/// Hard-links `bitmap` to `dest` and falls back to a copy across
/// filesystems. Anything already at `dest` is replaced.
pub fn publish_page_bitmap(bitmap: &Path, dest: &Path) -> Result<(), DerivativeError> {
    prepare_destination(dest)?;
    let write_err = |source: io::Error| DerivativeError::WriteFailed {
        path: dest.to_path_buf(),
        source,
    };
    match fs::remove_file(dest) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(write_err(e)),
    }
    if fs::hard_link(bitmap, dest).is_err() {
        fs::copy(bitmap, dest).map_err(write_err)?;
    }
    Ok(())
}

/// Number of pages in `pdf`, from the page-count tool's output.
pub fn page_count(
    shell: &Shell,
    template: &CommandTemplate,
    pdf: &Path,
) -> Result<usize, DerivativeError> {
    let out = shell
        .run(template, &[("input", &*pdf.to_string_lossy())])
        .map_err(|e| DerivativeError::PageCountFailed {
            path: pdf.to_path_buf(),
            detail: e.to_string(),
        })?;

    let count = parse_page_count(&out.stdout).ok_or_else(|| DerivativeError::PageCountFailed {
        path: pdf.to_path_buf(),
        detail: format!("unrecognised output: {:?}", out.stdout.trim()),
    })?;

    if count == 0 {
        return Err(DerivativeError::PageCountFailed {
            path: pdf.to_path_buf(),
            detail: "document has no pages".to_string(),
        });
    }
    Ok(count)
}

/// Accepts `pdfinfo`-style output (`Pages: N`) or a bare integer.
fn parse_page_count(stdout: &str) -> Option<usize> {
    if let Some(caps) = RE_PAGES.captures(stdout) {
        return caps[1].parse().ok();
    }
    stdout.trim().parse().ok()
}
