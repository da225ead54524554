//! Conversions for office documents, audio and video.
//!
//! Office files are turned into a PDF and then treated like any other PDF
//! for thumbnail and text purposes. Audio and video get access renditions;
//! video additionally gets a poster-frame thumbnail.

use crate::error::{DerivativeError, ToolError};
use crate::pipeline::paths::{prepare_destination, DerivativeKind, DerivativePathResolver};
use crate::pipeline::shell::{CommandTemplate, Shell};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Convert an office document to PDF inside `outdir`.
///
/// The office suite names its output after the input stem; a zero exit
/// without that file is reported as [`ToolError::MissingOutput`].
pub fn office_to_pdf(
    shell: &Shell,
    template: &CommandTemplate,
    input: &Path,
    outdir: &Path,
) -> Result<PathBuf, DerivativeError> {
    let (input_arg, outdir_arg) = (input.to_string_lossy(), outdir.to_string_lossy());
    let args = [("input", &*input_arg), ("outdir", &*outdir_arg)];
    shell.run(template, &args)?;

    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let pdf = outdir.join(format!("{stem}.pdf"));
    if !pdf.is_file() {
        return Err(ToolError::MissingOutput {
            command: template.render(&args)?,
            path: pdf,
        }
        .into());
    }
    debug!("office → {}", pdf.display());
    Ok(pdf)
}

/// Transcode `input` to an access rendition with `extension`.
pub fn create_rendition(
    shell: &Shell,
    template: &CommandTemplate,
    resolver: &DerivativePathResolver,
    input: &Path,
    extension: &str,
) -> Result<PathBuf, DerivativeError> {
    let dest = resolver.path_for(DerivativeKind::Rendition, extension, None);
    prepare_destination(&dest)?;
    shell.run(
        template,
        &[
            ("input", &*input.to_string_lossy()),
            ("output", &*dest.to_string_lossy()),
        ],
    )?;
    debug!("rendition → {}", dest.display());
    Ok(dest)
}

/// Grab a poster frame from `video` at the thumbnail location.
pub fn create_video_thumbnail(
    shell: &Shell,
    template: &CommandTemplate,
    resolver: &DerivativePathResolver,
    video: &Path,
    (width, height): (u32, u32),
) -> Result<PathBuf, DerivativeError> {
    let ext = DerivativeKind::Thumbnail.default_extension().unwrap_or("jpg");
    let dest = resolver.path_for(DerivativeKind::Thumbnail, ext, None);
    prepare_destination(&dest)?;

    let (w, h) = (width.to_string(), height.to_string());
    shell.run(
        template,
        &[
            ("input", &*video.to_string_lossy()),
            ("width", w.as_str()),
            ("height", h.as_str()),
            ("output", &*dest.to_string_lossy()),
        ],
    )?;
    debug!("poster frame → {}", dest.display());
    Ok(dest)
}
