//! Tile pyramid (deep-zoom JPEG 2000) generation.

use crate::error::DerivativeError;
use crate::pipeline::paths::{prepare_destination, DerivativeKind, DerivativePathResolver};
use crate::pipeline::shell::{CommandTemplate, Shell};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Build a tile pyramid from `bitmap` for single-page media.
pub fn create_zoomable(
    shell: &Shell,
    template: &CommandTemplate,
    resolver: &DerivativePathResolver,
    bitmap: &Path,
) -> Result<PathBuf, DerivativeError> {
    create_zoomable_page(shell, template, resolver, bitmap, None)
}

/// Build a tile pyramid from `bitmap` at the location for `page`.
///
/// The page only selects the destination; the runner call is the same.
pub fn create_zoomable_page(
    shell: &Shell,
    template: &CommandTemplate,
    resolver: &DerivativePathResolver,
    bitmap: &Path,
    page: Option<usize>,
) -> Result<PathBuf, DerivativeError> {
    let ext = DerivativeKind::TilePyramid
        .default_extension()
        .unwrap_or("jp2");
    let dest = resolver.path_for(DerivativeKind::TilePyramid, ext, page);
    prepare_destination(&dest)?;

    shell.run(
        template,
        &[
            ("input", &*bitmap.to_string_lossy()),
            ("output", &*dest.to_string_lossy()),
        ],
    )?;
    debug!("tile pyramid → {}", dest.display());
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingExecutor;

    #[test]
    fn single_page_equals_page_none() {
        let dir = tempfile::TempDir::new().unwrap();
        let resolver = DerivativePathResolver::new(dir.path(), "file://", "abcd");
        let exec = RecordingExecutor::new();
        let shell = Shell::new(exec.clone());
        let t = CommandTemplate::new("opj_compress -i {input} -o {output}");

        let a = create_zoomable(&shell, &t, &resolver, Path::new("in.bmp")).unwrap();
        let b = create_zoomable_page(&shell, &t, &resolver, Path::new("in.bmp"), None).unwrap();

        assert_eq!(a, b);
        let cmds = exec.commands();
        assert_eq!(cmds[0], cmds[1]);
    }

    #[test]
    fn page_selects_destination_only() {
        let dir = tempfile::TempDir::new().unwrap();
        let resolver = DerivativePathResolver::new(dir.path(), "file://", "abcd");
        let exec = RecordingExecutor::new();
        let shell = Shell::new(exec.clone());
        let t = CommandTemplate::new("opj_compress -i {input} -o {output}");

        let dest = create_zoomable_page(&shell, &t, &resolver, Path::new("p.bmp"), Some(4)).unwrap();

        assert_eq!(dest, resolver.path_for(DerivativeKind::TilePyramid, "jp2", Some(4)));
        assert_eq!(
            exec.commands(),
            vec![format!("opj_compress -i p.bmp -o {}", dest.display())]
        );
    }
}
