//! Thumbnail generation.
//!
//! The thumbnail runner writes straight to the resolved location; a
//! non-zero exit is the only failure signal.

use crate::error::DerivativeError;
use crate::pipeline::paths::{prepare_destination, DerivativeKind, DerivativePathResolver};
use crate::pipeline::shell::{CommandTemplate, Shell};
use std::path::PathBuf;
use tracing::debug;

/// Geometry string for the runner: fit within `width`x`height`, never enlarge.
pub fn geometry(width: u32, height: u32) -> String {
    format!("{width}x{height}>")
}

/// Render a thumbnail of `input` to the resolver's thumbnail location.
///
/// `input` is a path, or a path with a frame selector such as `doc.pdf[0]`.
pub fn create_thumbnail(
    shell: &Shell,
    template: &CommandTemplate,
    resolver: &DerivativePathResolver,
    input: &str,
    (width, height): (u32, u32),
) -> Result<PathBuf, DerivativeError> {
    let ext = DerivativeKind::Thumbnail.default_extension().unwrap_or("jpg");
    let dest = resolver.path_for(DerivativeKind::Thumbnail, ext, None);
    prepare_destination(&dest)?;

    let size = geometry(width, height);
    shell.run(
        template,
        &[
            ("input", input),
            ("size", size.as_str()),
            ("output", &*dest.to_string_lossy()),
        ],
    )?;
    debug!("thumbnail → {}", dest.display());
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingExecutor;

    #[test]
    fn geometry_only_shrinks() {
        assert_eq!(geometry(200, 150), "200x150>");
    }

    #[test]
    fn runner_writes_to_resolved_location() {
        let dir = tempfile::TempDir::new().unwrap();
        let resolver = DerivativePathResolver::new(dir.path(), "file://", "abcd");
        let exec = RecordingExecutor::new();
        let shell = Shell::new(exec.clone());
        let t = CommandTemplate::new("gm convert {input} -thumbnail {size} {output}");

        let dest = create_thumbnail(&shell, &t, &resolver, "file.bmp", (200, 150)).unwrap();

        assert_eq!(dest, resolver.path_for(DerivativeKind::Thumbnail, "jpg", None));
        assert!(dest.parent().unwrap().is_dir());
        let cmds = exec.commands();
        assert_eq!(cmds.len(), 1);
        assert_eq!(
            cmds[0],
            format!(
                "gm convert file.bmp -thumbnail 200x150\\> {}",
                dest.display()
            )
        );
    }

    #[test]
    fn runner_failure_is_the_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let resolver = DerivativePathResolver::new(dir.path(), "file://", "abcd");
        let shell = Shell::new(RecordingExecutor::failing_on(&["gm"]));
        let t = CommandTemplate::new("gm convert {input} {output}");
        let err = create_thumbnail(&shell, &t, &resolver, "file", (1, 1)).unwrap_err();
        assert!(matches!(err, DerivativeError::Tool(_)));
    }
}
