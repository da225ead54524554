//! Scoped temporary files for intermediate bitmaps.
//!
//! A [`TempFile`] owns its path exclusively. Dropping it deletes the file
//! (including on panic or an early `?` return); [`TempFile::close`] deletes
//! it explicitly and reports a failed deletion as a fatal error. A file a
//! tool already removed counts as cleaned up.

use crate::error::DerivativeError;
use std::io;
use std::path::Path;
use tempfile::TempPath;
use tracing::{debug, warn};

/// A temporary file with a chosen extension, removed when it goes out of scope.
#[derive(Debug)]
pub struct TempFile {
    path: TempPath,
}

impl TempFile {
    /// Create an empty temporary file ending in `.{extension}`.
    ///
    /// Lives in `dir` when given, otherwise in the system temp directory.
    pub fn new(dir: Option<&Path>, extension: &str) -> Result<Self, DerivativeError> {
        let suffix = format!(".{}", extension.trim_start_matches('.'));
        let mut builder = tempfile::Builder::new();
        builder.prefix("derivative-").suffix(&suffix);

        let file = match dir {
            Some(d) => builder.tempfile_in(d),
            None => builder.tempfile(),
        }
        .map_err(|source| DerivativeError::TempFile {
            context: format!("create *{suffix}"),
            source,
        })?;

        let path = file.into_temp_path();
        debug!("temp file {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file now, surfacing any error other than it being gone.
    pub fn close(self) -> Result<(), DerivativeError> {
        let shown = self.path.display().to_string();
        match self.path.close() {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("temp file {} already removed", shown);
                Ok(())
            }
            Err(source) => Err(DerivativeError::TempFile {
                context: format!("remove {shown}"),
                source,
            }),
        }
    }
}

/// Run `f` with a fresh temporary file and remove it afterwards.
///
/// The file is removed whether `f` succeeds or fails. When `f` fails its
/// error is returned and a cleanup failure is only logged; when `f` succeeds
/// a cleanup failure becomes the result.
pub fn with_tmp_file<T>(
    dir: Option<&Path>,
    extension: &str,
    f: impl FnOnce(&Path) -> Result<T, DerivativeError>,
) -> Result<T, DerivativeError> {
    let tmp = TempFile::new(dir, extension)?;
    match f(tmp.path()) {
        Ok(value) => {
            tmp.close()?;
            Ok(value)
        }
        Err(e) => {
            if let Err(cleanup) = tmp.close() {
                warn!("{}", cleanup);
            }
            Err(e)
        }
    }
}
