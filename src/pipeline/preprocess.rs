//! Image preprocessing: normalise any supported source image to a bitmap.
//!
//! The bitmap is the common input of the thumbnail and tile-pyramid
//! generators. The branch taken depends on the source's own encoding:
//!
//! | Encoding   | Action                                                  |
//! |------------|---------------------------------------------------------|
//! | JPEG 2000  | decompress with the wavelet codec tool                  |
//! | Bitmap     | alias the source at the destination, no re-encoding     |
//! | Other      | generic raster converter, first frame only              |

use crate::error::DerivativeError;
use crate::pipeline::rasterize::page_selector;
use crate::pipeline::shell::{CommandTemplate, Shell};
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use tracing::debug;

/// JP2 signature box: length 12, type `jP  `, content `<CR><LF><0x87><LF>`.
const JP2_SIGNATURE: [u8; 12] = [
    0x00, 0x00, 0x00, 0x0C, 0x6A, 0x50, 0x20, 0x20, 0x0D, 0x0A, 0x87, 0x0A,
];
/// Raw JPEG 2000 codestream: SOC marker followed by SIZ.
const J2K_CODESTREAM: [u8; 4] = [0xFF, 0x4F, 0xFF, 0x51];

/// Declared types handed to the generic converter.
const RASTER_MIME_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/jpg",
    "image/gif",
    "image/tiff",
];

/// The encoding of a source image as far as preprocessing is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    Jpeg2000,
    Bitmap,
    Raster,
}

impl SourceEncoding {
    /// Encoding implied by a declared MIME type.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "image/jp2" => Some(SourceEncoding::Jpeg2000),
            "image/bmp" => Some(SourceEncoding::Bitmap),
            m if RASTER_MIME_TYPES.contains(&m) => Some(SourceEncoding::Raster),
            _ => None,
        }
    }

    /// Encoding recognised from the first bytes of the file.
    pub fn sniff(header: &[u8]) -> Option<Self> {
        if header.starts_with(&JP2_SIGNATURE) || header.starts_with(&J2K_CODESTREAM) {
            return Some(SourceEncoding::Jpeg2000);
        }
        match image::guess_format(header).ok()? {
            image::ImageFormat::Bmp => Some(SourceEncoding::Bitmap),
            image::ImageFormat::Png
            | image::ImageFormat::Jpeg
            | image::ImageFormat::Gif
            | image::ImageFormat::Tiff => Some(SourceEncoding::Raster),
            _ => None,
        }
    }

    /// Sniff the file header, falling back to the declared type.
    pub fn detect(source: &Path, declared_mime: &str) -> Result<Self, DerivativeError> {
        let header = read_header(source).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => DerivativeError::FileNotFound {
                path: source.to_path_buf(),
            },
            io::ErrorKind::PermissionDenied => DerivativeError::PermissionDenied {
                path: source.to_path_buf(),
            },
            _ => DerivativeError::Internal(format!("reading {}: {e}", source.display())),
        })?;

        Self::sniff(&header)
            .or_else(|| Self::from_mime(declared_mime))
            .ok_or_else(|| DerivativeError::UnsupportedEncoding {
                path: source.to_path_buf(),
                mime: declared_mime.to_string(),
            })
    }
}

fn read_header(path: &Path) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(32);
    fs::File::open(path)?.take(32).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Templates the preprocessor needs.
#[derive(Debug, Clone, Copy)]
pub struct Preprocessors<'a> {
    pub jp2_decompress: &'a CommandTemplate,
    pub raster_convert: &'a CommandTemplate,
}

/// Produce an uncompressed bitmap of `source` at `dest`.
pub fn to_bitmap(
    shell: &Shell,
    tools: Preprocessors<'_>,
    source: &Path,
    declared_mime: &str,
    dest: &Path,
) -> Result<SourceEncoding, DerivativeError> {
    let encoding = SourceEncoding::detect(source, declared_mime)?;
    debug!("preprocess {} as {:?}", source.display(), encoding);

    match encoding {
        SourceEncoding::Jpeg2000 => jp2_to_bmp(shell, tools.jp2_decompress, source, dest)?,
        SourceEncoding::Bitmap => bmp_to_bmp(source, dest)?,
        SourceEncoding::Raster => raster_to_bmp(shell, tools.raster_convert, source, dest)?,
    }
    Ok(encoding)
}

/// Decompress a JPEG 2000 source into `dest`.
pub fn jp2_to_bmp(
    shell: &Shell,
    template: &CommandTemplate,
    source: &Path,
    dest: &Path,
) -> Result<(), DerivativeError> {
    shell.run(
        template,
        &[
            ("input", &*source.to_string_lossy()),
            ("output", &*dest.to_string_lossy()),
        ],
    )?;
    Ok(())
}

/// Alias an existing bitmap at `dest` instead of re-encoding it.
///
/// Whatever was at `dest` is removed first, so calling this twice leaves a
/// single alias.
pub fn bmp_to_bmp(source: &Path, dest: &Path) -> Result<(), DerivativeError> {
    let write_err = |source: io::Error| DerivativeError::WriteFailed {
        path: dest.to_path_buf(),
        source,
    };

    match fs::remove_file(dest) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(write_err(e)),
    }

    let target = fs::canonicalize(source).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => DerivativeError::FileNotFound {
            path: source.to_path_buf(),
        },
        _ => write_err(e),
    })?;

    #[cfg(unix)]
    std::os::unix::fs::symlink(&target, dest).map_err(write_err)?;
    #[cfg(not(unix))]
    fs::hard_link(&target, dest).map_err(write_err)?;

    Ok(())
}

/// Convert any other raster source with the generic converter.
///
/// Only the first frame is taken, so animated GIFs and multi-page TIFFs
/// still yield a single bitmap.
pub fn raster_to_bmp(
    shell: &Shell,
    template: &CommandTemplate,
    source: &Path,
    dest: &Path,
) -> Result<(), DerivativeError> {
    shell.run(
        template,
        &[
            ("input", page_selector(source, 0).as_str()),
            ("output", &*dest.to_string_lossy()),
        ],
    )?;
    Ok(())
}
