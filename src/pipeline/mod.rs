//! Pipeline stages for derivative generation.
//!
//! Each submodule implements one step and talks to external tools only
//! through [`shell::Shell`], so every stage can be exercised with a
//! recording executor.
//!
//! ## Data Flow
//!
//! ```text
//! source ──▶ preprocess ──▶ thumbnail / zoomable          (image)
//! source ──▶ rasterize ─┬─▶ zoomable + page bitmap         (pdf, per page)
//!                       ├─▶ thumbnail of page 0
//!                       └─▶ text
//! source ──▶ media ─────▶ thumbnail / text / renditions    (office, audio, video)
//! ```
//!
//! 1. [`shell`]     : command templates, argument escaping, the executor seam
//! 2. [`temp`]      : scoped temporary files for intermediate bitmaps
//! 3. [`paths`]     : where each derivative lives, and enumeration
//! 4. [`preprocess`]: any supported image encoding to an uncompressed bitmap
//! 5. [`thumbnail`] : small preview
//! 6. [`zoomable`]  : JPEG 2000 tile pyramid
//! 7. [`rasterize`] : page count and one-page-to-bitmap for PDFs
//! 8. [`text`]      : full-text extraction
//! 9. [`media`]     : office-to-PDF, access renditions, poster frames

pub mod media;
pub mod paths;
pub mod preprocess;
pub mod rasterize;
pub mod shell;
pub mod temp;
pub mod text;
pub mod thumbnail;
pub mod zoomable;
