//! Configuration types for derivative generation.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`] or loaded from JSON with
//! [`PipelineConfig::from_json_file`]. Every external tool is a
//! [`CommandTemplate`] in [`ToolTemplates`], so deployments can swap tools
//! without code changes.

use crate::error::DerivativeError;
use crate::pipeline::shell::CommandTemplate;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Command templates for every external tool the pipeline runs.
///
/// Placeholders are `{name}`; each template may use only the placeholders
/// listed in [`ToolTemplates::validate`] and must bind `{output}` (or
/// `{outdir}` for the office converter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolTemplates {
    /// JPEG 2000 → bitmap.
    pub jp2_decompress: CommandTemplate,
    /// Any other raster format → bitmap. `{input}` carries a frame selector.
    pub raster_convert: CommandTemplate,
    /// Bitmap (or `pdf[0]`) → thumbnail. Also binds `{size}`.
    pub thumbnail: CommandTemplate,
    /// Bitmap → JPEG 2000 tile pyramid.
    pub zoomable: CommandTemplate,
    /// One PDF page → bitmap. Also binds `{density}`.
    pub page_rasterize: CommandTemplate,
    /// Prints the page count of `{input}` on stdout.
    pub page_count: CommandTemplate,
    /// PDF → UTF-8 text. May bind `{uri}`.
    pub full_text: CommandTemplate,
    /// Office document → `{outdir}/<stem>.pdf`.
    pub office_to_pdf: CommandTemplate,
    /// Audio → access rendition; the extension picks the codec.
    pub audio_rendition: CommandTemplate,
    /// Video → access rendition.
    pub video_rendition: CommandTemplate,
    /// Video → poster frame. Binds `{width}` and `{height}`.
    pub video_thumbnail: CommandTemplate,
}

impl Default for ToolTemplates {
    fn default() -> Self {
        Self {
            jp2_decompress: "opj_decompress -i {input} -o {output}".into(),
            raster_convert: "convert {input} {output}".into(),
            thumbnail: "gm convert {input} -thumbnail {size} -flatten {output}".into(),
            zoomable: "opj_compress -i {input} -o {output} -t 1024,1024 -p RPCL -n 7 -c '[256,256],[256,256],[128,128]' -b 64,64 -r 20.0,10.0,5.0 -TP R".into(),
            page_rasterize: "convert -density {density} {input} {output}".into(),
            page_count: "pdfinfo {input}".into(),
            full_text: "pdftotext -enc UTF-8 {input} {output}".into(),
            office_to_pdf: "soffice --headless --convert-to pdf --outdir {outdir} {input}".into(),
            audio_rendition: "ffmpeg -y -loglevel error -i {input} -vn {output}".into(),
            video_rendition: "ffmpeg -y -loglevel error -i {input} {output}".into(),
            video_thumbnail: "ffmpeg -y -loglevel error -ss 00:00:02 -i {input} -frames:v 1 -vf scale={width}:{height}:force_original_aspect_ratio=decrease {output}".into(),
        }
    }
}

impl ToolTemplates {
    /// Check each template against its allowed and required placeholders.
    pub fn validate(&self) -> Result<(), DerivativeError> {
        const IO: &[&str] = &["input", "output"];
        let checks: [(&str, &CommandTemplate, &[&str], &[&str]); 11] = [
            ("jp2_decompress", &self.jp2_decompress, IO, IO),
            ("raster_convert", &self.raster_convert, IO, IO),
            ("thumbnail", &self.thumbnail, &["input", "output", "size"], IO),
            ("zoomable", &self.zoomable, IO, IO),
            (
                "page_rasterize",
                &self.page_rasterize,
                &["input", "output", "density"],
                IO,
            ),
            ("page_count", &self.page_count, &["input"], &["input"]),
            ("full_text", &self.full_text, &["input", "output", "uri"], IO),
            (
                "office_to_pdf",
                &self.office_to_pdf,
                &["input", "outdir"],
                &["input", "outdir"],
            ),
            ("audio_rendition", &self.audio_rendition, IO, IO),
            ("video_rendition", &self.video_rendition, IO, IO),
            (
                "video_thumbnail",
                &self.video_thumbnail,
                &["input", "output", "width", "height"],
                IO,
            ),
        ];

        for (name, template, allowed, required) in checks {
            let used = template.placeholders();
            if let Some(unknown) = used.iter().find(|p| !allowed.contains(*p)) {
                return Err(DerivativeError::InvalidConfig(format!(
                    "tools.{name}: unknown placeholder '{{{unknown}}}'"
                )));
            }
            if let Some(missing) = required.iter().find(|r| !used.contains(*r)) {
                return Err(DerivativeError::InvalidConfig(format!(
                    "tools.{name}: must use '{{{missing}}}'"
                )));
            }
        }
        Ok(())
    }
}

/// Configuration for a derivative-generation invocation.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use fileset_derivatives::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .derivatives_root("/srv/derivatives")
///     .page_concurrency(2)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory derivatives are written under. Default: `./derivatives`.
    pub derivatives_root: PathBuf,

    /// Prefix turning a derivative path into a location URL. Default: `file://`.
    pub url_scheme: String,

    /// Where temporary bitmaps are created. Default: the system temp dir.
    pub temp_dir: Option<PathBuf>,

    /// Thumbnail bounding box. Default: 200×150.
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,

    /// PDF pages processed at once. Default: 4.
    ///
    /// Each page holds an uncompressed 300-DPI bitmap and a running encoder;
    /// size this by tool memory, not CPU count.
    pub page_concurrency: usize,

    pub tools: ToolTemplates,

    /// Rendition extensions for audio sources. Default: mp3, ogg.
    pub audio_renditions: Vec<String>,

    /// Rendition extensions for video sources. Default: mp4, webm.
    pub video_renditions: Vec<String>,

    #[serde(skip)]
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            derivatives_root: PathBuf::from("derivatives"),
            url_scheme: "file://".to_string(),
            temp_dir: None,
            thumbnail_width: 200,
            thumbnail_height: 150,
            page_concurrency: 4,
            tools: ToolTemplates::default(),
            audio_renditions: vec!["mp3".to_string(), "ogg".to_string()],
            video_renditions: vec!["mp4".to_string(), "webm".to_string()],
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("derivatives_root", &self.derivatives_root)
            .field("url_scheme", &self.url_scheme)
            .field("temp_dir", &self.temp_dir)
            .field("thumbnail_width", &self.thumbnail_width)
            .field("thumbnail_height", &self.thumbnail_height)
            .field("page_concurrency", &self.page_concurrency)
            .field("tools", &self.tools)
            .field("audio_renditions", &self.audio_renditions)
            .field("video_renditions", &self.video_renditions)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn GenerationProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Load a JSON config; absent fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, DerivativeError> {
        let path = path.as_ref();
        let load_err = |detail: String| DerivativeError::ConfigLoad {
            path: path.to_path_buf(),
            detail,
        };
        let text = std::fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
        let config: Self = serde_json::from_str(&text).map_err(|e| load_err(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Thumbnail bounding box as `(width, height)`.
    pub fn thumbnail_size(&self) -> (u32, u32) {
        (self.thumbnail_width, self.thumbnail_height)
    }

    /// Check constraints the builder's setters cannot enforce alone.
    pub fn validate(&self) -> Result<(), DerivativeError> {
        if self.page_concurrency == 0 {
            return Err(DerivativeError::InvalidConfig(
                "page_concurrency must be ≥ 1".into(),
            ));
        }
        if self.thumbnail_width == 0 || self.thumbnail_height == 0 {
            return Err(DerivativeError::InvalidConfig(format!(
                "thumbnail size must be non-zero, got {}x{}",
                self.thumbnail_width, self.thumbnail_height
            )));
        }
        for ext in self.audio_renditions.iter().chain(&self.video_renditions) {
            if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(DerivativeError::InvalidConfig(format!(
                    "rendition extension '{ext}' must be alphanumeric"
                )));
            }
        }
        self.tools.validate()
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn derivatives_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.derivatives_root = root.into();
        self
    }

    pub fn url_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.config.url_scheme = scheme.into();
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = Some(dir.into());
        self
    }

    pub fn thumbnail_size(mut self, width: u32, height: u32) -> Self {
        self.config.thumbnail_width = width.clamp(1, 4096);
        self.config.thumbnail_height = height.clamp(1, 4096);
        self
    }

    pub fn page_concurrency(mut self, n: usize) -> Self {
        self.config.page_concurrency = n.clamp(1, 64);
        self
    }

    pub fn tools(mut self, tools: ToolTemplates) -> Self {
        self.config.tools = tools;
        self
    }

    pub fn audio_renditions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.audio_renditions = exts.into_iter().map(Into::into).collect();
        self
    }

    pub fn video_renditions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.video_renditions = exts.into_iter().map(Into::into).collect();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, DerivativeError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.thumbnail_size(), (200, 150));
        assert_eq!(config.page_concurrency, 4);
        assert_eq!(config.url_scheme, "file://");
    }

    #[test]
    fn default_config_yields_absolute_file_urls() {
        use crate::pipeline::paths::{DerivativeKind, DerivativePathResolver};

        let config = PipelineConfig::default();
        let resolver = DerivativePathResolver::new(
            config.derivatives_root.clone(),
            config.url_scheme.clone(),
            "abcd",
        );
        let url = resolver.url_for(DerivativeKind::Thumbnail, "jpg", None);
        assert!(url.starts_with("file:///"), "{url}");
    }

    #[test]
    fn builder_clamps() {
        let config = PipelineConfig::builder()
            .page_concurrency(0)
            .thumbnail_size(0, 10_000)
            .build()
            .unwrap();
        assert_eq!(config.page_concurrency, 1);
        assert_eq!(config.thumbnail_size(), (1, 4096));
    }

    #[test]
    fn unknown_placeholder_is_rejected() {
        let tools = ToolTemplates {
            zoomable: "opj_compress -i {input} -o {output} -r {rate}".into(),
            ..ToolTemplates::default()
        };
        let err = PipelineConfig::builder().tools(tools).build().unwrap_err();
        assert!(err.to_string().contains("tools.zoomable"), "{err}");
    }

    #[test]
    fn missing_output_is_rejected() {
        let tools = ToolTemplates {
            full_text: "pdftotext {input}".into(),
            ..ToolTemplates::default()
        };
        let err = PipelineConfig::builder().tools(tools).build().unwrap_err();
        assert!(err.to_string().contains("{output}"), "{err}");
    }

    #[test]
    fn bad_rendition_extension_is_rejected() {
        let err = PipelineConfig::builder()
            .audio_renditions(["mp3", "../x"])
            .build()
            .unwrap_err();
        assert!(matches!(err, DerivativeError::InvalidConfig(_)));
    }

    #[test]
    fn loads_partial_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "page_concurrency": 2, "tools": { "page_count": "echo {input}" } }"#,
        )
        .unwrap();

        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.page_concurrency, 2);
        assert_eq!(config.tools.page_count.as_str(), "echo {input}");
        assert_eq!(config.tools.thumbnail, ToolTemplates::default().thumbnail);
        assert_eq!(config.thumbnail_width, 200);
    }

    #[test]
    fn malformed_json_is_a_load_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = PipelineConfig::from_json_file(&path).unwrap_err();
        assert!(matches!(err, DerivativeError::ConfigLoad { .. }));
    }

    #[test]
    fn debug_hides_callback() {
        let config = PipelineConfig::builder()
            .progress_callback(std::sync::Arc::new(crate::progress::NoopProgressCallback))
            .build()
            .unwrap();
        let dbg = format!("{config:?}");
        assert!(dbg.contains("<dyn GenerationProgressCallback>"));
    }
}
