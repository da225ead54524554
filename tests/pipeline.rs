//! Integration tests driving the real pipeline through `sh`.
//!
//! Every external tool is replaced by a small shell stand-in (`cp`,
//! `printf`, `case`) via the configurable templates, so the full path from
//! template rendering through escaping, process spawning, temp files and
//! derivative placement is exercised without ImageMagick or poppler.

use fileset_derivatives::{
    generate, DerivativeError, DerivativeKind, GenerationReport, MediaCategory, PipelineConfig,
    RoutineState, SourceDescriptor, StepError, ToolTemplates,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Stand-in tools: each writes something to `{output}`.
///
/// With `failing_page`, rasterising that page removes its partial output and
/// exits non-zero, the way a real converter fails on a corrupt page.
fn stand_in_tools(pages: usize, failing_page: Option<usize>) -> ToolTemplates {
    let fail = match failing_page {
        Some(page) => format!(
            "case {{input}} in *'[{page}]') rm -f {{output}}; echo 'bad page' >&2; exit 1;; esac; "
        ),
        None => String::new(),
    };
    ToolTemplates {
        jp2_decompress: "printf 'BM%s' {input} > {output}".into(),
        raster_convert: "printf 'BM%s' {input} > {output}".into(),
        thumbnail: "printf '%s %s' {input} {size} > {output}".into(),
        zoomable: "cp {input} {output}".into(),
        page_rasterize: format!("{fail}test {{density}} = 300 && printf 'BM%s' {{input}} > {{output}}")
            .into(),
        page_count: format!("test -f {{input}} && echo 'Pages: {pages}'").into(),
        full_text: "printf '%s\\n' {uri} {input} > {output}".into(),
        office_to_pdf: "f=$(basename {input}); cp {input} {outdir}/\"${f%.*}\".pdf".into(),
        audio_rendition: "cp {input} {output}".into(),
        video_rendition: "cp {input} {output}".into(),
        video_thumbnail: "test -f {input} && printf '%sx%s' {width} {height} > {output}".into(),
    }
}

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        init_tracing();
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("tmp")).unwrap();
        Self { dir }
    }

    fn file(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn root(&self) -> PathBuf {
        self.dir.path().join("derivatives")
    }

    fn tmp(&self) -> PathBuf {
        self.dir.path().join("tmp")
    }

    fn config(&self, pages: usize) -> PipelineConfig {
        self.config_with(stand_in_tools(pages, None))
    }

    fn config_failing_page(&self, pages: usize, page: usize) -> PipelineConfig {
        self.config_with(stand_in_tools(pages, Some(page)))
    }

    fn config_with(&self, tools: ToolTemplates) -> PipelineConfig {
        PipelineConfig::builder()
            .derivatives_root(self.root())
            .temp_dir(self.tmp())
            .tools(tools)
            .build()
            .unwrap()
    }

    fn path_for(
        &self,
        source: &SourceDescriptor,
        kind: DerivativeKind,
        ext: &str,
        page: Option<usize>,
    ) -> PathBuf {
        fileset_derivatives::DerivativePathResolver::new(self.root(), "file://", source.id())
            .path_for(kind, ext, page)
    }

    fn assert_temp_dir_empty(&self) {
        let left: Vec<_> = std::fs::read_dir(self.tmp()).unwrap().collect();
        assert!(left.is_empty(), "temporary files left behind: {left:?}");
    }
}

fn count_files(root: &Path) -> usize {
    fn walk(dir: &Path, n: &mut usize) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                walk(&path, n);
            } else {
                *n += 1;
            }
        }
    }
    let mut n = 0;
    walk(root, &mut n);
    n
}

fn assert_all_written(report: &GenerationReport) {
    assert!(report.is_success(), "failures: {:?}", report.failed().collect::<Vec<_>>());
    for outcome in &report.outcomes {
        assert!(
            outcome.location.exists(),
            "{} {:?} missing at {}",
            outcome.kind,
            outcome.page,
            outcome.location.display()
        );
    }
}

// ── PDF ──────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn three_page_pdf_yields_eight_artifacts() {
    let fx = Fixture::new();
    let pdf = fx.file("thesis.pdf", b"%PDF-1.7");
    let source = SourceDescriptor::new(&pdf, "application/pdf")
        .unwrap()
        .with_id("f4752g72m")
        .with_uri("http://example.org/1/2/3/foo");

    let report = generate(&source, &fx.config(3)).await.unwrap();

    assert_all_written(&report);
    assert_eq!(report.outcomes.len(), 8);
    assert_eq!(count_files(&fx.root()), 8);
    assert_eq!(report.count(DerivativeKind::PageBitmap), 3);
    assert_eq!(report.count(DerivativeKind::TilePyramid), 3);
    assert_eq!(report.stats.total_pages, Some(3));

    // The thumbnail comes from the first page of the document itself.
    let thumb = fx.path_for(&source, DerivativeKind::Thumbnail, "jpg", None);
    let thumb = std::fs::read_to_string(thumb).unwrap();
    assert!(thumb.contains("thesis.pdf[0] 200x150>"), "{thumb}");

    // Text extraction sees the source URI.
    let text = fx.path_for(&source, DerivativeKind::FullText, "txt", None);
    let text = std::fs::read_to_string(text).unwrap();
    assert!(text.starts_with("http://example.org/1/2/3/foo\n"), "{text}");

    // Each tile pyramid was built from its own page's bitmap.
    let tiles = fx.path_for(&source, DerivativeKind::TilePyramid, "jp2", Some(1));
    assert!(std::fs::read_to_string(tiles).unwrap().ends_with("thesis.pdf[1]"));

    fx.assert_temp_dir_empty();
}

#[tokio::test]
async fn failing_page_does_not_stop_the_others() {
    let fx = Fixture::new();
    let pdf = fx.file("book.pdf", b"%PDF-1.7");
    let source = SourceDescriptor::new(&pdf, "application/pdf").unwrap();

    let report = generate(&source, &fx.config_failing_page(5, 2)).await.unwrap();

    assert_eq!(report.state, RoutineState::Failed);
    assert_eq!(report.count(DerivativeKind::PageBitmap), 4);
    assert_eq!(report.count(DerivativeKind::TilePyramid), 4);
    assert_eq!(report.count(DerivativeKind::Thumbnail), 1);
    assert_eq!(report.count(DerivativeKind::FullText), 1);

    let failed: Vec<_> = report.failed().collect();
    assert_eq!(failed.len(), 2);
    assert!(failed.iter().all(|o| o.page == Some(2)));
    let bitmap_failure = failed
        .iter()
        .find(|o| o.kind == DerivativeKind::PageBitmap)
        .unwrap();
    match &bitmap_failure.error {
        Some(StepError::ToolFailed { detail }) => assert!(detail.contains("bad page"), "{detail}"),
        other => panic!("expected ToolFailed, got {other:?}"),
    }

    for page in [0, 1, 3, 4] {
        assert!(fx
            .path_for(&source, DerivativeKind::TilePyramid, "jp2", Some(page))
            .exists());
    }
    assert!(!fx
        .path_for(&source, DerivativeKind::TilePyramid, "jp2", Some(2))
        .exists());

    assert!(matches!(
        report.into_result(),
        Err(DerivativeError::PartialFailure { failed: 2, total: 12, .. })
    ));
    fx.assert_temp_dir_empty();
}

#[tokio::test]
async fn broken_page_count_is_fatal() {
    let fx = Fixture::new();
    let pdf = fx.file("empty.pdf", b"%PDF-1.7");
    let source = SourceDescriptor::new(&pdf, "application/pdf").unwrap();

    let err = generate(&source, &fx.config(0)).await.unwrap_err();
    assert!(matches!(err, DerivativeError::PageCountFailed { .. }));
    assert_eq!(count_files(&fx.root()), 0);
}

// ── Images ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn hostile_filename_is_passed_as_one_argument() {
    let fx = Fixture::new();
    let marker = format!("pwned{}", std::process::id());
    let name = format!("scan \"x\" || touch {marker}; $(touch {marker}) `touch {marker}`.png");
    let png = fx.file(&name, b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR");
    let source = SourceDescriptor::new(&png, "image/png").unwrap();

    let report = generate(&source, &fx.config(1)).await.unwrap();

    assert_all_written(&report);
    assert_eq!(report.count(DerivativeKind::Thumbnail), 1);
    assert_eq!(report.count(DerivativeKind::TilePyramid), 1);
    assert!(!Path::new(&marker).exists());
    assert!(!fx.dir.path().join(&marker).exists());

    // The tile pyramid is a copy of the converter's output, which echoes the
    // untouched source path.
    let tiles = std::fs::read_to_string(&report.outcomes[1].location).unwrap();
    assert!(tiles.contains(&name), "{tiles}");
    fx.assert_temp_dir_empty();
}

#[tokio::test]
async fn bitmap_source_is_aliased_not_converted() {
    let fx = Fixture::new();
    let bmp = fx.file("plate.bmp", b"BM\x36\0\0\0\0\0\0\0\x36\0\0\0");
    let source = SourceDescriptor::new(&bmp, "image/bmp").unwrap();

    let report = generate(&source, &fx.config(1)).await.unwrap();

    assert_all_written(&report);
    let tiles = fx.path_for(&source, DerivativeKind::TilePyramid, "jp2", None);
    assert_eq!(std::fs::read(tiles).unwrap(), std::fs::read(&bmp).unwrap());
    assert!(bmp.exists());
    fx.assert_temp_dir_empty();
}

#[tokio::test]
async fn jpeg2000_is_sniffed_from_content() {
    let fx = Fixture::new();
    let jp2 = fx.file(
        "scan.jp2",
        b"\0\0\0\x0cjP  \r\n\x87\n\0\0\0\x14ftypjp2 ",
    );
    // Declared type is wrong on purpose; the header wins.
    let source = SourceDescriptor::new(&jp2, "image/tiff").unwrap();

    let report = generate(&source, &fx.config(1)).await.unwrap();

    assert_all_written(&report);
    let tiles = fx.path_for(&source, DerivativeKind::TilePyramid, "jp2", None);
    let tiles = std::fs::read_to_string(tiles).unwrap();
    assert!(tiles.ends_with("scan.jp2"), "jp2 path went through the raster converter: {tiles}");
}

#[tokio::test]
async fn same_named_uploads_keep_separate_derivatives() {
    let fx = Fixture::new();
    std::fs::create_dir(fx.dir.path().join("u1")).unwrap();
    std::fs::create_dir(fx.dir.path().join("u2")).unwrap();
    let jpg = fx.file("u1/IMG_0001.jpg", b"\xff\xd8\xff\xe0\0\x10JFIF\0");
    let tiff = fx.file("u2/IMG_0001.tiff", b"II*\0\x08\0\0\0");
    let first = SourceDescriptor::new(&jpg, "image/jpeg").unwrap();
    let second = SourceDescriptor::new(&tiff, "image/tiff").unwrap();

    assert_all_written(&generate(&first, &fx.config(1)).await.unwrap());
    assert_all_written(&generate(&second, &fx.config(1)).await.unwrap());

    let a = fx.path_for(&first, DerivativeKind::TilePyramid, "jp2", None);
    let b = fx.path_for(&second, DerivativeKind::TilePyramid, "jp2", None);
    assert_ne!(a, b);
    assert!(std::fs::read_to_string(a).unwrap().contains("IMG_0001.jpg"));
    assert!(std::fs::read_to_string(b).unwrap().contains("IMG_0001.tiff"));
    assert_eq!(count_files(&fx.root()), 4);
}

// ── Other categories ─────────────────────────────────────────────────────────

#[tokio::test]
async fn office_document_goes_through_pdf() {
    let fx = Fixture::new();
    let doc = fx.file("minutes.docx", b"PK\x03\x04");
    let source = SourceDescriptor::new(
        &doc,
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    )
    .unwrap();

    let report = generate(&source, &fx.config(1)).await.unwrap();

    assert_all_written(&report);
    assert_eq!(report.category, MediaCategory::OfficeDocument);
    assert_eq!(report.count(DerivativeKind::Thumbnail), 1);
    assert_eq!(report.count(DerivativeKind::FullText), 1);
    let text = fx.path_for(&source, DerivativeKind::FullText, "txt", None);
    assert!(std::fs::read_to_string(text).unwrap().contains("minutes.pdf"));
}

#[tokio::test]
async fn audio_and_video_get_renditions() {
    let fx = Fixture::new();
    let wav = fx.file("talk.wav", b"RIFF\0\0\0\0WAVE");
    let mp4 = fx.file("clip.mp4", b"\0\0\0\x18ftypmp42");

    let audio = generate(&SourceDescriptor::new(&wav, "audio/x-wave").unwrap(), &fx.config(1))
        .await
        .unwrap();
    assert_all_written(&audio);
    assert_eq!(audio.count(DerivativeKind::Rendition), 2);

    let source = SourceDescriptor::new(&mp4, "video/mp4").unwrap();
    let video = generate(&source, &fx.config(1)).await.unwrap();
    assert_all_written(&video);
    assert_eq!(video.count(DerivativeKind::Rendition), 2);
    let poster = fx.path_for(&source, DerivativeKind::Thumbnail, "jpg", None);
    assert_eq!(std::fs::read_to_string(poster).unwrap(), "200x150");
}

#[tokio::test]
async fn unsupported_type_produces_nothing() {
    let fx = Fixture::new();
    let txt = fx.file("notes.txt", b"hello");
    let source = SourceDescriptor::new(&txt, "text/plain").unwrap();

    let err = generate(&source, &fx.config(1)).await.unwrap_err();

    assert!(matches!(err, DerivativeError::UnsupportedMimeType { .. }));
    assert!(!fx.root().exists());
}

// ── Enumeration ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn enumerate_lists_only_this_sources_derivatives() {
    let fx = Fixture::new();
    let pdf = fx.file("atlas.pdf", b"%PDF-1.7");
    let source = SourceDescriptor::new(&pdf, "application/pdf")
        .unwrap()
        .with_id("abcd");
    let config = fx.config(2);

    generate(&source, &config).await.unwrap();

    // A stray file and another source's derivative in the same directory.
    let dir = fx.path_for(&source, DerivativeKind::Thumbnail, "jpg", None);
    let dir = dir.parent().unwrap();
    std::fs::write(dir.join("cd-notes.jp2"), b"").unwrap();
    std::fs::write(dir.join("ce-zoomable.jp2"), b"").unwrap();

    let urls = fileset_derivatives::sorted_derivative_urls(&source, &config, "jp2").unwrap();
    let expected: Vec<String> = (0..2)
        .map(|p| {
            format!(
                "file://{}",
                fx.path_for(&source, DerivativeKind::TilePyramid, "jp2", Some(p))
                    .display()
            )
        })
        .collect();
    assert_eq!(urls, expected);

    let bitmaps = fileset_derivatives::sorted_derivative_urls(&source, &config, "bmp").unwrap();
    assert_eq!(bitmaps.len(), 2);
    assert!(fileset_derivatives::sorted_derivative_urls(&source, &config, "png")
        .unwrap()
        .is_empty());
}
