//! The derivative service: one source, one routine, one report.
//!
//! [`DerivativeService`] binds a [`SourceDescriptor`] to a configuration and
//! an executor, classifies the source once and runs the matching category
//! routine. Every external tool call runs inside `spawn_blocking`; PDF pages
//! fan out through `buffer_unordered` with `page_concurrency` in flight.
//!
//! Fatal errors (unsupported type, failed preprocessing, temp-file trouble)
//! end the routine with `Err`. Everything else is recorded per derivative in
//! the returned [`GenerationReport`].

use crate::classify::MediaCategory;
use crate::config::PipelineConfig;
use crate::error::{DerivativeError, StepError};
use crate::output::{DerivativeOutcome, GenerationReport, GenerationStats, RoutineState};
use crate::pipeline::paths::{DerivativeKind, DerivativePathResolver};
use crate::pipeline::preprocess::{self, Preprocessors, SourceEncoding};
use crate::pipeline::shell::Shell;
use crate::pipeline::temp::{with_tmp_file, TempFile};
use crate::pipeline::{media, rasterize, text, thumbnail, zoomable};
use crate::progress::ProgressCallback;
use crate::source::SourceDescriptor;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const THUMBNAIL_EXT: &str = "jpg";
const ZOOMABLE_EXT: &str = "jp2";
const FULL_TEXT_EXT: &str = "txt";
const PAGE_BITMAP_EXT: &str = "bmp";

struct Inner {
    source: SourceDescriptor,
    config: PipelineConfig,
    shell: Shell,
    resolver: DerivativePathResolver,
}

/// Generates every derivative for one source.
///
/// Cheap to clone; clones share the same source, configuration and executor.
#[derive(Clone)]
pub struct DerivativeService {
    inner: Arc<Inner>,
}

impl DerivativeService {
    pub fn new(source: SourceDescriptor, config: PipelineConfig, shell: Shell) -> Self {
        let resolver = DerivativePathResolver::new(
            config.derivatives_root.clone(),
            config.url_scheme.clone(),
            source.id(),
        );
        Self {
            inner: Arc::new(Inner {
                source,
                config,
                shell,
                resolver,
            }),
        }
    }

    pub fn source(&self) -> &SourceDescriptor {
        &self.inner.source
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    pub fn resolver(&self) -> &DerivativePathResolver {
        &self.inner.resolver
    }

    fn shell(&self) -> &Shell {
        &self.inner.shell
    }

    fn temp_dir(&self) -> Option<&Path> {
        self.inner.config.temp_dir.as_deref()
    }

    fn callback(&self) -> Option<&ProgressCallback> {
        self.inner.config.progress_callback.as_ref()
    }

    // ── Dispatch ─────────────────────────────────────────────────────────

    /// Classify the source and run its category routine.
    ///
    /// # Errors
    /// [`DerivativeError::UnsupportedMimeType`] before any work is done, or
    /// any fatal error from the routine. Failed individual derivatives are
    /// not errors here; see [`GenerationReport::into_result`].
    pub async fn create_derivatives(&self) -> Result<GenerationReport, DerivativeError> {
        let category = MediaCategory::classify(self.source().mime_type())?;
        info!(
            "Generating derivatives for {} ({}, {})",
            self.source().path().display(),
            self.source().mime_type(),
            category
        );
        self.execute(category).await
    }

    pub async fn create_image_derivatives(&self) -> Result<GenerationReport, DerivativeError> {
        self.execute(MediaCategory::Image).await
    }

    pub async fn create_pdf_derivatives(&self) -> Result<GenerationReport, DerivativeError> {
        self.execute(MediaCategory::Pdf).await
    }

    pub async fn create_office_document_derivatives(
        &self,
    ) -> Result<GenerationReport, DerivativeError> {
        self.execute(MediaCategory::OfficeDocument).await
    }

    pub async fn create_audio_derivatives(&self) -> Result<GenerationReport, DerivativeError> {
        self.execute(MediaCategory::Audio).await
    }

    pub async fn create_video_derivatives(&self) -> Result<GenerationReport, DerivativeError> {
        self.execute(MediaCategory::Video).await
    }

    async fn execute(&self, category: MediaCategory) -> Result<GenerationReport, DerivativeError> {
        let mut run = Run::new(self, category);
        if let Some(cb) = self.callback() {
            cb.on_generation_start(category, self.expected_outcomes(category));
        }

        run.enter(RoutineState::Preprocessing);
        let routine = match category {
            MediaCategory::Image => self.image_routine(&mut run).await,
            MediaCategory::Pdf => self.pdf_routine(&mut run).await,
            MediaCategory::OfficeDocument => self.office_routine(&mut run).await,
            MediaCategory::Audio => self.audio_routine(&mut run).await,
            MediaCategory::Video => self.video_routine(&mut run).await,
        };

        match routine {
            Ok(()) => Ok(run.finish()),
            Err(e) => Err(run.abort(e)),
        }
    }

    fn expected_outcomes(&self, category: MediaCategory) -> Option<usize> {
        let config = self.config();
        match category {
            MediaCategory::Image | MediaCategory::OfficeDocument => Some(2),
            MediaCategory::Pdf => None,
            MediaCategory::Audio => Some(config.audio_renditions.len()),
            MediaCategory::Video => Some(config.video_renditions.len() + 1),
        }
    }

    // ── Category routines ────────────────────────────────────────────────

    async fn image_routine(&self, run: &mut Run) -> Result<(), DerivativeError> {
        let tmp = TempFile::new(self.temp_dir(), PAGE_BITMAP_EXT)?;
        let bitmap = tmp.path().to_path_buf();
        self.preprocess_image(&bitmap).await?;
        let bitmap_arg = bitmap.to_string_lossy().into_owned();

        run.enter(RoutineState::GeneratingDerivatives);
        let (thumb, tiles) = tokio::join!(
            self.attempt(
                DerivativeKind::Thumbnail,
                None,
                THUMBNAIL_EXT,
                self.create_thumbnail(&bitmap_arg),
            ),
            self.attempt(
                DerivativeKind::TilePyramid,
                None,
                ZOOMABLE_EXT,
                self.create_zoomable(&bitmap),
            ),
        );
        run.record(thumb);
        run.record(tiles);

        tmp.close()
    }

    async fn pdf_routine(&self, run: &mut Run) -> Result<(), DerivativeError> {
        let pdf = self.source().path().to_path_buf();
        let pages = self.page_count(&pdf).await?;
        info!("{} has {} pages", pdf.display(), pages);
        run.total_pages = Some(pages);
        if let Some(cb) = self.callback() {
            cb.on_page_count(pages, 2 + 2 * pages);
        }

        run.enter(RoutineState::GeneratingDerivatives);
        let first_page = rasterize::page_selector(&pdf, 0);
        let thumb = self.attempt(
            DerivativeKind::Thumbnail,
            None,
            THUMBNAIL_EXT,
            self.create_thumbnail(&first_page),
        );
        let full_text = self.attempt(
            DerivativeKind::FullText,
            None,
            FULL_TEXT_EXT,
            self.extract_full_text(&pdf),
        );
        // After a fatal page error, pages not yet started are skipped and
        // pages in flight run to completion before the error is returned.
        let aborted = AtomicBool::new(false);
        let page_work = stream::iter(0..pages)
            .map(|index| {
                let aborted = &aborted;
                let pdf = &pdf;
                async move {
                    if aborted.load(Ordering::SeqCst) {
                        return Ok(Vec::new());
                    }
                    let result = self.create_page_derivatives(pdf, index).await;
                    if result.is_err() {
                        aborted.store(true, Ordering::SeqCst);
                    }
                    result
                }
            })
            .buffer_unordered(self.config().page_concurrency)
            .collect::<Vec<_>>();

        let (thumb, full_text, page_results) = tokio::join!(thumb, full_text, page_work);
        run.record(thumb);
        run.record(full_text);

        let page_outcomes = page_results
            .into_iter()
            .collect::<Result<Vec<_>, DerivativeError>>()?;
        let mut page_outcomes: Vec<DerivativeOutcome> =
            page_outcomes.into_iter().flatten().collect();
        page_outcomes.sort_by_key(|o| (o.page, o.kind == DerivativeKind::TilePyramid));
        for outcome in page_outcomes {
            run.record(outcome);
        }
        Ok(())
    }

    async fn office_routine(&self, run: &mut Run) -> Result<(), DerivativeError> {
        let outdir = match self.temp_dir() {
            Some(dir) => tempfile::Builder::new()
                .prefix("derivative-office-")
                .tempdir_in(dir),
            None => tempfile::Builder::new()
                .prefix("derivative-office-")
                .tempdir(),
        }
        .map_err(|source| DerivativeError::TempFile {
            context: "create office output directory".to_string(),
            source,
        })?;

        let input = self.source().path().to_path_buf();
        let out = outdir.path().to_path_buf();
        let pdf = self
            .blocking(move |svc| {
                media::office_to_pdf(svc.shell(), &svc.config().tools.office_to_pdf, &input, &out)
            })
            .await?;

        run.enter(RoutineState::GeneratingDerivatives);
        let first_page = rasterize::page_selector(&pdf, 0);
        let (thumb, full_text) = tokio::join!(
            self.attempt(
                DerivativeKind::Thumbnail,
                None,
                THUMBNAIL_EXT,
                self.create_thumbnail(&first_page),
            ),
            self.attempt(
                DerivativeKind::FullText,
                None,
                FULL_TEXT_EXT,
                self.extract_full_text(&pdf),
            ),
        );
        run.record(thumb);
        run.record(full_text);

        outdir.close().map_err(|source| DerivativeError::TempFile {
            context: "remove office output directory".to_string(),
            source,
        })
    }

    async fn audio_routine(&self, run: &mut Run) -> Result<(), DerivativeError> {
        run.enter(RoutineState::GeneratingDerivatives);
        let renditions = self.config().audio_renditions.clone();
        for outcome in self.renditions(&renditions, false).await {
            run.record(outcome);
        }
        Ok(())
    }

    async fn video_routine(&self, run: &mut Run) -> Result<(), DerivativeError> {
        run.enter(RoutineState::GeneratingDerivatives);
        let renditions = self.config().video_renditions.clone();
        let (outcomes, poster) = tokio::join!(
            self.renditions(&renditions, true),
            self.attempt(
                DerivativeKind::Thumbnail,
                None,
                THUMBNAIL_EXT,
                self.create_video_thumbnail(),
            ),
        );
        for outcome in outcomes {
            run.record(outcome);
        }
        run.record(poster);
        Ok(())
    }

    async fn renditions(&self, extensions: &[String], video: bool) -> Vec<DerivativeOutcome> {
        join_all(extensions.iter().map(|ext| {
            self.attempt(
                DerivativeKind::Rendition,
                None,
                ext,
                self.create_rendition(ext, video),
            )
        }))
        .await
    }

    // ── Steps ────────────────────────────────────────────────────────────

    /// Decode the source image into an uncompressed bitmap at `dest`.
    pub async fn preprocess_image(&self, dest: &Path) -> Result<SourceEncoding, DerivativeError> {
        let dest = dest.to_path_buf();
        self.blocking(move |svc| {
            let tools = &svc.config().tools;
            preprocess::to_bitmap(
                svc.shell(),
                Preprocessors {
                    jp2_decompress: &tools.jp2_decompress,
                    raster_convert: &tools.raster_convert,
                },
                svc.source().path(),
                svc.source().mime_type(),
                &dest,
            )
        })
        .await
    }

    /// Write the thumbnail from `input` (a path, optionally with a page selector).
    pub async fn create_thumbnail(&self, input: &str) -> Result<PathBuf, DerivativeError> {
        let input = input.to_string();
        self.blocking(move |svc| {
            thumbnail::create_thumbnail(
                svc.shell(),
                &svc.config().tools.thumbnail,
                svc.resolver(),
                &input,
                svc.config().thumbnail_size(),
            )
        })
        .await
    }

    pub async fn create_zoomable(&self, bitmap: &Path) -> Result<PathBuf, DerivativeError> {
        let bitmap = bitmap.to_path_buf();
        self.blocking(move |svc| {
            zoomable::create_zoomable(
                svc.shell(),
                &svc.config().tools.zoomable,
                svc.resolver(),
                &bitmap,
            )
        })
        .await
    }

    pub async fn create_zoomable_page(
        &self,
        bitmap: &Path,
        page: Option<usize>,
    ) -> Result<PathBuf, DerivativeError> {
        let bitmap = bitmap.to_path_buf();
        self.blocking(move |svc| {
            zoomable::create_zoomable_page(
                svc.shell(),
                &svc.config().tools.zoomable,
                svc.resolver(),
                &bitmap,
                page,
            )
        })
        .await
    }

    /// Rasterise page `page` (0-based) of `pdf` into `dest`.
    pub async fn manual_convert(
        &self,
        pdf: &Path,
        page: usize,
        dest: &Path,
    ) -> Result<(), DerivativeError> {
        let (pdf, dest) = (pdf.to_path_buf(), dest.to_path_buf());
        self.blocking(move |svc| {
            rasterize::manual_convert(
                svc.shell(),
                &svc.config().tools.page_rasterize,
                &pdf,
                page,
                &dest,
            )
        })
        .await
    }

    /// Extract the text of `document`, passing the source URI along.
    pub async fn extract_full_text(&self, document: &Path) -> Result<PathBuf, DerivativeError> {
        let document = document.to_path_buf();
        self.blocking(move |svc| {
            text::extract_full_text(
                svc.shell(),
                &svc.config().tools.full_text,
                svc.resolver(),
                &document,
                svc.source().uri(),
            )
        })
        .await
    }

    pub async fn page_count(&self, pdf: &Path) -> Result<usize, DerivativeError> {
        let pdf = pdf.to_path_buf();
        self.blocking(move |svc| {
            rasterize::page_count(svc.shell(), &svc.config().tools.page_count, &pdf)
        })
        .await
    }

    async fn create_rendition(&self, extension: &str, video: bool) -> Result<PathBuf, DerivativeError> {
        let extension = extension.to_string();
        self.blocking(move |svc| {
            let tools = &svc.config().tools;
            let template = if video {
                &tools.video_rendition
            } else {
                &tools.audio_rendition
            };
            media::create_rendition(
                svc.shell(),
                template,
                svc.resolver(),
                svc.source().path(),
                &extension,
            )
        })
        .await
    }

    async fn create_video_thumbnail(&self) -> Result<PathBuf, DerivativeError> {
        self.blocking(|svc| {
            media::create_video_thumbnail(
                svc.shell(),
                &svc.config().tools.video_thumbnail,
                svc.resolver(),
                svc.source().path(),
                svc.config().thumbnail_size(),
            )
        })
        .await
    }

    /// Page bitmap and tile pyramid for one page.
    ///
    /// A failed rasterisation fails the page bitmap and skips the tile
    /// pyramid; only temp-file trouble is returned as `Err`.
    async fn create_page_derivatives(
        &self,
        pdf: &Path,
        index: usize,
    ) -> Result<Vec<DerivativeOutcome>, DerivativeError> {
        let pdf = pdf.to_path_buf();
        self.blocking(move |svc| {
            let tools = &svc.config().tools;
            with_tmp_file(svc.temp_dir(), PAGE_BITMAP_EXT, |bitmap| {
                let started = Instant::now();
                let page = Some(index);

                if let Err(e) =
                    rasterize::manual_convert(svc.shell(), &tools.page_rasterize, &pdf, index, bitmap)
                {
                    let bitmap_outcome =
                        svc.settle(DerivativeKind::PageBitmap, page, PAGE_BITMAP_EXT, started, Err(e.into()));
                    let tiles_outcome = svc.settle(
                        DerivativeKind::TilePyramid,
                        page,
                        ZOOMABLE_EXT,
                        started,
                        Err(StepError::Skipped {
                            reason: format!("page {index} could not be rasterised"),
                        }),
                    );
                    return Ok(vec![bitmap_outcome, tiles_outcome]);
                }

                let tiles = zoomable::create_zoomable_page(
                    svc.shell(),
                    &tools.zoomable,
                    svc.resolver(),
                    bitmap,
                    page,
                );
                let tiles_outcome = svc.settle(
                    DerivativeKind::TilePyramid,
                    page,
                    ZOOMABLE_EXT,
                    started,
                    tiles.map_err(StepError::from),
                );

                let dest = svc
                    .resolver()
                    .path_for(DerivativeKind::PageBitmap, PAGE_BITMAP_EXT, page);
                let published = rasterize::publish_page_bitmap(bitmap, &dest).map(|()| dest);
                let bitmap_outcome = svc.settle(
                    DerivativeKind::PageBitmap,
                    page,
                    PAGE_BITMAP_EXT,
                    started,
                    published.map_err(StepError::from),
                );

                Ok(vec![bitmap_outcome, tiles_outcome])
            })
        })
        .await
    }

    // ── Enumeration ──────────────────────────────────────────────────────

    /// Location URLs of this source's existing derivatives with `extension`,
    /// sorted and de-duplicated.
    pub fn sorted_derivative_urls(&self, extension: &str) -> Result<Vec<String>, DerivativeError> {
        self.resolver()
            .enumerate(extension)
            .map_err(|source| DerivativeError::WriteFailed {
                path: self.resolver().root().to_path_buf(),
                source,
            })
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    /// Run blocking tool work on the blocking pool with a handle to `self`.
    async fn blocking<T, F>(&self, f: F) -> Result<T, DerivativeError>
    where
        T: Send + 'static,
        F: FnOnce(&DerivativeService) -> Result<T, DerivativeError> + Send + 'static,
    {
        let svc = self.clone();
        tokio::task::spawn_blocking(move || f(&svc))
            .await
            .map_err(|e| DerivativeError::Internal(format!("blocking task failed: {e}")))?
    }

    async fn attempt(
        &self,
        kind: DerivativeKind,
        page: Option<usize>,
        extension: &str,
        work: impl Future<Output = Result<PathBuf, DerivativeError>>,
    ) -> DerivativeOutcome {
        let started = Instant::now();
        let result = work.await.map_err(StepError::from);
        self.settle(kind, page, extension, started, result)
    }

    /// Turn one step's result into an outcome and report it.
    fn settle(
        &self,
        kind: DerivativeKind,
        page: Option<usize>,
        extension: &str,
        started: Instant,
        result: Result<PathBuf, StepError>,
    ) -> DerivativeOutcome {
        let (location, error) = match result {
            Ok(location) => {
                debug!("{} {:?} written to {}", kind, page, location.display());
                if let Some(cb) = self.callback() {
                    cb.on_derivative_complete(kind, page);
                }
                (location, None)
            }
            Err(e) => {
                warn!("{} {:?} for {} failed: {}", kind, page, self.source().path().display(), e);
                if let Some(cb) = self.callback() {
                    cb.on_derivative_error(kind, page, &e.to_string());
                }
                (self.resolver().path_for(kind, extension, page), Some(e))
            }
        };
        DerivativeOutcome {
            kind,
            page,
            extension: extension.to_string(),
            location,
            error,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

impl std::fmt::Debug for DerivativeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivativeService")
            .field("source", &self.inner.source)
            .field("resolver", &self.inner.resolver)
            .finish()
    }
}

/// Bookkeeping for one routine: states entered and outcomes so far.
struct Run {
    source: PathBuf,
    mime_type: String,
    category: MediaCategory,
    callback: Option<ProgressCallback>,
    transitions: Vec<RoutineState>,
    outcomes: Vec<DerivativeOutcome>,
    total_pages: Option<usize>,
    started: Instant,
}

impl Run {
    fn new(svc: &DerivativeService, category: MediaCategory) -> Self {
        Self {
            source: svc.source().path().to_path_buf(),
            mime_type: svc.source().mime_type().to_string(),
            category,
            callback: svc.callback().cloned(),
            transitions: vec![RoutineState::NotStarted],
            outcomes: Vec::new(),
            total_pages: None,
            started: Instant::now(),
        }
    }

    fn enter(&mut self, state: RoutineState) {
        debug!("{} routine → {:?}", self.category, state);
        self.transitions.push(state);
        if let Some(cb) = &self.callback {
            cb.on_state_change(state);
        }
    }

    fn record(&mut self, outcome: DerivativeOutcome) {
        self.outcomes.push(outcome);
    }

    fn counts(&self) -> (usize, usize) {
        let failed = self.outcomes.iter().filter(|o| !o.is_success()).count();
        (self.outcomes.len() - failed, failed)
    }

    fn finish(mut self) -> GenerationReport {
        let (generated, failed) = self.counts();
        let state = if failed == 0 {
            RoutineState::Done
        } else {
            RoutineState::Failed
        };
        self.enter(state);
        if let Some(cb) = &self.callback {
            cb.on_generation_complete(generated, failed);
        }

        let stats = GenerationStats {
            total_pages: self.total_pages,
            generated,
            failed,
            total_duration_ms: self.started.elapsed().as_millis() as u64,
        };
        info!(
            "{} routine for {} finished: {} written, {} failed, {}ms",
            self.category,
            self.source.display(),
            generated,
            failed,
            stats.total_duration_ms
        );

        GenerationReport {
            source: self.source,
            mime_type: self.mime_type,
            category: self.category,
            state,
            transitions: self.transitions,
            outcomes: self.outcomes,
            stats,
        }
    }

    fn abort(mut self, error: DerivativeError) -> DerivativeError {
        warn!(
            "{} routine for {} aborted: {}",
            self.category,
            self.source.display(),
            error
        );
        self.enter(RoutineState::Failed);
        if let Some(cb) = &self.callback {
            let (generated, failed) = self.counts();
            cb.on_generation_complete(generated, failed);
        }
        error
    }
}
