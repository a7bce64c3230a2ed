//! Canvas render pipeline
//!
//! A [`CanvasRenderer`] owns one drawing surface. Each render request runs
//! as a cancellable task: the base raster comes from the render cache when
//! present, otherwise from the engine under a hard timeout, and the
//! signature overlays are composited on top. Starting a new request
//! supersedes the one in flight. Failures are recorded on the surface and
//! never replace the last good raster.

use crate::engine::{EngineError, PdfPage, Rotation, Viewport};
use crate::overlay::{compose, OverlayStyle, SignatureImage, SignatureZone};
use image::RgbaImage;
use parking_lot::Mutex;
use signview_cache::{CacheKey, RenderCache, DEFAULT_CAPACITY};
use signview_scheduler::{CancellationToken, TaskHandle};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Hard limit for a single engine render
pub const RENDER_TIMEOUT_SECS: u64 = 30;
/// Device pixel ratios above this are capped to bound memory use
pub const MAX_DEVICE_PIXEL_RATIO: f32 = 2.5;
pub const MIN_SCALE: f32 = 0.5;
pub const MAX_SCALE: f32 = 3.0;

/// Tunables for a [`CanvasRenderer`]
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub min_scale: f32,
    pub max_scale: f32,
    pub max_device_pixel_ratio: f32,
    pub render_timeout: Duration,
    pub cache_capacity: usize,
    pub overlay_style: OverlayStyle,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_scale: MIN_SCALE,
            max_scale: MAX_SCALE,
            max_device_pixel_ratio: MAX_DEVICE_PIXEL_RATIO,
            render_timeout: Duration::from_secs(RENDER_TIMEOUT_SECS),
            cache_capacity: DEFAULT_CAPACITY,
            overlay_style: OverlayStyle::default(),
        }
    }
}

impl PipelineConfig {
    /// Clamp a logical scale into the supported range
    pub fn clamp_scale(&self, scale: f32) -> f32 {
        if !scale.is_finite() {
            return self.min_scale;
        }
        scale.max(self.min_scale).min(self.max_scale.max(self.min_scale))
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RenderError {
    #[error("rendering page {page} timed out after {}s", timeout.as_secs())]
    Timeout { page: u32, timeout: Duration },
    #[error("rendering page {page} failed: {source}")]
    Engine {
        page: u32,
        #[source]
        source: Arc<EngineError>,
    },
}

impl RenderError {
    pub fn page(&self) -> u32 {
        match self {
            RenderError::Timeout { page, .. } | RenderError::Engine { page, .. } => *page,
        }
    }
}

/// One page render: the page, its view parameters and the overlays
pub struct RenderRequest<P> {
    pub page: Arc<P>,
    pub scale: f32,
    pub rotation: Rotation,
    pub zones: Vec<SignatureZone>,
    pub images: Vec<SignatureImage>,
}

impl<P: PdfPage> RenderRequest<P> {
    pub fn new(page: Arc<P>, scale: f32, rotation: Rotation) -> Self {
        Self {
            page,
            scale,
            rotation,
            zones: Vec::new(),
            images: Vec::new(),
        }
    }

    pub fn with_zones(mut self, zones: Vec<SignatureZone>) -> Self {
        self.zones = zones;
        self
    }

    pub fn with_images(mut self, images: Vec<SignatureImage>) -> Self {
        self.images = images;
        self
    }
}

/// The raster currently shown on a surface
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub page_number: u32,
    /// Logical scale the page was rendered at
    pub scale: f32,
    pub rotation: Rotation,
    pub device_pixel_ratio: f32,
    /// Logical scale times the capped device pixel ratio
    pub effective_scale: f32,
    pub image: Arc<RgbaImage>,
    pub from_cache: bool,
}

impl RenderedPage {
    /// Width in layout (CSS) pixels
    pub fn css_width(&self) -> f64 {
        self.image.width() as f64 / self.device_pixel_ratio as f64
    }

    /// Height in layout (CSS) pixels
    pub fn css_height(&self) -> f64 {
        self.image.height() as f64 / self.device_pixel_ratio as f64
    }
}

#[derive(Debug, Default)]
struct CanvasSurface {
    rendered: Option<RenderedPage>,
    last_error: Option<RenderError>,
}

/// How a render task ended
#[derive(Debug, Clone)]
pub enum RenderOutcome {
    Rendered { page_number: u32, from_cache: bool },
    /// A newer request or `cancel()` took over; the surface was not touched
    Superseded,
    Failed(RenderError),
}

impl RenderOutcome {
    pub fn is_rendered(&self) -> bool {
        matches!(self, RenderOutcome::Rendered { .. })
    }
}

/// Renders pages onto a single surface, one task at a time
pub struct CanvasRenderer {
    config: PipelineConfig,
    device_pixel_ratio: f32,
    cache: RenderCache<Arc<RgbaImage>>,
    surface: Arc<Mutex<CanvasSurface>>,
    in_flight: Option<TaskHandle<RenderOutcome>>,
}

impl CanvasRenderer {
    pub fn new(config: PipelineConfig, device_pixel_ratio: f32) -> Self {
        let cache = RenderCache::new(config.cache_capacity);
        Self {
            config,
            device_pixel_ratio: sanitize_ratio(device_pixel_ratio),
            cache,
            surface: Arc::new(Mutex::new(CanvasSurface::default())),
            in_flight: None,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn device_pixel_ratio(&self) -> f32 {
        self.device_pixel_ratio
    }

    /// Change the display density; takes effect on the next render
    pub fn set_device_pixel_ratio(&mut self, ratio: f32) {
        self.device_pixel_ratio = sanitize_ratio(ratio);
    }

    /// Ratio actually applied to rasters
    pub fn capped_pixel_ratio(&self) -> f32 {
        self.device_pixel_ratio.min(self.config.max_device_pixel_ratio)
    }

    /// Raster scale for a logical scale
    pub fn effective_scale(&self, scale: f32) -> f32 {
        self.config.clamp_scale(scale) * self.capped_pixel_ratio()
    }

    /// Start rendering `request`, superseding any render in flight
    pub fn start<P: PdfPage>(&mut self, request: RenderRequest<P>) {
        self.cancel();

        let scale = self.config.clamp_scale(request.scale);
        if scale != request.scale {
            log::warn!(
                "scale {} outside [{}, {}], rendering at {scale}",
                request.scale,
                self.config.min_scale,
                self.config.max_scale
            );
        }

        let job = RenderJob {
            page_number: request.page.page_number(),
            scale,
            device_pixel_ratio: self.capped_pixel_ratio(),
            rotation: request.rotation,
            render_timeout: self.config.render_timeout,
            style: self.config.overlay_style,
            cache: self.cache.clone(),
            surface: Arc::clone(&self.surface),
        };
        let RenderRequest {
            page,
            zones,
            images,
            ..
        } = request;

        log::debug!(
            "render page {} at scale {scale} ({:?})",
            job.page_number,
            job.rotation
        );
        self.in_flight = Some(TaskHandle::spawn(move |token| {
            job.run(page, zones, images, token)
        }));
    }

    /// Wait for the render in flight, if any
    pub async fn finish(&mut self) -> Option<RenderOutcome> {
        let handle = self.in_flight.take()?;
        Some(handle.join().await.unwrap_or(RenderOutcome::Superseded))
    }

    /// Render and wait for the result
    pub async fn render<P: PdfPage>(&mut self, request: RenderRequest<P>) -> RenderOutcome {
        self.start(request);
        self.finish().await.unwrap_or(RenderOutcome::Superseded)
    }

    /// Cancel the render in flight; its result will be discarded
    pub fn cancel(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            if !handle.is_finished() {
                log::debug!("superseding in-flight render");
            }
            handle.cancel();
        }
    }

    pub fn is_rendering(&self) -> bool {
        self.in_flight
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// The raster currently on the surface
    pub fn rendered(&self) -> Option<RenderedPage> {
        self.surface.lock().rendered.clone()
    }

    /// Error from the most recent failed render, cleared on success
    pub fn last_error(&self) -> Option<RenderError> {
        self.surface.lock().last_error.clone()
    }

    pub fn cache(&self) -> &RenderCache<Arc<RgbaImage>> {
        &self.cache
    }

    /// Cancel any render, drop cached rasters and blank the surface
    pub fn reset(&mut self) {
        self.cancel();
        self.cache.clear();
        let mut surface = self.surface.lock();
        surface.rendered = None;
        surface.last_error = None;
    }
}

fn sanitize_ratio(ratio: f32) -> f32 {
    if ratio.is_finite() && ratio > 0.0 {
        ratio
    } else {
        1.0
    }
}

struct RenderJob {
    page_number: u32,
    scale: f32,
    device_pixel_ratio: f32,
    rotation: Rotation,
    render_timeout: Duration,
    style: OverlayStyle,
    cache: RenderCache<Arc<RgbaImage>>,
    surface: Arc<Mutex<CanvasSurface>>,
}

impl RenderJob {
    fn effective_scale(&self) -> f32 {
        self.scale * self.device_pixel_ratio
    }

    async fn run<P: PdfPage>(
        self,
        page: Arc<P>,
        zones: Vec<SignatureZone>,
        images: Vec<SignatureImage>,
        token: CancellationToken,
    ) -> RenderOutcome {
        let effective_scale = self.effective_scale();
        let key = CacheKey::new(self.page_number, effective_scale, self.rotation.degrees());

        let (base, from_cache) = match self.cache.get(&key) {
            Some(base) => (base, true),
            None => {
                let viewport = Viewport::new(effective_scale, self.rotation);
                let result = timeout(self.render_timeout, page.render(viewport)).await;
                if token.is_cancelled() {
                    return RenderOutcome::Superseded;
                }
                match result {
                    Ok(Ok(image)) => {
                        let image = Arc::new(image);
                        self.cache.put(key, Arc::clone(&image));
                        (image, false)
                    }
                    Ok(Err(err)) => {
                        return self.fail(
                            &token,
                            RenderError::Engine {
                                page: self.page_number,
                                source: Arc::new(err),
                            },
                        )
                    }
                    Err(_) => {
                        return self.fail(
                            &token,
                            RenderError::Timeout {
                                page: self.page_number,
                                timeout: self.render_timeout,
                            },
                        )
                    }
                }
            }
        };

        let composed = compose(&base, self.page_number, &images, &zones, &self.style);
        self.publish(&token, composed, from_cache)
    }

    fn publish(
        &self,
        token: &CancellationToken,
        image: RgbaImage,
        from_cache: bool,
    ) -> RenderOutcome {
        let mut surface = self.surface.lock();
        if token.is_cancelled() {
            return RenderOutcome::Superseded;
        }
        surface.rendered = Some(RenderedPage {
            page_number: self.page_number,
            scale: self.scale,
            rotation: self.rotation,
            device_pixel_ratio: self.device_pixel_ratio,
            effective_scale: self.effective_scale(),
            image: Arc::new(image),
            from_cache,
        });
        surface.last_error = None;
        RenderOutcome::Rendered {
            page_number: self.page_number,
            from_cache,
        }
    }

    fn fail(&self, token: &CancellationToken, error: RenderError) -> RenderOutcome {
        let mut surface = self.surface.lock();
        if token.is_cancelled() {
            return RenderOutcome::Superseded;
        }
        log::warn!("{error}");
        surface.last_error = Some(error.clone());
        RenderOutcome::Failed(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{PageSize, PdfDocument, PdfEngine};
    use crate::testing::{DocumentScript, ScriptedEngine, ScriptedPage};
    use image::Rgba;

    const URI: &str = "memory://contract.pdf";

    async fn page(engine: &ScriptedEngine, number: u32) -> Arc<ScriptedPage> {
        let document = engine.load_document(URI).await.unwrap();
        Arc::new(document.get_page(number).await.unwrap())
    }

    fn engine(script: DocumentScript) -> ScriptedEngine {
        ScriptedEngine::new().with_document(URI, script)
    }

    fn letter() -> DocumentScript {
        DocumentScript::new(3).with_page_size(PageSize::new(100.0, 200.0))
    }

    #[tokio::test]
    async fn test_render_records_logical_scale() {
        let engine = engine(letter());
        let mut renderer = CanvasRenderer::new(PipelineConfig::default(), 2.0);

        let outcome = renderer
            .render(RenderRequest::new(page(&engine, 1).await, 1.5, Rotation::None))
            .await;
        assert!(outcome.is_rendered());

        let rendered = renderer.rendered().unwrap();
        assert_eq!(rendered.page_number, 1);
        assert_eq!(rendered.scale, 1.5);
        assert_eq!(rendered.effective_scale, 3.0);
        assert_eq!(rendered.image.dimensions(), (300, 600));
        assert_eq!(rendered.css_width(), 150.0);
        assert!(!rendered.from_cache);
        assert!(renderer.last_error().is_none());
    }

    #[tokio::test]
    async fn test_device_pixel_ratio_is_capped() {
        let renderer = CanvasRenderer::new(PipelineConfig::default(), 4.0);
        assert_eq!(renderer.capped_pixel_ratio(), 2.5);
        assert_eq!(renderer.effective_scale(2.0), 5.0);

        let renderer = CanvasRenderer::new(PipelineConfig::default(), 0.0);
        assert_eq!(renderer.device_pixel_ratio(), 1.0);
    }

    #[tokio::test]
    async fn test_scale_is_clamped() {
        let engine = engine(letter());
        let mut renderer = CanvasRenderer::new(PipelineConfig::default(), 1.0);

        renderer
            .render(RenderRequest::new(page(&engine, 1).await, 10.0, Rotation::None))
            .await;
        assert_eq!(renderer.rendered().unwrap().scale, 3.0);

        renderer
            .render(RenderRequest::new(page(&engine, 1).await, 0.1, Rotation::None))
            .await;
        assert_eq!(renderer.rendered().unwrap().scale, 0.5);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_engine_but_recomposites() {
        let engine = engine(letter());
        let mut renderer = CanvasRenderer::new(PipelineConfig::default(), 1.0);
        let first = page(&engine, 1).await;

        renderer
            .render(RenderRequest::new(Arc::clone(&first), 1.0, Rotation::None))
            .await;
        let plain = renderer.rendered().unwrap();
        assert_eq!(plain.image.get_pixel(10, 10), &Rgba([255, 255, 255, 255]));

        let zone = SignatureZone {
            page_number: 1,
            x: 0.0,
            y: 0.0,
            width: 50.0,
            height: 50.0,
            label: None,
        };
        let outcome = renderer
            .render(RenderRequest::new(first, 1.0, Rotation::None).with_zones(vec![zone]))
            .await;

        assert!(matches!(
            outcome,
            RenderOutcome::Rendered {
                from_cache: true,
                ..
            }
        ));
        assert_eq!(engine.log().renders.len(), 1);
        let highlighted = renderer.rendered().unwrap();
        assert_ne!(highlighted.image.get_pixel(10, 10), &Rgba([255, 255, 255, 255]));
    }

    #[tokio::test]
    async fn test_rotation_and_scale_are_part_of_the_cache_key() {
        let engine = engine(letter());
        let mut renderer = CanvasRenderer::new(PipelineConfig::default(), 1.0);
        let first = page(&engine, 1).await;

        renderer
            .render(RenderRequest::new(Arc::clone(&first), 1.0, Rotation::None))
            .await;
        renderer
            .render(RenderRequest::new(Arc::clone(&first), 1.0, Rotation::Clockwise90))
            .await;
        renderer
            .render(RenderRequest::new(first, 2.0, Rotation::None))
            .await;

        assert_eq!(engine.log().renders.len(), 3);
        assert_eq!(renderer.cache().len(), 3);
        assert_eq!(renderer.rendered().unwrap().image.dimensions(), (200, 400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_recorded_and_previous_raster_kept() {
        let engine = engine(letter().with_render_delay_for(2, Duration::from_secs(31)));
        let mut renderer = CanvasRenderer::new(PipelineConfig::default(), 1.0);

        renderer
            .render(RenderRequest::new(page(&engine, 1).await, 1.0, Rotation::None))
            .await;
        let outcome = renderer
            .render(RenderRequest::new(page(&engine, 2).await, 1.0, Rotation::None))
            .await;

        match outcome {
            RenderOutcome::Failed(RenderError::Timeout { page, timeout }) => {
                assert_eq!(page, 2);
                assert_eq!(timeout, Duration::from_secs(RENDER_TIMEOUT_SECS));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(renderer.rendered().unwrap().page_number, 1);
        assert_eq!(renderer.last_error().unwrap().page(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_render_supersedes_in_flight() {
        let engine = engine(letter().with_render_delay_for(1, Duration::from_secs(5)));
        let mut renderer = CanvasRenderer::new(PipelineConfig::default(), 1.0);

        renderer.start(RenderRequest::new(page(&engine, 1).await, 1.0, Rotation::None));
        assert!(renderer.is_rendering());
        let outcome = renderer
            .render(RenderRequest::new(page(&engine, 2).await, 1.0, Rotation::None))
            .await;
        assert!(outcome.is_rendered());

        // Let the superseded render complete; it must not overwrite page 2
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(renderer.rendered().unwrap().page_number, 2);
        assert!(!renderer.cache().contains(&CacheKey::new(1, 1.0, 0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_discards_result() {
        let engine = engine(letter().with_render_delay(Duration::from_secs(1)));
        let mut renderer = CanvasRenderer::new(PipelineConfig::default(), 1.0);

        renderer.start(RenderRequest::new(page(&engine, 1).await, 1.0, Rotation::None));
        renderer.cancel();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(renderer.rendered().is_none());
        assert!(renderer.last_error().is_none());
        assert!(renderer.finish().await.is_none());
    }

    #[tokio::test]
    async fn test_disposed_page_fails_without_clearing_surface() {
        let engine = engine(letter());
        let document = engine.load_document(URI).await.unwrap();
        let first = Arc::new(document.get_page(1).await.unwrap());
        let second = Arc::new(document.get_page(2).await.unwrap());
        let mut renderer = CanvasRenderer::new(PipelineConfig::default(), 1.0);

        renderer
            .render(RenderRequest::new(first, 1.0, Rotation::None))
            .await;
        document.destroy();
        let outcome = renderer
            .render(RenderRequest::new(second, 1.0, Rotation::None))
            .await;

        match outcome {
            RenderOutcome::Failed(RenderError::Engine { page, source }) => {
                assert_eq!(page, 2);
                assert!(matches!(*source, EngineError::Disposed));
            }
            other => panic!("expected engine error, got {other:?}"),
        }
        assert_eq!(renderer.rendered().unwrap().page_number, 1);
    }

    #[tokio::test]
    async fn test_reset_clears_surface_and_cache() {
        let engine = engine(letter());
        let mut renderer = CanvasRenderer::new(PipelineConfig::default(), 1.0);
        renderer
            .render(RenderRequest::new(page(&engine, 1).await, 1.0, Rotation::None))
            .await;

        renderer.reset();
        assert!(renderer.rendered().is_none());
        assert!(renderer.cache().is_empty());
    }
}
