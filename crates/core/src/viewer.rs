//! Signature viewer
//!
//! [`SignatureViewer`] wires the document lifecycle, the page prefetcher,
//! the canvas renderer, the gesture interpreter and the placement editor
//! around one shared view state (page, scale, rotation). View changes are
//! reported as [`ViewerEvent`]s for a surrounding toolbar to pick up.

use crate::config::ViewerConfig;
use crate::document::{DocumentLifecycle, DocumentState, DocumentStatus};
use crate::gesture::{GestureAction, GestureInterpreter};
use crate::placement::{EscapeOutcome, PlacementEditor};
use crate::prefetch::PagePrefetcher;
use kurbo::Point;
use signview_render::{
    CanvasRenderer, PdfDocument, PdfEngine, RenderError, RenderOutcome, RenderRequest,
    RenderedPage, Rotation, SignatureImage, SignatureZone,
};
use std::sync::Arc;
use std::time::Instant;

/// Scale change applied by `zoom_in` / `zoom_out`
pub const ZOOM_STEP: f32 = 0.25;

type PageOf<E> = <<E as PdfEngine>::Document as PdfDocument>::Page;

/// Page, zoom and rotation currently shown
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    /// 1-based page number
    pub page: u32,
    pub scale: f32,
    pub rotation: Rotation,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            page: 1,
            scale: 1.0,
            rotation: Rotation::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewerEvent {
    PageChanged(u32),
    ScaleChanged(f32),
    RotationChanged(Rotation),
}

pub struct SignatureViewer<E: PdfEngine> {
    config: ViewerConfig,
    lifecycle: DocumentLifecycle<E>,
    prefetcher: PagePrefetcher<E::Document>,
    renderer: CanvasRenderer,
    gestures: GestureInterpreter,
    placement: Option<PlacementEditor>,
    view: ViewState,
    zones: Vec<SignatureZone>,
    images: Vec<SignatureImage>,
    events: Vec<ViewerEvent>,
}

impl<E: PdfEngine> SignatureViewer<E> {
    pub fn new(engine: E, config: ViewerConfig, device_pixel_ratio: f32) -> Self {
        Self {
            lifecycle: DocumentLifecycle::new(Arc::new(engine)),
            prefetcher: PagePrefetcher::new(),
            renderer: CanvasRenderer::new(config.pipeline_config(), device_pixel_ratio),
            gestures: GestureInterpreter::new(config.gesture_config()),
            placement: None,
            view: ViewState::default(),
            zones: Vec::new(),
            images: Vec::new(),
            events: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    /// Start loading `uri`, replacing whatever was open
    pub fn open(&mut self, uri: impl Into<String>) {
        self.renderer.reset();
        self.prefetcher.set_document(None);
        self.placement = None;
        self.gestures.set_enabled(true);
        self.set_page(1);
        self.lifecycle.set_source(uri);
    }

    /// Wait for the document load and the initial prefetch
    pub async fn settle(&mut self) {
        self.lifecycle.settle().await;
        self.attach_document();
        self.prefetcher.settle().await;
    }

    fn attach_document(&mut self) {
        let document = self.lifecycle.document();
        let attached = match (self.prefetcher.document(), &document) {
            (Some(current), Some(latest)) => Arc::ptr_eq(current, latest),
            (None, None) => true,
            _ => false,
        };
        if attached {
            return;
        }

        self.prefetcher.set_document(document);
        if self.lifecycle.state() == DocumentState::Ready {
            let page_count = self.lifecycle.page_count();
            if self.view.page > page_count {
                self.set_page(page_count.max(1));
            }
            self.prefetcher.update(self.view.page);
        }
    }

    pub fn status(&self) -> DocumentStatus {
        self.lifecycle.status()
    }

    /// Page count once the document is ready, otherwise 0
    pub fn page_count(&self) -> u32 {
        match self.lifecycle.state() {
            DocumentState::Ready => self.lifecycle.page_count(),
            _ => 0,
        }
    }

    pub fn view(&self) -> ViewState {
        self.view
    }

    /// Navigate to a 1-based page; returns `false` if out of range
    pub fn go_to_page(&mut self, page: u32) -> bool {
        self.attach_document();
        if page == 0 || page > self.page_count() {
            return false;
        }
        if page != self.view.page {
            self.renderer.cancel();
            self.set_page(page);
        }
        self.prefetcher.update(page);
        true
    }

    pub fn next_page(&mut self) -> bool {
        self.go_to_page(self.view.page.saturating_add(1))
    }

    pub fn previous_page(&mut self) -> bool {
        self.go_to_page(self.view.page.saturating_sub(1))
    }

    fn set_page(&mut self, page: u32) {
        if let Some(editor) = self.placement.as_mut() {
            editor.go_to_page(page);
        }
        if page != self.view.page {
            self.view.page = page;
            self.events.push(ViewerEvent::PageChanged(page));
        }
    }

    /// Set the zoom scale, clamped to the configured range
    pub fn set_scale(&mut self, scale: f32) -> f32 {
        let clamped = self.config.clamp_scale(scale);
        if clamped != scale {
            log::warn!(
                "scale {scale} outside [{}, {}], using {clamped}",
                self.config.min_scale,
                self.config.max_scale
            );
        }
        if clamped != self.view.scale {
            self.renderer.cancel();
            if let Some(editor) = self.placement.as_mut() {
                editor.invalidate_render();
            }
            self.view.scale = clamped;
            self.events.push(ViewerEvent::ScaleChanged(clamped));
        }
        clamped
    }

    pub fn zoom_in(&mut self) -> f32 {
        self.set_scale(self.view.scale + ZOOM_STEP)
    }

    pub fn zoom_out(&mut self) -> f32 {
        self.set_scale(self.view.scale - ZOOM_STEP)
    }

    /// Rotate the view; selections drawn in the old orientation are dropped
    pub fn rotate_clockwise(&mut self) -> Rotation {
        self.renderer.cancel();
        if let Some(editor) = self.placement.as_mut() {
            editor.invalidate_render();
            editor.clear_selections();
        }
        self.view.rotation = self.view.rotation.rotate_clockwise();
        self.events.push(ViewerEvent::RotationChanged(self.view.rotation));
        self.view.rotation
    }

    /// Replace the signature zones and placed signatures
    pub fn set_overlays(&mut self, zones: Vec<SignatureZone>, images: Vec<SignatureImage>) {
        self.renderer.cancel();
        self.zones = zones;
        self.images = images;
    }

    pub fn touch_start(&mut self, touches: &[Point], now: Instant) -> Option<GestureAction> {
        self.sync_placement();
        let action = self.gestures.touch_start(touches, now, self.view.scale);
        self.apply(action)
    }

    pub fn touch_move(&mut self, touches: &[Point]) -> Option<GestureAction> {
        self.sync_placement();
        let action = self.gestures.touch_move(touches);
        self.apply(action)
    }

    pub fn touch_end(&mut self, released: Option<Point>, now: Instant) -> Option<GestureAction> {
        self.sync_placement();
        let action = self.gestures.touch_end(released, now);
        self.apply(action)
    }

    fn apply(&mut self, action: Option<GestureAction>) -> Option<GestureAction> {
        match action? {
            GestureAction::Zoom(scale) => {
                self.set_scale(scale);
            }
            GestureAction::PreviousPage => {
                self.previous_page();
            }
            GestureAction::NextPage => {
                self.next_page();
            }
        }
        action
    }

    /// Render the current page with the current overlays
    ///
    /// Returns `None` when no document is ready.
    pub async fn render_current(&mut self) -> Option<RenderOutcome> {
        self.attach_document();
        let document = self.lifecycle.document()?;
        let page_number = self.view.page;

        let page: Arc<PageOf<E>> = match self.prefetcher.page(page_number) {
            Some(page) => page,
            None => match document.get_page(page_number).await {
                Ok(page) => Arc::new(page),
                Err(err) => {
                    log::warn!("failed to load page {page_number}: {err}");
                    return Some(RenderOutcome::Failed(RenderError::Engine {
                        page: page_number,
                        source: Arc::new(err),
                    }));
                }
            },
        };

        let request = RenderRequest::new(page, self.view.scale, self.view.rotation)
            .with_zones(self.zones.clone())
            .with_images(self.images.clone());
        let outcome = self.renderer.render(request).await;

        if outcome.is_rendered() {
            let rendered = self.renderer.rendered();
            if let (Some(editor), Some(rendered)) = (self.placement.as_mut(), rendered) {
                if rendered.page_number == editor.page_number() {
                    editor.set_rendered(
                        rendered.css_width(),
                        rendered.css_height(),
                        rendered.scale,
                    );
                }
            }
        }
        Some(outcome)
    }

    /// Raster currently on the canvas
    pub fn rendered(&self) -> Option<RenderedPage> {
        self.renderer.rendered()
    }

    pub fn last_render_error(&self) -> Option<RenderError> {
        self.renderer.last_error()
    }

    pub fn renderer(&self) -> &CanvasRenderer {
        &self.renderer
    }

    /// Open the placement editor on the current page
    ///
    /// Touch gestures are disabled while the editor owns pointer input.
    pub fn open_placement_editor(&mut self, signature_id: Option<u64>) -> &mut PlacementEditor {
        let mut editor = PlacementEditor::new(self.config.placement_config(), self.view.page);
        editor.set_signature_id(signature_id);
        if let Some(rendered) = self.renderer.rendered() {
            if rendered.page_number == self.view.page {
                editor.set_rendered(
                    rendered.css_width(),
                    rendered.css_height(),
                    rendered.scale,
                );
            }
        }
        self.gestures.set_enabled(false);
        self.placement.insert(editor)
    }

    pub fn placement_editor(&self) -> Option<&PlacementEditor> {
        self.placement.as_ref()
    }

    pub fn placement_editor_mut(&mut self) -> Option<&mut PlacementEditor> {
        self.placement.as_mut()
    }

    /// Route the escape key to the placement editor
    pub fn escape(&mut self) -> Option<EscapeOutcome> {
        let outcome = self.placement.as_mut()?.escape();
        self.sync_placement();
        Some(outcome)
    }

    fn sync_placement(&mut self) {
        if self.placement.as_ref().is_some_and(|editor| !editor.is_open()) {
            self.placement = None;
        }
        self.gestures.set_enabled(self.placement.is_none());
    }

    /// Tear everything down; the viewer can be reopened afterwards
    pub fn close(&mut self) {
        self.renderer.reset();
        self.prefetcher.set_document(None);
        self.placement = None;
        self.lifecycle.teardown();
    }

    /// Take the view change notifications emitted so far
    pub fn drain_events(&mut self) -> Vec<ViewerEvent> {
        std::mem::take(&mut self.events)
    }
}
