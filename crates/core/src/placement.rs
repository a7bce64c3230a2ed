//! Signature placement editor
//!
//! Lets the user draw one rectangular selection per page over the rendered
//! canvas, move it, resize it with eight handles and finally submit it in
//! native page units. Coordinates handled here are screen pixels relative
//! to the rendered page; the render scale captured when the page was drawn
//! converts them back to page units.
//!
//! Only one pointer interacts at a time. The pointer that started an
//! interaction is captured until it is released; events from any other
//! pointer are ignored.

use kurbo::{Point, Rect, Vec2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub type PointerId = u64;

/// Editor thresholds, in screen pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementConfig {
    /// Smallest width and height a selection may have
    pub min_size: f64,
    /// Grab distance for resize handles
    pub handle_hit_radius: f64,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            min_size: 16.0,
            handle_hit_radius: 8.0,
        }
    }
}

/// Resize handle on the selection outline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeHandle {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

impl ResizeHandle {
    pub const ALL: [ResizeHandle; 8] = [
        ResizeHandle::N,
        ResizeHandle::NE,
        ResizeHandle::E,
        ResizeHandle::SE,
        ResizeHandle::S,
        ResizeHandle::SW,
        ResizeHandle::W,
        ResizeHandle::NW,
    ];

    fn moves_left(self) -> bool {
        matches!(self, ResizeHandle::W | ResizeHandle::NW | ResizeHandle::SW)
    }

    fn moves_right(self) -> bool {
        matches!(self, ResizeHandle::E | ResizeHandle::NE | ResizeHandle::SE)
    }

    fn moves_top(self) -> bool {
        matches!(self, ResizeHandle::N | ResizeHandle::NE | ResizeHandle::NW)
    }

    fn moves_bottom(self) -> bool {
        matches!(self, ResizeHandle::S | ResizeHandle::SE | ResizeHandle::SW)
    }

    /// Where the handle sits on `selection`
    pub fn position(self, selection: &Selection) -> Point {
        let rect = selection.to_rect();
        let center = rect.center();
        let x = if self.moves_left() {
            rect.x0
        } else if self.moves_right() {
            rect.x1
        } else {
            center.x
        };
        let y = if self.moves_top() {
            rect.y0
        } else if self.moves_bottom() {
            rect.y1
        } else {
            center.y
        };
        Point::new(x, y)
    }
}

/// A selection rectangle in screen pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Selection {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The rectangle spanned by two opposite corners, in any order
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (b.x - a.x).abs(),
            height: (b.y - a.y).abs(),
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn to_rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.right(), self.bottom())
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.x <= self.right()
            && point.y >= self.y
            && point.y <= self.bottom()
    }

    /// Every coordinate multiplied by `factor`
    pub fn scaled(&self, factor: f64) -> Self {
        Self::new(
            self.x * factor,
            self.y * factor,
            self.width * factor,
            self.height * factor,
        )
    }
}

/// Submitted placement in native page units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
    pub page_number: u32,
    pub signature_id: u64,
}

/// Size of the rendered page and the logical scale it was rendered at
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderDimensions {
    pub width: f64,
    pub height: f64,
    pub scale: f32,
}

/// Current interaction mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorMode {
    Idle,
    Drawing,
    Dragging,
    Resizing(ResizeHandle),
}

/// Result of pressing escape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeOutcome {
    /// A gesture was in progress; it was aborted and the selection cleared
    GestureAborted,
    /// Nothing was in progress; the editor closed
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Interaction {
    Idle,
    Drawing {
        start: Point,
    },
    Dragging {
        offset: Vec2,
    },
    Resizing {
        handle: ResizeHandle,
        origin: Point,
        snapshot: Selection,
    },
}

/// `value` clamped to `[lo, hi]`; `lo` wins when the range is empty
fn clamp_between(value: f64, lo: f64, hi: f64) -> f64 {
    value.max(lo).min(hi.max(lo))
}

#[derive(Debug, Clone)]
pub struct PlacementEditor {
    config: PlacementConfig,
    open: bool,
    page_number: u32,
    render: Option<RenderDimensions>,
    selections: Arc<BTreeMap<u32, Selection>>,
    /// Render scale each page's selection is expressed in
    drawn_at: BTreeMap<u32, f32>,
    interaction: Interaction,
    pointer: Option<PointerId>,
    signature_id: Option<u64>,
}

impl PlacementEditor {
    pub fn new(config: PlacementConfig, page_number: u32) -> Self {
        Self {
            config,
            open: true,
            page_number,
            render: None,
            selections: Arc::new(BTreeMap::new()),
            drawn_at: BTreeMap::new(),
            interaction: Interaction::Idle,
            pointer: None,
            signature_id: None,
        }
    }

    pub fn config(&self) -> &PlacementConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn close(&mut self) {
        self.abort_gesture();
        self.open = false;
    }

    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    /// Record the size and scale of the freshly rendered page
    ///
    /// Interaction stays disabled until this is called for the current
    /// page.
    ///
    /// A selection drawn against another scale is rescaled so it keeps
    /// covering the same part of the page.
    pub fn set_rendered(&mut self, width: f64, height: f64, scale: f32) {
        self.render = Some(RenderDimensions {
            width,
            height,
            scale,
        });

        let drawn_at = self.drawn_at.get(&self.page_number).copied();
        if let (Some(selection), Some(drawn_at)) = (self.selection(), drawn_at) {
            if drawn_at != scale && drawn_at > 0.0 {
                let rescaled = selection.scaled(f64::from(scale) / f64::from(drawn_at));
                log::debug!(
                    "rescaling page {} selection from {drawn_at} to {scale}",
                    self.page_number
                );
                self.store(Some(rescaled));
            }
        }
    }

    /// Forget the render; the page must be rendered again before use
    pub fn invalidate_render(&mut self) {
        self.abort_gesture();
        self.render = None;
    }

    /// Drop the selections on every page
    pub fn clear_selections(&mut self) {
        self.abort_gesture();
        self.selections = Arc::new(BTreeMap::new());
        self.drawn_at.clear();
    }

    pub fn render_dimensions(&self) -> Option<RenderDimensions> {
        self.render
    }

    /// Switch to another page; the new page must be rendered before use
    pub fn go_to_page(&mut self, page_number: u32) {
        if page_number == self.page_number {
            return;
        }
        self.invalidate_render();
        self.page_number = page_number;
    }

    /// Whether pointer input is accepted
    pub fn is_interactive(&self) -> bool {
        self.open && self.render.is_some()
    }

    pub fn mode(&self) -> EditorMode {
        match self.interaction {
            Interaction::Idle => EditorMode::Idle,
            Interaction::Drawing { .. } => EditorMode::Drawing,
            Interaction::Dragging { .. } => EditorMode::Dragging,
            Interaction::Resizing { handle, .. } => EditorMode::Resizing(handle),
        }
    }

    pub fn set_signature_id(&mut self, signature_id: Option<u64>) {
        self.signature_id = signature_id;
    }

    pub fn signature_id(&self) -> Option<u64> {
        self.signature_id
    }

    /// Selection on the current page
    pub fn selection(&self) -> Option<Selection> {
        self.selections.get(&self.page_number).copied()
    }

    /// Every page's selection
    pub fn selections(&self) -> Arc<BTreeMap<u32, Selection>> {
        Arc::clone(&self.selections)
    }

    /// Remove the selection on the current page
    pub fn reset(&mut self) {
        self.abort_gesture();
        self.store(None);
    }

    /// Handle whose grab area contains `point`, nearest first
    pub fn handle_at(&self, point: Point) -> Option<ResizeHandle> {
        let selection = self.selection()?;
        ResizeHandle::ALL
            .iter()
            .map(|handle| (*handle, handle.position(&selection).distance(point)))
            .filter(|(_, distance)| *distance <= self.config.handle_hit_radius)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(handle, _)| handle)
    }

    /// Returns `true` if the event started an interaction
    pub fn pointer_down(&mut self, pointer: PointerId, point: Point) -> bool {
        if !self.is_interactive() || self.pointer.is_some() {
            return false;
        }
        let point = self.clamp_to_container(point);

        self.interaction = match self.selection() {
            None => {
                self.store(Some(Selection::from_corners(point, point)));
                Interaction::Drawing { start: point }
            }
            Some(selection) => {
                if let Some(handle) = self.handle_at(point) {
                    Interaction::Resizing {
                        handle,
                        origin: point,
                        snapshot: selection,
                    }
                } else if selection.contains(point) {
                    Interaction::Dragging {
                        offset: point - Point::new(selection.x, selection.y),
                    }
                } else {
                    return false;
                }
            }
        };
        self.pointer = Some(pointer);
        true
    }

    /// Returns `true` if the event belonged to the captured pointer
    pub fn pointer_move(&mut self, pointer: PointerId, point: Point) -> bool {
        if self.pointer != Some(pointer) {
            return false;
        }
        let Some(render) = self.render else {
            return false;
        };

        let next = match self.interaction {
            Interaction::Idle => return false,
            Interaction::Drawing { start } => {
                Selection::from_corners(start, self.clamp_to_container(point))
            }
            Interaction::Dragging { offset } => {
                let Some(current) = self.selection() else {
                    return false;
                };
                Selection {
                    x: clamp_between(point.x - offset.x, 0.0, render.width - current.width),
                    y: clamp_between(point.y - offset.y, 0.0, render.height - current.height),
                    ..current
                }
            }
            Interaction::Resizing {
                handle,
                origin,
                snapshot,
            } => self.resized(handle, snapshot, point - origin, render),
        };
        self.store(Some(next));
        true
    }

    /// Finish the interaction of the captured pointer
    pub fn pointer_up(&mut self, pointer: PointerId, point: Point) -> bool {
        if !self.pointer_move(pointer, point) {
            return false;
        }

        if let Interaction::Drawing { .. } = self.interaction {
            let too_small = self
                .selection()
                .map(|s| s.width < self.config.min_size || s.height < self.config.min_size)
                .unwrap_or(true);
            if too_small {
                log::debug!("discarding selection below {}px", self.config.min_size);
                self.store(None);
            }
        }

        self.interaction = Interaction::Idle;
        self.pointer = None;
        true
    }

    /// Abort a gesture in flight, or close the editor when idle
    pub fn escape(&mut self) -> EscapeOutcome {
        if self.interaction != Interaction::Idle {
            self.abort_gesture();
            log::debug!("placement gesture aborted");
            EscapeOutcome::GestureAborted
        } else {
            self.open = false;
            EscapeOutcome::Closed
        }
    }

    pub fn can_submit(&self) -> bool {
        self.open
            && self.interaction == Interaction::Idle
            && self.render.is_some()
            && self.signature_id.is_some()
            && self.selection().is_some()
    }

    /// Convert the current selection to native page units
    ///
    /// Returns `None` when submission is not possible.
    pub fn submit(&self) -> Option<Placement> {
        if !self.can_submit() {
            return None;
        }
        let selection = self.selection()?;
        let render = self.render?;
        let signature_id = self.signature_id?;

        let scale = render.scale as f64;
        let to_page = |value: f64| (value / scale).round() as i64;
        Some(Placement {
            x: to_page(selection.x),
            y: to_page(selection.y),
            width: to_page(selection.width),
            height: to_page(selection.height),
            page_number: self.page_number,
            signature_id,
        })
    }

    fn resized(
        &self,
        handle: ResizeHandle,
        snapshot: Selection,
        delta: Vec2,
        render: RenderDimensions,
    ) -> Selection {
        let min = self.config.min_size;

        // All edges come from the snapshot; the rectangle is rebuilt once
        let mut left = snapshot.x;
        let mut right = snapshot.right();
        let mut top = snapshot.y;
        let mut bottom = snapshot.bottom();

        if handle.moves_left() {
            left = clamp_between(snapshot.x + delta.x, 0.0, right - min);
        }
        if handle.moves_right() {
            right = clamp_between(snapshot.right() + delta.x, left + min, render.width);
        }
        if handle.moves_top() {
            top = clamp_between(snapshot.y + delta.y, 0.0, bottom - min);
        }
        if handle.moves_bottom() {
            bottom = clamp_between(snapshot.bottom() + delta.y, top + min, render.height);
        }

        Selection::new(left, top, right - left, bottom - top)
    }

    fn clamp_to_container(&self, point: Point) -> Point {
        match self.render {
            Some(render) => Point::new(
                clamp_between(point.x, 0.0, render.width),
                clamp_between(point.y, 0.0, render.height),
            ),
            None => point,
        }
    }

    /// Drop a gesture in flight together with its unfinished selection
    fn abort_gesture(&mut self) {
        if self.interaction != Interaction::Idle {
            self.store(None);
        }
        self.interaction = Interaction::Idle;
        self.pointer = None;
    }

    fn store(&mut self, selection: Option<Selection>) {
        let mut next = (*self.selections).clone();
        match selection {
            Some(selection) => {
                next.insert(self.page_number, selection);
                if let Some(render) = self.render {
                    self.drawn_at.insert(self.page_number, render.scale);
                }
            }
            None => {
                next.remove(&self.page_number);
                self.drawn_at.remove(&self.page_number);
            }
        }
        self.selections = Arc::new(next);
    }
}
