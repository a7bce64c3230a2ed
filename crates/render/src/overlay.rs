//! Signature overlays
//!
//! Zones and signature images are positioned in percent of the page so
//! that they survive zoom changes. They are composited onto the rendered
//! raster in a fixed order: placed signature images first, pending zones
//! on top, so a zone outline stays visible over an already-filled slot.

use image::imageops::{self, FilterType};
use image::{Pixel, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Rectangle in percent of the page, each component in [0, 100]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Rectangle in surface pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    fn right(&self) -> u32 {
        self.x + self.width
    }

    fn bottom(&self) -> u32 {
        self.y + self.height
    }
}

fn clamp_percent(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

impl PercentRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Map onto a surface, clipped to its bounds
    ///
    /// Returns `None` when nothing of the rectangle is left.
    pub fn to_pixels(&self, surface_width: u32, surface_height: u32) -> Option<PixelRect> {
        let scale_x = surface_width as f32 / 100.0;
        let scale_y = surface_height as f32 / 100.0;

        let left = (clamp_percent(self.x) * scale_x).round() as u32;
        let top = (clamp_percent(self.y) * scale_y).round() as u32;
        let right =
            ((clamp_percent(self.x + self.width) * scale_x).round() as u32).min(surface_width);
        let bottom =
            ((clamp_percent(self.y + self.height) * scale_y).round() as u32).min(surface_height);

        if right <= left || bottom <= top {
            return None;
        }

        Some(PixelRect {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        })
    }
}

/// Placeholder region awaiting a signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureZone {
    pub page_number: u32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub label: Option<String>,
}

impl SignatureZone {
    pub fn rect(&self) -> PercentRect {
        PercentRect::new(self.x, self.y, self.width, self.height)
    }
}

/// A captured signature placed on a page
#[derive(Debug, Clone)]
pub struct SignatureImage {
    pub page_number: u32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub image_data: Arc<RgbaImage>,
}

impl SignatureImage {
    pub fn rect(&self) -> PercentRect {
        PercentRect::new(self.x, self.y, self.width, self.height)
    }
}

/// Colours used for zone highlights
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
    pub zone_fill: Rgba<u8>,
    pub zone_border: Rgba<u8>,
    pub border_width: u32,
    /// Height of the tab drawn above labelled zones
    pub label_tab_height: u32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            zone_fill: Rgba([255, 200, 0, 64]),
            zone_border: Rgba([230, 140, 0, 255]),
            border_width: 2,
            label_tab_height: 6,
        }
    }
}

/// Composite the overlays for `page_number` onto a copy of `base`
pub fn compose(
    base: &RgbaImage,
    page_number: u32,
    images: &[SignatureImage],
    zones: &[SignatureZone],
    style: &OverlayStyle,
) -> RgbaImage {
    let mut surface = base.clone();

    for signature in images.iter().filter(|image| image.page_number == page_number) {
        draw_signature(&mut surface, signature);
    }

    for zone in zones.iter().filter(|zone| zone.page_number == page_number) {
        draw_zone(&mut surface, zone, style);
    }

    surface
}

fn draw_signature(surface: &mut RgbaImage, signature: &SignatureImage) {
    let Some(rect) = signature.rect().to_pixels(surface.width(), surface.height()) else {
        return;
    };
    if signature.image_data.width() == 0 || signature.image_data.height() == 0 {
        return;
    }

    let scaled = imageops::resize(
        signature.image_data.as_ref(),
        rect.width,
        rect.height,
        FilterType::Triangle,
    );
    imageops::overlay(surface, &scaled, rect.x as i64, rect.y as i64);
}

fn draw_zone(surface: &mut RgbaImage, zone: &SignatureZone, style: &OverlayStyle) {
    let Some(rect) = zone.rect().to_pixels(surface.width(), surface.height()) else {
        return;
    };

    let border = style.border_width;
    let tab_bottom = if zone.label.is_some() {
        rect.y + style.label_tab_height.min(rect.height)
    } else {
        rect.y
    };

    for y in rect.y..rect.bottom() {
        for x in rect.x..rect.right() {
            let on_border = x < rect.x + border
                || x + border >= rect.right()
                || y < rect.y + border
                || y + border >= rect.bottom()
                || y < tab_bottom;
            let color = if on_border {
                style.zone_border
            } else {
                style.zone_fill
            };
            surface.get_pixel_mut(x, y).blend(&color);
        }
    }
}
