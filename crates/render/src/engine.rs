//! Decoding-engine boundary
//!
//! The viewer never decodes documents itself. An engine turns a source URI
//! into a document, a document hands out pages, and a page renders itself
//! into an RGBA raster for a given viewport. All three steps are
//! asynchronous.

use async_trait::async_trait;
use image::RgbaImage;

/// Page rotation in 90 degree steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    #[default]
    None,
    Clockwise90,
    Half,
    Clockwise270,
}

impl Rotation {
    /// Parse a rotation in degrees
    ///
    /// Negative angles and multiples of 360 are normalised. Returns `None`
    /// for angles that are not a multiple of 90.
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::None),
            90 => Some(Rotation::Clockwise90),
            180 => Some(Rotation::Half),
            270 => Some(Rotation::Clockwise270),
            _ => None,
        }
    }

    pub fn degrees(self) -> u16 {
        match self {
            Rotation::None => 0,
            Rotation::Clockwise90 => 90,
            Rotation::Half => 180,
            Rotation::Clockwise270 => 270,
        }
    }

    /// Rotate a further 90 degrees clockwise
    pub fn rotate_clockwise(self) -> Self {
        match self {
            Rotation::None => Rotation::Clockwise90,
            Rotation::Clockwise90 => Rotation::Half,
            Rotation::Half => Rotation::Clockwise270,
            Rotation::Clockwise270 => Rotation::None,
        }
    }

    /// Whether width and height trade places
    pub fn swaps_axes(self) -> bool {
        matches!(self, Rotation::Clockwise90 | Rotation::Clockwise270)
    }
}

/// Intrinsic page size in native document units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Scale and rotation for one engine render
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Device-resolution scale (logical scale times pixel ratio)
    pub scale: f32,
    pub rotation: Rotation,
}

impl Viewport {
    pub fn new(scale: f32, rotation: Rotation) -> Self {
        Self { scale, rotation }
    }

    /// Raster size for a page, after rotation, at least 1x1
    pub fn pixel_size(&self, page: PageSize) -> (u32, u32) {
        let width = (page.width * self.scale).round().max(1.0) as u32;
        let height = (page.height * self.scale).round().max(1.0) as u32;
        if self.rotation.swaps_axes() {
            (height, width)
        } else {
            (width, height)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("document has no pages: {0}")]
    NoPages(String),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("document has been destroyed")]
    Disposed,
    #[error("backend error: {0}")]
    Backend(String),
}

/// Opens documents from source URIs
#[async_trait]
pub trait PdfEngine: Send + Sync + 'static {
    type Document: PdfDocument;

    async fn load_document(&self, uri: &str) -> Result<Self::Document, EngineError>;
}

/// A decoded document
///
/// The document owns its pages. After `destroy()` every page handed out
/// earlier fails to render with [`EngineError::Disposed`].
#[async_trait]
pub trait PdfDocument: Send + Sync + 'static {
    type Page: PdfPage;

    fn page_count(&self) -> u32;

    /// Load a 1-based page
    async fn get_page(&self, page_number: u32) -> Result<Self::Page, EngineError>;

    /// Release decoder-held resources
    fn destroy(&self);
}

/// A decoded page
#[async_trait]
pub trait PdfPage: Send + Sync + 'static {
    /// 1-based page number
    fn page_number(&self) -> u32;

    /// Unrotated size in native units
    fn size(&self) -> PageSize;

    async fn render(&self, viewport: Viewport) -> Result<RgbaImage, EngineError>;
}
