//! Signview Render Library
//!
//! Page rendering for the signature viewer: the decoding-engine boundary,
//! a raster-image engine, the signature overlay compositor and the
//! cancellable canvas render pipeline.

pub mod engine;
pub mod overlay;
pub mod pipeline;
pub mod raster;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use engine::{EngineError, PageSize, PdfDocument, PdfEngine, PdfPage, Rotation, Viewport};
pub use image::RgbaImage;
pub use overlay::{compose, OverlayStyle, PercentRect, PixelRect, SignatureImage, SignatureZone};
pub use pipeline::{
    CanvasRenderer, PipelineConfig, RenderError, RenderOutcome, RenderRequest, RenderedPage,
};
pub use raster::{RasterDocument, RasterEngine, RasterPage};
