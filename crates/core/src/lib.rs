//! Signview Core Library
//!
//! Viewer state for signing documents: configuration, the document
//! lifecycle, neighbour-page prefetching, touch gestures and the signature
//! placement editor, tied together by [`SignatureViewer`].

pub mod config;
pub mod document;
pub mod gesture;
pub mod placement;
pub mod prefetch;
pub mod viewer;

pub use config::{ConfigError, ViewerConfig};
pub use document::{DocumentError, DocumentLifecycle, DocumentState, DocumentStatus};
pub use gesture::{GestureAction, GestureConfig, GestureInterpreter};
pub use placement::{
    EditorMode, EscapeOutcome, Placement, PlacementConfig, PlacementEditor, PointerId,
    RenderDimensions, ResizeHandle, Selection,
};
pub use prefetch::{PagePrefetcher, PrefetchUpdate};
pub use viewer::{SignatureViewer, ViewState, ViewerEvent, ZOOM_STEP};
