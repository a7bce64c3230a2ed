//! Raster-image document engine
//!
//! Treats image files as paginated documents: a directory is a document
//! whose pages are the images it contains (sorted by file name), a single
//! image file is a one-page document. Native units are source pixels.

use crate::engine::{EngineError, PageSize, PdfDocument, PdfEngine, PdfPage, Rotation, Viewport};
use async_trait::async_trait;
use image::imageops::{self, FilterType};
use image::RgbaImage;
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

const PAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

type PageStore = Vec<RgbaImage>;

/// Engine for image-backed documents
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterEngine;

impl RasterEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PdfEngine for RasterEngine {
    type Document = RasterDocument;

    async fn load_document(&self, uri: &str) -> Result<RasterDocument, EngineError> {
        let path = source_path(uri);
        let owned_uri = uri.to_owned();

        let pages = tokio::task::spawn_blocking(move || decode_pages(&path))
            .await
            .map_err(|err| EngineError::Backend(format!("decoder task failed: {err}")))??;

        log::debug!("decoded {} page(s) from {owned_uri}", pages.len());
        Ok(RasterDocument::from_images(owned_uri, pages))
    }
}

fn source_path(uri: &str) -> PathBuf {
    PathBuf::from(uri.strip_prefix("file://").unwrap_or(uri))
}

fn is_page_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| PAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn page_files(path: &Path) -> Result<Vec<PathBuf>, EngineError> {
    if !path.is_dir() {
        // Surface a proper NotFound instead of a decode error
        fs::metadata(path)?;
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry_path = entry?.path();
        if entry_path.is_file() && is_page_file(&entry_path) {
            files.push(entry_path);
        }
    }
    files.sort();
    Ok(files)
}

fn decode_pages(path: &Path) -> Result<PageStore, EngineError> {
    let files = page_files(path)?;
    if files.is_empty() {
        return Err(EngineError::NoPages(path.display().to_string()));
    }

    files
        .iter()
        .map(|file| {
            image::open(file)
                .map(|decoded| decoded.to_rgba8())
                .map_err(|err| EngineError::Decode(format!("{}: {err}", file.display())))
        })
        .collect()
}

/// A decoded image document
///
/// Holds the only strong reference to the decoded pages; pages handed out by
/// [`PdfDocument::get_page`] keep a weak one.
#[derive(Debug)]
pub struct RasterDocument {
    uri: String,
    page_count: u32,
    pages: Mutex<Option<Arc<PageStore>>>,
}

impl RasterDocument {
    /// Build a document from already-decoded pages
    pub fn from_images(uri: impl Into<String>, pages: Vec<RgbaImage>) -> Self {
        Self {
            uri: uri.into(),
            page_count: pages.len() as u32,
            pages: Mutex::new(Some(Arc::new(pages))),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn is_destroyed(&self) -> bool {
        self.pages.lock().is_none()
    }
}

#[async_trait]
impl PdfDocument for RasterDocument {
    type Page = RasterPage;

    fn page_count(&self) -> u32 {
        self.page_count
    }

    async fn get_page(&self, page_number: u32) -> Result<RasterPage, EngineError> {
        let store = self.pages.lock().clone().ok_or(EngineError::Disposed)?;

        let index = page_number
            .checked_sub(1)
            .filter(|index| (*index as usize) < store.len())
            .ok_or(EngineError::PageOutOfRange {
                page: page_number,
                page_count: self.page_count,
            })? as usize;

        let image = &store[index];
        Ok(RasterPage {
            page_number,
            index,
            size: PageSize::new(image.width() as f32, image.height() as f32),
            store: Arc::downgrade(&store),
        })
    }

    fn destroy(&self) {
        if self.pages.lock().take().is_some() {
            log::debug!("released decoded pages of {}", self.uri);
        }
    }
}

/// One page of a [`RasterDocument`]
#[derive(Debug, Clone)]
pub struct RasterPage {
    page_number: u32,
    index: usize,
    size: PageSize,
    store: Weak<PageStore>,
}

#[async_trait]
impl PdfPage for RasterPage {
    fn page_number(&self) -> u32 {
        self.page_number
    }

    fn size(&self) -> PageSize {
        self.size
    }

    async fn render(&self, viewport: Viewport) -> Result<RgbaImage, EngineError> {
        let store = self.store.upgrade().ok_or(EngineError::Disposed)?;
        let index = self.index;
        let (width, height) = Viewport::new(viewport.scale, Rotation::None).pixel_size(self.size);

        tokio::task::spawn_blocking(move || {
            let scaled = imageops::resize(&store[index], width, height, FilterType::Triangle);
            match viewport.rotation {
                Rotation::None => scaled,
                Rotation::Clockwise90 => imageops::rotate90(&scaled),
                Rotation::Half => imageops::rotate180(&scaled),
                Rotation::Clockwise270 => imageops::rotate270(&scaled),
            }
        })
        .await
        .map_err(|err| EngineError::Backend(format!("render task failed: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(width: u32, height: u32, color: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba(color))
    }

    #[tokio::test]
    async fn test_get_page_bounds() {
        let doc = RasterDocument::from_images("mem://doc", vec![solid(4, 2, [0; 4])]);
        assert_eq!(doc.page_count(), 1);

        let page = doc.get_page(1).await.unwrap();
        assert_eq!(page.page_number(), 1);
        assert_eq!(page.size(), PageSize::new(4.0, 2.0));

        assert!(matches!(
            doc.get_page(0).await,
            Err(EngineError::PageOutOfRange { page: 0, page_count: 1 })
        ));
        assert!(matches!(doc.get_page(2).await, Err(EngineError::PageOutOfRange { .. })));
    }

    #[tokio::test]
    async fn test_render_scales_and_rotates() {
        let doc = RasterDocument::from_images("mem://doc", vec![solid(40, 20, [9, 9, 9, 255])]);
        let page = doc.get_page(1).await.unwrap();

        let image = page.render(Viewport::new(2.0, Rotation::None)).await.unwrap();
        assert_eq!(image.dimensions(), (80, 40));

        let rotated = page.render(Viewport::new(0.5, Rotation::Clockwise90)).await.unwrap();
        assert_eq!(rotated.dimensions(), (10, 20));
    }

    #[tokio::test]
    async fn test_destroy_invalidates_pages() {
        let doc = RasterDocument::from_images("mem://doc", vec![solid(4, 4, [0; 4])]);
        let page = doc.get_page(1).await.unwrap();

        doc.destroy();
        assert!(doc.is_destroyed());
        assert!(matches!(
            page.render(Viewport::new(1.0, Rotation::None)).await,
            Err(EngineError::Disposed)
        ));
        assert!(matches!(doc.get_page(1).await, Err(EngineError::Disposed)));

        // Destroying twice is harmless
        doc.destroy();
    }

    #[tokio::test]
    async fn test_load_directory_sorted_by_name() {
        let dir = tempfile::tempdir().unwrap();
        solid(10, 10, [255, 0, 0, 255]).save(dir.path().join("b.png")).unwrap();
        solid(20, 10, [0, 255, 0, 255]).save(dir.path().join("a.png")).unwrap();
        fs::write(dir.path().join("notes.txt"), "not a page").unwrap();

        let doc = RasterEngine::new()
            .load_document(dir.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(doc.page_count(), 2);
        assert_eq!(doc.get_page(1).await.unwrap().size(), PageSize::new(20.0, 10.0));
        assert_eq!(doc.get_page(2).await.unwrap().size(), PageSize::new(10.0, 10.0));
    }

    #[tokio::test]
    async fn test_load_single_file_with_file_scheme() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.png");
        solid(8, 6, [0, 0, 255, 255]).save(&path).unwrap();

        let uri = format!("file://{}", path.display());
        let doc = RasterEngine::new().load_document(&uri).await.unwrap();
        assert_eq!(doc.page_count(), 1);
        assert_eq!(doc.uri(), uri);
    }

    #[tokio::test]
    async fn test_load_failures() {
        let dir = tempfile::tempdir().unwrap();

        let empty = RasterEngine::new().load_document(dir.path().to_str().unwrap()).await;
        assert!(matches!(empty, Err(EngineError::NoPages(_))));

        let missing = dir.path().join("missing.png");
        let result = RasterEngine::new().load_document(missing.to_str().unwrap()).await;
        assert!(matches!(result, Err(EngineError::Io(_))));

        let garbage = dir.path().join("garbage.png");
        fs::write(&garbage, b"definitely not a png").unwrap();
        let result = RasterEngine::new().load_document(garbage.to_str().unwrap()).await;
        assert!(matches!(result, Err(EngineError::Decode(_))));
    }
}
