//! Scripted in-memory engine for tests
//!
//! Documents are registered by URI with a [`DocumentScript`] describing
//! their page count, delays and failures. Every call is recorded in an
//! [`EngineLog`] so tests can assert on what the viewer asked for.

use crate::engine::{EngineError, PageSize, PdfDocument, PdfEngine, PdfPage, Viewport};
use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Behaviour of one scripted document
#[derive(Debug, Clone)]
pub struct DocumentScript {
    pub page_count: u32,
    pub page_size: PageSize,
    pub load_delay: Duration,
    pub page_delay: Duration,
    pub render_delay: Duration,
    pub render_delays: HashMap<u32, Duration>,
    pub fail_load: Option<String>,
    pub fail_pages: BTreeSet<u32>,
    pub fail_renders: BTreeSet<u32>,
}

impl DocumentScript {
    pub fn new(page_count: u32) -> Self {
        Self {
            page_count,
            page_size: PageSize::new(612.0, 792.0),
            load_delay: Duration::ZERO,
            page_delay: Duration::ZERO,
            render_delay: Duration::ZERO,
            render_delays: HashMap::new(),
            fail_load: None,
            fail_pages: BTreeSet::new(),
            fail_renders: BTreeSet::new(),
        }
    }

    pub fn with_page_size(mut self, size: PageSize) -> Self {
        self.page_size = size;
        self
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    pub fn with_render_delay(mut self, delay: Duration) -> Self {
        self.render_delay = delay;
        self
    }

    pub fn with_render_delay_for(mut self, page: u32, delay: Duration) -> Self {
        self.render_delays.insert(page, delay);
        self
    }

    pub fn failing_load(mut self, message: impl Into<String>) -> Self {
        self.fail_load = Some(message.into());
        self
    }

    pub fn failing_page(mut self, page: u32) -> Self {
        self.fail_pages.insert(page);
        self
    }

    pub fn failing_render(mut self, page: u32) -> Self {
        self.fail_renders.insert(page);
        self
    }
}

/// Calls observed by a [`ScriptedEngine`]
#[derive(Debug, Clone, Default)]
pub struct EngineLog {
    pub loads: Vec<String>,
    pub destroyed: Vec<String>,
    pub page_requests: Vec<u32>,
    pub renders: Vec<(u32, Viewport)>,
}

#[derive(Debug, Default)]
struct Script {
    documents: HashMap<String, DocumentScript>,
    log: EngineLog,
}

/// Engine whose documents are described up front
#[derive(Debug, Clone, Default)]
pub struct ScriptedEngine {
    script: Arc<Mutex<Script>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(self, uri: impl Into<String>, script: DocumentScript) -> Self {
        self.add_document(uri, script);
        self
    }

    pub fn add_document(&self, uri: impl Into<String>, script: DocumentScript) {
        self.script.lock().documents.insert(uri.into(), script);
    }

    pub fn log(&self) -> EngineLog {
        self.script.lock().log.clone()
    }
}

#[async_trait]
impl PdfEngine for ScriptedEngine {
    type Document = ScriptedDocument;

    async fn load_document(&self, uri: &str) -> Result<ScriptedDocument, EngineError> {
        let script = {
            let mut state = self.script.lock();
            state.log.loads.push(uri.to_owned());
            state.documents.get(uri).cloned()
        };
        let script = script.ok_or_else(|| {
            EngineError::Io(io::Error::new(io::ErrorKind::NotFound, uri.to_owned()))
        })?;

        sleep(script.load_delay).await;
        if let Some(message) = &script.fail_load {
            return Err(EngineError::Decode(message.clone()));
        }

        Ok(ScriptedDocument {
            uri: uri.to_owned(),
            script: Arc::new(script),
            alive: Arc::new(AtomicBool::new(true)),
            engine: Arc::clone(&self.script),
        })
    }
}

pub struct ScriptedDocument {
    uri: String,
    script: Arc<DocumentScript>,
    alive: Arc<AtomicBool>,
    engine: Arc<Mutex<Script>>,
}

impl ScriptedDocument {
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn is_destroyed(&self) -> bool {
        !self.alive.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PdfDocument for ScriptedDocument {
    type Page = ScriptedPage;

    fn page_count(&self) -> u32 {
        self.script.page_count
    }

    async fn get_page(&self, page_number: u32) -> Result<ScriptedPage, EngineError> {
        self.engine.lock().log.page_requests.push(page_number);
        sleep(self.script.page_delay).await;

        if self.is_destroyed() {
            return Err(EngineError::Disposed);
        }
        if page_number == 0 || page_number > self.script.page_count {
            return Err(EngineError::PageOutOfRange {
                page: page_number,
                page_count: self.script.page_count,
            });
        }
        if self.script.fail_pages.contains(&page_number) {
            return Err(EngineError::Backend(format!("page {page_number} is corrupt")));
        }

        Ok(ScriptedPage {
            page_number,
            script: Arc::clone(&self.script),
            alive: Arc::clone(&self.alive),
            engine: Arc::clone(&self.engine),
        })
    }

    fn destroy(&self) {
        self.alive.store(false, Ordering::SeqCst);
        self.engine.lock().log.destroyed.push(self.uri.clone());
    }
}

pub struct ScriptedPage {
    page_number: u32,
    script: Arc<DocumentScript>,
    alive: Arc<AtomicBool>,
    engine: Arc<Mutex<Script>>,
}

#[async_trait]
impl PdfPage for ScriptedPage {
    fn page_number(&self) -> u32 {
        self.page_number
    }

    fn size(&self) -> PageSize {
        self.script.page_size
    }

    async fn render(&self, viewport: Viewport) -> Result<RgbaImage, EngineError> {
        self.engine
            .lock()
            .log
            .renders
            .push((self.page_number, viewport));

        let delay = self
            .script
            .render_delays
            .get(&self.page_number)
            .copied()
            .unwrap_or(self.script.render_delay);
        sleep(delay).await;

        if !self.alive.load(Ordering::SeqCst) {
            return Err(EngineError::Disposed);
        }
        if self.script.fail_renders.contains(&self.page_number) {
            return Err(EngineError::Backend(format!(
                "page {} failed to rasterize",
                self.page_number
            )));
        }

        let (width, height) = viewport.pixel_size(self.script.page_size);
        Ok(RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255])))
    }
}
