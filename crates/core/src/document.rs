//! Document lifecycle
//!
//! [`DocumentLifecycle`] owns the decoded document for the current source
//! URI. Changing the source cancels the load in flight and destroys the
//! previous document before the new load starts, so at most one document
//! is alive per viewer. Load failures become state on [`DocumentStatus`]
//! and are never returned to the caller.

use parking_lot::Mutex;
use signview_render::{EngineError, PdfDocument, PdfEngine};
use signview_scheduler::{CancellationToken, Generation, GenerationCounter, TaskHandle};
use std::sync::Arc;

/// Lifecycle state of the viewer's document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentState {
    /// No source has been set
    #[default]
    Idle,
    Loading,
    Ready,
    Failed,
    /// Torn down; nothing is loaded
    Disposed,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DocumentError {
    #[error("failed to open {uri}: {source}")]
    Load {
        uri: String,
        #[source]
        source: Arc<EngineError>,
    },
}

/// Snapshot of the lifecycle state for display
#[derive(Debug, Clone, Default)]
pub struct DocumentStatus {
    pub state: DocumentState,
    pub source_uri: Option<String>,
    /// Page count of the last successfully loaded document
    pub page_count: u32,
    pub error: Option<DocumentError>,
}

impl DocumentStatus {
    pub fn is_loading(&self) -> bool {
        self.state == DocumentState::Loading
    }

    pub fn is_ready(&self) -> bool {
        self.state == DocumentState::Ready
    }

    /// Source to hand to an external viewer when loading failed
    pub fn open_externally(&self) -> Option<&str> {
        match self.state {
            DocumentState::Failed => self.source_uri.as_deref(),
            _ => None,
        }
    }
}

struct Shared<D> {
    status: DocumentStatus,
    document: Option<Arc<D>>,
}

/// Owns the single live document of a viewer
pub struct DocumentLifecycle<E: PdfEngine> {
    engine: Arc<E>,
    generations: GenerationCounter,
    shared: Arc<Mutex<Shared<E::Document>>>,
    in_flight: Option<TaskHandle<()>>,
}

impl<E: PdfEngine> DocumentLifecycle<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Self {
            engine,
            generations: GenerationCounter::new(),
            shared: Arc::new(Mutex::new(Shared {
                status: DocumentStatus::default(),
                document: None,
            })),
            in_flight: None,
        }
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// Switch to a new source
    ///
    /// Cancels the load in flight, destroys the current document and starts
    /// loading `uri`. The page count of the previous document is kept until
    /// the new one is ready.
    pub fn set_source(&mut self, uri: impl Into<String>) {
        let uri = uri.into();
        self.cancel_in_flight();
        let generation = self.generations.advance();

        {
            let mut shared = self.shared.lock();
            destroy_current(&mut shared);
            shared.status.state = DocumentState::Loading;
            shared.status.source_uri = Some(uri.clone());
            shared.status.error = None;
        }

        log::debug!("loading document {uri} ({generation:?})");
        let engine = Arc::clone(&self.engine);
        let shared = Arc::clone(&self.shared);
        let generations = self.generations.clone();
        self.in_flight = Some(TaskHandle::spawn(move |token| async move {
            let result = engine.load_document(&uri).await;
            complete_load(&shared, &generations, generation, &token, uri, result);
        }));
    }

    /// Cancel any load and destroy the loaded document
    pub fn teardown(&mut self) {
        self.cancel_in_flight();
        self.generations.advance();

        let mut shared = self.shared.lock();
        destroy_current(&mut shared);
        shared.status.state = DocumentState::Disposed;
        log::debug!("document lifecycle torn down");
    }

    /// Wait for the load in flight, if any
    pub async fn settle(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.join().await;
        }
    }

    pub fn status(&self) -> DocumentStatus {
        self.shared.lock().status.clone()
    }

    pub fn state(&self) -> DocumentState {
        self.shared.lock().status.state
    }

    pub fn page_count(&self) -> u32 {
        self.shared.lock().status.page_count
    }

    /// The loaded document, once ready
    pub fn document(&self) -> Option<Arc<E::Document>> {
        self.shared.lock().document.clone()
    }

    fn cancel_in_flight(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.cancel();
        }
    }
}

impl<E: PdfEngine> Drop for DocumentLifecycle<E> {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn destroy_current<D: PdfDocument>(shared: &mut Shared<D>) {
    if let Some(document) = shared.document.take() {
        document.destroy();
    }
}

fn complete_load<D: PdfDocument>(
    shared: &Mutex<Shared<D>>,
    generations: &GenerationCounter,
    generation: Generation,
    token: &CancellationToken,
    uri: String,
    result: Result<D, EngineError>,
) {
    let mut shared = shared.lock();

    if token.is_cancelled() || !generations.is_current(generation) {
        if let Ok(document) = result {
            log::debug!("discarding superseded load of {uri}");
            document.destroy();
        }
        return;
    }

    match result {
        Ok(document) => {
            log::debug!("document {uri} ready with {} page(s)", document.page_count());
            shared.status.page_count = document.page_count();
            shared.status.state = DocumentState::Ready;
            shared.document = Some(Arc::new(document));
        }
        Err(err) => {
            log::warn!("failed to open {uri}: {err}");
            shared.status.state = DocumentState::Failed;
            shared.status.error = Some(DocumentError::Load {
                uri,
                source: Arc::new(err),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use signview_render::testing::{DocumentScript, ScriptedEngine};
    use std::time::Duration;

    fn lifecycle(engine: &ScriptedEngine) -> DocumentLifecycle<ScriptedEngine> {
        DocumentLifecycle::new(Arc::new(engine.clone()))
    }

    #[tokio::test]
    async fn test_load_reports_page_count() {
        let engine = ScriptedEngine::new().with_document("a.pdf", DocumentScript::new(3));
        let mut documents = lifecycle(&engine);
        assert_eq!(documents.state(), DocumentState::Idle);

        documents.set_source("a.pdf");
        assert!(documents.status().is_loading());
        assert!(documents.status().error.is_none());

        documents.settle().await;
        let status = documents.status();
        assert!(status.is_ready());
        assert_eq!(status.page_count, 3);
        assert_eq!(status.source_uri.as_deref(), Some("a.pdf"));
        assert!(status.open_externally().is_none());
        assert!(documents.document().is_some());
    }

    #[tokio::test]
    async fn test_failure_keeps_page_count_and_offers_fallback() {
        let engine = ScriptedEngine::new()
            .with_document("a.pdf", DocumentScript::new(3))
            .with_document("broken.pdf", DocumentScript::new(1).failing_load("bad xref"));
        let mut documents = lifecycle(&engine);

        documents.set_source("a.pdf");
        documents.settle().await;
        documents.set_source("broken.pdf");
        documents.settle().await;

        let status = documents.status();
        assert_eq!(status.state, DocumentState::Failed);
        assert_eq!(status.page_count, 3);
        assert_eq!(status.open_externally(), Some("broken.pdf"));
        match status.error {
            Some(DocumentError::Load { uri, source }) => {
                assert_eq!(uri, "broken.pdf");
                assert!(matches!(*source, EngineError::Decode(_)));
            }
            None => panic!("expected a load error"),
        }
        assert!(documents.document().is_none());
    }

    #[tokio::test]
    async fn test_missing_source_fails_with_io_error() {
        let engine = ScriptedEngine::new();
        let mut documents = lifecycle(&engine);

        documents.set_source("nowhere.pdf");
        documents.settle().await;

        let status = documents.status();
        assert_eq!(status.state, DocumentState::Failed);
        assert!(matches!(
            status.error,
            Some(DocumentError::Load { ref source, .. }) if matches!(**source, EngineError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_switching_source_destroys_previous_first() {
        let engine = ScriptedEngine::new()
            .with_document("a.pdf", DocumentScript::new(3))
            .with_document("b.pdf", DocumentScript::new(5));
        let mut documents = lifecycle(&engine);

        documents.set_source("a.pdf");
        documents.settle().await;
        let first = documents.document().unwrap();

        documents.set_source("b.pdf");
        assert!(first.is_destroyed());
        assert_eq!(engine.log().destroyed, vec!["a.pdf".to_string()]);

        documents.settle().await;
        assert_eq!(documents.page_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_load_is_destroyed_on_arrival() {
        let engine = ScriptedEngine::new()
            .with_document(
                "slow.pdf",
                DocumentScript::new(9).with_load_delay(Duration::from_secs(5)),
            )
            .with_document("fast.pdf", DocumentScript::new(2));
        let mut documents = lifecycle(&engine);

        documents.set_source("slow.pdf");
        documents.set_source("fast.pdf");
        documents.settle().await;
        assert_eq!(documents.page_count(), 2);

        tokio::time::sleep(Duration::from_secs(10)).await;
        let status = documents.status();
        assert_eq!(status.page_count, 2);
        assert_eq!(status.source_uri.as_deref(), Some("fast.pdf"));
        assert_eq!(engine.log().destroyed, vec!["slow.pdf".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_mid_load() {
        let engine = ScriptedEngine::new().with_document(
            "slow.pdf",
            DocumentScript::new(4).with_load_delay(Duration::from_secs(5)),
        );
        let mut documents = lifecycle(&engine);

        documents.set_source("slow.pdf");
        documents.teardown();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(documents.state(), DocumentState::Disposed);
        assert!(documents.document().is_none());
        assert_eq!(documents.page_count(), 0);
        assert_eq!(engine.log().destroyed, vec!["slow.pdf".to_string()]);
    }

    #[tokio::test]
    async fn test_teardown_destroys_loaded_document() {
        let engine = ScriptedEngine::new().with_document("a.pdf", DocumentScript::new(1));
        let mut documents = lifecycle(&engine);

        documents.set_source("a.pdf");
        documents.settle().await;
        let document = documents.document().unwrap();

        documents.teardown();
        assert!(document.is_destroyed());
        assert_eq!(documents.state(), DocumentState::Disposed);

        // Dropping after teardown must not destroy twice
        drop(documents);
        assert_eq!(engine.log().destroyed.len(), 1);
    }
}
