//! Lazy page prefetching
//!
//! Keeps the current page and its neighbours decoded. Loads for pages that
//! drop out of the working set are cancelled, and pages already loaded
//! outside of it are released. Prefetching is best effort: failures are
//! logged and otherwise ignored.

use parking_lot::Mutex;
use signview_render::PdfDocument;
use signview_scheduler::{TaskHandle, WorkingSet};
use std::collections::BTreeMap;
use std::sync::Arc;

type LoadedPages<P> = Arc<Mutex<BTreeMap<u32, Arc<P>>>>;

/// What an [`PagePrefetcher::update`] call changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefetchUpdate {
    /// Pages whose load was started
    pub started: Vec<u32>,
    /// Pages whose in-flight load was cancelled
    pub cancelled: Vec<u32>,
    /// Loaded pages that were dropped
    pub released: Vec<u32>,
}

pub struct PagePrefetcher<D: PdfDocument> {
    document: Option<Arc<D>>,
    working_set: WorkingSet,
    loading: BTreeMap<u32, TaskHandle<()>>,
    loaded: LoadedPages<D::Page>,
}

impl<D: PdfDocument> Default for PagePrefetcher<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: PdfDocument> PagePrefetcher<D> {
    pub fn new() -> Self {
        Self {
            document: None,
            working_set: WorkingSet::empty(),
            loading: BTreeMap::new(),
            loaded: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Replace the document pages are loaded from
    ///
    /// Everything belonging to the previous document is cancelled or
    /// released.
    pub fn set_document(&mut self, document: Option<Arc<D>>) {
        self.cancel_all();
        self.document = document;
    }

    pub fn has_document(&self) -> bool {
        self.document.is_some()
    }

    pub fn document(&self) -> Option<&Arc<D>> {
        self.document.as_ref()
    }

    /// Move the working set to `current`
    pub fn update(&mut self, current: u32) -> PrefetchUpdate {
        let mut update = PrefetchUpdate::default();
        let Some(document) = self.document.clone() else {
            return update;
        };

        let working_set = WorkingSet::around(current, document.page_count());
        self.loading.retain(|_, handle| !handle.is_finished());

        // Cancel before starting anything so a page is never loaded twice
        let stale: Vec<u32> = self
            .loading
            .keys()
            .copied()
            .filter(|page| !working_set.contains(*page))
            .collect();
        for page in stale {
            if let Some(handle) = self.loading.remove(&page) {
                handle.cancel();
                update.cancelled.push(page);
            }
        }

        {
            let mut loaded = self.loaded.lock();
            loaded.retain(|page, _| {
                let keep = working_set.contains(*page);
                if !keep {
                    update.released.push(*page);
                }
                keep
            });
        }

        for page in working_set.pages() {
            if self.loading.contains_key(&page) || self.loaded.lock().contains_key(&page) {
                continue;
            }
            let handle = self.spawn_load(Arc::clone(&document), page);
            self.loading.insert(page, handle);
            update.started.push(page);
        }

        if !update.cancelled.is_empty() {
            log::debug!("prefetch cancelled pages {:?}", update.cancelled);
        }
        self.working_set = working_set;
        update
    }

    fn spawn_load(&self, document: Arc<D>, page: u32) -> TaskHandle<()> {
        let loaded = Arc::clone(&self.loaded);
        TaskHandle::spawn(move |token| async move {
            let result = document.get_page(page).await;
            let mut loaded = loaded.lock();
            if token.is_cancelled() {
                return;
            }
            match result {
                Ok(handle) => {
                    loaded.insert(page, Arc::new(handle));
                }
                Err(err) => log::warn!("prefetch of page {page} failed: {err}"),
            }
        })
    }

    /// Cancel every load and release every page
    pub fn cancel_all(&mut self) {
        for (_, handle) in std::mem::take(&mut self.loading) {
            handle.cancel();
        }
        self.loaded.lock().clear();
        self.working_set = WorkingSet::empty();
    }

    /// Wait for the loads in flight
    pub async fn settle(&mut self) {
        for (_, handle) in std::mem::take(&mut self.loading) {
            handle.join().await;
        }
    }

    /// A loaded page, if it is in the working set and finished loading
    pub fn page(&self, page_number: u32) -> Option<Arc<D::Page>> {
        self.loaded.lock().get(&page_number).cloned()
    }

    pub fn working_set(&self) -> &WorkingSet {
        &self.working_set
    }

    pub fn loaded_pages(&self) -> Vec<u32> {
        self.loaded.lock().keys().copied().collect()
    }

    /// Pages with a load still running
    pub fn loading_pages(&self) -> Vec<u32> {
        self.loading
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(page, _)| *page)
            .collect()
    }
}

impl<D: PdfDocument> Drop for PagePrefetcher<D> {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use signview_render::testing::{DocumentScript, ScriptedDocument, ScriptedEngine};
    use signview_render::{PdfEngine, PdfPage};
    use std::time::Duration;

    async fn document(script: DocumentScript) -> (ScriptedEngine, Arc<ScriptedDocument>) {
        let engine = ScriptedEngine::new().with_document("doc.pdf", script);
        let document = engine.load_document("doc.pdf").await.unwrap();
        (engine, Arc::new(document))
    }

    #[tokio::test]
    async fn test_loads_current_and_neighbours() {
        let (_engine, document) = document(DocumentScript::new(3)).await;
        let mut prefetcher = PagePrefetcher::new();
        prefetcher.set_document(Some(document));

        let update = prefetcher.update(2);
        assert_eq!(update.started, vec![1, 2, 3]);
        assert!(update.cancelled.is_empty());

        prefetcher.settle().await;
        assert_eq!(prefetcher.loaded_pages(), vec![1, 2, 3]);
        assert_eq!(prefetcher.page(2).unwrap().page_number(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_moving_to_first_page_cancels_page_three() {
        let (engine, document) =
            document(DocumentScript::new(3).with_page_delay(Duration::from_secs(1))).await;
        let mut prefetcher = PagePrefetcher::new();
        prefetcher.set_document(Some(document));

        prefetcher.update(2);
        let update = prefetcher.update(1);
        assert_eq!(update.cancelled, vec![3]);
        assert!(update.started.is_empty());
        assert_eq!(prefetcher.working_set().pages().collect::<Vec<_>>(), vec![1, 2]);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(prefetcher.loaded_pages(), vec![1, 2]);
        assert!(prefetcher.page(3).is_none());
        // Page 3 was requested once and never again
        assert_eq!(
            engine.log().page_requests.iter().filter(|page| **page == 3).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_loaded_pages_outside_set_are_released() {
        let (_engine, document) = document(DocumentScript::new(10)).await;
        let mut prefetcher = PagePrefetcher::new();
        prefetcher.set_document(Some(document));

        prefetcher.update(5);
        prefetcher.settle().await;
        let update = prefetcher.update(6);

        assert_eq!(update.released, vec![4]);
        assert_eq!(update.started, vec![7]);
        prefetcher.settle().await;
        assert_eq!(prefetcher.loaded_pages(), vec![5, 6, 7]);
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let (_engine, document) = document(DocumentScript::new(3).failing_page(3)).await;
        let mut prefetcher = PagePrefetcher::new();
        prefetcher.set_document(Some(document));

        prefetcher.update(2);
        prefetcher.settle().await;
        assert_eq!(prefetcher.loaded_pages(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_discards_late_loads() {
        let (_engine, document) =
            document(DocumentScript::new(3).with_page_delay(Duration::from_secs(1))).await;
        let mut prefetcher = PagePrefetcher::new();
        prefetcher.set_document(Some(document));

        prefetcher.update(1);
        assert_eq!(prefetcher.loading_pages(), vec![1, 2]);
        prefetcher.cancel_all();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(prefetcher.loaded_pages().is_empty());
        assert!(prefetcher.working_set().is_empty());
    }

    #[tokio::test]
    async fn test_without_document_nothing_happens() {
        let mut prefetcher: PagePrefetcher<ScriptedDocument> = PagePrefetcher::new();
        assert_eq!(prefetcher.update(1), PrefetchUpdate::default());
        assert!(!prefetcher.has_document());
    }
}
