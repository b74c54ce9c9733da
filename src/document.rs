//! Printed document model.
//!
//! A `PrintedDocument` is shared between the coordinating context and the
//! worker while a job runs. Only the worker records rendered pages; the
//! coordinating context swaps whole documents, never edits one in place.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::settings::PrintSettings;

/// Provider of the content being printed.
pub trait PagesSource: Send + Sync {
    /// Human-readable name, used as the document title.
    fn source_name(&self) -> String;

    /// Where the content came from, if it has an address.
    fn source_url(&self) -> Option<String> {
        None
    }
}

/// A single rendered page.
#[derive(Debug, Clone)]
pub struct PrintedPage {
    page_number: u32,
    rendered_at: DateTime<Utc>,
}

impl PrintedPage {
    pub fn new(page_number: u32) -> Self {
        Self {
            page_number,
            rendered_at: Utc::now(),
        }
    }

    /// 1-based page number.
    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn rendered_at(&self) -> DateTime<Utc> {
        self.rendered_at
    }
}

#[derive(Default)]
struct DocumentState {
    source: Option<Arc<dyn PagesSource>>,
    page_count: u32,
    pages: BTreeMap<u32, Arc<PrintedPage>>,
}

/// Document being printed: settings, identity cookie, and rendered pages.
pub struct PrintedDocument {
    settings: PrintSettings,
    cookie: i32,
    name: String,
    state: Mutex<DocumentState>,
}

impl PrintedDocument {
    pub fn new(settings: PrintSettings, source: Option<Arc<dyn PagesSource>>, cookie: i32) -> Self {
        let name = source
            .as_ref()
            .map(|s| s.source_name())
            .unwrap_or_default();
        Self {
            settings,
            cookie,
            name,
            state: Mutex::new(DocumentState {
                source,
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, DocumentState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn settings(&self) -> &PrintSettings {
        &self.settings
    }

    /// Correlation cookie handed out by the worker owner.
    pub fn cookie(&self) -> i32 {
        self.cookie
    }

    /// Title captured from the source at creation.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn page_count(&self) -> u32 {
        self.state().page_count
    }

    pub fn set_page_count(&self, page_count: u32) {
        self.state().page_count = page_count;
    }

    /// Record a rendered page. Pages outside `1..=page_count` are ignored.
    pub fn set_page(&self, page: Arc<PrintedPage>) -> bool {
        let mut state = self.state();
        let number = page.page_number();
        if number == 0 || number > state.page_count {
            tracing::warn!(page = number, page_count = state.page_count, "Ignoring out of range page");
            return false;
        }
        state.pages.insert(number, page);
        true
    }

    pub fn page(&self, page_number: u32) -> Option<Arc<PrintedPage>> {
        self.state().pages.get(&page_number).cloned()
    }

    pub fn rendered_pages(&self) -> usize {
        self.state().pages.len()
    }

    /// Every page up to the page count has been rendered.
    pub fn is_complete(&self) -> bool {
        let state = self.state();
        state.page_count > 0 && state.pages.len() as u32 == state.page_count
    }

    pub fn has_source(&self) -> bool {
        self.state().source.is_some()
    }

    /// Drop the reference to the pages source. Rendered pages are kept.
    pub fn disconnect_source(&self) {
        self.state().source = None;
    }
}

impl fmt::Debug for PrintedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("PrintedDocument")
            .field("cookie", &self.cookie)
            .field("name", &self.name)
            .field("page_count", &state.page_count)
            .field("rendered_pages", &state.pages.len())
            .field("has_source", &state.source.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl PagesSource for Named {
        fn source_name(&self) -> String {
            self.0.to_string()
        }
    }

    #[test]
    fn name_is_captured_from_source() {
        let doc = PrintedDocument::new(PrintSettings::default(), Some(Arc::new(Named("report.pdf"))), 3);
        assert_eq!(doc.name(), "report.pdf");
        assert_eq!(doc.cookie(), 3);
        assert!(doc.has_source());

        doc.disconnect_source();
        assert!(!doc.has_source());
        assert_eq!(doc.name(), "report.pdf");
    }

    #[test]
    fn completes_when_every_page_is_rendered() {
        let doc = PrintedDocument::new(PrintSettings::default(), None, 1);
        assert!(!doc.is_complete());
        doc.set_page_count(2);

        assert!(doc.set_page(Arc::new(PrintedPage::new(1))));
        assert!(!doc.set_page(Arc::new(PrintedPage::new(3))));
        assert!(!doc.set_page(Arc::new(PrintedPage::new(0))));
        assert!(!doc.is_complete());

        assert!(doc.set_page(Arc::new(PrintedPage::new(2))));
        assert!(doc.is_complete());
        assert_eq!(doc.rendered_pages(), 2);
        assert_eq!(doc.page(2).map(|p| p.page_number()), Some(2));
    }
}
