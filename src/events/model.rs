//! Event records describing one step in a print job's life.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::{PrintedDocument, PrintedPage};

/// Identity of a print job. Events are routed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Kind of a print job event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobEventKind {
    /// A job was dispatched to the worker.
    NewDocument,
    /// The worker started rendering a page.
    NewPage,
    /// The worker finished a page.
    PageDone,
    /// Every page of the document has been spooled.
    DocumentDone,
    /// The job finished and its worker was torn down.
    JobDone,
    /// The job failed or was canceled.
    Failed,
    /// User-driven settings initialization finished.
    UserInitDone,
    /// Default settings initialization finished.
    DefaultInitDone,
    /// The user dismissed settings initialization.
    UserInitCanceled,
    /// The worker has requested every page it needs.
    AllPagesRequested,
}

impl JobEventKind {
    /// Whether this event ends the job from an observer's point of view.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::JobDone | Self::Failed)
    }
}

impl fmt::Display for JobEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NewDocument => "new_document",
            Self::NewPage => "new_page",
            Self::PageDone => "page_done",
            Self::DocumentDone => "document_done",
            Self::JobDone => "job_done",
            Self::Failed => "failed",
            Self::UserInitDone => "user_init_done",
            Self::DefaultInitDone => "default_init_done",
            Self::UserInitCanceled => "user_init_canceled",
            Self::AllPagesRequested => "all_pages_requested",
        };
        write!(f, "{s}")
    }
}

/// An immutable event record.
#[derive(Debug, Clone)]
pub struct JobEvent {
    pub kind: JobEventKind,
    /// Job that published the event.
    pub source: JobId,
    pub document: Option<Arc<PrintedDocument>>,
    pub page: Option<Arc<PrintedPage>>,
}

impl JobEvent {
    pub fn new(kind: JobEventKind, source: JobId) -> Self {
        Self {
            kind,
            source,
            document: None,
            page: None,
        }
    }

    pub fn with_document(mut self, document: Option<Arc<PrintedDocument>>) -> Self {
        self.document = document;
        self
    }

    pub fn with_page(mut self, page: Option<Arc<PrintedPage>>) -> Self {
        self.page = page;
        self
    }

    /// True if the event carries exactly this document instance.
    pub fn is_for_document(&self, document: Option<&Arc<PrintedDocument>>) -> bool {
        match (self.document.as_ref(), document) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    /// Serializable view of the event.
    pub fn summary(&self) -> JobEventSummary {
        JobEventSummary {
            kind: self.kind,
            job_id: self.source,
            cookie: self.document.as_ref().map(|d| d.cookie()),
            page_number: self.page.as_ref().map(|p| p.page_number()),
        }
    }
}

/// Flat, serializable description of a `JobEvent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEventSummary {
    pub kind: JobEventKind,
    pub job_id: JobId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookie: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::PrintSettings;

    #[test]
    fn terminal_kinds() {
        assert!(JobEventKind::JobDone.is_terminal());
        assert!(JobEventKind::Failed.is_terminal());
        assert!(!JobEventKind::DocumentDone.is_terminal());
        assert!(!JobEventKind::NewDocument.is_terminal());
    }

    #[test]
    fn kind_display_matches_serde() {
        assert_eq!(JobEventKind::AllPagesRequested.to_string(), "all_pages_requested");
        let json = serde_json::to_string(&JobEventKind::UserInitCanceled).unwrap();
        assert_eq!(json, "\"user_init_canceled\"");
    }

    #[test]
    fn document_identity_is_by_instance() {
        let doc = Arc::new(PrintedDocument::new(PrintSettings::default(), None, 7));
        let twin = Arc::new(PrintedDocument::new(PrintSettings::default(), None, 7));
        let event = JobEvent::new(JobEventKind::UserInitDone, JobId::new())
            .with_document(Some(Arc::clone(&doc)));
        assert!(event.is_for_document(Some(&doc)));
        assert!(!event.is_for_document(Some(&twin)));
        assert!(!event.is_for_document(None));
    }

    #[test]
    fn summary_serializes_page_and_cookie() {
        let id = JobId::new();
        let doc = Arc::new(PrintedDocument::new(PrintSettings::default(), None, 42));
        let event = JobEvent::new(JobEventKind::PageDone, id)
            .with_document(Some(doc))
            .with_page(Some(Arc::new(PrintedPage::new(2))));
        let value = serde_json::to_value(event.summary()).unwrap();
        assert_eq!(value["kind"], "page_done");
        assert_eq!(value["job_id"], id.to_string());
        assert_eq!(value["cookie"], 42);
        assert_eq!(value["page_number"], 2);

        let bare = serde_json::to_value(JobEvent::new(JobEventKind::Failed, id).summary()).unwrap();
        assert!(bare.get("cookie").is_none());
    }
}
