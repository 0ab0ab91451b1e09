//! Registry (PASI) link consistency cleanup
//!
//! `pasi_links` denormalizes the pairing between a student course enrollment
//! and a provincial registry record, and `student_courses.pasi_link_id`
//! points back at it. The reconciler removes links whose either end is gone
//! and clears back-references to links that no longer exist.
//!
//! Fixed-size batches, no retries: a failure on one link is logged, counted
//! and skipped.

pub mod sqlite;

pub use sqlite::SqliteLinkStore;

use crate::error::StoreError;
use async_trait::async_trait;
use edu_common::events::{EduEvent, EventBus};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasiLink {
    pub link_id: String,
    pub student_course_key: String,
    pub pasi_record_id: String,
}

#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Up to `limit` links with ids strictly greater than `after`, in id order
    async fn list_links(&self, after: Option<&str>, limit: usize)
        -> Result<Vec<PasiLink>, StoreError>;

    async fn student_course_exists(&self, student_course_key: &str) -> Result<bool, StoreError>;

    async fn pasi_record_exists(&self, record_id: &str) -> Result<bool, StoreError>;

    /// Delete the link and clear any enrollment still pointing at it, atomically
    async fn delete_link(&self, link: &PasiLink) -> Result<(), StoreError>;

    /// Enrollments (keys > `after`, in key order) whose link id names no existing link
    async fn list_dangling_refs(&self, after: Option<&str>, limit: usize)
        -> Result<Vec<String>, StoreError>;

    async fn clear_link_ref(&self, student_course_key: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub links_checked: u64,
    pub links_removed: u64,
    pub dangling_refs_cleared: u64,
    pub errors: u64,
}

pub struct LinkReconciler {
    store: Arc<dyn LinkStore>,
    batch_size: usize,
    event_bus: Option<EventBus>,
}

impl LinkReconciler {
    pub fn new(store: Arc<dyn LinkStore>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Run both passes over the whole table
    ///
    /// Only a failure to list a batch ends a pass early.
    pub async fn run(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        self.remove_orphaned_links(&mut report).await;
        self.clear_dangling_refs(&mut report).await;

        info!(
            links_checked = report.links_checked,
            links_removed = report.links_removed,
            dangling_refs_cleared = report.dangling_refs_cleared,
            errors = report.errors,
            "Registry link reconciliation finished"
        );

        if let Some(bus) = &self.event_bus {
            bus.emit_lossy(EduEvent::LinksReconciled {
                links_checked: report.links_checked,
                links_removed: report.links_removed,
                dangling_refs_cleared: report.dangling_refs_cleared,
                errors: report.errors,
                timestamp: edu_common::time::now(),
            });
        }

        report
    }

    async fn remove_orphaned_links(&self, report: &mut ReconcileReport) {
        let mut after: Option<String> = None;
        loop {
            let batch = match self.store.list_links(after.as_deref(), self.batch_size).await {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(error = %e, "Failed to list registry links, ending pass");
                    report.errors += 1;
                    return;
                }
            };

            for link in &batch {
                report.links_checked += 1;
                match self.is_orphaned(link).await {
                    Ok(false) => {}
                    Ok(true) => match self.store.delete_link(link).await {
                        Ok(()) => {
                            report.links_removed += 1;
                            info!(link_id = %link.link_id, "Removed orphaned registry link");
                        }
                        Err(e) => {
                            report.errors += 1;
                            warn!(link_id = %link.link_id, error = %e, "Failed to delete link");
                        }
                    },
                    Err(e) => {
                        report.errors += 1;
                        warn!(link_id = %link.link_id, error = %e, "Failed to check link");
                    }
                }
            }

            if batch.len() < self.batch_size {
                return;
            }
            after = batch.last().map(|l| l.link_id.clone());
        }
    }

    async fn is_orphaned(&self, link: &PasiLink) -> Result<bool, StoreError> {
        if !self.store.student_course_exists(&link.student_course_key).await? {
            return Ok(true);
        }
        Ok(!self.store.pasi_record_exists(&link.pasi_record_id).await?)
    }

    async fn clear_dangling_refs(&self, report: &mut ReconcileReport) {
        let mut after: Option<String> = None;
        loop {
            let batch = match self
                .store
                .list_dangling_refs(after.as_deref(), self.batch_size)
                .await
            {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(error = %e, "Failed to list dangling link references, ending pass");
                    report.errors += 1;
                    return;
                }
            };

            for key in &batch {
                match self.store.clear_link_ref(key).await {
                    Ok(()) => report.dangling_refs_cleared += 1,
                    Err(e) => {
                        report.errors += 1;
                        warn!(student_course_key = %key, error = %e, "Failed to clear link reference");
                    }
                }
            }

            if batch.len() < self.batch_size {
                return;
            }
            after = batch.last().cloned();
        }
    }
}
