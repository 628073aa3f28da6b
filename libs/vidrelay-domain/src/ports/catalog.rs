use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::ingestion::{CatalogError, ObjectName, StructuredContent, UserId};

/// Status the system-of-record reports for a successful call
pub const CATALOG_OK: u16 = 200;

/// Subscription tier of the uploading account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlanTier {
    Pro,
    /// Any tier other than `PRO`
    #[default]
    #[serde(other)]
    Free,
}

impl PlanTier {
    /// Whether the tier is entitled to enrichment
    pub fn is_premium(&self) -> bool {
        matches!(self, PlanTier::Pro)
    }
}

/// Response to the "processing started" call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTicket {
    pub status: u16,
    #[serde(default)]
    pub plan: PlanTier,
}

impl ProcessingTicket {
    pub fn is_success(&self) -> bool {
        self.status == CATALOG_OK
    }
}

/// Port for the external system-of-record
///
/// All three calls are idempotent by filename. Each returns the status the
/// system-of-record reported; deciding whether a status is fatal is the
/// Finalizer's job.
pub trait CatalogClient: Send + Sync + 'static {
    /// Announce that processing of an uploaded object has started
    fn processing_started(
        &self,
        user: &UserId,
        filename: &ObjectName,
    ) -> impl Future<Output = Result<ProcessingTicket, CatalogError>> + Send;

    /// Attach enrichment output to the object
    fn transcribed(
        &self,
        user: &UserId,
        filename: &ObjectName,
        content: &StructuredContent,
        transcript: &str,
    ) -> impl Future<Output = Result<u16, CatalogError>> + Send;

    /// Mark processing of the object as complete
    fn complete(
        &self,
        user: &UserId,
        filename: &ObjectName,
    ) -> impl Future<Output = Result<u16, CatalogError>> + Send;
}
