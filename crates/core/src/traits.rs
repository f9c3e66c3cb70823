//! Collaborator interfaces injected into the orchestrator and search.
//!
//! Implementations are constructed once per process and shared behind `Arc`;
//! none of them keeps per-call global state.

use crate::error::PersistenceError;
use crate::models::{
    ProcessingStatus, Report, ReportChunk, ReportMetadata, ReportStatus, SearchCandidate,
    SearchQuery,
};
use async_trait::async_trait;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, path: &str) -> Result<Vec<u8>, PersistenceError>;
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn get_report(&self, report_id: &str) -> Result<Option<Report>, PersistenceError>;

    /// Moves a `processing` report to a terminal status. Stores reject the
    /// update when the report is not currently `processing`.
    async fn update_report(
        &self,
        report_id: &str,
        status: ReportStatus,
        metadata: Option<&ReportMetadata>,
    ) -> Result<(), PersistenceError>;

    /// Upsert keyed by `status.report_id`.
    async fn upsert_processing_status(
        &self,
        status: &ProcessingStatus,
    ) -> Result<(), PersistenceError>;

    /// Single bulk insert; either every row lands or none does.
    async fn insert_chunks(&self, chunks: &[ReportChunk]) -> Result<(), PersistenceError>;

    async fn list_reports(&self, status: ReportStatus) -> Result<Vec<Report>, PersistenceError>;
}

#[async_trait]
pub trait ChunkIndex: Send + Sync {
    /// Nearest neighbours of `query_vector` among embedded chunks of completed
    /// reports, pre-filtered by the query's metadata filters.
    async fn match_chunks(
        &self,
        query_vector: &[f32],
        query: &SearchQuery,
    ) -> Result<Vec<SearchCandidate>, PersistenceError>;
}
