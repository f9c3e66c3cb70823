use crate::embeddings::cosine_similarity;
use crate::traits::{ChunkIndex, ObjectStore, ReportStore};
use crate::{
    PersistenceError, ProcessingStatus, Report, ReportChunk, ReportMetadata, ReportStatus,
    ReportSummary, SearchCandidate, SearchQuery,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    reports: HashMap<String, Report>,
    objects: HashMap<String, Vec<u8>>,
    chunks: Vec<ReportChunk>,
    statuses: HashMap<String, ProcessingStatus>,
    status_history: Vec<ProcessingStatus>,
}

/// Process-local store implementing every collaborator trait. Vector lookup
/// is a brute-force cosine scan.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_report(&self, report: Report) {
        self.state
            .write()
            .await
            .reports
            .insert(report.id.clone(), report);
    }

    pub async fn put_object(&self, path: impl Into<String>, bytes: Vec<u8>) {
        self.state.write().await.objects.insert(path.into(), bytes);
    }

    pub async fn report(&self, report_id: &str) -> Option<Report> {
        self.state.read().await.reports.get(report_id).cloned()
    }

    pub async fn chunks_for(&self, report_id: &str) -> Vec<ReportChunk> {
        let mut chunks: Vec<ReportChunk> = self
            .state
            .read()
            .await
            .chunks
            .iter()
            .filter(|chunk| chunk.report_id == report_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|chunk| chunk.chunk_index);
        chunks
    }

    pub async fn processing_status(&self, report_id: &str) -> Option<ProcessingStatus> {
        self.state.read().await.statuses.get(report_id).cloned()
    }

    /// Every status record written for a report, oldest first.
    pub async fn status_history(&self, report_id: &str) -> Vec<ProcessingStatus> {
        self.state
            .read()
            .await
            .status_history
            .iter()
            .filter(|status| status.report_id == report_id)
            .cloned()
            .collect()
    }

    /// Removes a report and, by cascade, its chunks and status record.
    pub async fn delete_report(&self, report_id: &str) -> Option<Report> {
        let mut state = self.state.write().await;
        state.chunks.retain(|chunk| chunk.report_id != report_id);
        state.statuses.remove(report_id);
        state.reports.remove(report_id)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, path: &str) -> Result<Vec<u8>, PersistenceError> {
        self.state
            .read()
            .await
            .objects
            .get(path)
            .cloned()
            .ok_or_else(|| PersistenceError::ObjectNotFound(path.to_string()))
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn get_report(&self, report_id: &str) -> Result<Option<Report>, PersistenceError> {
        Ok(self.report(report_id).await)
    }

    async fn update_report(
        &self,
        report_id: &str,
        status: ReportStatus,
        metadata: Option<&ReportMetadata>,
    ) -> Result<(), PersistenceError> {
        let mut state = self.state.write().await;
        let report = state
            .reports
            .get_mut(report_id)
            .ok_or_else(|| PersistenceError::Request(format!("unknown report {report_id}")))?;

        if report.status != ReportStatus::Processing {
            return Err(PersistenceError::Request(format!(
                "report {report_id} is {} and cannot move to {status}",
                report.status
            )));
        }

        report.status = status;
        if let Some(metadata) = metadata {
            report.metadata = Some(metadata.clone());
        }
        report.updated_at = Utc::now();
        Ok(())
    }

    async fn upsert_processing_status(
        &self,
        status: &ProcessingStatus,
    ) -> Result<(), PersistenceError> {
        let mut state = self.state.write().await;
        state
            .statuses
            .insert(status.report_id.clone(), status.clone());
        state.status_history.push(status.clone());
        Ok(())
    }

    async fn insert_chunks(&self, chunks: &[ReportChunk]) -> Result<(), PersistenceError> {
        let mut state = self.state.write().await;
        if let Some(orphan) = chunks
            .iter()
            .find(|chunk| !state.reports.contains_key(&chunk.report_id))
        {
            return Err(PersistenceError::Request(format!(
                "chunk references unknown report {}",
                orphan.report_id
            )));
        }
        state.chunks.extend_from_slice(chunks);
        Ok(())
    }

    async fn list_reports(&self, status: ReportStatus) -> Result<Vec<Report>, PersistenceError> {
        let mut reports: Vec<Report> = self
            .state
            .read()
            .await
            .reports
            .values()
            .filter(|report| report.status == status)
            .cloned()
            .collect();
        reports.sort_by_key(|report| report.created_at);
        Ok(reports)
    }
}

#[async_trait]
impl ChunkIndex for MemoryStore {
    async fn match_chunks(
        &self,
        query_vector: &[f32],
        query: &SearchQuery,
    ) -> Result<Vec<SearchCandidate>, PersistenceError> {
        let state = self.state.read().await;

        let mut candidates: Vec<SearchCandidate> = state
            .chunks
            .iter()
            .filter_map(|chunk| {
                let embedding = chunk.embedding.as_ref()?;
                let report = ReportSummary::from(state.reports.get(&chunk.report_id)?);
                if !query.accepts(&report) {
                    return None;
                }

                let similarity = cosine_similarity(query_vector, embedding);
                if similarity < query.threshold {
                    return None;
                }

                Some(SearchCandidate {
                    chunk: chunk.clone(),
                    report,
                    similarity,
                })
            })
            .collect();

        candidates.sort_by(|left, right| right.similarity.total_cmp(&left.similarity));
        candidates.truncate(query.limit);
        Ok(candidates)
    }
}
