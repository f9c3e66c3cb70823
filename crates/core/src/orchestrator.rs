use crate::chunking::{Chunker, ChunkingConfig};
use crate::embeddings::Embedder;
use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::ingest::digest_bytes;
use crate::status::PipelineRun;
use crate::text::{detect_language, word_count};
use crate::traits::{ObjectStore, ReportStore};
use crate::{
    ChunkDraft, ConfigError, IngestError, ProcessingStage, Report, ReportChunk, ReportMetadata,
    ReportStatus,
};
use chrono::Utc;
use futures_util::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Outcome of one successful ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestionSummary {
    pub report_id: String,
    pub page_count: u32,
    pub word_count: usize,
    pub language: String,
    pub chunk_count: usize,
    pub embedded_count: usize,
    pub failed_embeddings: usize,
}

/// Runs extract -> chunk -> embed -> persist for one report at a time.
///
/// Runs for different reports share nothing but the injected collaborators.
/// Two runs for the same report id are not guarded against; callers must not
/// trigger them.
pub struct IngestionOrchestrator {
    objects: Arc<dyn ObjectStore>,
    reports: Arc<dyn ReportStore>,
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn PdfExtractor>,
    chunker: Chunker,
}

impl IngestionOrchestrator {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        reports: Arc<dyn ReportStore>,
        embedder: Arc<dyn Embedder>,
        chunking: ChunkingConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            objects,
            reports,
            embedder,
            extractor: Arc::new(LopdfExtractor),
            chunker: Chunker::new(chunking)?,
        })
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn PdfExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub async fn process_report(&self, report_id: &str) -> Result<IngestionSummary, IngestError> {
        let report = self
            .reports
            .get_report(report_id)
            .await?
            .ok_or_else(|| IngestError::ReportNotFound(report_id.to_string()))?;

        if report.status.is_terminal() {
            return Err(IngestError::ReportFinalized {
                report_id: report.id,
                status: report.status.to_string(),
            });
        }

        let (mut run, initial) = PipelineRun::start(report_id);
        match self.run_stages(&report, &mut run, initial).await {
            Ok(summary) => {
                info!(
                    report_id,
                    chunks = summary.chunk_count,
                    embedded = summary.embedded_count,
                    failed_embeddings = summary.failed_embeddings,
                    "report processed"
                );
                Ok(summary)
            }
            Err(error) => {
                self.record_failure(&mut run, &error).await;
                Err(error)
            }
        }
    }

    async fn run_stages(
        &self,
        report: &Report,
        run: &mut PipelineRun,
        initial: crate::ProcessingStatus,
    ) -> Result<IngestionSummary, IngestError> {
        self.reports.upsert_processing_status(&initial).await?;
        info!(report_id = %report.id, stage = %run.stage(), "stage started");

        let bytes = self.objects.get(&report.file_path).await?;
        let checksum = digest_bytes(&bytes);
        let extracted = self.extractor.extract(&bytes)?;

        self.advance(run, ProcessingStage::Chunking).await?;
        let drafts = self.chunker.chunk(&extracted.text);

        self.advance(run, ProcessingStage::Embedding).await?;
        let embeddings = self.embed_all(&report.id, &drafts).await;

        let created_at = Utc::now();
        let chunks: Vec<ReportChunk> = drafts
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(index, (draft, embedding))| {
                ReportChunk::from_draft(&report.id, index as u32, draft, embedding, created_at)
            })
            .collect();
        let embedded_count = chunks
            .iter()
            .filter(|chunk| chunk.embedding.is_some())
            .count();

        self.reports.insert_chunks(&chunks).await?;

        let metadata = ReportMetadata {
            pages: extracted.page_count,
            word_count: word_count(&extracted.text),
            language: detect_language(&extracted.text).to_string(),
            chunks_count: chunks.len(),
            checksum: Some(checksum),
        };
        // The live status goes first so a rejected write still leaves the
        // report in `processing`, where the failure path can reach it.
        let completed = run.prepare(
            ProcessingStage::Completed,
            ProcessingStage::Completed.default_message(),
        )?;
        self.reports.upsert_processing_status(&completed).await?;
        self.reports
            .update_report(&report.id, ReportStatus::Completed, Some(&metadata))
            .await?;
        run.commit(&completed)?;
        info!(
            report_id = %report.id,
            stage = %completed.status,
            progress = completed.progress,
            "stage started"
        );

        Ok(IngestionSummary {
            report_id: report.id.clone(),
            page_count: metadata.pages,
            word_count: metadata.word_count,
            language: metadata.language,
            chunk_count: chunks.len(),
            embedded_count,
            failed_embeddings: chunks.len() - embedded_count,
        })
    }

    async fn advance(
        &self,
        run: &mut PipelineRun,
        next: ProcessingStage,
    ) -> Result<(), IngestError> {
        let status = run.prepare(next, next.default_message())?;
        self.reports.upsert_processing_status(&status).await?;
        run.commit(&status)?;
        info!(
            report_id = run.report_id(),
            stage = %next,
            progress = status.progress,
            "stage started"
        );
        Ok(())
    }

    /// Embeds every chunk concurrently. A failed or malformed embedding
    /// degrades that chunk to `None` and never fails the run.
    async fn embed_all(&self, report_id: &str, drafts: &[ChunkDraft]) -> Vec<Option<Vec<f32>>> {
        let expected = self.embedder.dimensions();

        let calls = drafts.iter().enumerate().map(|(chunk_index, draft)| async move {
            match self.embedder.embed(&draft.content).await {
                Ok(vector) if vector.len() == expected => Some(vector),
                Ok(vector) => {
                    warn!(
                        report_id,
                        chunk_index,
                        expected,
                        actual = vector.len(),
                        "embedding has wrong dimension; storing chunk without vector"
                    );
                    None
                }
                Err(error) => {
                    warn!(
                        report_id,
                        chunk_index,
                        error = %error,
                        "embedding failed; storing chunk without vector"
                    );
                    None
                }
            }
        });

        join_all(calls).await
    }

    async fn record_failure(&self, run: &mut PipelineRun, cause: &IngestError) {
        let message = cause.to_string();
        error!(
            report_id = run.report_id(),
            stage = %run.stage(),
            error = %message,
            "ingestion failed"
        );

        if let Err(update_error) = self
            .reports
            .update_report(run.report_id(), ReportStatus::Failed, None)
            .await
        {
            error!(
                report_id = run.report_id(),
                error = %update_error,
                "could not mark report failed"
            );
        }

        match run.fail(message) {
            Ok(status) => {
                if let Err(upsert_error) = self.reports.upsert_processing_status(&status).await {
                    error!(
                        report_id = run.report_id(),
                        error = %upsert_error,
                        "could not record failed status"
                    );
                }
            }
            Err(transition) => {
                error!(report_id = run.report_id(), error = %transition, "run already finished");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::fixtures::pdf_with_pages;
    use crate::extractor::ExtractedText;
    use crate::stores::MemoryStore;
    use crate::test_support::report;
    use crate::traits::ReportStore;
    use crate::{
        CharacterNgramEmbedder, EmbeddingError, ExtractionError, PersistenceError,
        ProcessingStatus,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Barrier;

    struct FixedTextExtractor(String);

    impl PdfExtractor for FixedTextExtractor {
        fn extract(&self, _bytes: &[u8]) -> Result<ExtractedText, ExtractionError> {
            Ok(ExtractedText {
                text: self.0.clone(),
                page_count: 4,
            })
        }
    }

    /// Fails the 2nd, 5th and 8th call.
    #[derive(Default)]
    struct FlakyEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        fn model_name(&self) -> &str {
            "flaky"
        }

        fn dimensions(&self) -> usize {
            2
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if matches!(call, 1 | 4 | 7) {
                return Err(EmbeddingError::Status {
                    status: 429,
                    body: "rate limited".to_string(),
                });
            }
            Ok(vec![1.0, 0.0])
        }
    }

    /// Only completes once `parties` calls are in flight at the same time.
    struct BarrierEmbedder {
        barrier: Barrier,
    }

    #[async_trait]
    impl Embedder for BarrierEmbedder {
        fn model_name(&self) -> &str {
            "barrier"
        }

        fn dimensions(&self) -> usize {
            1
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.barrier.wait().await;
            Ok(vec![1.0])
        }
    }

    struct WrongDimensionEmbedder;

    #[async_trait]
    impl Embedder for WrongDimensionEmbedder {
        fn model_name(&self) -> &str {
            "wrong"
        }

        fn dimensions(&self) -> usize {
            3
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(vec![1.0])
        }
    }

    /// Delegates to a memory store but refuses every chunk insert.
    struct RejectingChunkStore(Arc<MemoryStore>);

    #[async_trait]
    impl ReportStore for RejectingChunkStore {
        async fn get_report(&self, report_id: &str) -> Result<Option<Report>, PersistenceError> {
            self.0.get_report(report_id).await
        }

        async fn update_report(
            &self,
            report_id: &str,
            status: ReportStatus,
            metadata: Option<&ReportMetadata>,
        ) -> Result<(), PersistenceError> {
            self.0.update_report(report_id, status, metadata).await
        }

        async fn upsert_processing_status(
            &self,
            status: &ProcessingStatus,
        ) -> Result<(), PersistenceError> {
            self.0.upsert_processing_status(status).await
        }

        async fn insert_chunks(&self, _chunks: &[ReportChunk]) -> Result<(), PersistenceError> {
            Err(PersistenceError::Request("bulk insert rejected".to_string()))
        }

        async fn list_reports(
            &self,
            status: ReportStatus,
        ) -> Result<Vec<Report>, PersistenceError> {
            self.0.list_reports(status).await
        }
    }

    /// Delegates to a memory store but refuses to record the completed stage.
    struct RejectingCompletionStore(Arc<MemoryStore>);

    #[async_trait]
    impl ReportStore for RejectingCompletionStore {
        async fn get_report(&self, report_id: &str) -> Result<Option<Report>, PersistenceError> {
            self.0.get_report(report_id).await
        }

        async fn update_report(
            &self,
            report_id: &str,
            status: ReportStatus,
            metadata: Option<&ReportMetadata>,
        ) -> Result<(), PersistenceError> {
            self.0.update_report(report_id, status, metadata).await
        }

        async fn upsert_processing_status(
            &self,
            status: &ProcessingStatus,
        ) -> Result<(), PersistenceError> {
            if status.status == ProcessingStage::Completed {
                return Err(PersistenceError::Request("status write rejected".to_string()));
            }
            self.0.upsert_processing_status(status).await
        }

        async fn insert_chunks(&self, chunks: &[ReportChunk]) -> Result<(), PersistenceError> {
            self.0.insert_chunks(chunks).await
        }

        async fn list_reports(
            &self,
            status: ReportStatus,
        ) -> Result<Vec<Report>, PersistenceError> {
            self.0.list_reports(status).await
        }
    }

    /// 8000 characters without breakpoints: ten windows at the default config.
    fn ten_chunk_text() -> String {
        "abcdefghij".repeat(800)
    }

    async fn store_with_report(id: &str, pdf: Vec<u8>) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let report = report(id, "Chile - Santiago", ReportStatus::Processing);
        store.put_object(report.file_path.clone(), pdf).await;
        store.insert_report(report).await;
        store
    }

    fn orchestrator(
        store: &Arc<MemoryStore>,
        embedder: Arc<dyn Embedder>,
    ) -> IngestionOrchestrator {
        IngestionOrchestrator::new(
            store.clone(),
            store.clone(),
            embedder,
            ChunkingConfig::default(),
        )
        .unwrap()
    }

    fn stages(history: &[ProcessingStatus]) -> Vec<(ProcessingStage, u8)> {
        history
            .iter()
            .map(|status| (status.status, status.progress))
            .collect()
    }

    #[tokio::test]
    async fn successful_run_persists_chunks_and_completes_report() {
        let pdf = pdf_with_pages(&[
            "Resumen ejecutivo del ecosistema de innovacion de Santiago.",
            "Fortalezas: talento, universidades y capital de riesgo.",
        ]);
        let store = store_with_report("r1", pdf).await;
        let embedder = Arc::new(CharacterNgramEmbedder::default());

        let summary = orchestrator(&store, embedder).process_report("r1").await.unwrap();

        let report = store.report("r1").await.unwrap();
        assert_eq!(report.status, ReportStatus::Completed);
        let metadata = report.metadata.unwrap();
        assert_eq!(metadata.pages, 2);
        assert_eq!(metadata.chunks_count, summary.chunk_count);
        assert_eq!(metadata.language, "es");
        assert_eq!(metadata.checksum.map(|sum| sum.len()), Some(64));

        let chunks = store.chunks_for("r1").await;
        assert_eq!(chunks.len(), summary.chunk_count);
        assert!(!chunks.is_empty());
        for (expected_index, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index as usize, expected_index);
            assert!(chunk.start_char < chunk.end_char);
            assert_eq!(chunk.embedding.as_ref().map(Vec::len), Some(128));
        }

        assert_eq!(
            stages(&store.status_history("r1").await),
            vec![
                (ProcessingStage::Extracting, 10),
                (ProcessingStage::Chunking, 30),
                (ProcessingStage::Embedding, 60),
                (ProcessingStage::Completed, 100),
            ]
        );
    }

    #[tokio::test]
    async fn unparseable_pdf_fails_before_chunking() {
        let store = store_with_report("r1", b"definitely not a pdf".to_vec()).await;
        let embedder = Arc::new(CharacterNgramEmbedder::default());

        let error = orchestrator(&store, embedder)
            .process_report("r1")
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            IngestError::Extraction(ExtractionError::Parse(_))
        ));
        assert_eq!(
            store.report("r1").await.map(|report| report.status),
            Some(ReportStatus::Failed)
        );

        let live = store.processing_status("r1").await.unwrap();
        assert_eq!(live.status, ProcessingStage::Failed);
        assert_eq!(live.progress, 0);
        assert_eq!(live.message, error.to_string());

        let history = stages(&store.status_history("r1").await);
        assert!(history
            .iter()
            .all(|(stage, _)| *stage != ProcessingStage::Chunking));
        assert!(store.chunks_for("r1").await.is_empty());
    }

    #[tokio::test]
    async fn embedding_failures_keep_every_chunk() {
        let store = store_with_report("r1", b"%PDF".to_vec()).await;
        let embedder = Arc::new(FlakyEmbedder::default());
        let orchestrator = orchestrator(&store, embedder)
            .with_extractor(Arc::new(FixedTextExtractor(ten_chunk_text())));

        let summary = orchestrator.process_report("r1").await.unwrap();

        let chunks = store.chunks_for("r1").await;
        assert_eq!(chunks.len(), 10);
        assert_eq!(
            chunks.iter().filter(|chunk| chunk.embedding.is_some()).count(),
            7
        );
        assert_eq!(
            chunks.iter().filter(|chunk| chunk.embedding.is_none()).count(),
            3
        );
        assert_eq!(summary.failed_embeddings, 3);
        assert_eq!(
            store.report("r1").await.map(|report| report.status),
            Some(ReportStatus::Completed)
        );
    }

    #[tokio::test]
    async fn vectors_of_the_wrong_dimension_are_dropped() {
        let store = store_with_report("r1", b"%PDF".to_vec()).await;
        let orchestrator = orchestrator(&store, Arc::new(WrongDimensionEmbedder))
            .with_extractor(Arc::new(FixedTextExtractor("Texto breve.".to_string())));

        let summary = orchestrator.process_report("r1").await.unwrap();

        assert_eq!(summary.chunk_count, 1);
        assert_eq!(summary.embedded_count, 0);
        assert!(store.chunks_for("r1").await[0].embedding.is_none());
    }

    #[tokio::test]
    async fn embedding_calls_are_in_flight_together() {
        let store = store_with_report("r1", b"%PDF".to_vec()).await;
        let embedder = Arc::new(BarrierEmbedder {
            barrier: Barrier::new(10),
        });
        let orchestrator = orchestrator(&store, embedder)
            .with_extractor(Arc::new(FixedTextExtractor(ten_chunk_text())));

        let run = orchestrator.process_report("r1");
        let summary = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("sequential embedding would never release the barrier")
            .unwrap();

        assert_eq!(summary.embedded_count, 10);
    }

    #[tokio::test]
    async fn failed_bulk_insert_marks_report_failed_with_no_chunks() {
        let memory = store_with_report("r1", b"%PDF".to_vec()).await;
        let reports = Arc::new(RejectingChunkStore(memory.clone()));
        let orchestrator = IngestionOrchestrator::new(
            memory.clone(),
            reports,
            Arc::new(CharacterNgramEmbedder::default()),
            ChunkingConfig::default(),
        )
        .unwrap()
        .with_extractor(Arc::new(FixedTextExtractor(ten_chunk_text())));

        let error = orchestrator.process_report("r1").await.unwrap_err();

        assert!(matches!(error, IngestError::Persistence(_)));
        assert!(memory.chunks_for("r1").await.is_empty());
        assert_eq!(
            memory.report("r1").await.map(|report| report.status),
            Some(ReportStatus::Failed)
        );
        let live = memory.processing_status("r1").await.unwrap();
        assert_eq!((live.status, live.progress), (ProcessingStage::Failed, 0));
        assert!(live.message.contains("bulk insert rejected"));
    }

    #[tokio::test]
    async fn rejected_completion_status_leaves_report_failed() {
        let memory = store_with_report("r1", b"%PDF".to_vec()).await;
        let reports = Arc::new(RejectingCompletionStore(memory.clone()));
        let orchestrator = IngestionOrchestrator::new(
            memory.clone(),
            reports,
            Arc::new(CharacterNgramEmbedder::default()),
            ChunkingConfig::default(),
        )
        .unwrap()
        .with_extractor(Arc::new(FixedTextExtractor("Texto breve.".to_string())));

        let error = orchestrator.process_report("r1").await.unwrap_err();

        assert!(matches!(error, IngestError::Persistence(_)));
        assert_eq!(
            memory.report("r1").await.map(|report| report.status),
            Some(ReportStatus::Failed)
        );
        let live = memory.processing_status("r1").await.unwrap();
        assert_eq!((live.status, live.progress), (ProcessingStage::Failed, 0));
        assert!(live.message.contains("status write rejected"));
    }

    #[tokio::test]
    async fn missing_pdf_object_fails_the_run() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_report(report("r1", "Chile - Santiago", ReportStatus::Processing))
            .await;

        let error = orchestrator(&store, Arc::new(CharacterNgramEmbedder::default()))
            .process_report("r1")
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            IngestError::Persistence(PersistenceError::ObjectNotFound(_))
        ));
        assert_eq!(
            store.report("r1").await.map(|report| report.status),
            Some(ReportStatus::Failed)
        );
    }

    #[tokio::test]
    async fn blank_pdf_text_is_a_hard_failure() {
        let store = store_with_report("r1", pdf_with_pages(&["  "])).await;

        let error = orchestrator(&store, Arc::new(CharacterNgramEmbedder::default()))
            .process_report("r1")
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            IngestError::Extraction(ExtractionError::Empty)
        ));
        assert!(store.chunks_for("r1").await.is_empty());
    }

    #[tokio::test]
    async fn terminal_reports_are_never_reprocessed() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_report(report("done", "Chile - Santiago", ReportStatus::Completed))
            .await;

        let error = orchestrator(&store, Arc::new(CharacterNgramEmbedder::default()))
            .process_report("done")
            .await
            .unwrap_err();

        assert!(matches!(error, IngestError::ReportFinalized { .. }));
        assert!(store.status_history("done").await.is_empty());
        assert_eq!(
            store.report("done").await.map(|report| report.status),
            Some(ReportStatus::Completed)
        );
    }

    #[tokio::test]
    async fn unknown_reports_are_not_found() {
        let store = Arc::new(MemoryStore::new());
        let error = orchestrator(&store, Arc::new(CharacterNgramEmbedder::default()))
            .process_report("ghost")
            .await
            .unwrap_err();

        assert!(matches!(error, IngestError::ReportNotFound(id) if id == "ghost"));
    }
}
