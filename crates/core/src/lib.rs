pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod reconcile;
pub mod search;
pub mod status;
pub mod stores;
pub mod text;
pub mod traits;

#[cfg(test)]
pub(crate) mod test_support;

pub use chunking::{Chunker, ChunkingConfig, SectionClassifier};
pub use embeddings::{
    cosine_similarity, CharacterNgramEmbedder, Embedder, EmbeddingConfig, OpenAiEmbedder,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{
    ConfigError, EmbeddingError, ExtractionError, IngestError, PersistenceError, SearchError,
    TransitionError,
};
pub use extractor::{ExtractedText, LopdfExtractor, PdfExtractor};
pub use ingest::{
    discover_pdf_files, preview_path_best_effort, FilePreview, PreviewReport, SkippedPdf,
};
pub use models::{
    ChunkDraft, ProcessingStage, ProcessingStatus, Report, ReportChunk, ReportMetadata,
    ReportStatus, ReportSummary, SearchCandidate, SearchQuery, SearchResult, SectionType,
};
pub use orchestrator::{IngestionOrchestrator, IngestionSummary};
pub use reconcile::{reconcile_stuck_reports, StuckReport};
pub use search::SimilaritySearch;
pub use status::PipelineRun;
pub use stores::{MemoryStore, SupabaseStore};
pub use traits::{ChunkIndex, ObjectStore, ReportStore};
