use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fmt;
use uuid::Uuid;

pub const DEFAULT_SEARCH_LIMIT: usize = 10;
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Processing,
    Completed,
    Failed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing)
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ReportMetadata {
    pub pages: u32,
    pub word_count: usize,
    pub language: String,
    pub chunks_count: usize,
    #[serde(default)]
    pub checksum: Option<String>,
}

/// One uploaded report as stored in the `reports` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    pub title: String,
    pub ecosystem: String,
    pub region: String,
    pub file_path: String,
    pub file_size: u64,
    pub status: ReportStatus,
    /// Cross-ecosystem benchmark report.
    #[serde(default)]
    pub comparado: bool,
    #[serde(default)]
    pub metadata: Option<ReportMetadata>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Denormalized report fields carried alongside search hits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportSummary {
    pub id: String,
    pub title: String,
    pub ecosystem: String,
    pub region: String,
    pub created_at: DateTime<Utc>,
    pub status: ReportStatus,
}

impl From<&Report> for ReportSummary {
    fn from(report: &Report) -> Self {
        Self {
            id: report.id.clone(),
            title: report.title.clone(),
            ecosystem: report.ecosystem.clone(),
            region: report.region.clone(),
            created_at: report.created_at,
            status: report.status,
        }
    }
}

/// Section label persisted with each chunk. The serialized names are stored
/// as-is in the database and must not change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SectionType {
    #[serde(rename = "resumen")]
    Resumen,
    #[serde(rename = "fortalezas")]
    Fortalezas,
    #[serde(rename = "retos")]
    Retos,
    #[serde(rename = "recomendaciones")]
    Recomendaciones,
    #[serde(rename = "métricas")]
    Metricas,
    #[serde(rename = "other")]
    Other,
}

impl SectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resumen => "resumen",
            Self::Fortalezas => "fortalezas",
            Self::Retos => "retos",
            Self::Recomendaciones => "recomendaciones",
            Self::Metricas => "métricas",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for SectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chunk as produced by the chunker, before it is bound to a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDraft {
    pub content: String,
    pub section_type: SectionType,
    pub start_char: usize,
    pub end_char: usize,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportChunk {
    pub id: Uuid,
    pub report_id: String,
    pub content: String,
    pub section_type: SectionType,
    pub chunk_index: u32,
    pub start_char: usize,
    pub end_char: usize,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

impl ReportChunk {
    pub fn from_draft(
        report_id: &str,
        chunk_index: u32,
        draft: ChunkDraft,
        embedding: Option<Vec<f32>>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            report_id: report_id.to_string(),
            content: draft.content,
            section_type: draft.section_type,
            chunk_index,
            start_char: draft.start_char,
            end_char: draft.end_char,
            embedding,
            created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStage {
    Extracting,
    Chunking,
    Embedding,
    Completed,
    Failed,
}

impl ProcessingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extracting => "extracting",
            Self::Chunking => "chunking",
            Self::Embedding => "embedding",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live progress record for a report, upserted by `report_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessingStatus {
    pub report_id: String,
    pub status: ProcessingStage,
    pub progress: u8,
    pub message: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchQuery {
    pub text: String,
    /// Case-insensitive substring match against `Report::ecosystem`.
    pub ecosystem: Option<String>,
    /// Exact match against `Report::region`.
    pub region: Option<String>,
    pub limit: usize,
    pub threshold: f64,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ecosystem: None,
            region: None,
            limit: DEFAULT_SEARCH_LIMIT,
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }

    pub fn with_ecosystem(mut self, ecosystem: impl Into<String>) -> Self {
        self.ecosystem = Some(ecosystem.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Metadata pre-filter applied to a candidate's parent report.
    pub fn accepts(&self, report: &ReportSummary) -> bool {
        if report.status != ReportStatus::Completed {
            return false;
        }

        if let Some(ecosystem) = &self.ecosystem {
            let needle = ecosystem.to_lowercase();
            if !report.ecosystem.to_lowercase().contains(&needle) {
                return false;
            }
        }

        match &self.region {
            Some(region) => report.region == *region,
            None => true,
        }
    }
}

/// Raw nearest-neighbour hit as returned by a chunk index.
#[derive(Debug, Clone)]
pub struct SearchCandidate {
    pub chunk: ReportChunk,
    pub report: ReportSummary,
    pub similarity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk: ReportChunk,
    pub report: ReportSummary,
    pub similarity: f64,
}
