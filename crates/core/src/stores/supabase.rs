//! Supabase adapter: PostgREST for the `reports`, `chunks` and
//! `processing_status` tables, Storage for the uploaded PDFs, and the
//! `match_chunks` RPC (see `sql/schema.sql`) for vector lookup.

use crate::traits::{ChunkIndex, ObjectStore, ReportStore};
use crate::{
    PersistenceError, ProcessingStatus, Report, ReportChunk, ReportMetadata, ReportStatus,
    ReportSummary, SearchCandidate, SearchQuery, SectionType,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use serde_with::skip_serializing_none;
use url::Url;
use uuid::Uuid;

const BACKEND: &str = "supabase";

pub struct SupabaseStore {
    client: Client,
    base: Url,
    api_key: String,
    bucket: String,
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
struct ReportUpdate<'a> {
    status: ReportStatus,
    metadata: Option<&'a ReportMetadata>,
    updated_at: DateTime<Utc>,
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
struct MatchChunksParams<'a> {
    query_embedding: &'a [f32],
    match_threshold: f64,
    match_count: usize,
    filter_ecosystem: Option<&'a str>,
    filter_region: Option<&'a str>,
}

/// Row shape returned by the `match_chunks` RPC.
#[derive(Debug, Deserialize)]
struct MatchRow {
    id: Uuid,
    report_id: String,
    content: String,
    section_type: SectionType,
    chunk_index: u32,
    start_char: usize,
    end_char: usize,
    created_at: DateTime<Utc>,
    similarity: f64,
    report_title: String,
    report_ecosystem: String,
    report_region: String,
    report_created_at: DateTime<Utc>,
    report_status: ReportStatus,
}

impl From<MatchRow> for SearchCandidate {
    fn from(row: MatchRow) -> Self {
        SearchCandidate {
            report: ReportSummary {
                id: row.report_id.clone(),
                title: row.report_title,
                ecosystem: row.report_ecosystem,
                region: row.report_region,
                created_at: row.report_created_at,
                status: row.report_status,
            },
            chunk: ReportChunk {
                id: row.id,
                report_id: row.report_id,
                content: row.content,
                section_type: row.section_type,
                chunk_index: row.chunk_index,
                start_char: row.start_char,
                end_char: row.end_char,
                embedding: None,
                created_at: row.created_at,
            },
            similarity: row.similarity,
        }
    }
}

impl SupabaseStore {
    pub fn new(
        project_url: &str,
        api_key: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Result<Self, PersistenceError> {
        let mut base = Url::parse(project_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            client: Client::new(),
            base,
            api_key: api_key.into(),
            bucket: bucket.into(),
        })
    }

    fn table_url(&self, table: &str) -> Result<Url, PersistenceError> {
        Ok(self.base.join(&format!("rest/v1/{table}"))?)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn check(response: Response) -> Result<Response, PersistenceError> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(PersistenceError::BackendResponse {
            backend: BACKEND.to_string(),
            details: format!("{status}: {body}"),
        })
    }
}

#[async_trait]
impl ObjectStore for SupabaseStore {
    async fn get(&self, path: &str) -> Result<Vec<u8>, PersistenceError> {
        let mut url = self.base.join("storage/v1/object/")?;
        url.path_segments_mut()
            .map_err(|_| PersistenceError::Request(format!("cannot-be-a-base url {}", self.base)))?
            .pop_if_empty()
            .push(&self.bucket)
            .extend(path.split('/').filter(|segment| !segment.is_empty()));

        let response = self.authorized(self.client.get(url)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(PersistenceError::ObjectNotFound(path.to_string()));
        }

        let response = Self::check(response).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl ReportStore for SupabaseStore {
    async fn get_report(&self, report_id: &str) -> Result<Option<Report>, PersistenceError> {
        let mut url = self.table_url("reports")?;
        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair("id", &format!("eq.{report_id}"));

        let response = Self::check(self.authorized(self.client.get(url)).send().await?).await?;
        let rows: Vec<Report> = response.json().await?;
        Ok(rows.into_iter().next())
    }

    async fn update_report(
        &self,
        report_id: &str,
        status: ReportStatus,
        metadata: Option<&ReportMetadata>,
    ) -> Result<(), PersistenceError> {
        let mut url = self.table_url("reports")?;
        url.query_pairs_mut()
            .append_pair("id", &format!("eq.{report_id}"))
            .append_pair("status", "eq.processing");

        let body = ReportUpdate {
            status,
            metadata,
            updated_at: Utc::now(),
        };

        let response = self
            .authorized(self.client.patch(url))
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .await?;
        let rows: Vec<Value> = Self::check(response).await?.json().await?;

        if rows.is_empty() {
            return Err(PersistenceError::Request(format!(
                "report {report_id} is not processing; refusing to set {status}"
            )));
        }
        Ok(())
    }

    async fn upsert_processing_status(
        &self,
        status: &ProcessingStatus,
    ) -> Result<(), PersistenceError> {
        let mut url = self.table_url("processing_status")?;
        url.query_pairs_mut().append_pair("on_conflict", "report_id");

        let response = self
            .authorized(self.client.post(url))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(status)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn insert_chunks(&self, chunks: &[ReportChunk]) -> Result<(), PersistenceError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let rows = chunks
            .iter()
            .map(|chunk| {
                json!({
                    "id": chunk.id,
                    "report_id": chunk.report_id,
                    "content": chunk.content,
                    "section_type": chunk.section_type,
                    "chunk_index": chunk.chunk_index,
                    "start_char": chunk.start_char,
                    "end_char": chunk.end_char,
                    "embedding": chunk.embedding,
                    "created_at": chunk.created_at,
                })
            })
            .collect::<Vec<_>>();

        let response = self
            .authorized(self.client.post(self.table_url("chunks")?))
            .header("Prefer", "return=minimal")
            .json(&rows)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn list_reports(&self, status: ReportStatus) -> Result<Vec<Report>, PersistenceError> {
        let mut url = self.table_url("reports")?;
        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair("status", &format!("eq.{status}"))
            .append_pair("order", "created_at.asc");

        let response = Self::check(self.authorized(self.client.get(url)).send().await?).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ChunkIndex for SupabaseStore {
    async fn match_chunks(
        &self,
        query_vector: &[f32],
        query: &SearchQuery,
    ) -> Result<Vec<SearchCandidate>, PersistenceError> {
        let params = MatchChunksParams {
            query_embedding: query_vector,
            match_threshold: query.threshold,
            match_count: query.limit,
            filter_ecosystem: query.ecosystem.as_deref(),
            filter_region: query.region.as_deref(),
        };

        let response = self
            .authorized(self.client.post(self.table_url("rpc/match_chunks")?))
            .json(&params)
            .send()
            .await?;
        let rows: Vec<MatchRow> = Self::check(response).await?.json().await?;
        Ok(rows.into_iter().map(SearchCandidate::from).collect())
    }
}
