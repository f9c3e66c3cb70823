//! Recovery for runs that died mid-flight and left their report in
//! `processing`.

use crate::traits::ReportStore;
use crate::{PersistenceError, ProcessingStage, ProcessingStatus, ReportStatus};
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StuckReport {
    pub id: String,
    pub title: String,
    pub ecosystem: String,
    pub updated_at: DateTime<Utc>,
}

/// Marks every report that has sat in `processing` since before
/// `now - older_than` as `failed` and returns the ones it changed. Reports
/// the store refuses to update are skipped. With `dry_run` nothing is
/// written and every stale report is returned.
pub async fn reconcile_stuck_reports(
    store: &dyn ReportStore,
    older_than: Duration,
    now: DateTime<Utc>,
    dry_run: bool,
) -> Result<Vec<StuckReport>, PersistenceError> {
    let cutoff = now - older_than;
    let stuck: Vec<StuckReport> = store
        .list_reports(ReportStatus::Processing)
        .await?
        .into_iter()
        .filter(|report| report.updated_at < cutoff)
        .map(|report| StuckReport {
            id: report.id,
            title: report.title,
            ecosystem: report.ecosystem,
            updated_at: report.updated_at,
        })
        .collect();

    if dry_run {
        info!(count = stuck.len(), "dry run; no reports changed");
        return Ok(stuck);
    }

    let mut failed = Vec::with_capacity(stuck.len());
    for report in stuck {
        // A run may finish between the listing and this update.
        if let Err(error) = store
            .update_report(&report.id, ReportStatus::Failed, None)
            .await
        {
            warn!(report_id = %report.id, error = %error, "skipping report");
            continue;
        }
        store
            .upsert_processing_status(&ProcessingStatus {
                report_id: report.id.clone(),
                status: ProcessingStage::Failed,
                progress: ProcessingStage::Failed.progress(),
                message: format!(
                    "Marked failed: still processing since {}",
                    report.updated_at.to_rfc3339()
                ),
                updated_at: now,
            })
            .await?;
        warn!(report_id = %report.id, "stuck report marked failed");
        failed.push(report);
    }

    Ok(failed)
}
