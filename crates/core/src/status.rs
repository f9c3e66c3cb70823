//! Processing state machine for one ingestion run.
//!
//! A run moves `extracting -> chunking -> embedding -> completed`; `failed` is
//! reachable from every non-terminal stage. Any other move is rejected with a
//! [`TransitionError`] instead of overwriting the stored record.

use crate::error::TransitionError;
use crate::models::{ProcessingStage, ProcessingStatus};
use chrono::Utc;

impl ProcessingStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Progress checkpoint recorded when a run enters this stage.
    pub fn progress(&self) -> u8 {
        match self {
            Self::Extracting => 10,
            Self::Chunking => 30,
            Self::Embedding => 60,
            Self::Completed => 100,
            Self::Failed => 0,
        }
    }

    pub fn can_transition_to(&self, next: ProcessingStage) -> bool {
        use ProcessingStage::*;

        match (self, next) {
            (Extracting, Chunking) => true,
            (Chunking, Embedding) => true,
            (Embedding, Completed) => true,
            (Extracting | Chunking | Embedding, Failed) => true,
            (Extracting, Extracting | Embedding | Completed) => false,
            (Chunking, Extracting | Chunking | Completed) => false,
            (Embedding, Extracting | Chunking | Embedding) => false,
            (Completed | Failed, _) => false,
        }
    }

    pub(crate) fn default_message(&self) -> &'static str {
        match self {
            Self::Extracting => "Extracting text from PDF...",
            Self::Chunking => "Chunking text content...",
            Self::Embedding => "Generating embeddings...",
            Self::Completed => "Processing completed successfully",
            Self::Failed => "Processing failed",
        }
    }
}

/// Tracks the current stage of one run and builds the status records to
/// persist for each transition.
#[derive(Debug)]
pub struct PipelineRun {
    report_id: String,
    stage: ProcessingStage,
}

impl PipelineRun {
    pub fn start(report_id: impl Into<String>) -> (Self, ProcessingStatus) {
        let run = Self {
            report_id: report_id.into(),
            stage: ProcessingStage::Extracting,
        };
        let status = run.record(
            ProcessingStage::Extracting,
            ProcessingStage::Extracting.default_message().to_string(),
        );
        (run, status)
    }

    pub fn stage(&self) -> ProcessingStage {
        self.stage
    }

    pub fn report_id(&self) -> &str {
        &self.report_id
    }

    pub fn advance(&mut self, next: ProcessingStage) -> Result<ProcessingStatus, TransitionError> {
        self.advance_with_message(next, next.default_message())
    }

    pub fn advance_with_message(
        &mut self,
        next: ProcessingStage,
        message: impl Into<String>,
    ) -> Result<ProcessingStatus, TransitionError> {
        let status = self.prepare(next, message)?;
        self.commit(&status)?;
        Ok(status)
    }

    pub fn fail(
        &mut self,
        message: impl Into<String>,
    ) -> Result<ProcessingStatus, TransitionError> {
        self.advance_with_message(ProcessingStage::Failed, message)
    }

    /// Builds the record for moving to `next` without leaving the current
    /// stage. Pair with [`PipelineRun::commit`] once the record is stored.
    pub fn prepare(
        &self,
        next: ProcessingStage,
        message: impl Into<String>,
    ) -> Result<ProcessingStatus, TransitionError> {
        self.check(next)?;
        Ok(self.record(next, message.into()))
    }

    pub fn commit(&mut self, status: &ProcessingStatus) -> Result<(), TransitionError> {
        self.check(status.status)?;
        self.stage = status.status;
        Ok(())
    }

    fn check(&self, next: ProcessingStage) -> Result<(), TransitionError> {
        if self.stage.can_transition_to(next) {
            Ok(())
        } else {
            Err(TransitionError {
                from: self.stage,
                to: next,
            })
        }
    }

    fn record(&self, stage: ProcessingStage, message: String) -> ProcessingStatus {
        ProcessingStatus {
            report_id: self.report_id.clone(),
            status: stage,
            progress: stage.progress(),
            message,
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ProcessingStage::*;

    const ALL: [ProcessingStage; 5] = [Extracting, Chunking, Embedding, Completed, Failed];

    #[test]
    fn happy_path_reports_documented_checkpoints() {
        let (mut run, first) = PipelineRun::start("report-1");
        assert_eq!(first.status, Extracting);
        assert_eq!(first.progress, 10);

        let progress: Vec<u8> = [Chunking, Embedding, Completed]
            .into_iter()
            .map(|stage| run.advance(stage).expect("legal transition").progress)
            .collect();

        assert_eq!(progress, vec![30, 60, 100]);
        assert_eq!(run.stage(), Completed);
    }

    #[test]
    fn completed_cannot_go_back_to_embedding() {
        let (mut run, _) = PipelineRun::start("report-1");
        run.advance(Chunking).unwrap();
        run.advance(Embedding).unwrap();
        run.advance(Completed).unwrap();

        let error = run.advance(Embedding).unwrap_err();
        assert_eq!(
            error,
            TransitionError {
                from: Completed,
                to: Embedding
            }
        );
        assert_eq!(run.stage(), Completed);
    }

    #[test]
    fn failed_is_reachable_from_every_live_stage_and_resets_progress() {
        for stage in [Extracting, Chunking, Embedding] {
            assert!(stage.can_transition_to(Failed));
        }

        let (mut run, _) = PipelineRun::start("report-1");
        run.advance(Chunking).unwrap();
        let status = run.fail("boom").unwrap();
        assert_eq!(status.status, Failed);
        assert_eq!(status.progress, 0);
        assert_eq!(status.message, "boom");
    }

    #[test]
    fn terminal_stages_have_no_outgoing_transitions() {
        for from in [Completed, Failed] {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn stages_cannot_be_skipped() {
        assert!(!Extracting.can_transition_to(Embedding));
        assert!(!Extracting.can_transition_to(Completed));
        assert!(!Chunking.can_transition_to(Completed));
    }

    #[test]
    fn progress_is_monotonic_along_legal_forward_transitions() {
        for from in ALL {
            for to in ALL {
                if to != Failed && from.can_transition_to(to) {
                    assert!(to.progress() > from.progress());
                }
            }
        }
    }

    #[test]
    fn prepared_transition_leaves_stage_until_committed() {
        let (mut run, _) = PipelineRun::start("report-1");
        run.advance(Chunking).unwrap();
        run.advance(Embedding).unwrap();

        let completed = run
            .prepare(Completed, Completed.default_message())
            .unwrap();
        assert_eq!((completed.status, completed.progress), (Completed, 100));
        assert_eq!(run.stage(), Embedding);

        // an uncommitted completion can still fail
        let failed = run.fail("status write rejected").unwrap();
        assert_eq!((failed.status, failed.progress), (Failed, 0));
        assert!(run.commit(&completed).is_err());
    }

    #[test]
    fn commit_applies_a_prepared_record() {
        let (mut run, _) = PipelineRun::start("report-1");
        let chunking = run.prepare(Chunking, "Chunking text content...").unwrap();
        run.commit(&chunking).unwrap();
        assert_eq!(run.stage(), Chunking);
        assert!(run.prepare(Completed, "skip").is_err());
    }
}
