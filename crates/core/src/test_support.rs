use crate::{Report, ReportChunk, ReportStatus, SectionType};
use chrono::{TimeZone, Utc};
use uuid::Uuid;

pub(crate) fn report(id: &str, ecosystem: &str, status: ReportStatus) -> Report {
    let created_at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
    Report {
        id: id.to_string(),
        title: format!("Informe {id}"),
        ecosystem: ecosystem.to_string(),
        region: "LATAM".to_string(),
        file_path: format!("{id}.pdf"),
        file_size: 1_024,
        status,
        comparado: false,
        metadata: None,
        created_at,
        updated_at: created_at,
        user_id: None,
    }
}

pub(crate) fn chunk(
    report_id: &str,
    chunk_index: u32,
    content: &str,
    embedding: Option<Vec<f32>>,
) -> ReportChunk {
    let start_char = chunk_index as usize * 800;
    ReportChunk {
        id: Uuid::new_v4(),
        report_id: report_id.to_string(),
        content: content.to_string(),
        section_type: SectionType::Other,
        chunk_index,
        start_char,
        end_char: start_char + content.chars().count().max(1),
        embedding,
        created_at: Utc::now(),
    }
}
