use crate::error::ExtractionError;
use lopdf::Document;

/// Plain text pulled out of a PDF payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub text: String,
    pub page_count: u32,
}

pub trait PdfExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<ExtractedText, ExtractionError>;
}

/// Extracts page text with `lopdf`, joining pages with a blank line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<ExtractedText, ExtractionError> {
        let document =
            Document::load_mem(bytes).map_err(|error| ExtractionError::Parse(error.to_string()))?;

        let pages = document.get_pages();
        let page_count = u32::try_from(pages.len())
            .map_err(|_| ExtractionError::Parse("page count overflow".to_string()))?;

        let mut texts = Vec::new();
        for page_no in pages.keys() {
            let text = document
                .extract_text(&[*page_no])
                .map_err(|error| ExtractionError::Parse(error.to_string()))?;

            if !text.trim().is_empty() {
                texts.push(text.trim_end().to_string());
            }
        }

        if texts.is_empty() {
            return Err(ExtractionError::Empty);
        }

        Ok(ExtractedText {
            text: texts.join("\n\n"),
            page_count,
        })
    }
}
