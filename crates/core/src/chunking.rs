use crate::error::ConfigError;
use crate::models::{ChunkDraft, SectionType};
use regex::{Regex, RegexBuilder};

pub const DEFAULT_CHUNK_SIZE: usize = 1_000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
pub const DEFAULT_MIN_BREAK_RATIO: f64 = 0.7;

/// Keyword patterns tested in priority order; the first match labels the chunk.
const SECTION_PATTERNS: [(SectionType, &str); 5] = [
    (SectionType::Resumen, r"resumen|summary|executive summary"),
    (SectionType::Fortalezas, r"fortalezas|strengths|ventajas|advantages"),
    (SectionType::Retos, r"retos|challenges|desafíos|obstacles"),
    (
        SectionType::Recomendaciones,
        r"recomendaciones|recommendations|sugerencias|suggestions",
    ),
    (
        SectionType::Metricas,
        r"métricas|metrics|indicadores|kpis|performance",
    ),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkingConfig {
    /// Target window length in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive windows.
    pub overlap: usize,
    /// A sentence or paragraph break only shortens a window when it sits past
    /// this fraction of `chunk_size`.
    pub min_break_ratio: f64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
            min_break_ratio: DEFAULT_MIN_BREAK_RATIO,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidChunking(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(ConfigError::InvalidChunking(format!(
                "overlap {} must be smaller than chunk_size {}",
                self.overlap, self.chunk_size
            )));
        }
        if !(0.0..=1.0).contains(&self.min_break_ratio) {
            return Err(ConfigError::InvalidChunking(format!(
                "min_break_ratio {} must be within [0, 1]",
                self.min_break_ratio
            )));
        }
        Ok(())
    }
}

/// Labels a piece of text with the first section whose keywords it mentions.
#[derive(Debug, Clone)]
pub struct SectionClassifier {
    patterns: Vec<(SectionType, Regex)>,
}

impl SectionClassifier {
    pub fn new() -> Result<Self, ConfigError> {
        let patterns = SECTION_PATTERNS
            .iter()
            .map(|(section, pattern)| {
                let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
                Ok((*section, regex))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self { patterns })
    }

    pub fn classify(&self, text: &str) -> SectionType {
        self.patterns
            .iter()
            .find(|(_, regex)| regex.is_match(text))
            .map(|(section, _)| *section)
            .unwrap_or(SectionType::Other)
    }
}

#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
    classifier: SectionClassifier,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            classifier: SectionClassifier::new()?,
        })
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    pub fn classifier(&self) -> &SectionClassifier {
        &self.classifier
    }

    /// Splits `text` into overlapping windows snapped to sentence or paragraph
    /// ends. Offsets are character (not byte) positions into `text`.
    ///
    /// Windows holding only whitespace yield no draft; their span is folded
    /// into the neighbouring draft so the drafts still cover all of `text`.
    pub fn chunk(&self, text: &str) -> Vec<ChunkDraft> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        let mut drafts = Vec::new();
        let mut start = 0usize;
        // Start of a run of blank windows not yet covered by any draft.
        let mut blank_from: Option<usize> = None;

        while start < total {
            let window_end = (start + self.config.chunk_size).min(total);
            let end = if window_end < total {
                self.snap_to_break(&chars[start..window_end])
                    .map(|offset| start + offset + 1)
                    .unwrap_or(window_end)
            } else {
                window_end
            };

            let window: String = chars[start..end].iter().collect();
            let content = window.trim();
            if content.is_empty() {
                blank_from.get_or_insert(start);
            } else {
                drafts.push(ChunkDraft {
                    content: content.to_string(),
                    section_type: self.classifier.classify(&window),
                    start_char: blank_from.take().unwrap_or(start),
                    end_char: end,
                });
            }

            if end >= total {
                break;
            }

            start = end.saturating_sub(self.config.overlap).max(start + 1);
        }

        // Trailing whitespace is absorbed by the last draft.
        if blank_from.is_some() {
            if let Some(last) = drafts.last_mut() {
                last.end_char = total;
            }
        }

        drafts
    }

    /// Offset of the last qualifying `.` or `\n\n` inside the window.
    fn snap_to_break(&self, window: &[char]) -> Option<usize> {
        let last_sentence = window.iter().rposition(|ch| *ch == '.');
        let last_paragraph = window
            .windows(2)
            .rposition(|pair| pair[0] == '\n' && pair[1] == '\n');

        let breakpoint = last_sentence.max(last_paragraph)?;
        let floor = self.config.chunk_size as f64 * self.config.min_break_ratio;

        if breakpoint as f64 > floor {
            Some(breakpoint)
        } else {
            None
        }
    }
}
