//! # Statute Corpus Extraction
//!
//! ## Purpose
//! Parses the raw statute corpus into typed records: article number, article
//! text, and the plain-language explanation that accompanies each article.
//!
//! ## Input/Output Specification
//! - **Input**: A single document of repeated blocks separated by a literal
//!   `"""` delimiter, each block shaped as
//!   `第 N 條` newline, article text, newline, `口語化解釋:` explanation
//! - **Output**: One [`StatuteRecord`] per well-formed block
//! - **Edge cases**: Blocks failing the pattern are skipped (lenient) or
//!   surfaced as `MalformedInput` (strict)

use crate::errors::{KgError, Result};
use regex::Regex;

/// Literal delimiter between statute blocks in the source corpus
pub const STATUTE_BLOCK_DELIMITER: &str = "\"\"\"";

/// One parsed statute block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatuteRecord {
    /// Article number in canonical form, e.g. `184` or `191-2`
    pub article_number: String,
    /// Full article text
    pub text: String,
    /// Plain-language explanation
    pub explanation: String,
}

/// Statute corpus parser
pub struct StatuteParser {
    block_re: Regex,
    strict: bool,
}

impl StatuteParser {
    pub fn new(strict: bool) -> Self {
        Self {
            block_re: Regex::new(r"(?s)第 (\d+-?\d*) 條\n(.*?)\n口語化解釋:\s*(.*)")
                .expect("static statute block pattern"),
            strict,
        }
    }

    /// Parse the whole corpus into records.
    ///
    /// Returns the records plus the number of skipped blocks. In strict mode
    /// the first malformed non-empty block aborts parsing instead.
    pub fn parse(&self, content: &str) -> Result<(Vec<StatuteRecord>, usize)> {
        let mut records = Vec::new();
        let mut skipped = 0;

        for section in content.split(STATUTE_BLOCK_DELIMITER) {
            if section.trim().is_empty() {
                continue;
            }
            match self.block_re.captures(section) {
                Some(cap) => {
                    records.push(StatuteRecord {
                        article_number: cap[1].trim().to_string(),
                        text: cap[2].trim().to_string(),
                        explanation: cap[3].trim().to_string(),
                    });
                }
                None => {
                    if self.strict {
                        return Err(KgError::MalformedInput {
                            section: "statute".to_string(),
                            details: format!(
                                "block does not match the article pattern: {}",
                                crate::utils::TextUtils::preview(section, 60)
                            ),
                        });
                    }
                    tracing::warn!(
                        "Skipping malformed statute block: {}",
                        crate::utils::TextUtils::preview(section, 60)
                    );
                    skipped += 1;
                }
            }
        }

        Ok((records, skipped))
    }
}
