//! # Case Corpus Extraction
//!
//! ## Purpose
//! Parses the raw judgment corpus into typed case records: the fact
//! narrative, the legal-basis text with its cited statutes, and the itemized
//! compensation request.
//!
//! ## Input/Output Specification
//! - **Input**: A document of `"`-quoted case blocks. Each case splits at the
//!   fixed numeral markers `一、` / `二、` into fact narrative and remainder;
//!   the remainder splits at the first `（一）` marker into legal-reference
//!   text and compensation text.
//! - **Output**: One [`CaseRecord`] per well-formed block, with positional
//!   1-based numbering over ALL blocks (a skipped block consumes its index,
//!   reproducing the source enumeration)
//! - **Edge cases**: Blocks missing the `一、`/`二、` markers are skipped
//!   whole — no partial case is ever produced. No `（一）` marker means the
//!   entire remainder is legal-reference text and no compensation exists.

use crate::citation::CitationNormalizer;
use crate::errors::{KgError, Result};
use regex::Regex;

/// One itemized damages entry from the compensation segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompensationItem {
    /// Bracketed label content, e.g. `一` or `醫療費用`
    pub label: String,
    /// Item body text, up to the next label or end of segment
    pub text: String,
}

/// One parsed case block
#[derive(Debug, Clone)]
pub struct CaseRecord {
    /// 1-based positional index over raw case blocks
    pub index: usize,
    /// Full raw case text
    pub raw: String,
    /// Fact narrative (between `一、` and `二、`)
    pub fact_text: String,
    /// Legal-basis text block, if non-empty
    pub legal_text: Option<String>,
    /// Canonical statute ids cited in the legal-basis text
    pub references: Vec<String>,
    /// Compensation request text block, if present
    pub compensation_text: Option<String>,
    /// Itemized damages entries in extraction order
    pub items: Vec<CompensationItem>,
}

impl CaseRecord {
    pub fn case_id(&self) -> String {
        format!("Case{}", self.index)
    }

    pub fn fact_id(&self) -> String {
        format!("Fact{}", self.index)
    }

    pub fn legal_id(&self) -> String {
        format!("Legal{}", self.index)
    }

    pub fn compensation_id(&self) -> String {
        format!("Compensation{}", self.index)
    }

    /// Id of the j-th (1-based) compensation item
    pub fn item_id(&self, item_index: usize) -> String {
        format!("CompItem{}_{}", self.index, item_index)
    }
}

/// Case corpus parser
pub struct CaseParser {
    sections_re: Regex,
    compensation_marker_re: Regex,
    item_label_re: Regex,
    strict: bool,
}

impl CaseParser {
    pub fn new(strict: bool) -> Self {
        Self {
            sections_re: Regex::new(r"(?s)一、(.*?)二、(.*)").expect("static section pattern"),
            compensation_marker_re: Regex::new(r"（\s*一\s*）")
                .expect("static compensation marker pattern"),
            // A label is a bracketed run without nested brackets; half- and
            // full-width parentheses are interchangeable.
            item_label_re: Regex::new(r"[（(]\s*([^（）()]+?)\s*[）)]")
                .expect("static item label pattern"),
            strict,
        }
    }

    /// Parse the whole corpus.
    ///
    /// Returns the well-formed records plus the number of skipped blocks.
    pub fn parse(
        &self,
        content: &str,
        normalizer: &CitationNormalizer,
    ) -> Result<(Vec<CaseRecord>, usize)> {
        let blocks: Vec<&str> = content
            .split('"')
            .map(str::trim)
            .filter(|block| !block.is_empty())
            .collect();

        let mut records = Vec::new();
        let mut skipped = 0;

        for (i, block) in blocks.iter().enumerate() {
            match self.parse_block(i + 1, block, normalizer) {
                Some(record) => records.push(record),
                None => {
                    if self.strict {
                        return Err(KgError::MalformedInput {
                            section: "case".to_string(),
                            details: format!(
                                "case block {} is missing the 一、/二、 markers: {}",
                                i + 1,
                                crate::utils::TextUtils::preview(block, 60)
                            ),
                        });
                    }
                    tracing::warn!(
                        "Skipping malformed case block {}: {}",
                        i + 1,
                        crate::utils::TextUtils::preview(block, 60)
                    );
                    skipped += 1;
                }
            }
        }

        Ok((records, skipped))
    }

    /// Parse one case block. Returns None when the block lacks the required
    /// section markers.
    fn parse_block(
        &self,
        index: usize,
        block: &str,
        normalizer: &CitationNormalizer,
    ) -> Option<CaseRecord> {
        let cap = self.sections_re.captures(block)?;
        let fact_text = cap[1].trim().to_string();
        let remainder = cap[2].trim().to_string();

        let (legal_text, compensation_text) =
            match self.compensation_marker_re.find(&remainder) {
                Some(marker) => {
                    let legal = remainder[..marker.start()].trim().to_string();
                    let compensation = remainder[marker.start()..].trim().to_string();
                    (legal, Some(compensation))
                }
                None => (remainder, None),
            };

        let references = match legal_text.is_empty() {
            true => Vec::new(),
            false => normalizer.extract_references(&legal_text),
        };

        let items = compensation_text
            .as_deref()
            .map(|text| self.split_items(text))
            .unwrap_or_default();

        Some(CaseRecord {
            index,
            raw: block.to_string(),
            fact_text,
            legal_text: (!legal_text.is_empty()).then_some(legal_text),
            references,
            compensation_text,
            items,
        })
    }

    /// Split a compensation segment into itemized entries.
    ///
    /// Each item spans from its bracketed label through the character before
    /// the next label (or end of segment). This fixes the segmentation of
    /// mixed half/full-width bracket labels deterministically.
    fn split_items(&self, text: &str) -> Vec<CompensationItem> {
        let labels: Vec<(usize, usize, String)> = self
            .item_label_re
            .captures_iter(text)
            .map(|cap| {
                let whole = cap.get(0).expect("match");
                (whole.start(), whole.end(), cap[1].to_string())
            })
            .collect();

        let mut items = Vec::with_capacity(labels.len());
        for (i, (_, body_start, label)) in labels.iter().enumerate() {
            let body_end = labels
                .get(i + 1)
                .map(|(next_start, _, _)| *next_start)
                .unwrap_or(text.len());
            items.push(CompensationItem {
                label: label.clone(),
                text: text[*body_start..body_end].trim().to_string(),
            });
        }
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_case() -> String {
        [
            "一、被告於民國105年4月12日駕駛車輛，疏未注意車前狀況，自後追撞原告駕駛車輛左後車尾。",
            "二、按民法第184條第1項前段及第191條之2定有明文，被告應負損害賠償責任。",
            "（一）醫療費用190元。",
            "（二）車輛修復費用181,144元。",
            "(三)慰撫金99,000元。",
        ]
        .join("\n")
    }

    #[test]
    fn splits_fact_legal_and_compensation() {
        let parser = CaseParser::new(false);
        let normalizer = CitationNormalizer::default();
        let content = format!("\"{}\"", sample_case());
        let (records, skipped) = parser.parse(&content, &normalizer).unwrap();
        assert_eq!(skipped, 0);
        assert_eq!(records.len(), 1);

        let case = &records[0];
        assert_eq!(case.case_id(), "Case1");
        assert!(case.fact_text.starts_with("被告於民國105年"));
        assert!(case.legal_text.as_deref().unwrap().contains("民法第184條"));
        assert_eq!(
            case.references,
            vec!["民法第184條".to_string(), "民法第191-2條".to_string()]
        );
        assert!(case.compensation_text.as_deref().unwrap().starts_with("（一）"));
    }

    #[test]
    fn item_order_matches_source_label_order() {
        let parser = CaseParser::new(false);
        let normalizer = CitationNormalizer::default();
        let content = format!("\"{}\"", sample_case());
        let (records, _) = parser.parse(&content, &normalizer).unwrap();

        let labels: Vec<&str> = records[0].items.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, vec!["一", "二", "三"]);
        assert!(records[0].items[0].text.contains("醫療費用190元"));
        assert!(records[0].items[2].text.contains("慰撫金99,000元"));
    }

    #[test]
    fn mixed_brackets_split_deterministically() {
        let parser = CaseParser::new(false);
        let items = parser.split_items("（一）甲項目 (二)乙項目（三）丙項目");
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].label, "一");
        assert_eq!(items[0].text, "甲項目");
        assert_eq!(items[1].label, "二");
        assert_eq!(items[1].text, "乙項目");
        assert_eq!(items[2].text, "丙項目");
    }

    #[test]
    fn missing_first_marker_skips_whole_case() {
        let parser = CaseParser::new(false);
        let normalizer = CitationNormalizer::default();
        let content = "\"二、只有第二段沒有第一段。\"";
        let (records, skipped) = parser.parse(content, &normalizer).unwrap();
        assert!(records.is_empty());
        assert_eq!(skipped, 1);
    }

    #[test]
    fn skipped_block_still_consumes_its_index() {
        let parser = CaseParser::new(false);
        let normalizer = CitationNormalizer::default();
        let content = format!("\"沒有標記的區塊\"\n\"{}\"", sample_case());
        let (records, skipped) = parser.parse(&content, &normalizer).unwrap();
        assert_eq!(skipped, 1);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].case_id(), "Case2");
    }

    #[test]
    fn no_compensation_marker_means_all_legal_text() {
        let parser = CaseParser::new(false);
        let normalizer = CitationNormalizer::default();
        let content = "\"一、事實。二、依民法第184條請求。\"";
        let (records, _) = parser.parse(content, &normalizer).unwrap();
        let case = &records[0];
        assert!(case.compensation_text.is_none());
        assert!(case.items.is_empty());
        assert_eq!(case.references, vec!["民法第184條".to_string()]);
    }

    #[test]
    fn strict_mode_surfaces_malformed_case() {
        let parser = CaseParser::new(true);
        let normalizer = CitationNormalizer::default();
        let err = parser.parse("\"完全不符合格式\"", &normalizer).unwrap_err();
        assert!(matches!(err, KgError::MalformedInput { .. }));
    }
}
