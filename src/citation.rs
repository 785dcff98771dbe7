//! # Citation Normalization Module
//!
//! ## Purpose
//! Pure text transforms turning raw statute citation fragments into canonical
//! statute identifiers. This is the single source of truth for identifier
//! equality: the same normalization runs at ingestion time and at query
//! resolution time, so ids always match.
//!
//! ## Input/Output Specification
//! - **Input**: Free text containing citation fragments such as `第191條之2`
//!   or `第191-2條`
//! - **Output**: Canonical article suffixes (`191-2條`) and jurisdiction
//!   prefixed statute ids (`民法第191-2條`)
//!
//! ## Key Features
//! - Total normalization: unmatched input passes through unchanged
//! - Idempotent: normalizing twice equals normalizing once
//! - NFKC folding so full-width digits in source text still match

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Compiled citation patterns shared by the extractor and the retrieval
/// engine.
pub struct CitationNormalizer {
    /// Rewrites the `條之M` suffix form into the canonical `-M條` form
    suffix_re: Regex,
    /// Finds article references in either form inside free text
    reference_re: Regex,
    /// Jurisdiction label prepended to normalized article numbers
    jurisdiction_prefix: String,
}

impl CitationNormalizer {
    /// Create a normalizer for the given jurisdiction prefix (e.g. `民法第`)
    pub fn new(jurisdiction_prefix: &str) -> Self {
        Self {
            suffix_re: Regex::new(r"條之(\d+)").expect("static suffix pattern"),
            reference_re: Regex::new(r"第(\d+-?\d*條之?\d*)").expect("static reference pattern"),
            jurisdiction_prefix: jurisdiction_prefix.to_string(),
        }
    }

    /// Normalize a citation fragment: `第191條之2` becomes `第191-2條`.
    ///
    /// Total and idempotent; text without the `條之` suffix form is returned
    /// unchanged (after NFKC folding of compatibility characters).
    pub fn normalize(&self, citation: &str) -> String {
        let folded: String = citation.nfkc().collect();
        self.suffix_re.replace_all(&folded, "-$1條").into_owned()
    }

    /// Extract every cited statute from free text as canonical ids.
    ///
    /// Returns ids in textual order, deduplicated by first occurrence.
    /// References naming articles outside the curated statute set are still
    /// returned here; the graph layer drops the dangling ones.
    pub fn extract_references(&self, text: &str) -> Vec<String> {
        let folded: String = text.nfkc().collect();
        let mut seen = std::collections::HashSet::new();
        let mut ids = Vec::new();
        for cap in self.reference_re.captures_iter(&folded) {
            let raw = &cap[1];
            let normalized = self.suffix_re.replace_all(raw, "-$1條");
            let id = format!("{}{}", self.jurisdiction_prefix, normalized);
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }
        ids
    }

    /// Build a canonical statute id from an article number already in
    /// canonical form (e.g. `184` or `191-2`).
    pub fn statute_id(&self, article_number: &str) -> String {
        format!("{}{}條", self.jurisdiction_prefix, article_number.trim())
    }
}

impl Default for CitationNormalizer {
    fn default() -> Self {
        Self::new("民法第")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_tiao_zhi_suffix() {
        let n = CitationNormalizer::default();
        assert_eq!(n.normalize("第191條之2"), "第191-2條");
        assert_eq!(n.normalize("191條之2"), "191-2條");
    }

    #[test]
    fn canonical_form_passes_through() {
        let n = CitationNormalizer::default();
        assert_eq!(n.normalize("第191-2條"), "第191-2條");
        assert_eq!(n.normalize("第184條"), "第184條");
        assert_eq!(n.normalize("not a citation"), "not a citation");
    }

    #[test]
    fn normalization_is_idempotent() {
        let n = CitationNormalizer::default();
        for s in ["第191條之2", "第191-2條", "第184條", "隨便的文字"] {
            let once = n.normalize(s);
            assert_eq!(n.normalize(&once), once);
        }
    }

    #[test]
    fn both_forms_yield_same_statute_id() {
        let n = CitationNormalizer::default();
        let a = n.extract_references("依民法第191條之2規定");
        let b = n.extract_references("依民法第191-2條規定");
        assert_eq!(a, vec!["民法第191-2條".to_string()]);
        assert_eq!(a, b);
    }

    #[test]
    fn extracts_all_references_in_order_deduplicated() {
        let n = CitationNormalizer::default();
        let text = "按民法第184條第1項前段、第191條之2及第193條第1項定有明文，又第184條...";
        let ids = n.extract_references(text);
        assert_eq!(
            ids,
            vec![
                "民法第184條".to_string(),
                "民法第191-2條".to_string(),
                "民法第193條".to_string(),
            ]
        );
    }

    #[test]
    fn folds_full_width_digits() {
        let n = CitationNormalizer::default();
        let ids = n.extract_references("民法第１８４條");
        assert_eq!(ids, vec!["民法第184條".to_string()]);
    }

    #[test]
    fn statute_id_from_article_number() {
        let n = CitationNormalizer::default();
        assert_eq!(n.statute_id("184"), "民法第184條");
        assert_eq!(n.statute_id("191-2"), "民法第191-2條");
    }
}
