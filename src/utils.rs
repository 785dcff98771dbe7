//! # Utilities Module
//!
//! ## Purpose
//! Small shared helpers: operation timing for the ingestion and index-build
//! paths, and text helpers safe for the CJK corpus.

use std::time::Instant;

/// Performance timer for measuring operation duration
pub struct Timer {
    start: Instant,
    name: String,
}

/// Text processing utilities
pub struct TextUtils;

impl Timer {
    /// Start a new timer with a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Get elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Stop timer and log duration
    pub fn stop(self) -> u64 {
        let elapsed = self.elapsed_ms();
        tracing::debug!("Timer '{}' completed in {}ms", self.name, elapsed);
        elapsed
    }
}

impl TextUtils {
    /// Truncate to at most `max_chars` characters with an ellipsis.
    ///
    /// Counts characters, not bytes; slicing CJK text on a byte boundary
    /// would panic.
    pub fn preview(text: &str, max_chars: usize) -> String {
        let flattened: String = text
            .chars()
            .map(|c| if c == '\n' { ' ' } else { c })
            .collect();
        if flattened.chars().count() <= max_chars {
            flattened
        } else {
            let head: String = flattened.chars().take(max_chars).collect();
            format!("{}...", head)
        }
    }
}
