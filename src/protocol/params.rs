// src/protocol/params.rs

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result-count limit used when the caller omits `topN`.
pub const DEFAULT_TOP_N: u32 = 10;

/// Parameters of one analysis request.
///
/// Copied into the execution context at submission time; nothing here is
/// shared with the submitting thread afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskParams {
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default = "default_top_n")]
    pub top_n: u32,
}

fn default_top_n() -> u32 {
    DEFAULT_TOP_N
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvocationError {
    #[error("start date {start} is after end date {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },

    #[error("result limit must be at least 1")]
    ZeroLimit,

    #[error("`{0}` must not be blank when provided")]
    BlankValue(&'static str),
}

impl TaskParams {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            symbol: None,
            pattern: None,
            top_n: DEFAULT_TOP_N,
        }
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_top_n(mut self, top_n: u32) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn validate(&self) -> Result<(), InvocationError> {
        if self.start > self.end {
            return Err(InvocationError::InvertedRange {
                start: self.start,
                end: self.end,
            });
        }
        if self.top_n == 0 {
            return Err(InvocationError::ZeroLimit);
        }
        if matches!(self.symbol.as_deref(), Some(s) if s.trim().is_empty()) {
            return Err(InvocationError::BlankValue("symbol"));
        }
        if matches!(self.pattern.as_deref(), Some(p) if p.trim().is_empty()) {
            return Err(InvocationError::BlankValue("pattern"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn rejects_inverted_range_and_zero_limit() {
        let params = TaskParams::new(date("2024-06-01"), date("2024-01-01"));
        assert!(matches!(
            params.validate(),
            Err(InvocationError::InvertedRange { .. })
        ));

        let params = TaskParams::new(date("2024-01-01"), date("2024-06-01")).with_top_n(0);
        assert_eq!(params.validate(), Err(InvocationError::ZeroLimit));
    }

    #[test]
    fn same_day_range_is_valid() {
        let params = TaskParams::new(date("2024-01-01"), date("2024-01-01")).with_symbol("005930");
        assert_eq!(params.validate(), Ok(()));
    }

    #[test]
    fn blank_symbol_is_rejected() {
        let params = TaskParams::new(date("2024-01-01"), date("2024-02-01")).with_symbol("  ");
        assert_eq!(params.validate(), Err(InvocationError::BlankValue("symbol")));
    }
}
