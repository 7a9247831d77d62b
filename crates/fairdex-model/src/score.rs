use crate::doi::ValidationError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

pub const SCORE_MIN: f64 = 0.0;
pub const SCORE_MAX: f64 = 100.0;

/// A FAIR assessment score, constrained to the inclusive 0..=100 range and
/// guaranteed finite.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
#[non_exhaustive]
pub struct ScoreValue(f64);

impl ScoreValue {
    pub fn parse(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError("score must be a finite number".to_string()));
        }
        if !(SCORE_MIN..=SCORE_MAX).contains(&value) {
            return Err(ValidationError(format!(
                "score must be between {SCORE_MIN} and {SCORE_MAX}"
            )));
        }
        Ok(Self(value))
    }

    #[must_use]
    pub fn get(self) -> f64 {
        self.0
    }

    /// Acceptance rule for incoming results: strictly greater than the stored
    /// score. Equal scores are duplicates, lower scores are stale.
    #[must_use]
    pub fn improves_on(self, current: Option<ScoreValue>) -> bool {
        match current {
            Some(existing) => self.0 > existing.0,
            None => true,
        }
    }
}

impl Display for ScoreValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The single accepted FAIR score for a dataset, including the evaluation
/// provenance reported by the worker that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairScore {
    pub dataset_id: i64,
    pub score: ScoreValue,
    pub evaluation_date: NaiveDate,
    pub metric_version: String,
    pub software_version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_is_inclusive() {
        assert!(ScoreValue::parse(0.0).is_ok());
        assert!(ScoreValue::parse(100.0).is_ok());
        assert!(ScoreValue::parse(-0.1).is_err());
        assert!(ScoreValue::parse(100.1).is_err());
        assert!(ScoreValue::parse(f64::NAN).is_err());
        assert!(ScoreValue::parse(f64::INFINITY).is_err());
    }

    #[test]
    fn improvement_is_strict() {
        let sixty = ScoreValue::parse(60.0).unwrap();
        let eighty = ScoreValue::parse(80.0).unwrap();
        assert!(sixty.improves_on(None));
        assert!(eighty.improves_on(Some(sixty)));
        assert!(!sixty.improves_on(Some(sixty)));
        assert!(!sixty.improves_on(Some(eighty)));
    }
}
