//! Priority tier classification.
//!
//! Bands are half-open `[lower, upper)` and must partition `[0, 100]`
//! exactly. The topmost band also includes `100`.

use std::collections::BTreeSet;

use priority_map_scoring_models::{
    ClassificationBand, MAX_SCORE, MIN_SCORE, SCORE_TOLERANCE, default_bands,
};

use crate::{ConfigError, ScoringError};

/// A validated band partition of `[0, 100]`, in ascending order.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationBands {
    bands: Vec<ClassificationBand>,
}

impl Default for ClassificationBands {
    /// Low `[0, 25)`, Medium `[25, 50)`, High `[50, 75)`, Critical `[75, 100]`.
    fn default() -> Self {
        Self {
            bands: default_bands(),
        }
    }
}

impl ClassificationBands {
    /// Validates that `bands`, in the given order, partition `[0, 100]`
    /// with no gap and no overlap.
    ///
    /// Boundaries are compared exactly.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the first violated rule: empty list,
    /// empty or duplicate label, empty range, wrong start or end, gap, or
    /// overlap.
    #[allow(clippy::float_cmp)]
    pub fn new(bands: Vec<ClassificationBand>) -> Result<Self, ConfigError> {
        let (Some(first), Some(last)) = (bands.first(), bands.last()) else {
            return Err(ConfigError::EmptyBands);
        };

        let mut labels = BTreeSet::new();
        for (index, band) in bands.iter().enumerate() {
            if band.label.trim().is_empty() {
                return Err(ConfigError::EmptyLabel { index });
            }
            if !labels.insert(band.label.as_str()) {
                return Err(ConfigError::DuplicateLabel {
                    label: band.label.clone(),
                });
            }
            if !band.lower.is_finite() || !band.upper.is_finite() || band.lower >= band.upper {
                return Err(ConfigError::EmptyBand {
                    label: band.label.clone(),
                    lower: band.lower,
                    upper: band.upper,
                });
            }
        }

        if first.lower != MIN_SCORE {
            return Err(ConfigError::BandStart { lower: first.lower });
        }

        for pair in bands.windows(2) {
            let [below, above] = pair else { continue };
            if above.lower > below.upper {
                return Err(ConfigError::BandGap {
                    below: below.label.clone(),
                    above: above.label.clone(),
                    from: below.upper,
                    to: above.lower,
                });
            }
            if above.lower < below.upper {
                return Err(ConfigError::BandOverlap {
                    below: below.label.clone(),
                    above: above.label.clone(),
                    from: above.lower,
                    to: below.upper,
                });
            }
        }

        if last.upper != MAX_SCORE {
            return Err(ConfigError::BandEnd { upper: last.upper });
        }

        Ok(Self { bands })
    }

    /// Returns the bands in ascending order.
    #[must_use]
    pub fn bands(&self) -> &[ClassificationBand] {
        &self.bands
    }

    /// Returns the tier labels in ascending order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.bands.iter().map(|band| band.label.as_str())
    }

    /// Maps a priority score to its tier label.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::InternalConsistency`] if the score is not
    /// finite or lies outside `[0, 100]` (beyond [`SCORE_TOLERANCE`]).
    /// Such a score is a bug upstream and is never clamped.
    pub fn classify(&self, score: f64) -> Result<&str, ScoringError> {
        if !score.is_finite()
            || score < MIN_SCORE - SCORE_TOLERANCE
            || score > MAX_SCORE + SCORE_TOLERANCE
        {
            return Err(ScoringError::InternalConsistency {
                message: format!("priority score {score} is outside [0, 100]"),
            });
        }

        self.bands
            .iter()
            .find(|band| score < band.upper)
            .or_else(|| self.bands.last())
            .map(|band| band.label.as_str())
            .ok_or_else(|| ScoringError::InternalConsistency {
                message: "classification bands are empty".to_string(),
            })
    }
}
