use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ForensicsError, Result};

pub const METADATA_DETECTOR: &str = "metadata";
pub const PIXEL_LEVEL_DETECTOR: &str = "pixel_level";
pub const ELEMENT_VERIFICATION_DETECTOR: &str = "element_verification";

/// The three detector names every complete report must carry, in
/// pipeline execution order.
pub const DETECTOR_NAMES: [&str; 3] = [
    METADATA_DETECTOR,
    PIXEL_LEVEL_DETECTOR,
    ELEMENT_VERIFICATION_DETECTOR,
];

/// One detector's contribution: a non-negative integer plus the
/// human-readable findings that justify it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspicionScore {
    pub score: u32,
    pub findings: Vec<String>,
}

impl SuspicionScore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A zero score carrying a single explanatory finding.
    pub fn clean<S: Into<String>>(finding: S) -> Self {
        Self {
            score: 0,
            findings: vec![finding.into()],
        }
    }

    /// A nonzero score carrying a single finding.
    pub fn flagged<S: Into<String>>(score: u32, finding: S) -> Self {
        Self {
            score,
            findings: vec![finding.into()],
        }
    }

    pub fn raise<S: Into<String>>(&mut self, points: u32, finding: S) {
        self.score += points;
        self.findings.push(finding.into());
    }

    pub fn note<S: Into<String>>(&mut self, finding: S) {
        self.findings.push(finding.into());
    }
}

/// Per-detector scores keyed by detector name. Insertion order is
/// preserved and mirrors pipeline execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScoreReport {
    entries: Vec<(String, SuspicionScore)>,
}

impl ScoreReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<S: Into<String>>(&mut self, detector: S, score: SuspicionScore) {
        self.entries.push((detector.into(), score));
    }

    pub fn get(&self, detector: &str) -> Option<&SuspicionScore> {
        self.entries
            .iter()
            .find(|(name, _)| name == detector)
            .map(|(_, score)| score)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SuspicionScore)> {
        self.entries
            .iter()
            .map(|(name, score)| (name.as_str(), score))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub total: u32,
    pub threshold: u32,
    pub passed: bool,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.passed {
            write!(
                f,
                "DOCUMENT PASSED: score ({}) is within acceptable limits (threshold {})",
                self.total, self.threshold
            )
        } else {
            write!(
                f,
                "DOCUMENT FAILED: score ({}) meets or exceeds threshold ({}). \
                 High probability of forgery. Escalating for human review.",
                self.total, self.threshold
            )
        }
    }
}

/// Sums the three detector scores and applies the verdict threshold.
///
/// A report missing any expected detector entry is an integration bug
/// and is the only condition surfaced as a hard error.
pub fn aggregate(report: &ScoreReport, threshold: u32) -> Result<Verdict> {
    for name in DETECTOR_NAMES {
        if report.get(name).is_none() {
            return Err(ForensicsError::MissingDetectorScore(name.into()));
        }
    }

    let total = report.iter().map(|(_, s)| s.score).sum::<u32>();

    Ok(Verdict {
        total,
        threshold,
        passed: total < threshold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(metadata: u32, pixel_level: u32, element: u32) -> ScoreReport {
        let mut report = ScoreReport::new();
        report.insert(METADATA_DETECTOR, SuspicionScore::flagged(metadata, "m"));
        report.insert(PIXEL_LEVEL_DETECTOR, SuspicionScore::flagged(pixel_level, "p"));
        report.insert(
            ELEMENT_VERIFICATION_DETECTOR,
            SuspicionScore::flagged(element, "e"),
        );
        report
    }

    #[test]
    fn test_all_clean_passes() {
        let verdict = aggregate(&report(0, 0, 0), 2).unwrap();
        assert_eq!(verdict.total, 0);
        assert!(verdict.passed);
    }

    #[test]
    fn test_total_at_or_above_threshold_fails() {
        let verdict = aggregate(&report(1, 2, 0), 2).unwrap();
        assert_eq!(verdict.total, 3);
        assert!(!verdict.passed);

        let verdict = aggregate(&report(1, 0, 1), 2).unwrap();
        assert_eq!(verdict.total, 2);
        assert!(!verdict.passed);
    }

    #[test]
    fn test_total_strictly_below_threshold_passes() {
        let verdict = aggregate(&report(0, 0, 1), 2).unwrap();
        assert_eq!(verdict.total, 1);
        assert!(verdict.passed);
    }

    #[test]
    fn test_missing_detector_is_hard_error() {
        let mut partial = ScoreReport::new();
        partial.insert(METADATA_DETECTOR, SuspicionScore::new());
        partial.insert(PIXEL_LEVEL_DETECTOR, SuspicionScore::new());

        let err = aggregate(&partial, 2).unwrap_err();
        assert!(matches!(
            err,
            crate::error::ForensicsError::MissingDetectorScore(ref name)
                if name == ELEMENT_VERIFICATION_DETECTOR
        ));
    }

    #[test]
    fn test_report_preserves_insertion_order() {
        let report = report(0, 1, 0);
        let names = report.iter().map(|(name, _)| name).collect::<Vec<_>>();
        assert_eq!(names, DETECTOR_NAMES);
        assert_eq!(report.get(PIXEL_LEVEL_DETECTOR).unwrap().score, 1);
    }

    #[test]
    fn test_verdict_display() {
        let verdict = aggregate(&report(1, 2, 0), 2).unwrap();
        let rendered = verdict.to_string();
        assert!(rendered.contains("DOCUMENT FAILED"));
        assert!(rendered.contains("human review"));
    }
}
