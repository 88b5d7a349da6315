use serde::Serialize;

use crate::PipelineReport;

/// Serializable rendering of a pipeline run, for callers that present
/// or archive results outside the core.
#[derive(Serialize)]
pub struct JsonReport {
    pub verdict: VerdictSection,
    pub detectors: Vec<DetectorSection>,
    pub error_level: ErrorLevelSection,
    pub element_match: Option<MatchSection>,
}

#[derive(Serialize)]
pub struct VerdictSection {
    pub total: u32,
    pub threshold: u32,
    pub passed: bool,
    pub summary: String,
}

#[derive(Serialize)]
pub struct DetectorSection {
    pub name: String,
    pub score: u32,
    pub findings: Vec<String>,
}

#[derive(Serialize)]
pub struct ErrorLevelSection {
    pub max_difference: u8,
    pub mean_intensity: f64,
}

#[derive(Serialize)]
pub struct MatchSection {
    pub confidence: f64,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub inputs_swapped: bool,
}

impl From<&PipelineReport> for JsonReport {
    fn from(report: &PipelineReport) -> Self {
        let detectors = report
            .scores
            .iter()
            .map(|(name, score)| DetectorSection {
                name: name.to_string(),
                score: score.score,
                findings: score.findings.clone(),
            })
            .collect();

        Self {
            verdict: VerdictSection {
                total: report.verdict.total,
                threshold: report.verdict.threshold,
                passed: report.verdict.passed,
                summary: report.verdict.to_string(),
            },
            detectors,
            error_level: ErrorLevelSection {
                max_difference: report.ela.max_difference,
                mean_intensity: report.ela.mean_intensity,
            },
            element_match: report.template.best_match.map(|m| MatchSection {
                confidence: m.score,
                x: m.x,
                y: m.y,
                width: m.width,
                height: m.height,
                inputs_swapped: report.template.swapped,
            }),
        }
    }
}

impl JsonReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DocumentAnalyzer, DocumentImage};
    use image::{Rgb, RgbImage, imageops};

    #[test]
    fn test_json_report_round_trip() {
        let document = DocumentImage::new(RgbImage::from_pixel(40, 30, Rgb([128, 128, 128])));
        let template =
            DocumentImage::new(imageops::crop_imm(&document.pixels, 5, 5, 10, 10).to_image());

        let report = DocumentAnalyzer::new(document, template).run().unwrap();
        let json = JsonReport::from(&report).to_json().unwrap();

        assert!(json.contains("\"metadata\""));
        assert!(json.contains("\"pixel_level\""));
        assert!(json.contains("\"element_verification\""));
        assert!(json.contains("\"total\""));
    }
}
