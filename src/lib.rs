use std::{collections::HashMap, path::Path};

use image::RgbImage;

use crate::{
    analysis::{
        ela::{ElaAnalyzer, ElaOutcome},
        template::{TemplateOutcome, TemplateVerifier},
    },
    error::Result,
    metadata::inspect::{DEFAULT_WATCHLIST, MetadataInspector},
    scoring::{
        ELEMENT_VERIFICATION_DETECTOR, METADATA_DETECTOR, PIXEL_LEVEL_DETECTOR, ScoreReport,
        SuspicionScore, Verdict,
    },
};

pub mod analysis;
pub mod error;
pub mod image_utils;
pub mod metadata;
pub mod report;
pub mod scoring;

#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// JPEG quality used for the error-level re-encode.
    pub ela_quality: u8,
    /// Mean brightened-residual intensity above which ELA flags the image.
    pub ela_mean_threshold: f64,
    /// Points contributed by a positive ELA result. ELA is weighted as a
    /// strong signal.
    pub ela_weight: u32,
    /// Minimum accepted normalized cross-correlation coefficient.
    pub match_threshold: f64,
    /// Fraction of the document dimensions an oversize template is
    /// rescaled to.
    pub template_fit_ratio: f64,
    /// Total suspicion score at which the document fails.
    pub score_threshold: u32,
    pub parallel: bool,
    /// Editing-tool names searched for in metadata values.
    pub watchlist: Vec<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            ela_quality: 95,
            ela_mean_threshold: 20.0,
            ela_weight: 2,
            match_threshold: 0.7,
            template_fit_ratio: 0.9,
            score_threshold: 2,
            parallel: true,
            watchlist: DEFAULT_WATCHLIST.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// A textual or binary metadata value attached to a decoded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataValue {
    Text(String),
    Binary(Vec<u8>),
}

/// A decoded 8-bit RGB bitmap plus whatever metadata came with it.
/// Immutable once loaded; detectors only ever read it.
#[derive(Debug, Clone)]
pub struct DocumentImage {
    pub pixels: RgbImage,
    pub metadata: HashMap<String, MetadataValue>,
}

impl DocumentImage {
    pub fn new(pixels: RgbImage) -> Self {
        Self {
            pixels,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, MetadataValue>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Decodes an image file and best-effort extracts its EXIF tags.
    /// An image without a readable EXIF container loads with an empty
    /// metadata map.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let pixels = image::open(&path)?.to_rgb8();
        let metadata = metadata::inspect::read_exif_tags(&path).unwrap_or_default();

        Ok(Self { pixels, metadata })
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }
}

/// Everything the pipeline produced: per-detector outputs, the ordered
/// score report, and the final verdict.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub ela: ElaOutcome,
    pub template: TemplateOutcome,
    pub scores: ScoreReport,
    pub verdict: Verdict,
}

/// Runs the three forgery detectors over one document/template pair and
/// aggregates their suspicion scores into a verdict.
pub struct DocumentAnalyzer {
    document: DocumentImage,
    template: DocumentImage,
    config: AnalysisConfig,
}

impl DocumentAnalyzer {
    pub fn new(document: DocumentImage, template: DocumentImage) -> Self {
        Self {
            document,
            template,
            config: AnalysisConfig::default(),
        }
    }

    pub fn from_paths<P: AsRef<Path>>(document: P, template: P) -> Result<Self> {
        Ok(Self::new(
            DocumentImage::open(document)?,
            DocumentImage::open(template)?,
        ))
    }

    pub fn with_config(mut self, config: AnalysisConfig) -> Self {
        self.config = config;
        self
    }

    pub fn inspect_metadata(&self) -> SuspicionScore {
        MetadataInspector::with_watchlist(self.config.watchlist.clone()).inspect(&self.document)
    }

    pub fn analyze_error_levels(&self) -> ElaOutcome {
        ElaAnalyzer::new(self.config.ela_quality)
            .with_mean_threshold(self.config.ela_mean_threshold)
            .with_weight(self.config.ela_weight)
            .analyze(&self.document)
    }

    pub fn verify_template(&self) -> TemplateOutcome {
        TemplateVerifier::new(self.config.match_threshold)
            .with_fit_ratio(self.config.template_fit_ratio)
            .with_parallel(self.config.parallel)
            .verify(&self.document, &self.template)
    }

    /// Runs all three detectors (in parallel when configured; they share
    /// no mutable state) and aggregates once every result is in.
    pub fn run(&self) -> Result<PipelineReport> {
        let (metadata, (ela, template)) = if self.config.parallel {
            rayon::join(
                || self.inspect_metadata(),
                || rayon::join(|| self.analyze_error_levels(), || self.verify_template()),
            )
        } else {
            (
                self.inspect_metadata(),
                (self.analyze_error_levels(), self.verify_template()),
            )
        };

        let mut scores = ScoreReport::new();
        scores.insert(METADATA_DETECTOR, metadata);
        scores.insert(PIXEL_LEVEL_DETECTOR, ela.score.clone());
        scores.insert(ELEMENT_VERIFICATION_DETECTOR, template.score.clone());

        let verdict = scoring::aggregate(&scores, self.config.score_threshold)?;
        log::debug!("analysis complete: {verdict}");

        Ok(PipelineReport {
            ela,
            template,
            scores,
            verdict,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, imageops};

    /// Flat background with one hard-edged dark disc. Smooth enough that
    /// a quality-95 round trip leaves only sparse residuals, textured
    /// enough around the disc for correlation to lock on.
    fn fixture_document() -> DocumentImage {
        DocumentImage::new(RgbImage::from_fn(160, 120, |x, y| {
            let dx = x as f64 - 60.0;
            let dy = y as f64 - 50.0;
            if dx * dx + dy * dy < 400.0 {
                Rgb([80, 80, 80])
            } else {
                Rgb([200, 200, 200])
            }
        }))
    }

    fn fixture_template(document: &DocumentImage) -> DocumentImage {
        DocumentImage::new(imageops::crop_imm(&document.pixels, 40, 30, 40, 40).to_image())
    }

    #[test]
    fn test_clean_document_passes() {
        let document = fixture_document();
        let template = fixture_template(&document);

        let report = DocumentAnalyzer::new(document, template).run().unwrap();

        assert_eq!(report.verdict.total, 0);
        assert!(report.verdict.passed);
        assert_eq!(report.scores.len(), 3);
        assert_eq!(report.template.score.score, 0);
    }

    #[test]
    fn test_suspicious_metadata_fails_document() {
        let document = fixture_document().with_metadata(HashMap::from([(
            "Software".to_string(),
            MetadataValue::Text("Adobe Photoshop 2024".to_string()),
        )]));
        let template = fixture_template(&document);

        let report = DocumentAnalyzer::new(document, template).run().unwrap();

        assert_eq!(
            report.scores.get(scoring::METADATA_DETECTOR).unwrap().score,
            2
        );
        assert_eq!(report.verdict.total, 2);
        assert!(!report.verdict.passed);
    }

    #[test]
    fn test_report_preserves_execution_order() {
        let document = fixture_document();
        let template = fixture_template(&document);

        let report = DocumentAnalyzer::new(document, template).run().unwrap();
        let names = report.scores.iter().map(|(n, _)| n).collect::<Vec<_>>();

        assert_eq!(names, scoring::DETECTOR_NAMES);
    }

    #[test]
    fn test_pipeline_is_idempotent() {
        let document = fixture_document();
        let template = fixture_template(&document);
        let analyzer = DocumentAnalyzer::new(document, template);

        let first = analyzer.run().unwrap();
        let second = analyzer.run().unwrap();

        assert_eq!(first.scores, second.scores);
        assert_eq!(first.verdict, second.verdict);
    }

    #[test]
    fn test_sequential_run_matches_parallel() {
        let document = fixture_document();
        let template = fixture_template(&document);

        let parallel = DocumentAnalyzer::new(document.clone(), template.clone())
            .run()
            .unwrap();
        let sequential = DocumentAnalyzer::new(document, template)
            .with_config(AnalysisConfig {
                parallel: false,
                ..AnalysisConfig::default()
            })
            .run()
            .unwrap();

        assert_eq!(parallel.scores, sequential.scores);
        assert_eq!(parallel.verdict, sequential.verdict);
    }

    #[test]
    fn test_open_missing_file_is_an_error() {
        assert!(DocumentImage::open("/nonexistent/document.png").is_err());
    }

    #[test]
    fn test_open_decodes_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.png");
        RgbImage::from_pixel(12, 8, Rgb([1, 2, 3]))
            .save(&path)
            .unwrap();

        let document = DocumentImage::open(&path).unwrap();

        assert_eq!(document.pixels.dimensions(), (12, 8));
        // PNG without an EXIF container loads with empty metadata.
        assert!(document.metadata.is_empty());
    }
}
