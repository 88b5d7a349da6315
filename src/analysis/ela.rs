use std::io::Cursor;

use image::{Rgb, RgbImage};

use crate::{
    DocumentImage,
    error::Result,
    image_utils::mean_intensity,
    scoring::SuspicionScore,
};

/// Error-level analysis: re-encode at a fixed lossy quality and expose
/// regions whose compression history disagrees with the rest of the image.
pub struct ElaAnalyzer {
    quality: u8,
    mean_threshold: f64,
    weight: u32,
}

#[derive(Debug, Clone)]
pub struct ElaOutcome {
    /// Brightness-normalized difference image, kept for display/audit.
    pub visualization: RgbImage,
    pub max_difference: u8,
    pub mean_intensity: f64,
    pub score: SuspicionScore,
}

impl ElaAnalyzer {
    pub fn new(quality: u8) -> Self {
        Self {
            quality,
            mean_threshold: 20.0,
            weight: 2,
        }
    }

    pub fn with_mean_threshold(mut self, threshold: f64) -> Self {
        self.mean_threshold = threshold;
        self
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// Total over decoded inputs: an internal failure degrades to a
    /// zero score with a warning finding instead of aborting the pipeline.
    pub fn analyze(&self, document: &DocumentImage) -> ElaOutcome {
        match self.try_analyze(&document.pixels) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!("error-level analysis failed: {e}");
                ElaOutcome {
                    visualization: RgbImage::new(document.width(), document.height()),
                    max_difference: 0,
                    mean_intensity: 0.0,
                    score: SuspicionScore::clean(format!("error-level analysis failed: {e}")),
                }
            }
        }
    }

    fn try_analyze(&self, original: &RgbImage) -> Result<ElaOutcome> {
        let resaved = self.recompress_jpeg(original)?;
        let difference = absolute_difference(original, &resaved);

        let max_difference = difference.as_raw().iter().copied().max().unwrap_or(0);
        // Clamped to 1 so a pristine image scales to an all-black map
        // instead of dividing by zero.
        let scale = 255.0 / max_difference.max(1) as f64;

        let visualization = brighten(&difference, scale);
        let mean = mean_intensity(&visualization);

        let score = if mean > self.mean_threshold {
            SuspicionScore::flagged(
                self.weight,
                format!(
                    "high variance in error-level result (mean {mean:.1}), suggesting possible editing"
                ),
            )
        } else {
            SuspicionScore::clean("error-level result appears consistent")
        };

        Ok(ElaOutcome {
            visualization,
            max_difference,
            mean_intensity: mean,
            score,
        })
    }

    fn recompress_jpeg(&self, image: &RgbImage) -> Result<RgbImage> {
        let mut buffer = Cursor::new(Vec::new());

        let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, self.quality);
        image.write_with_encoder(encoder)?;

        let resaved = image::load_from_memory(&buffer.into_inner())?;

        Ok(resaved.to_rgb8())
    }
}

fn absolute_difference(a: &RgbImage, b: &RgbImage) -> RgbImage {
    let (width, height) = a.dimensions();
    let mut difference = RgbImage::new(width, height);

    for (x, y, pixel) in difference.enumerate_pixels_mut() {
        let pa = a.get_pixel(x, y);
        let pb = b.get_pixel(x, y);

        *pixel = Rgb([
            pa[0].abs_diff(pb[0]),
            pa[1].abs_diff(pb[1]),
            pa[2].abs_diff(pb[2]),
        ]);
    }

    difference
}

fn brighten(image: &RgbImage, scale: f64) -> RgbImage {
    let (width, height) = image.dimensions();
    let mut brightened = RgbImage::new(width, height);

    for (x, y, pixel) in image.enumerate_pixels() {
        brightened.put_pixel(
            x,
            y,
            Rgb([
                (pixel[0] as f64 * scale).min(255.0) as u8,
                (pixel[1] as f64 * scale).min(255.0) as u8,
                (pixel[2] as f64 * scale).min(255.0) as u8,
            ]),
        );
    }

    brightened
}
