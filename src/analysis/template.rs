use image::{GrayImage, Rgb, RgbImage, imageops};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::{
    DocumentImage,
    error::{ForensicsError, Result},
    image_utils::rgb_to_gray,
    scoring::SuspicionScore,
};

/// Locates a reference element (seal, signature, logo) inside a document
/// raster via normalized cross-correlation.
///
/// Inputs may arrive swapped or mis-sized, so roles are inferred from
/// pixel area and the template is rescaled to fit before searching.
pub struct TemplateVerifier {
    match_threshold: f64,
    fit_ratio: f64,
    parallel: bool,
}

/// Best correlation found during the search.
#[derive(Debug, Clone, Copy)]
pub struct MatchResult {
    /// Normalized correlation coefficient in [-1.0, 1.0].
    pub score: f64,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct TemplateOutcome {
    /// Document image with the matched region outlined when accepted.
    pub annotated: RgbImage,
    pub best_match: Option<MatchResult>,
    /// Whether role inference swapped the two inputs.
    pub swapped: bool,
    pub score: SuspicionScore,
}

impl TemplateVerifier {
    pub fn new(match_threshold: f64) -> Self {
        Self {
            match_threshold,
            fit_ratio: 0.9,
            parallel: true,
        }
    }

    pub fn with_fit_ratio(mut self, ratio: f64) -> Self {
        self.fit_ratio = ratio;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Order-independent verification: the larger-area input is treated
    /// as the document, ties resolve to the first argument. Total over
    /// decoded inputs; degenerate geometry fails closed with score 1.
    pub fn verify(&self, first: &DocumentImage, second: &DocumentImage) -> TemplateOutcome {
        let swapped = second.area() > first.area();
        let (document, template) = if swapped { (second, first) } else { (first, second) };

        let mut score = SuspicionScore::new();
        if swapped {
            score.note("auto-correction: inputs appear to be swapped, larger image treated as document");
        } else {
            score.note("auto-detection: larger image assigned as document, smaller as template");
        }

        match self.try_verify(document, template, &mut score) {
            Ok((annotated, best_match)) => TemplateOutcome {
                annotated,
                best_match,
                swapped,
                score,
            },
            Err(e) => {
                log::warn!("element verification failed: {e}");
                score.raise(1, format!("element verification failed: {e}"));
                TemplateOutcome {
                    annotated: document.pixels.clone(),
                    best_match: None,
                    swapped,
                    score,
                }
            }
        }
    }

    fn try_verify(
        &self,
        document: &DocumentImage,
        template: &DocumentImage,
        score: &mut SuspicionScore,
    ) -> Result<(RgbImage, Option<MatchResult>)> {
        let (doc_w, doc_h) = document.pixels.dimensions();
        let (tpl_w, tpl_h) = template.pixels.dimensions();

        if doc_w == 0 || doc_h == 0 {
            return Err(ForensicsError::DegenerateGeometry {
                width: doc_w,
                height: doc_h,
            });
        }
        if tpl_w == 0 || tpl_h == 0 {
            return Err(ForensicsError::DegenerateGeometry {
                width: tpl_w,
                height: tpl_h,
            });
        }

        let document_gray = rgb_to_gray(&document.pixels);
        let mut template_gray = rgb_to_gray(&template.pixels);

        if tpl_h > doc_h || tpl_w > doc_w {
            template_gray = self.fit_template(&template_gray, doc_w, doc_h)?;
            let (w, h) = template_gray.dimensions();
            score.note(format!("template larger than document, resized to {w}x{h} pixels"));
        }

        let best = self
            .correlation_search(&document_gray, &template_gray)
            .ok_or(ForensicsError::DegenerateGeometry {
                width: template_gray.width(),
                height: template_gray.height(),
            })?;

        let mut annotated = document.pixels.clone();
        if best.score >= self.match_threshold {
            score.note(format!(
                "template matched with high confidence: {:.2}",
                best.score
            ));
            draw_match(&mut annotated, &best);
        } else {
            score.raise(
                1,
                format!(
                    "template match confidence is low ({:.2}), element may be forged or inconsistent",
                    best.score
                ),
            );
        }

        Ok((annotated, Some(best)))
    }

    /// Rescales the template to fit strictly inside the document.
    ///
    /// Width-first: width becomes `fit_ratio` of the document width,
    /// height scaled to preserve aspect. If that still overflows the
    /// height budget, re-derive from a height-first constraint.
    fn fit_template(
        &self,
        template: &GrayImage,
        doc_w: u32,
        doc_h: u32,
    ) -> Result<GrayImage> {
        let (tpl_w, tpl_h) = template.dimensions();

        let mut new_w = (doc_w as f64 * self.fit_ratio) as u32;
        let mut ratio = new_w as f64 / tpl_w as f64;
        let mut new_h = (tpl_h as f64 * ratio) as u32;

        if new_h as f64 > doc_h as f64 * self.fit_ratio {
            new_h = (doc_h as f64 * self.fit_ratio) as u32;
            ratio = new_h as f64 / tpl_h as f64;
            new_w = (tpl_w as f64 * ratio) as u32;
        }

        if new_w == 0 || new_h == 0 {
            return Err(ForensicsError::DegenerateGeometry {
                width: new_w,
                height: new_h,
            });
        }

        Ok(imageops::resize(template, new_w, new_h, imageops::FilterType::Triangle))
    }

    /// Zero-mean normalized cross-correlation at every valid offset,
    /// returning the global maximum. Flat windows correlate as 0.
    fn correlation_search(&self, document: &GrayImage, template: &GrayImage) -> Option<MatchResult> {
        let (doc_w, doc_h) = document.dimensions();
        let (tpl_w, tpl_h) = template.dimensions();

        if tpl_w == 0 || tpl_h == 0 || tpl_w > doc_w || tpl_h > doc_h {
            return None;
        }

        let pixel_count = (tpl_w * tpl_h) as f64;
        let template_mean = template
            .as_raw()
            .iter()
            .map(|&v| v as f64)
            .sum::<f64>()
            / pixel_count;
        let template_dev = template
            .as_raw()
            .iter()
            .map(|&v| v as f64 - template_mean)
            .collect::<Vec<_>>();
        let template_ssd = template_dev.iter().map(|d| d * d).sum::<f64>();

        let mut offsets = Vec::new();
        for y in 0..=doc_h - tpl_h {
            for x in 0..=doc_w - tpl_w {
                offsets.push((x, y));
            }
        }

        let score_at = |&(x, y): &(u32, u32)| -> (u32, u32, f64) {
            let mut window_sum = 0.0;
            for dy in 0..tpl_h {
                for dx in 0..tpl_w {
                    window_sum += document.get_pixel(x + dx, y + dy)[0] as f64;
                }
            }
            let window_mean = window_sum / pixel_count;

            let mut covariance = 0.0;
            let mut window_ssd = 0.0;
            let mut i = 0;
            for dy in 0..tpl_h {
                for dx in 0..tpl_w {
                    let w = document.get_pixel(x + dx, y + dy)[0] as f64 - window_mean;
                    covariance += w * template_dev[i];
                    window_ssd += w * w;
                    i += 1;
                }
            }

            let denom = (template_ssd * window_ssd).sqrt();
            let score = if denom > f64::EPSILON {
                covariance / denom
            } else {
                0.0
            };

            (x, y, score)
        };

        let best = if self.parallel {
            offsets
                .par_iter()
                .map(score_at)
                .max_by(|a, b| a.2.total_cmp(&b.2))?
        } else {
            offsets
                .iter()
                .map(score_at)
                .max_by(|a, b| a.2.total_cmp(&b.2))?
        };

        Some(MatchResult {
            score: best.2,
            x: best.0,
            y: best.1,
            width: tpl_w,
            height: tpl_h,
        })
    }
}

fn draw_match(image: &mut RgbImage, best: &MatchResult) {
    for t in 0..3i32 {
        let rect = Rect::at(best.x as i32 - t, best.y as i32 - t)
            .of_size(best.width + 2 * t as u32, best.height + 2 * t as u32);
        draw_hollow_rect_mut(image, rect, Rgb([0, 255, 0]));
    }
}
