use std::{collections::HashMap, fs::File, io::BufReader, path::Path};

use crate::{DocumentImage, MetadataValue, error::Result, scoring::SuspicionScore};

/// Editing-tool fingerprints searched for in textual metadata values.
pub const DEFAULT_WATCHLIST: &[&str] = &["photoshop", "gimp", "adobe"];

pub struct MetadataInspector {
    watchlist: Vec<String>,
}

impl MetadataInspector {
    pub fn new() -> Self {
        Self {
            watchlist: DEFAULT_WATCHLIST.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_watchlist<I, S>(watchlist: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            watchlist: watchlist
                .into_iter()
                .map(|s| s.into().to_lowercase())
                .collect(),
        }
    }

    /// Scans textual metadata values for watch-listed editing tools.
    /// Each case-insensitive hit adds one suspicion point. Total over
    /// all inputs; absence of metadata is a normal zero-score outcome.
    pub fn inspect(&self, document: &DocumentImage) -> SuspicionScore {
        if document.metadata.is_empty() {
            return SuspicionScore::clean("no metadata");
        }

        let mut result = SuspicionScore::new();

        for (key, value) in &document.metadata {
            let MetadataValue::Text(text) = value else {
                continue;
            };
            let lowered = text.to_lowercase();

            for tool in &self.watchlist {
                if lowered.contains(tool.as_str()) {
                    result.raise(1, format!("suspicious software tag in '{key}': {text}"));
                }
            }
        }

        if result.score == 0 {
            result.note("no suspicious software tags found in metadata");
        }

        result
    }
}

impl Default for MetadataInspector {
    fn default() -> Self {
        Self::new()
    }
}

/// Flattens every EXIF field of an image file into a string map.
///
/// A file without a readable EXIF container yields an empty map; the
/// inspector treats that as "no metadata", not as a failure.
pub fn read_exif_tags<P: AsRef<Path>>(path: P) -> Result<HashMap<String, MetadataValue>> {
    let file = File::open(&path)?;
    let mut reader = BufReader::new(file);

    let exif_reader = exif::Reader::new();

    let mut tags = HashMap::new();
    if let Ok(exif_data) = exif_reader.read_from_container(&mut reader) {
        for field in exif_data.fields() {
            let tag_name = format!("{}", field.tag);
            let value = field.display_value().to_string();
            tags.insert(tag_name, MetadataValue::Text(value));
        }
    }

    Ok(tags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn document_with(entries: &[(&str, MetadataValue)]) -> DocumentImage {
        let metadata = entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        DocumentImage::new(RgbImage::new(8, 8)).with_metadata(metadata)
    }

    #[test]
    fn test_empty_metadata_scores_zero() {
        let document = DocumentImage::new(RgbImage::new(8, 8));
        let result = MetadataInspector::new().inspect(&document);

        assert_eq!(result.score, 0);
        assert_eq!(result.findings, vec!["no metadata".to_string()]);
    }

    #[test]
    fn test_clean_metadata_scores_zero() {
        let document = document_with(&[
            ("Software", MetadataValue::Text("darktable 4.6".into())),
            ("Make", MetadataValue::Text("Canon".into())),
        ]);
        let result = MetadataInspector::new().inspect(&document);

        assert_eq!(result.score, 0);
    }

    #[test]
    fn test_each_match_adds_a_point() {
        // "Adobe Photoshop" hits both "adobe" and "photoshop".
        let document = document_with(&[(
            "Software",
            MetadataValue::Text("Adobe Photoshop 2024".into()),
        )]);
        let result = MetadataInspector::new().inspect(&document);

        assert_eq!(result.score, 2);
        assert_eq!(result.findings.len(), 2);
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let document = document_with(&[("Creator", MetadataValue::Text("GIMP 2.10".into()))]);
        let result = MetadataInspector::new().inspect(&document);

        assert_eq!(result.score, 1);
        assert!(result.findings[0].contains("GIMP 2.10"));
    }

    #[test]
    fn test_binary_values_are_ignored() {
        let document = document_with(&[(
            "ICCProfile",
            MetadataValue::Binary(b"photoshop".to_vec()),
        )]);
        let result = MetadataInspector::new().inspect(&document);

        assert_eq!(result.score, 0);
    }

    #[test]
    fn test_custom_watchlist() {
        let inspector = MetadataInspector::with_watchlist(["Inkscape"]);
        let document = document_with(&[("Software", MetadataValue::Text("inkscape 1.3".into()))]);

        assert_eq!(inspector.inspect(&document).score, 1);
    }
}
