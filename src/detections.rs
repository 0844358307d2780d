//! Loader for the detector's JSON output.
//!
//! ```text
//! {
//!   "imageSize": { "w": 640, "h": 480 },
//!   "detections": [
//!     { "cls": "digit_2", "score": 0.93, "bbox": [10, 40, 30, 80] },
//!     ...
//!   ]
//! }
//! ```

use serde::Deserialize;

use crate::error::DetectionError;
use crate::geometry::{BoundingBox, DetectedSymbol, SymbolSet};
use crate::labels::LabelMap;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetectionFile {
    image_size: ImageSize,
    detections: Vec<RawDetection>,
}

#[derive(Deserialize)]
struct ImageSize {
    w: u32,
    h: u32,
}

#[derive(Deserialize)]
struct RawDetection {
    cls: String,
    #[serde(default = "default_score")]
    score: f64,
    bbox: [f64; 4],
}

fn default_score() -> f64 {
    1.0
}

/// Parses detector output, resolving class labels through `labels`.
///
/// Detections with an unknown class label are skipped and reported in the
/// returned warnings. A malformed bounding box fails the whole load.
pub fn load_detections(
    json: &str,
    labels: &LabelMap,
) -> Result<(SymbolSet, Vec<String>), DetectionError> {
    let file: DetectionFile = serde_json::from_str(json)?;
    let mut warnings = Vec::new();
    let mut symbols = Vec::with_capacity(file.detections.len());

    for (index, det) in file.detections.into_iter().enumerate() {
        let [x1, y1, x2, y2] = det.bbox;
        let bbox = BoundingBox::new(x1, y1, x2, y2)
            .map_err(|source| DetectionError::BoundingBox { index, source })?;
        match labels.to_token(&det.cls) {
            Some(token) => symbols.push(DetectedSymbol::new(det.cls, token, det.score, bbox)),
            None => {
                let warning = format!(
                    "unknown class label: '{}' (score={:.2}, bbox=[{:.0},{:.0},{:.0},{:.0}]), skipped",
                    det.cls, det.score, x1, y1, x2, y2
                );
                log::warn!("{warning}");
                warnings.push(warning);
            }
        }
    }

    Ok((
        SymbolSet::new(file.image_size.w, file.image_size.h, symbols),
        warnings,
    ))
}
