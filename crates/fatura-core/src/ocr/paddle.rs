//! PaddleOCR backend using `pure-onnx-ocr` (pure Rust, no external ONNX Runtime).

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use image::{DynamicImage, GenericImageView};
use pure_onnx_ocr::engine::{OcrEngine, OcrEngineBuilder};
use tracing::{debug, info};

use super::{OcrBackend, Recognized};
use crate::error::OcrError;
use crate::script::{Direction, Script};

/// Rows closer than this many pixels are read as one line.
const ROW_HEIGHT: f64 = 20.0;

/// Loads one detection model plus a recognition model and dictionary per script:
/// `det.onnx`, `<script>_rec.onnx`, `<script>_dict.txt`.
pub struct PaddleBackend {
    model_dir: PathBuf,
    keep_unk: bool,
    engines: Mutex<HashMap<Script, OcrEngine>>,
}

struct Region {
    x: f64,
    y: f64,
    text: String,
}

impl PaddleBackend {
    pub fn from_dir(model_dir: &Path, keep_unk: bool) -> Self {
        Self {
            model_dir: model_dir.to_path_buf(),
            keep_unk,
            engines: Mutex::new(HashMap::new()),
        }
    }

    fn load_engine(&self, script: Script) -> Result<OcrEngine, OcrError> {
        let det_path = self.model_dir.join("det.onnx");
        let rec_path = self.model_dir.join(format!("{}_rec.onnx", script.as_str()));
        let dict_path = self.model_dir.join(format!("{}_dict.txt", script.as_str()));

        for path in [&det_path, &rec_path, &dict_path] {
            if !path.exists() {
                return Err(OcrError::Unavailable(format!("model file {} not found", path.display())));
            }
        }

        let engine = OcrEngineBuilder::new()
            .det_model_path(&det_path)
            .rec_model_path(&rec_path)
            .dictionary_path(&dict_path)
            .build()
            .map_err(|e| OcrError::ModelLoad(format!("pure-onnx-ocr: {}", e)))?;

        info!("Loaded {} recognizer from {}", script, self.model_dir.display());
        Ok(engine)
    }
}

impl OcrBackend for PaddleBackend {
    fn name(&self) -> &'static str {
        "paddle"
    }

    fn recognize(&self, image: &DynamicImage, script: Script) -> Result<Recognized, OcrError> {
        let start = Instant::now();
        let (width, height) = image.dimensions();
        debug!("Processing image: {}x{}", width, height);

        let mut engines = self
            .engines
            .lock()
            .map_err(|_| OcrError::ModelLoad("engine cache poisoned".to_string()))?;
        let engine = match engines.entry(script) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(self.load_engine(script)?),
        };
        let results = engine
            .run_from_image(image)
            .map_err(|e| OcrError::Recognition(format!("pure-onnx-ocr: {}", e)))?;
        drop(engines);

        let mut regions: Vec<Region> = results
            .iter()
            .map(|r| {
                let (x, y) = r
                    .bounding_box
                    .exterior()
                    .coords()
                    .fold((f64::MAX, f64::MAX), |(x, y), c| (x.min(c.x), y.min(c.y)));
                let text = if self.keep_unk {
                    r.text.clone()
                } else {
                    r.text.replace("[UNK]", " ")
                };
                Region { x, y, text }
            })
            .collect();

        sort_reading_order(&mut regions, script.direction());

        let text = regions
            .iter()
            .map(|r| r.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        info!(
            "OCR complete: {} regions in {}ms",
            regions.len(),
            start.elapsed().as_millis()
        );

        Ok(Recognized {
            text,
            notes: Vec::new(),
        })
    }
}

/// Top to bottom by row; within a row, left to right or right to left.
fn sort_reading_order(regions: &mut [Region], direction: Direction) {
    regions.sort_by(|a, b| {
        let row_a = (a.y / ROW_HEIGHT) as i64;
        let row_b = (b.y / ROW_HEIGHT) as i64;
        if row_a != row_b {
            return row_a.cmp(&row_b);
        }
        let ord = a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal);
        match direction {
            Direction::Ltr => ord,
            Direction::Rtl => ord.reverse(),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn region(x: f64, y: f64, text: &str) -> Region {
        Region {
            x,
            y,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_rtl_rows_read_right_to_left() {
        let mut regions = vec![region(10.0, 5.0, "left"), region(200.0, 8.0, "right"), region(50.0, 60.0, "next")];
        sort_reading_order(&mut regions, Direction::Rtl);

        let order: Vec<_> = regions.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(order, vec!["right", "left", "next"]);
    }

    #[test]
    fn test_ltr_rows_read_left_to_right() {
        let mut regions = vec![region(200.0, 5.0, "right"), region(10.0, 5.0, "left")];
        sort_reading_order(&mut regions, Direction::Ltr);
        assert_eq!(regions[0].text, "left");
    }

    #[test]
    fn test_missing_models_are_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let backend = PaddleBackend::from_dir(dir.path(), false);

        let result = backend.recognize(&DynamicImage::new_luma8(8, 8), Script::Arabic);
        assert!(matches!(result, Err(OcrError::Unavailable(_))));
    }
}
