//! Face analyzer backed by a YOLO-face ONNX model.
//!
//! One [`OnnxYoloAnalyzer`] owns one `ort` session. Frames are letterboxed to
//! the model's square input, decoded detections are mapped back to frame
//! coordinates and de-duplicated, and the survivors go to the domain's
//! [`MetricsEstimator`].
use std::path::{Path, PathBuf};

use ndarray::Array4;
use ort::execution_providers::ExecutionProviderDispatch;
use ort::session::Session;

use crate::analysis::domain::face_metrics::{FaceMetrics, FaceObservation, MetricsEstimator};
use crate::analysis::domain::frame_analyzer::{
    AnalyzerFactory, EngineError, EngineInitError, FrameAnalyzer,
};
use crate::shared::frame::Frame;

use super::math::{bbox_iou, clamp_bbox};

/// Used when the model leaves its spatial input dimension dynamic.
const FALLBACK_INPUT_SIZE: u32 = 640;

pub const DEFAULT_CONFIDENCE: f64 = 0.25;

const OVERLAP_IOU: f64 = 0.45;

/// Box (4) + score (1) + five landmarks of (x, y, visibility).
const BOX_FIELDS: usize = 5;
const LANDMARK_FIELDS: usize = 15;

const LANDMARK_VISIBILITY: f32 = 0.5;

/// YOLO pads letterboxed input with mid gray.
const PAD_VALUE: f32 = 114.0 / 255.0;

pub struct OnnxYoloAnalyzer {
    session: Option<Session>,
    estimator: MetricsEstimator,
    confidence: f64,
    input_size: u32,
}

impl OnnxYoloAnalyzer {
    pub fn new(
        model_path: &Path,
        confidence: f64,
        max_faces: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        // Many sessions run side by side on the worker pool, one thread each.
        let session = Session::builder()?
            .with_inter_threads(1)?
            .with_intra_threads(1)?
            .with_execution_providers(accelerators())?
            .commit_from_file(model_path)?;
        let input_size = declared_input_size(&session).unwrap_or(FALLBACK_INPUT_SIZE);
        log::debug!(
            "Loaded {} with {input_size}px input",
            model_path.display()
        );

        Ok(Self {
            session: Some(session),
            estimator: MetricsEstimator::new(max_faces),
            confidence,
            input_size,
        })
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceObservation>, Box<dyn std::error::Error>> {
        if frame.area() == 0 {
            return Err("frame has no pixels".into());
        }
        let session = self.session.as_mut().ok_or("analyzer session is closed")?;

        let geometry = Letterbox::fit(frame.width(), frame.height(), self.input_size);
        let input = ort::value::Tensor::from_array(geometry.render(frame))?;
        let outputs = session.run(ort::inputs![input])?;
        if outputs.len() == 0 {
            return Err("model returned no outputs".into());
        }
        let raw = outputs[0].try_extract_array::<f32>()?;
        let view = OutputView::new(raw.shape(), raw.as_slice().ok_or("output is not contiguous")?)?;

        let candidates = (0..view.count)
            .filter_map(|i| decode_candidate(|f| view.get(i, f), view.fields, self.confidence, &geometry))
            .collect();

        Ok(suppress_overlaps(candidates, OVERLAP_IOU)
            .into_iter()
            .map(|c| FaceObservation {
                bbox: clamp_bbox(c.bbox, frame.width(), frame.height()),
                confidence: c.score,
                landmarks: c.landmarks,
            })
            .collect())
    }
}

impl FrameAnalyzer for OnnxYoloAnalyzer {
    fn analyze(&mut self, frame: &Frame) -> Result<FaceMetrics, EngineError> {
        let faces = self
            .detect(frame)
            .map_err(|e| -> EngineError { e.to_string().into() })?;
        Ok(self.estimator.estimate(frame.width(), faces))
    }

    fn close(&mut self) -> Result<(), EngineError> {
        if self.session.take().is_some() {
            log::debug!("ONNX session released");
        }
        Ok(())
    }
}

/// Platform accelerators to try ahead of ORT's built-in CPU provider.
#[allow(unused_mut)]
fn accelerators() -> Vec<ExecutionProviderDispatch> {
    let mut providers = Vec::new();
    #[cfg(target_os = "macos")]
    providers.push(ort::execution_providers::CoreMLExecutionProvider::default().build());
    #[cfg(target_os = "windows")]
    providers.push(ort::execution_providers::DirectMLExecutionProvider::default().build());
    providers
}

/// Square spatial size from an NCHW input declaration, if static.
fn declared_input_size(session: &Session) -> Option<u32> {
    let input = session.inputs().first()?;
    match input.dtype() {
        ort::value::ValueType::Tensor { shape, .. } if shape.len() == 4 && shape[2] > 0 => {
            u32::try_from(shape[2]).ok()
        }
        _ => None,
    }
}

/// Builds one [`OnnxYoloAnalyzer`] per session from a resolved model file.
#[derive(Clone, Debug)]
pub struct OnnxYoloAnalyzerFactory {
    model_path: PathBuf,
    confidence: f64,
}

impl OnnxYoloAnalyzerFactory {
    pub fn new(model_path: PathBuf, confidence: f64) -> Self {
        Self {
            model_path,
            confidence,
        }
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }
}

impl AnalyzerFactory for OnnxYoloAnalyzerFactory {
    fn create(&self, max_faces: usize) -> Result<Box<dyn FrameAnalyzer>, EngineInitError> {
        if !self.model_path.is_file() {
            return Err(EngineInitError::Unavailable(format!(
                "model file not found: {}",
                self.model_path.display()
            )));
        }
        let analyzer = OnnxYoloAnalyzer::new(&self.model_path, self.confidence, max_faces)
            .map_err(|e| EngineInitError::Backend(e.to_string().into()))?;
        Ok(Box::new(analyzer))
    }
}

/// Placement of a frame inside the model's square input.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Letterbox {
    side: u32,
    scale: f64,
    offset_x: u32,
    offset_y: u32,
    inner_w: u32,
    inner_h: u32,
}

impl Letterbox {
    fn fit(width: u32, height: u32, side: u32) -> Self {
        let scale = (side as f64 / width as f64).min(side as f64 / height as f64);
        let inner_w = ((width as f64 * scale).round() as u32).min(side);
        let inner_h = ((height as f64 * scale).round() as u32).min(side);
        Self {
            side,
            scale,
            offset_x: (side - inner_w) / 2,
            offset_y: (side - inner_h) / 2,
            inner_w,
            inner_h,
        }
    }

    /// Model-input point back to frame coordinates.
    fn to_frame(&self, x: f32, y: f32) -> (f64, f64) {
        (
            (x as f64 - self.offset_x as f64) / self.scale,
            (y as f64 - self.offset_y as f64) / self.scale,
        )
    }

    /// NCHW tensor in [0, 1], nearest-neighbor sampled, padded with gray.
    fn render(&self, frame: &Frame) -> Array4<f32> {
        let side = self.side as usize;
        let mut tensor = Array4::from_elem((1, 3, side, side), PAD_VALUE);
        let max_x = frame.width() - 1;
        let max_y = frame.height() - 1;

        for row in 0..self.inner_h as usize {
            let sy = ((row as f64 / self.scale) as u32).min(max_y);
            let ty = self.offset_y as usize + row;
            for col in 0..self.inner_w as usize {
                let sx = ((col as f64 / self.scale) as u32).min(max_x);
                let tx = self.offset_x as usize + col;
                for (ch, value) in frame.pixel(sx, sy).into_iter().enumerate() {
                    tensor[[0, ch, ty, tx]] = f32::from(value) / 255.0;
                }
            }
        }
        tensor
    }
}

/// Row access into a `[1, N, F]` or `[1, F, N]` detection tensor.
struct OutputView<'a> {
    data: &'a [f32],
    count: usize,
    fields: usize,
    field_major: bool,
}

impl<'a> OutputView<'a> {
    fn new(shape: &[usize], data: &'a [f32]) -> Result<Self, String> {
        let &[_, a, b] = shape else {
            return Err(format!("unexpected output shape {shape:?}"));
        };
        // Exported YOLO heads put the short feature axis first
        let field_major = a < b;
        let (count, fields) = if field_major { (b, a) } else { (a, b) };
        Ok(Self {
            data,
            count,
            fields,
            field_major,
        })
    }

    fn get(&self, candidate: usize, field: usize) -> f32 {
        if self.field_major {
            self.data[field * self.count + candidate]
        } else {
            self.data[candidate * self.fields + field]
        }
    }
}

#[derive(Clone, Debug)]
struct Candidate {
    bbox: [f64; 4],
    score: f64,
    landmarks: Option<[(f64, f64); 5]>,
}

/// Decode one candidate laid out as `cx, cy, w, h, score, (x, y, vis) * 5`.
/// Landmarks below the visibility threshold stay at the origin, which the
/// domain treats as missing.
fn decode_candidate(
    field: impl Fn(usize) -> f32,
    fields: usize,
    min_score: f64,
    geometry: &Letterbox,
) -> Option<Candidate> {
    if fields < BOX_FIELDS {
        return None;
    }
    let score = f64::from(field(4));
    if score < min_score {
        return None;
    }

    let (cx, cy, half_w, half_h) = (field(0), field(1), field(2) / 2.0, field(3) / 2.0);
    let (left, top) = geometry.to_frame(cx - half_w, cy - half_h);
    let (right, bottom) = geometry.to_frame(cx + half_w, cy + half_h);

    let landmarks = (fields >= BOX_FIELDS + LANDMARK_FIELDS).then(|| {
        std::array::from_fn(|k| {
            let at = BOX_FIELDS + 3 * k;
            if field(at + 2) >= LANDMARK_VISIBILITY {
                geometry.to_frame(field(at), field(at + 1))
            } else {
                (0.0, 0.0)
            }
        })
    });

    Some(Candidate {
        bbox: [left, top, right, bottom],
        score,
        landmarks,
    })
}

/// Keep the best-scoring candidate of every overlapping cluster.
fn suppress_overlaps(mut candidates: Vec<Candidate>, max_iou: f64) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut survivors: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let overlaps = survivors
            .iter()
            .any(|s| bbox_iou(&s.bbox, &candidate.bbox) > max_iou);
        if !overlaps {
            survivors.push(candidate);
        }
    }
    survivors
}
