//! YOLOv8 detection on top of an ort session.
//!
//! The model takes a `[1, 3, S, S]` f32 tensor in `[0, 1]` and returns
//! `[1, 4 + nc, N]`: for each of the `N` candidates, a center-format box in
//! input pixels followed by one score per class.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use fast_image_resize::images::Image;
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::{DynamicImage, GenericImageView};
use inference_common::bbox::{self, BBoxesByClass, Bbox};
use inference_common::detector::Detector;
use inference_common::frame_times::FrameTimes;
use ndarray::{Array4, CowArray};
use ort::session::Session;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::value::TensorRef;

#[derive(Debug, Clone)]
pub struct YoloConfig {
    pub model_path: PathBuf,
    /// Candidates scoring below this are dropped before nms.
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    /// Side of the square model input.
    pub input_size: u32,
}

impl Default for YoloConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("weights/best.onnx"),
            confidence_threshold: 0.25,
            iou_threshold: 0.7,
            input_size: 640,
        }
    }
}

pub struct YoloV8 {
    session: Session,
    config: YoloConfig,
    resizer: Resizer,
    /// From the `names` entry of the export's metadata, empty if missing.
    class_names: Vec<String>,
}

impl YoloV8 {
    /// Loads the model weights into a new session.
    pub fn load(config: YoloConfig) -> anyhow::Result<Self> {
        if !config.model_path.is_file() {
            bail!("Model weights not found at {:?}", config.model_path);
        }

        let session = SessionBuilder::new()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(&config.model_path)
            .with_context(|| format!("Failed to load model {:?}", config.model_path))?;
        log::debug!("{session:?}");

        let class_names = match session.metadata().and_then(|meta| meta.custom("names")) {
            Ok(Some(names)) => parse_class_names(&names),
            Ok(None) => Vec::new(),
            Err(e) => {
                log::warn!("Could not read model metadata: {e}");
                Vec::new()
            }
        };
        log::debug!("Model class names: {class_names:?}");

        Ok(Self {
            session,
            config,
            resizer: Resizer::new(),
            class_names,
        })
    }

    pub fn model_path(&self) -> &Path {
        &self.config.model_path
    }

    /// Resizes to the model input and lays the pixels out as NCHW in `[0, 1]`.
    fn preprocess(
        &mut self,
        image: &DynamicImage,
        frame_times: &mut FrameTimes,
    ) -> anyhow::Result<Array4<f32>> {
        let size = self.config.input_size;

        let start = Instant::now();
        let (width, height) = image.dimensions();
        let src = Image::from_vec_u8(width, height, image.to_rgb8().into_raw(), PixelType::U8x3)?;
        let mut dst = Image::new(size, size, PixelType::U8x3);
        self.resizer.resize(
            &src,
            &mut dst,
            &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
        )?;
        frame_times.buffer_resize = start.elapsed();

        let start = Instant::now();
        let tensor = hwc_to_nchw(dst.buffer(), size as usize, size as usize);
        frame_times.buffer_to_tensor = start.elapsed();

        Ok(tensor)
    }
}

impl Detector for YoloV8 {
    fn class_names(&self) -> &[String] {
        &self.class_names
    }

    fn detect(
        &mut self,
        image: &DynamicImage,
        frame_times: &mut FrameTimes,
    ) -> anyhow::Result<BBoxesByClass> {
        let input = self.preprocess(image, frame_times)?;
        let (width, height) = image.dimensions();

        let start = Instant::now();
        let input_dyn = CowArray::from(input).into_dyn();
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(&input_dyn)?])?;
        frame_times.forward_pass = start.elapsed();

        let start = Instant::now();
        let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        let dims: Vec<i64> = shape.iter().copied().collect();
        let scale = (
            width as f32 / self.config.input_size as f32,
            height as f32 / self.config.input_size as f32,
        );
        let candidates = decode_output(
            &dims,
            data,
            self.config.confidence_threshold,
            scale,
            (width as f32, height as f32),
        )?;
        drop(outputs);
        frame_times.bbox_extraction = start.elapsed();

        let start = Instant::now();
        let bboxes = bbox::nms_by_class(candidates, self.config.iou_threshold);
        frame_times.nms = start.elapsed();

        Ok(bboxes)
    }
}

/// Parses the python dict literal ultralytics exports, e.g.
/// `{0: 'swimbody', 1: 'head'}`, into names indexed by class.
fn parse_class_names(names: &str) -> Vec<String> {
    let entries: Vec<(usize, String)> = names
        .trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .split(',')
        .filter_map(|entry| {
            let (index, name) = entry.split_once(':')?;
            let index: usize = index.trim().parse().ok()?;
            let name = name.trim().trim_matches(|c: char| c == '\'' || c == '"');
            (index < 4096).then(|| (index, name.to_string()))
        })
        .collect();

    let len = entries.iter().map(|(index, _)| index + 1).max().unwrap_or(0);
    let mut class_names: Vec<String> = (0..len).map(|i| format!("class{i}")).collect();
    for (index, name) in entries {
        class_names[index] = name;
    }
    class_names
}

/// Interleaved rgb bytes to a `[1, 3, h, w]` tensor normalized to `[0, 1]`.
fn hwc_to_nchw(rgb: &[u8], width: usize, height: usize) -> Array4<f32> {
    let mut tensor = Array4::<f32>::zeros((1, 3, height, width));
    for (i, pixel) in rgb.chunks_exact(3).enumerate() {
        let (y, x) = (i / width, i % width);
        for c in 0..3 {
            tensor[[0, c, y, x]] = pixel[c] as f32 / 255.0;
        }
    }
    tensor
}

/// Turns the raw `[1, 4 + nc, N]` output into per-class candidates, rescaled
/// by `scale` and clamped to `bounds`. No nms is applied.
fn decode_output(
    dims: &[i64],
    data: &[f32],
    confidence_threshold: f32,
    scale: (f32, f32),
    bounds: (f32, f32),
) -> anyhow::Result<BBoxesByClass> {
    let [_, features, candidates] = dims else {
        bail!("Unexpected model output shape {dims:?}, expected [1, 4 + classes, candidates]");
    };
    let (features, candidates) = (*features as usize, *candidates as usize);
    if features <= 4 || data.len() != features * candidates {
        bail!(
            "Model output shape {dims:?} does not match {} values",
            data.len()
        );
    }

    let num_classes = features - 4;
    let at = |feature: usize, candidate: usize| data[feature * candidates + candidate];

    let mut by_class: BBoxesByClass = vec![Vec::new(); num_classes];
    for i in 0..candidates {
        let (class_idx, score) = (0..num_classes)
            .map(|c| (c, at(4 + c, i)))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
        if score < confidence_threshold {
            continue;
        }

        let bbox = Bbox::from_center(at(0, i), at(1, i), at(2, i), at(3, i), score)
            .scale(scale.0, scale.1)
            .clamp(bounds.0, bounds.1);
        by_class[class_idx].push(bbox);
    }

    Ok(by_class)
}
