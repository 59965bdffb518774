use image::{
    imageops::{self, FilterType},
    RgbImage,
};
use ndarray::prelude::*;
use nshare::AsNdarray3;
use ort::{
    execution_providers::{
        CPUExecutionProvider, CUDAExecutionProvider, ExecutionProvider,
        ExecutionProviderDispatch, TensorRTExecutionProvider,
    },
    session::{builder::SessionBuilder, Session},
    value::TensorRef,
};
use parking_lot::Mutex;

use crate::config::{Normalization, SessionConfig};
use crate::errors::{BgremsError, Result};
use crate::mask::MaskBuffer;

/// The segmentation engine as the pipeline sees it: an image goes in, a
/// foreground-probability mask at the same dimensions comes out. Tests
/// substitute a mock; production uses [`SegmentationSession`].
pub trait MaskModel: Send + Sync {
    fn infer_mask(&self, image: &RgbImage) -> Result<MaskBuffer>;
}

/// A loaded ONNX segmentation model. Construction is expensive (model file
/// read, provider initialization, warm-up run); one session serves every
/// image of a run. The interior mutex serializes `run` calls, so shared
/// references are safe across batch workers.
pub struct SegmentationSession {
    input_size: u32,
    normalization: Normalization,
    input_name: String,
    output_name: String,
    session: Mutex<Session>,
}

impl SegmentationSession {
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let model_path = config.resolve_model_path();
        if !model_path.exists() {
            return Err(BgremsError::Configuration {
                message: format!(
                    "model file not found: {} (set --model-path or BGREMS_MODEL_DIR)",
                    model_path.display()
                ),
            });
        }

        let mut session = SessionBuilder::new()
            .map_err(|e| inference_error("session builder initialization", e))?
            .with_execution_providers(execution_providers(config))
            .map_err(|e| inference_error("execution provider registration", e))?
            .with_memory_pattern(true)
            .map_err(|e| inference_error("memory pattern configuration", e))?
            .commit_from_file(&model_path)
            .map_err(|e| {
                inference_error(&format!("model load: {}", model_path.display()), e)
            })?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| shape_fault("model declares no inputs"))?;
        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| shape_fault("model declares no outputs"))?;

        let input_size = config.variant.input_size();
        let size = input_size as usize;

        // initialize model
        let warmup = Array4::<f32>::zeros((1, 3, size, size));
        let warmup_input = TensorRef::from_array_view(&warmup)
            .map_err(|e| inference_error("warm-up tensor creation", e))?;
        session
            .run(ort::inputs![input_name.as_str() => warmup_input])
            .map_err(|e| inference_error("warm-up run", e))?;

        Ok(Self {
            input_size,
            normalization: config.variant.normalization(),
            input_name,
            output_name,
            session: Mutex::new(session),
        })
    }

    fn predict(&self, tensor: &Array4<f32>) -> Result<Array4<f32>> {
        let mut session = self.session.lock();
        let input = TensorRef::from_array_view(tensor)
            .map_err(|e| inference_error("input tensor creation", e))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(|e| inference_error("model execution", e))?;
        Ok(outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()
            .map_err(|e| inference_error("output tensor extraction", e))?
            .into_dimensionality::<Ix4>()?
            .to_owned())
    }
}

impl MaskModel for SegmentationSession {
    fn infer_mask(&self, image: &RgbImage) -> Result<MaskBuffer> {
        let tensor = preprocess(image, self.input_size, self.normalization);
        let output = self.predict(&tensor)?;
        let (width, height) = image.dimensions();
        mask_from_output(&output, width, height)
    }
}

/// Accelerators are attempted in preference order; an unavailable provider
/// is skipped rather than failing construction, and CPU is always the final
/// fallback.
fn execution_providers(config: &SessionConfig) -> Vec<ExecutionProviderDispatch> {
    let mut providers = Vec::new();
    if config.acceleration {
        let tensorrt = TensorRTExecutionProvider::default().with_device_id(config.device_id);
        if tensorrt.is_available().unwrap_or(false) {
            providers.push(tensorrt.build());
        }
        let cuda = CUDAExecutionProvider::default().with_device_id(config.device_id);
        if cuda.is_available().unwrap_or(false) {
            providers.push(cuda.build());
        }
    }
    providers.push(CPUExecutionProvider::default().build());
    providers
}

/// Lanczos3 square resize, scale to [0, 1], per-channel normalization, NCHW.
fn preprocess(image: &RgbImage, size: u32, normalization: Normalization) -> Array4<f32> {
    let resized = imageops::resize(image, size, size, FilterType::Lanczos3);
    let mut tensor = resized
        .as_ndarray3()
        .mapv(|value| f32::from(value) / 255.0)
        .insert_axis(Axis(0));

    let Normalization { mean, std } = normalization;
    for channel in 0..3 {
        tensor
            .slice_mut(s![0, channel, .., ..])
            .mapv_inplace(|value| (value - mean[channel]) / std[channel]);
    }
    tensor
}

/// Min-max normalizes the first output map and resizes it back to the source
/// dimensions.
fn mask_from_output(output: &Array4<f32>, width: u32, height: u32) -> Result<MaskBuffer> {
    let (batch, channels, rows, columns) = output.dim();
    if batch == 0 || channels == 0 || rows == 0 || columns == 0 {
        return Err(shape_fault("engine returned an empty mask tensor"));
    }

    let map = output.slice(s![0, 0, .., ..]);
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for &value in map.iter() {
        min = min.min(value);
        max = max.max(value);
    }
    let range = (max - min).max(f32::EPSILON);

    let data = map
        .iter()
        .map(|&value| (value - min) / range)
        .collect::<Vec<f32>>();
    let mask = MaskBuffer::from_raw(columns as u32, rows as u32, data)
        .ok_or_else(|| shape_fault("engine mask does not match its declared shape"))?;

    Ok(imageops::resize(&mask, width, height, FilterType::Lanczos3))
}

fn inference_error(operation: &str, source: ort::Error) -> BgremsError {
    BgremsError::Inference {
        operation: operation.to_string(),
        source: Box::new(source),
    }
}

fn shape_fault(detail: &str) -> BgremsError {
    BgremsError::Inference {
        operation: "engine output validation".to_string(),
        source: Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            detail.to_string(),
        )),
    }
}
