//! RIFE-style frame synthesis over ONNX Runtime.
//!
//! Frames are read from disk with the `image` crate, converted to NCHW f32 in
//! `[0, 1]`, reflection-padded to a multiple of [`PAD_ALIGN`], run through the
//! model, cropped back and written as 8-bit RGB.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{ensure, Context, Result};
use half::f16;
use image::RgbImage;
use ndarray::{s, Array4, ArrayD, Ix4};
use ort::{
    session::Session,
    value::{Tensor, TensorRef},
};
use tracing::{debug, info};

use super::backend::{build_session, DeviceSelection, InferenceBackend, SessionConfig};
use super::{FrameOracle, ModelName};

const PAD_ALIGN: usize = 32;

const INPUT_IMG0: &str = "img0";
const INPUT_IMG1: &str = "img1";
const INPUT_TIMESTEP: &str = "timestep";
const INPUT_CONCAT: &str = "input";
const OUTPUT_NAME: &str = "output";

/// Input layout of the loaded model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    /// `img0`, `img1` as `[1,3,H,W]` and `timestep` as `[1,1,1,1]`.
    ThreeInput,
    /// One `input` tensor `[1,7,H,W]`: both frames plus a constant timestep plane.
    Concatenated,
}

/// Everything needed to bring up the process-wide oracle.
#[derive(Debug, Clone)]
pub struct OracleOptions {
    pub models_dir: PathBuf,
    pub model_name: ModelName,
    pub gpu_ids: String,
    pub use_time_step: bool,
    pub backend: InferenceBackend,
    pub half_precision: bool,
    pub trt_cache_dir: Option<PathBuf>,
}

impl OracleOptions {
    pub fn model_path(&self) -> PathBuf {
        self.models_dir.join(self.model_name.file_name())
    }
}

pub struct RifeOracle {
    session: Session,
    model_format: ModelFormat,
    use_time_step: bool,
    half_precision: bool,
}

impl RifeOracle {
    /// Build the inference session once; the handle is then passed around by `&mut`.
    pub fn load(options: &OracleOptions) -> Result<Self> {
        let devices = DeviceSelection::parse(&options.gpu_ids)?;
        if let DeviceSelection::Gpu(ids) = &devices {
            if ids.len() > 1 {
                info!(
                    gpu_ids = %options.gpu_ids,
                    device_id = ids[0],
                    "Multiple GPUs listed; synthesis runs on the first one"
                );
            }
        }

        let model_path = options.model_path();
        let session = build_session(&SessionConfig {
            model_path: &model_path,
            backend: options.backend,
            devices: &devices,
            trt_cache_dir: options.trt_cache_dir.as_deref(),
        })?;
        let model_format = detect_model_format(&session);

        info!(
            model = %options.model_name,
            format = ?model_format,
            time_step = options.use_time_step,
            half_precision = options.half_precision,
            "Frame oracle ready"
        );

        Ok(Self {
            session,
            model_format,
            use_time_step: options.use_time_step,
            half_precision: options.half_precision,
        })
    }

    fn infer(&mut self, img0: &Array4<f32>, img1: &Array4<f32>, time: f32) -> Result<ArrayD<f32>> {
        match (self.model_format, self.half_precision) {
            (ModelFormat::ThreeInput, false) => {
                let tensor0 = Tensor::from_array(img0.clone())?;
                let tensor1 = Tensor::from_array(img1.clone())?;
                let ts_tensor = Tensor::from_array(Array4::<f32>::from_elem((1, 1, 1, 1), time))?;
                let outputs = self.session.run(ort::inputs![
                    INPUT_IMG0 => &tensor0,
                    INPUT_IMG1 => &tensor1,
                    INPUT_TIMESTEP => &ts_tensor
                ])?;
                Ok(outputs[OUTPUT_NAME].try_extract_array::<f32>()?.to_owned())
            }
            (ModelFormat::ThreeInput, true) => {
                let tensor0 = Tensor::from_array(img0.mapv(f16::from_f32))?;
                let tensor1 = Tensor::from_array(img1.mapv(f16::from_f32))?;
                let ts_tensor = Tensor::from_array(Array4::<f16>::from_elem(
                    (1, 1, 1, 1),
                    f16::from_f32(time),
                ))?;
                let outputs = self.session.run(ort::inputs![
                    INPUT_IMG0 => &tensor0,
                    INPUT_IMG1 => &tensor1,
                    INPUT_TIMESTEP => &ts_tensor
                ])?;
                Ok(outputs[OUTPUT_NAME]
                    .try_extract_array::<f16>()?
                    .mapv(f32::from))
            }
            (ModelFormat::Concatenated, false) => {
                let concat = concat_input(img0, img1, time);
                let tensor = TensorRef::from_array_view(concat.view())?;
                let outputs = self.session.run(ort::inputs![INPUT_CONCAT => tensor])?;
                Ok(outputs[OUTPUT_NAME].try_extract_array::<f32>()?.to_owned())
            }
            (ModelFormat::Concatenated, true) => {
                let concat = concat_input(img0, img1, time).mapv(f16::from_f32);
                let tensor = TensorRef::from_array_view(concat.view())?;
                let outputs = self.session.run(ort::inputs![INPUT_CONCAT => tensor])?;
                Ok(outputs[OUTPUT_NAME]
                    .try_extract_array::<f16>()?
                    .mapv(f32::from))
            }
        }
    }
}

impl FrameOracle for RifeOracle {
    fn time_step(
        &mut self,
        before: &Path,
        after: &Path,
        time: f64,
        output: &Path,
    ) -> Result<PathBuf> {
        ensure!(
            time > 0.0 && time < 1.0,
            "time step must lie strictly between 0 and 1, got {time}"
        );
        let frame0 = load_rgb(before)?;
        let frame1 = load_rgb(after)?;
        ensure!(
            frame0.dimensions() == frame1.dimensions(),
            "frame sizes differ: {} is {:?}, {} is {:?}",
            before.display(),
            frame0.dimensions(),
            after.display(),
            frame1.dimensions()
        );

        let (width, height) = frame0.dimensions();
        let (h, w) = (height as usize, width as usize);
        let img0 = rgb_to_padded_nchw(frame0.as_raw(), h, w)?;
        let img1 = rgb_to_padded_nchw(frame1.as_raw(), h, w)?;

        let started = Instant::now();
        let raw = self
            .infer(&img0, &img1, time as f32)
            .with_context(|| format!("inference failed for {}", output.display()))?;
        let cropped = crop_output(raw, h, w)?;
        debug!(
            time,
            session_run_ms = format!("{:.1}", started.elapsed().as_secs_f64() * 1000.0),
            output = %output.display(),
            "Synthesized frame"
        );

        let rgb = nchw_to_rgb(&cropped, h, w);
        let image = RgbImage::from_raw(width, height, rgb)
            .context("synthesized buffer does not match frame dimensions")?;
        image
            .save(output)
            .with_context(|| format!("failed to write {}", output.display()))?;
        Ok(output.to_path_buf())
    }

    fn supports_time_step(&self) -> bool {
        self.use_time_step
    }
}

fn load_rgb(path: &Path) -> Result<RgbImage> {
    let image = image::open(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(image.to_rgb8())
}

fn detect_model_format(session: &Session) -> ModelFormat {
    let inputs = session.inputs();
    if inputs.len() == 1 && inputs[0].name() == INPUT_CONCAT {
        ModelFormat::Concatenated
    } else {
        ModelFormat::ThreeInput
    }
}

fn pad_amount(dim: usize) -> usize {
    (PAD_ALIGN - (dim % PAD_ALIGN)) % PAD_ALIGN
}

/// Interleaved RGB8 to `[1, 3, H+pad, W+pad]`, normalised to `[0, 1]`.
///
/// Padding mirrors the last rows and columns (bottom first, then right, so the
/// corner is mirrored on both axes).
fn rgb_to_padded_nchw(data: &[u8], h: usize, w: usize) -> Result<Array4<f32>> {
    ensure!(
        data.len() == h * w * 3,
        "RGB buffer has {} bytes, expected {} for {w}x{h}",
        data.len(),
        h * w * 3
    );
    ensure!(h > 0 && w > 0, "empty frame");

    let pad_h = pad_amount(h);
    let pad_w = pad_amount(w);
    ensure!(
        pad_h < h && pad_w < w,
        "frame {w}x{h} is too small to reflection-pad to {PAD_ALIGN}"
    );
    let padded_h = h + pad_h;
    let padded_w = w + pad_w;

    let mut arr = Array4::<f32>::zeros((1, 3, padded_h, padded_w));
    for y in 0..padded_h {
        let src_y = if y < h { y } else { 2 * h - 1 - y };
        for x in 0..padded_w {
            let src_x = if x < w { x } else { 2 * w - 1 - x };
            let offset = (src_y * w + src_x) * 3;
            for c in 0..3 {
                arr[[0, c, y, x]] = data[offset + c] as f32 / 255.0;
            }
        }
    }
    Ok(arr)
}

fn concat_input(img0: &Array4<f32>, img1: &Array4<f32>, time: f32) -> Array4<f32> {
    let (h, w) = (img0.shape()[2], img0.shape()[3]);
    let mut concat = Array4::<f32>::zeros((1, 7, h, w));
    concat.slice_mut(s![.., 0..3, .., ..]).assign(img0);
    concat.slice_mut(s![.., 3..6, .., ..]).assign(img1);
    concat.slice_mut(s![.., 6, .., ..]).fill(time);
    concat
}

fn crop_output(raw: ArrayD<f32>, orig_h: usize, orig_w: usize) -> Result<Array4<f32>> {
    let output = raw
        .into_dimensionality::<Ix4>()
        .context("model output is not a 4-D tensor")?;
    let shape = output.shape();
    ensure!(
        shape[1] >= 3 && shape[2] >= orig_h && shape[3] >= orig_w,
        "model output {:?} cannot be cropped to 3x{orig_h}x{orig_w}",
        shape
    );
    Ok(output.slice(s![..1, ..3, ..orig_h, ..orig_w]).to_owned())
}

fn nchw_to_rgb(arr: &Array4<f32>, h: usize, w: usize) -> Vec<u8> {
    let mut rgb = vec![0u8; h * w * 3];
    for y in 0..h {
        for x in 0..w {
            let dst = (y * w + x) * 3;
            for c in 0..3 {
                rgb[dst + c] = (arr[[0, c, y, x]] * 255.0 + 0.5).clamp(0.0, 255.0) as u8;
            }
        }
    }
    rgb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_amount() {
        assert_eq!(pad_amount(32), 0);
        assert_eq!(pad_amount(1920), 0);
        assert_eq!(pad_amount(1080), 8);
        assert_eq!(pad_amount(720), 16);
        assert_eq!(pad_amount(33), 31);
    }

    #[test]
    fn test_rgb_to_padded_nchw_normalised() {
        let data = vec![255u8; 32 * 32 * 3];
        let arr = rgb_to_padded_nchw(&data, 32, 32).unwrap();
        assert_eq!(arr.shape(), &[1, 3, 32, 32]);
        assert!((arr[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!((arr[[0, 2, 31, 31]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_rgb_to_padded_nchw_reflects_edges() {
        let (h, w) = (30usize, 50usize);
        let mut data = vec![0u8; h * w * 3];
        for y in 0..h {
            for x in 0..w {
                let offset = (y * w + x) * 3;
                data[offset] = y as u8;
                data[offset + 1] = x as u8;
                data[offset + 2] = 7;
            }
        }

        let arr = rgb_to_padded_nchw(&data, h, w).unwrap();
        assert_eq!(arr.shape(), &[1, 3, 32, 64]);

        let value = |c: usize, y: usize, x: usize| (arr[[0, c, y, x]] * 255.0).round() as usize;
        assert_eq!(value(0, 30, 0), 29);
        assert_eq!(value(0, 31, 0), 28);
        assert_eq!(value(1, 0, 50), 49);
        assert_eq!(value(1, 0, 63), 36);
        assert_eq!(value(0, 31, 63), 28);
        assert_eq!(value(1, 31, 63), 36);
        assert_eq!(value(2, 31, 63), 7);
    }

    #[test]
    fn test_rgb_to_padded_nchw_rejects_size_mismatch() {
        let data = vec![0u8; 10];
        assert!(rgb_to_padded_nchw(&data, 32, 32).is_err());
    }

    #[test]
    fn test_rgb_to_padded_nchw_rejects_tiny_frames() {
        let data = vec![0u8; 4 * 4 * 3];
        assert!(rgb_to_padded_nchw(&data, 4, 4).is_err());
    }

    #[test]
    fn test_nchw_to_rgb_rounds_and_clamps() {
        let mut arr = Array4::<f32>::zeros((1, 3, 1, 2));
        arr[[0, 0, 0, 0]] = 1.5;
        arr[[0, 1, 0, 0]] = -0.2;
        arr[[0, 2, 0, 0]] = 0.5;
        arr[[0, 0, 0, 1]] = 1.0;
        let rgb = nchw_to_rgb(&arr, 1, 2);
        assert_eq!(rgb, vec![255, 0, 128, 255, 0, 0]);
    }

    #[test]
    fn test_concat_input_layout() {
        let img0 = Array4::<f32>::from_elem((1, 3, 2, 2), 0.25);
        let img1 = Array4::<f32>::from_elem((1, 3, 2, 2), 0.75);
        let concat = concat_input(&img0, &img1, 0.5);
        assert_eq!(concat.shape(), &[1, 7, 2, 2]);
        assert_eq!(concat[[0, 2, 1, 1]], 0.25);
        assert_eq!(concat[[0, 3, 0, 0]], 0.75);
        assert_eq!(concat[[0, 6, 1, 0]], 0.5);
    }

    #[test]
    fn test_crop_output_drops_padding() {
        let raw = Array4::<f32>::ones((1, 3, 64, 64)).into_dyn();
        let cropped = crop_output(raw, 30, 50).unwrap();
        assert_eq!(cropped.shape(), &[1, 3, 30, 50]);
    }

    #[test]
    fn test_model_path_joins_file_name() {
        let options = OracleOptions {
            models_dir: PathBuf::from("/models"),
            model_name: ModelName::OursSmall,
            gpu_ids: "0".to_string(),
            use_time_step: false,
            backend: InferenceBackend::Cuda,
            half_precision: false,
            trt_cache_dir: None,
        };
        assert_eq!(options.model_path(), PathBuf::from("/models/ours_small.onnx"));
    }
}
