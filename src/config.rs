use std::env;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::loader::ResizePolicy;

/// Default target width for document-shaped inputs, wide enough to keep A4
/// text legible while keeping inference fast.
pub const DOCUMENT_TARGET_WIDTH: u32 = 1240;

/// Default longer-side bound for general photos. Sits above the accurate
/// model's 1024 input so the bound never degrades what the model sees.
pub const PHOTO_MAX_DIMENSION: u32 = 1500;

#[derive(Parser, Debug, Clone)]
#[command(version, about = "Remove image backgrounds with a pretrained segmentation model", long_about = None)]
pub struct Cli {
    /// Input image, or input directory with --batch.
    pub input: PathBuf,

    /// Output image, or output directory with --batch.
    pub output: PathBuf,

    /// Process every supported image in the input directory.
    #[arg(long)]
    pub batch: bool,

    /// Tuning profile selecting the resize policy and model variant.
    #[arg(long, value_enum, default_value = "document")]
    pub profile: Profile,

    /// Model variant, overriding the profile's choice.
    #[arg(long, value_enum)]
    pub model: Option<ModelVariant>,

    /// Path to the .onnx model file. Defaults to $BGREMS_MODEL_DIR (or
    /// ./models) joined with the variant's file name.
    #[arg(long)]
    pub model_path: Option<PathBuf>,

    /// Resize inputs to exactly this width, scaling height to match.
    #[arg(long, conflicts_with_all = ["max_dimension", "no_resize"])]
    pub target_width: Option<u32>,

    /// Downscale inputs whose longer side exceeds this bound.
    #[arg(long, conflicts_with = "no_resize")]
    pub max_dimension: Option<u32>,

    /// Feed inputs to the model at their original size.
    #[arg(long)]
    pub no_resize: bool,

    /// Accelerator device ordinal.
    #[arg(long, default_value_t = 0)]
    pub device_id: i32,

    /// Skip accelerator probing and run on CPU only.
    #[arg(long)]
    pub cpu_only: bool,

    /// Smooth mask edges before compositing (slower).
    #[arg(long)]
    pub post_process_mask: bool,

    /// Blend edge pixels between the matting thresholds instead of
    /// hard-cutting them.
    #[arg(long)]
    pub alpha_matting: bool,

    /// Mask value at or above which a pixel counts as foreground.
    #[arg(long, default_value_t = 240)]
    pub alpha_matting_foreground_threshold: u8,

    /// Mask value at or below which a pixel counts as background.
    #[arg(long, default_value_t = 10)]
    pub alpha_matting_background_threshold: u8,

    /// Erosion radius applied to the foreground region while matting.
    #[arg(long, default_value_t = 10)]
    pub alpha_matting_erode_size: u8,

    /// Write the raw segmentation mask instead of the composited image.
    #[arg(long)]
    pub only_mask: bool,

    /// Worker threads for batch mode.
    #[arg(long, default_value_t = 1, value_parser = check_jobs)]
    pub jobs: usize,

    /// Suffix appended to output file stems in batch mode.
    #[arg(long, default_value = "_nobg")]
    pub suffix: String,
}

impl Cli {
    pub fn resize_policy(&self) -> ResizePolicy {
        if self.no_resize {
            return ResizePolicy::Keep;
        }
        if let Some(width) = self.target_width {
            return ResizePolicy::FitWidth(width);
        }
        if let Some(bound) = self.max_dimension {
            return ResizePolicy::Bounded(bound);
        }
        self.profile.resize_policy()
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            variant: self.model.unwrap_or_else(|| self.profile.model_variant()),
            model_path: self.model_path.clone(),
            device_id: self.device_id,
            acceleration: !self.cpu_only,
        }
    }

    pub fn removal_options(&self) -> RemovalOptions {
        RemovalOptions {
            post_process_mask: self.post_process_mask,
            alpha_matting: self.alpha_matting,
            alpha_matting_foreground_threshold: self.alpha_matting_foreground_threshold,
            alpha_matting_background_threshold: self.alpha_matting_background_threshold,
            alpha_matting_erode_size: self.alpha_matting_erode_size,
            only_mask: self.only_mask,
        }
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            jobs: self.jobs,
            suffix: self.suffix.clone(),
        }
    }
}

fn check_jobs(s: &str) -> Result<usize, String> {
    let jobs: usize = s.parse().map_err(|_| format!("`{s}` is not a number"))?;
    if jobs == 0 {
        return Err("at least one worker is required".to_string());
    }
    Ok(jobs)
}

/// Input shape the run is tuned for: documents get a fixed target width and
/// the fast model, photos get a longer-side bound and the accurate model.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Document,
    Photo,
}

impl Profile {
    pub const fn resize_policy(self) -> ResizePolicy {
        match self {
            Self::Document => ResizePolicy::FitWidth(DOCUMENT_TARGET_WIDTH),
            Self::Photo => ResizePolicy::Bounded(PHOTO_MAX_DIMENSION),
        }
    }

    pub const fn model_variant(self) -> ModelVariant {
        match self {
            Self::Document => ModelVariant::Fast,
            Self::Photo => ModelVariant::Accurate,
        }
    }
}

/// Pretrained segmentation model family. The variant fixes the square input
/// resolution and the per-channel normalization the model was trained with.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelVariant {
    /// u2netp-class model, 320x320 input. Fast, good for documents.
    Fast,
    /// isnet-class model, 1024x1024 input. Slower, better on photos.
    Accurate,
}

impl ModelVariant {
    pub const fn input_size(self) -> u32 {
        match self {
            Self::Fast => 320,
            Self::Accurate => 1024,
        }
    }

    pub const fn normalization(self) -> Normalization {
        match self {
            Self::Fast => Normalization {
                mean: [0.485, 0.456, 0.406],
                std: [0.229, 0.224, 0.225],
            },
            Self::Accurate => Normalization {
                mean: [0.5, 0.5, 0.5],
                std: [1.0, 1.0, 1.0],
            },
        }
    }

    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Fast => "u2netp.onnx",
            Self::Accurate => "isnet-general-use.onnx",
        }
    }
}

/// Per-channel normalization applied after scaling pixels to [0, 1].
#[derive(Debug, Clone, Copy)]
pub struct Normalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

/// Session construction parameters. Built once per run; the session it
/// produces is shared across every image in that run.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub variant: ModelVariant,
    pub model_path: Option<PathBuf>,
    pub device_id: i32,
    /// When false, accelerator providers are not probed at all.
    pub acceleration: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            variant: ModelVariant::Fast,
            model_path: None,
            device_id: 0,
            acceleration: true,
        }
    }
}

impl SessionConfig {
    /// Explicit path if given, else `$BGREMS_MODEL_DIR/<variant file>`,
    /// else `models/<variant file>`.
    pub fn resolve_model_path(&self) -> PathBuf {
        self.model_path.clone().unwrap_or_else(|| {
            let dir = env::var_os("BGREMS_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("models"));
            dir.join(self.variant.file_name())
        })
    }
}

/// Switches recognized by the remover.
#[derive(Debug, Clone)]
pub struct RemovalOptions {
    /// Smooth mask edges before compositing. Costs time, off by default.
    pub post_process_mask: bool,
    /// Soft-edge compositing between the two thresholds below.
    pub alpha_matting: bool,
    pub alpha_matting_foreground_threshold: u8,
    pub alpha_matting_background_threshold: u8,
    pub alpha_matting_erode_size: u8,
    /// Return the single-channel mask instead of the composited image.
    pub only_mask: bool,
}

impl Default for RemovalOptions {
    fn default() -> Self {
        Self {
            post_process_mask: false,
            alpha_matting: false,
            alpha_matting_foreground_threshold: 240,
            alpha_matting_background_threshold: 10,
            alpha_matting_erode_size: 10,
            only_mask: false,
        }
    }
}

/// Batch-mode knobs.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Worker threads. 1 keeps processing strictly sequential.
    pub jobs: usize,
    /// Appended to the input file stem when deriving the output name.
    pub suffix: String,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            jobs: 1,
            suffix: "_nobg".to_string(),
        }
    }
}
