use std::fs;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::{prelude::*, ThreadPoolBuilder};
use walkdir::WalkDir;

use crate::config::{BatchOptions, RemovalOptions};
use crate::errors::{BgremsError, Result};
use crate::loader::{self, ResizePolicy};
use crate::remover;
use crate::session::MaskModel;

/// Outcome of one batch item. Collected instead of thrown so a bad input
/// never aborts the files after it.
#[derive(Debug)]
pub struct FileReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub result: Result<()>,
}

impl FileReport {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Load, resize, remove, write. Errors propagate to the caller; recovery
/// policy (abort vs. continue) is the caller's decision.
pub fn process_one<M: MaskModel + ?Sized>(
    input: &Path,
    output: &Path,
    model: &M,
    policy: ResizePolicy,
    options: &RemovalOptions,
) -> Result<()> {
    if !options.only_mask && !has_alpha_capable_extension(output) {
        return Err(BgremsError::Validation {
            field: "output".to_string(),
            reason: format!(
                "{} cannot carry transparency; use png, webp or tiff",
                output.display()
            ),
        });
    }

    let image = loader::load_and_resize(input, policy)?;
    let composited = remover::remove_background(&image, model, options)?;
    save(&composited, output)
}

/// Processes every supported image directly inside `input_dir`, sharing one
/// model across all files. Per-file failures are reported and recorded, not
/// propagated.
pub fn process_batch<M: MaskModel>(
    input_dir: &Path,
    output_dir: &Path,
    model: &M,
    policy: ResizePolicy,
    options: &RemovalOptions,
    batch: &BatchOptions,
) -> Result<Vec<FileReport>> {
    if !input_dir.is_dir() {
        return Err(BgremsError::FileSystem {
            path: input_dir.to_path_buf(),
            operation: "input directory check".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        });
    }
    fs::create_dir_all(output_dir).map_err(|e| BgremsError::FileSystem {
        path: output_dir.to_path_buf(),
        operation: "output directory creation".to_string(),
        source: e,
    })?;

    let files = collect_image_files(input_dir);
    if files.is_empty() {
        return Ok(Vec::new());
    }

    let progress = ProgressBar::new(files.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )
            .unwrap()
            .progress_chars("#>-"),
    );

    let pool = ThreadPoolBuilder::new()
        .num_threads(batch.jobs.max(1))
        .build()
        .map_err(|e| BgremsError::Configuration {
            message: format!("worker pool setup failed: {e}"),
        })?;

    let reports = pool.install(|| {
        files
            .par_iter()
            .map(|input| {
                let output = output_path_for(input, output_dir, &batch.suffix);
                let result = process_one(input, &output, model, policy, options);
                if let Err(err) = &result {
                    eprintln!("failed {}: {err}", input.display());
                }
                progress.inc(1);
                FileReport {
                    input: input.clone(),
                    output,
                    result,
                }
            })
            .collect::<Vec<_>>()
    });

    progress.finish();
    Ok(reports)
}

/// Regular files directly in the directory with a recognized image
/// extension. Enumeration order follows the filesystem.
pub fn collect_image_files(input_dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(input_dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_supported_image(path))
        .collect()
}

pub fn is_supported_image(path: &Path) -> bool {
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        matches!(
            extension.to_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "webp"
        )
    } else {
        false
    }
}

/// `<output_dir>/<stem><suffix>.png`; PNG keeps the transparent background
/// representable regardless of the input format.
pub fn output_path_for(input: &Path, output_dir: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    output_dir.join(format!("{stem}{suffix}.png"))
}

fn has_alpha_capable_extension(path: &Path) -> bool {
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        matches!(extension.to_lowercase().as_str(), "png" | "webp" | "tiff" | "tif")
    } else {
        false
    }
}

fn save(image: &DynamicImage, output: &Path) -> Result<()> {
    image.save(output).map_err(|e| BgremsError::OutputWrite {
        path: output.to_path_buf(),
        source: Box::new(e),
    })
}
