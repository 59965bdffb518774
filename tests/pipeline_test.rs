use std::fs;
use std::path::Path;

use image::{ColorType, GenericImageView, Rgb, RgbImage};
use tempfile::TempDir;

use bgrems::config::{BatchOptions, RemovalOptions};
use bgrems::errors::BgremsError;
use bgrems::loader::ResizePolicy;
use bgrems::mocks::MockMaskModel;
use bgrems::pipeline::{process_batch, process_one};

fn write_image(path: &Path, width: u32, height: u32) {
    RgbImage::from_pixel(width, height, Rgb([200, 40, 40]))
        .save(path)
        .unwrap();
}

#[test]
fn batch_isolates_per_file_failures() {
    let temp = TempDir::new().unwrap();
    let input_dir = temp.path().join("input");
    let output_dir = temp.path().join("output");
    fs::create_dir_all(&input_dir).unwrap();

    for name in ["a.jpg", "b.png", "c.jpeg"] {
        write_image(&input_dir.join(name), 32, 32);
    }
    // a decodable extension over garbage bytes, and a file the enumeration
    // must skip entirely
    fs::write(input_dir.join("broken.jpg"), b"not an image").unwrap();
    fs::write(input_dir.join("notes.txt"), b"ignore me").unwrap();

    let model = MockMaskModel::new(2);
    let reports = process_batch(
        &input_dir,
        &output_dir,
        &model,
        ResizePolicy::Keep,
        &RemovalOptions::default(),
        &BatchOptions::default(),
    )
    .unwrap();

    assert_eq!(reports.len(), 4);
    assert_eq!(reports.iter().filter(|r| r.is_ok()).count(), 3);
    assert_eq!(reports.iter().filter(|r| !r.is_ok()).count(), 1);

    for name in ["a_nobg.png", "b_nobg.png", "c_nobg.png"] {
        assert!(output_dir.join(name).exists(), "missing output {name}");
    }
    assert!(!output_dir.join("broken_nobg.png").exists());

    let failed = reports.iter().find(|r| !r.is_ok()).unwrap();
    assert!(failed.input.ends_with("broken.jpg"));
}

#[test]
fn one_model_instance_serves_the_whole_batch() {
    let temp = TempDir::new().unwrap();
    let input_dir = temp.path().join("input");
    let output_dir = temp.path().join("output");
    fs::create_dir_all(&input_dir).unwrap();

    for index in 0..4 {
        write_image(&input_dir.join(format!("img_{index}.png")), 16, 16);
    }

    let model = MockMaskModel::new(1);
    let reports = process_batch(
        &input_dir,
        &output_dir,
        &model,
        ResizePolicy::Keep,
        &RemovalOptions::default(),
        &BatchOptions::default(),
    )
    .unwrap();

    assert!(reports.iter().all(|r| r.is_ok()));
    // one inference per file, all through the single shared instance
    assert_eq!(model.call_count(), 4);
}

#[test]
fn batch_of_empty_directory_reports_nothing() {
    let temp = TempDir::new().unwrap();
    let input_dir = temp.path().join("input");
    let output_dir = temp.path().join("output");
    fs::create_dir_all(&input_dir).unwrap();

    let model = MockMaskModel::new(0);
    let reports = process_batch(
        &input_dir,
        &output_dir,
        &model,
        ResizePolicy::Keep,
        &RemovalOptions::default(),
        &BatchOptions::default(),
    )
    .unwrap();

    assert!(reports.is_empty());
    assert_eq!(model.call_count(), 0);
}

#[test]
fn parallel_batch_processes_every_file() {
    let temp = TempDir::new().unwrap();
    let input_dir = temp.path().join("input");
    let output_dir = temp.path().join("output");
    fs::create_dir_all(&input_dir).unwrap();

    for index in 0..6 {
        write_image(&input_dir.join(format!("img_{index}.png")), 16, 16);
    }

    let model = MockMaskModel::new(1);
    let reports = process_batch(
        &input_dir,
        &output_dir,
        &model,
        ResizePolicy::Keep,
        &RemovalOptions::default(),
        &BatchOptions {
            jobs: 3,
            ..BatchOptions::default()
        },
    )
    .unwrap();

    assert_eq!(reports.len(), 6);
    assert!(reports.iter().all(|r| r.is_ok()));
    assert_eq!(model.call_count(), 6);
    for index in 0..6 {
        assert!(output_dir.join(format!("img_{index}_nobg.png")).exists());
    }
}

#[test]
fn composited_output_is_transparent_in_the_masked_border() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("doc.png");
    let output = temp.path().join("doc_out.png");
    write_image(&input, 64, 64);

    let model = MockMaskModel::new(10);
    process_one(
        &input,
        &output,
        &model,
        ResizePolicy::Keep,
        &RemovalOptions::default(),
    )
    .unwrap();

    let result = image::open(&output).unwrap().to_rgba8();
    assert_eq!(result.dimensions(), (64, 64));
    // border pixels rejected by the engine become fully transparent
    assert_eq!(result.get_pixel(0, 0)[3], 0);
    assert_eq!(result.get_pixel(63, 63)[3], 0);
    assert_eq!(result.get_pixel(5, 32)[3], 0);
    // interior pixels stay opaque with their RGB bytes untouched
    assert_eq!(result.get_pixel(32, 32).0, [200, 40, 40, 255]);
}

#[test]
fn only_mask_output_is_single_channel() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("in.png");
    let output = temp.path().join("mask.png");
    write_image(&input, 32, 32);

    let model = MockMaskModel::new(4);
    let options = RemovalOptions {
        only_mask: true,
        ..RemovalOptions::default()
    };
    process_one(&input, &output, &model, ResizePolicy::Keep, &options).unwrap();

    let mask = image::open(&output).unwrap();
    assert_eq!(mask.color(), ColorType::L8);
    assert_eq!(mask.dimensions(), (32, 32));
}

#[test]
fn fit_width_policy_applies_before_segmentation() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("tall.png");
    let output = temp.path().join("tall_out.png");
    write_image(&input, 64, 96);

    let model = MockMaskModel::new(0);
    process_one(
        &input,
        &output,
        &model,
        ResizePolicy::FitWidth(32),
        &RemovalOptions::default(),
    )
    .unwrap();

    let result = image::open(&output).unwrap();
    assert_eq!(result.dimensions(), (32, 48));
}

#[test]
fn bounded_policy_keeps_small_images_unchanged() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("small.png");
    let output = temp.path().join("small_out.png");
    write_image(&input, 64, 64);

    let model = MockMaskModel::new(0);
    process_one(
        &input,
        &output,
        &model,
        ResizePolicy::Bounded(100),
        &RemovalOptions::default(),
    )
    .unwrap();

    let result = image::open(&output).unwrap();
    assert_eq!(result.dimensions(), (64, 64));
}

#[test]
fn unwritable_output_is_an_output_error() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("in.png");
    write_image(&input, 16, 16);

    let model = MockMaskModel::new(0);
    let err = process_one(
        &input,
        &temp.path().join("no-such-dir").join("out.png"),
        &model,
        ResizePolicy::Keep,
        &RemovalOptions::default(),
    )
    .unwrap_err();

    assert!(matches!(err, BgremsError::OutputWrite { .. }));
}
