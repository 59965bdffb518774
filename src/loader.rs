use std::path::Path;

use image::{imageops::FilterType, DynamicImage, GenericImageView};

use crate::errors::{BgremsError, Result};

/// How an input is scaled before segmentation. Both scaling policies
/// preserve aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizePolicy {
    /// Scale to exactly this width, for document-shaped inputs.
    FitWidth(u32),
    /// Downscale only when the longer side exceeds the bound, for photos.
    Bounded(u32),
    /// Pass the image through untouched.
    Keep,
}

/// Reads an image and applies the resize policy.
pub fn load_and_resize(path: &Path, policy: ResizePolicy) -> Result<DynamicImage> {
    let image = image::open(path).map_err(|e| BgremsError::Image {
        path: path.display().to_string(),
        operation: "decode".to_string(),
        source: Box::new(e),
    })?;
    Ok(resize(image, policy))
}

pub fn resize(image: DynamicImage, policy: ResizePolicy) -> DynamicImage {
    let (width, height) = image.dimensions();
    match policy {
        ResizePolicy::Keep => image,
        ResizePolicy::FitWidth(target) => {
            if width == target {
                return image;
            }
            let target_height = scaled(height, target, width);
            image.resize_exact(target, target_height, FilterType::Lanczos3)
        }
        ResizePolicy::Bounded(bound) => {
            let longer = width.max(height);
            if longer <= bound {
                return image;
            }
            image.resize_exact(
                scaled(width, bound, longer),
                scaled(height, bound, longer),
                FilterType::Lanczos3,
            )
        }
    }
}

fn scaled(side: u32, numerator: u32, denominator: u32) -> u32 {
    let scaled = (f64::from(side) * f64::from(numerator) / f64::from(denominator)).round();
    (scaled as u32).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
    }

    #[test]
    fn fit_width_scales_height_proportionally() {
        let resized = resize(image(2000, 3000), ResizePolicy::FitWidth(1240));
        assert_eq!(resized.dimensions(), (1240, 1860));
    }

    #[test]
    fn fit_width_upscales_narrow_inputs() {
        let resized = resize(image(620, 800), ResizePolicy::FitWidth(1240));
        assert_eq!(resized.dimensions(), (1240, 1600));
    }

    #[test]
    fn fit_width_is_identity_at_target() {
        let resized = resize(image(1240, 777), ResizePolicy::FitWidth(1240));
        assert_eq!(resized.dimensions(), (1240, 777));
    }

    #[test]
    fn bounded_leaves_small_images_untouched() {
        let resized = resize(image(800, 600), ResizePolicy::Bounded(1500));
        assert_eq!(resized.dimensions(), (800, 600));
    }

    #[test]
    fn bounded_scales_both_sides_by_the_longer_side() {
        let resized = resize(image(4000, 2000), ResizePolicy::Bounded(1500));
        assert_eq!(resized.dimensions(), (1500, 750));

        let resized = resize(image(2000, 4000), ResizePolicy::Bounded(1500));
        assert_eq!(resized.dimensions(), (750, 1500));
    }

    #[test]
    fn keep_never_resizes() {
        let resized = resize(image(4000, 2000), ResizePolicy::Keep);
        assert_eq!(resized.dimensions(), (4000, 2000));
    }

    #[test]
    fn load_reports_the_offending_path() {
        let err = load_and_resize(Path::new("missing.jpg"), ResizePolicy::Keep).unwrap_err();
        match err {
            BgremsError::Image { path, .. } => assert!(path.contains("missing.jpg")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
