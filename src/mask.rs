use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage, RgbaImage};
use imageproc::{distance_transform::Norm, filter, map::map_colors, morphology};

use crate::errors::{BgremsError, Result};

/// Foreground-probability mask as produced by the engine: one f32 per pixel
/// in [0, 1], at the source image's dimensions.
pub type MaskBuffer = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Scales a probability mask to 8-bit alpha values.
pub fn to_luma8(mask: &MaskBuffer) -> GrayImage {
    map_colors(mask, |Luma([value])| {
        Luma([(value.clamp(0.0, 1.0) * 255.0).round() as u8])
    })
}

/// Attaches the mask to the image as its alpha channel. RGB bytes pass
/// through unchanged.
pub fn apply_alpha(image: &RgbImage, mask: &GrayImage) -> Result<RgbaImage> {
    if image.dimensions() != mask.dimensions() {
        return Err(BgremsError::Validation {
            field: "mask".to_string(),
            reason: format!(
                "dimensions {:?} do not match image {:?}",
                mask.dimensions(),
                image.dimensions()
            ),
        });
    }

    let pixels = image
        .pixels()
        .zip(mask.pixels())
        .flat_map(|(&Rgb([red, green, blue]), &Luma([alpha]))| [red, green, blue, alpha])
        .collect::<Vec<u8>>();

    RgbaImage::from_raw(image.width(), image.height(), pixels).ok_or_else(|| {
        BgremsError::Validation {
            field: "mask".to_string(),
            reason: "composited buffer has the wrong length".to_string(),
        }
    })
}

/// Mask edge smoothing: 3x3 morphological open, Gaussian blur at sigma 2,
/// then re-binarize at the midpoint.
pub fn smooth(mask: &GrayImage) -> GrayImage {
    let opened = morphology::open(mask, Norm::LInf, 1);
    let blurred = filter::gaussian_blur_f32(&opened, 2.0);
    map_colors(&blurred, |Luma([value])| {
        Luma([if value < 127 { 0 } else { 255 }])
    })
}

/// Soft-edge alpha from threshold trimap: pixels at or above the foreground
/// threshold (after eroding that region) stay opaque, pixels at or below the
/// background threshold go transparent, and the band in between gets a
/// linear alpha ramp.
pub fn matte(
    mask: &GrayImage,
    foreground_threshold: u8,
    background_threshold: u8,
    erode_size: u8,
) -> GrayImage {
    let foreground = map_colors(mask, |Luma([value])| {
        Luma([if value >= foreground_threshold { 255u8 } else { 0 }])
    });
    let foreground = morphology::erode(&foreground, Norm::LInf, erode_size);

    let span = f32::from(foreground_threshold) - f32::from(background_threshold);
    let mut matted = GrayImage::new(mask.width(), mask.height());
    for (x, y, pixel) in mask.enumerate_pixels() {
        let Luma([value]) = *pixel;
        let alpha = if foreground.get_pixel(x, y)[0] == 255 {
            255
        } else if value <= background_threshold {
            0
        } else {
            let ramp = (f32::from(value) - f32::from(background_threshold)) / span;
            (ramp.min(1.0) * 255.0).round() as u8
        };
        matted.put_pixel(x, y, Luma([alpha]));
    }
    matted
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn mask_of(width: u32, height: u32, value: u8) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([value]))
    }

    #[test]
    fn to_luma8_scales_and_clamps() {
        let mut mask = MaskBuffer::new(2, 1);
        mask.put_pixel(0, 0, Luma([0.5]));
        mask.put_pixel(1, 0, Luma([1.7]));

        let luma = to_luma8(&mask);
        assert_eq!(luma.get_pixel(0, 0)[0], 128);
        assert_eq!(luma.get_pixel(1, 0)[0], 255);
    }

    #[test]
    fn apply_alpha_preserves_rgb_bytes() {
        let image = RgbImage::from_pixel(2, 2, Rgb([10, 20, 30]));
        let mut mask = mask_of(2, 2, 255);
        mask.put_pixel(1, 1, Luma([0]));

        let rgba = apply_alpha(&image, &mask).unwrap();
        assert_eq!(rgba.get_pixel(0, 0), &Rgba([10, 20, 30, 255]));
        assert_eq!(rgba.get_pixel(1, 1), &Rgba([10, 20, 30, 0]));
    }

    #[test]
    fn apply_alpha_rejects_mismatched_dimensions() {
        let image = RgbImage::new(4, 4);
        let mask = mask_of(2, 2, 255);
        assert!(matches!(
            apply_alpha(&image, &mask),
            Err(BgremsError::Validation { .. })
        ));
    }

    #[test]
    fn smooth_is_stable_on_uniform_masks() {
        assert!(smooth(&mask_of(8, 8, 255)).pixels().all(|p| p[0] == 255));
        assert!(smooth(&mask_of(8, 8, 0)).pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn matte_ramps_between_thresholds() {
        let mut mask = mask_of(4, 1, 0);
        mask.put_pixel(0, 0, Luma([5]));
        mask.put_pixel(1, 0, Luma([125]));
        mask.put_pixel(2, 0, Luma([240]));
        mask.put_pixel(3, 0, Luma([255]));

        let matted = matte(&mask, 240, 10, 0);
        assert_eq!(matted.get_pixel(0, 0)[0], 0);
        assert_eq!(matted.get_pixel(1, 0)[0], 128);
        assert_eq!(matted.get_pixel(2, 0)[0], 255);
        assert_eq!(matted.get_pixel(3, 0)[0], 255);
    }

    #[test]
    fn matte_erosion_softens_the_boundary() {
        // 255 block next to a 0 block; with erosion 1 the pixels touching
        // the background lose their hard-foreground status and fall back to
        // the ramp (fully ramped here, so still 255), while background
        // stays 0.
        let mut mask = mask_of(4, 1, 255);
        mask.put_pixel(3, 0, Luma([0]));

        let matted = matte(&mask, 240, 10, 1);
        assert_eq!(matted.get_pixel(3, 0)[0], 0);
        assert_eq!(matted.get_pixel(0, 0)[0], 255);
    }
}
