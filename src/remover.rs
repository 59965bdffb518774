use image::DynamicImage;

use crate::config::RemovalOptions;
use crate::errors::{BgremsError, Result};
use crate::mask;
use crate::session::MaskModel;

/// Runs segmentation and composites the mask into an RGBA image whose
/// background pixels are fully transparent. With `only_mask` the gray mask
/// itself is returned instead.
pub fn remove_background<M: MaskModel + ?Sized>(
    image: &DynamicImage,
    model: &M,
    options: &RemovalOptions,
) -> Result<DynamicImage> {
    if options.alpha_matting
        && options.alpha_matting_foreground_threshold
            <= options.alpha_matting_background_threshold
    {
        return Err(BgremsError::Validation {
            field: "alpha_matting".to_string(),
            reason: format!(
                "foreground threshold {} must exceed background threshold {}",
                options.alpha_matting_foreground_threshold,
                options.alpha_matting_background_threshold
            ),
        });
    }

    let rgb = image.to_rgb8();
    let probabilities = model.infer_mask(&rgb)?;
    let mut alpha = mask::to_luma8(&probabilities);

    if options.post_process_mask {
        alpha = mask::smooth(&alpha);
    }
    if options.only_mask {
        return Ok(DynamicImage::ImageLuma8(alpha));
    }
    if options.alpha_matting {
        alpha = mask::matte(
            &alpha,
            options.alpha_matting_foreground_threshold,
            options.alpha_matting_background_threshold,
            options.alpha_matting_erode_size,
        );
    }

    Ok(DynamicImage::ImageRgba8(mask::apply_alpha(&rgb, &alpha)?))
}
