//! Intensity thresholding and the two region passes built on it.

use image::{GrayImage, Luma};
use ndarray::{Array2, Zip};

use crate::components::{self, BACKGROUND, FOREGROUND};
use crate::config::{CandidateConfig, RegionConfig};
use crate::enums::FilterMode;
use crate::morphology;
use crate::record::Candidate;
use crate::slice::SliceImage;

/// Map an 8-bit gray level onto the native range `0..=empirical_max`.
///
/// Integer arithmetic, truncating: `gray * empirical_max / 255`.
pub fn scale_gray_threshold(gray: u8, empirical_max: u32) -> u32 {
    (u64::from(gray) * u64::from(empirical_max) / 255) as u32
}

fn mask_where(image: &SliceImage, keep: impl Fn(u16) -> bool) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        if keep(image.get_pixel(x, y)) {
            Luma([FOREGROUND])
        } else {
            Luma([BACKGROUND])
        }
    })
}

/// Foreground wherever the native value is at most `threshold`.
pub fn mask_at_or_below(image: &SliceImage, threshold: i32) -> GrayImage {
    mask_where(image, |value| i32::from(value) <= threshold)
}

/// Foreground wherever the native value lies in `[low, high]`.
pub fn mask_within(image: &SliceImage, low: u32, high: u32) -> GrayImage {
    mask_where(image, |value| (low..=high).contains(&u32::from(value)))
}

/// Keep native values under the mask and paint `background` everywhere else.
/// Acquisition metadata is carried over.
pub fn apply_mask(image: &SliceImage, mask: &GrayImage, background: u16) -> SliceImage {
    let pixels: Array2<u16> = Zip::indexed(image.pixels()).par_map_collect(|(y, x), &value| {
        if mask.get_pixel(x as u32, y as u32).0[0] == BACKGROUND {
            background
        } else {
            value
        }
    });
    image.with_pixels(pixels)
}

/// Result of region extraction: the masked image and the mask behind it.
#[derive(Debug, Clone)]
pub struct RegionOutput {
    pub image: SliceImage,
    pub mask: GrayImage,
}

/// Threshold, close, drop border-touching regions and paint the rest of the
/// image with the background sentinel.
pub fn extract_region(image: &SliceImage, config: &RegionConfig) -> RegionOutput {
    let raw = mask_at_or_below(image, config.native_threshold());
    let closed = morphology::close_mask(&raw, config.closing_radius);
    let filtered = components::filter_regions(&closed, FilterMode::RemoveBorder);
    RegionOutput {
        image: apply_mask(image, &filtered.mask, config.background_value),
        mask: filtered.mask,
    }
}

/// Candidates found in a region image, with the mask they were measured on.
#[derive(Debug, Clone)]
pub struct CandidateOutput {
    pub candidates: Vec<Candidate>,
    pub mask: GrayImage,
}

/// Select the configured gray band, keep regions of at least the minimum size
/// and describe each survivor as a [`Candidate`].
pub fn detect_candidates(image: &SliceImage, config: &CandidateConfig) -> CandidateOutput {
    let low = scale_gray_threshold(config.bottom_threshold, config.empirical_max);
    let high = scale_gray_threshold(config.top_threshold, config.empirical_max);
    let band = mask_within(image, low, high);
    let filtered = components::filter_regions(
        &band,
        FilterMode::MinimumSize {
            width: config.min_width,
            height: config.min_height,
        },
    );
    CandidateOutput {
        candidates: components::candidates_from(&filtered),
        mask: filtered.mask,
    }
}
