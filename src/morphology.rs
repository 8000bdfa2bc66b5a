use image::GrayImage;
use imageproc::{
    distance_transform::Norm,
    morphology::{dilate, erode},
};

/// Binary closing with a disk of the given radius: dilation, then erosion
/// with the same element. Merges gaps narrower than the disk while leaving
/// large outlines where they were.
///
/// A radius of zero leaves the mask unchanged.
pub fn close_mask(mask: &GrayImage, radius: u8) -> GrayImage {
    if radius == 0 {
        return mask.clone();
    }
    let dilated = dilate(mask, Norm::L2, radius);
    erode(&dilated, Norm::L2, radius)
}
