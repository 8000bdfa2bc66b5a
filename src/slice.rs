use image::{GrayImage, ImageBuffer, Luma};
use ndarray::Array2;
use rayon::prelude::*;

/// Acquisition details that travel with the pixels through every stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcquisitionInfo {
    pub bits_stored: u16,
    pub rescale_slope: Option<f64>,
    pub rescale_intercept: Option<f64>,
    /// Row and column spacing in millimetres.
    pub pixel_spacing: Option<(f32, f32)>,
}

/// One decoded frame at its native bit depth, indexed `[[y, x]]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceImage {
    pixels: Array2<u16>,
    info: AcquisitionInfo,
}

impl SliceImage {
    pub fn new(pixels: Array2<u16>, info: AcquisitionInfo) -> Self {
        Self { pixels, info }
    }

    pub fn from_pixels(pixels: Array2<u16>) -> Self {
        Self::new(
            pixels,
            AcquisitionInfo {
                bits_stored: 16,
                ..AcquisitionInfo::default()
            },
        )
    }

    pub fn width(&self) -> u32 {
        self.pixels.ncols() as u32
    }

    pub fn height(&self) -> u32 {
        self.pixels.nrows() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    #[inline]
    pub fn get_pixel(&self, x: u32, y: u32) -> u16 {
        self.pixels[[y as usize, x as usize]]
    }

    pub fn pixels(&self) -> &Array2<u16> {
        &self.pixels
    }

    pub fn info(&self) -> &AcquisitionInfo {
        &self.info
    }

    /// Same metadata, new pixels.
    pub fn with_pixels(&self, pixels: Array2<u16>) -> Self {
        Self {
            pixels,
            info: self.info.clone(),
        }
    }

    #[inline]
    fn normalize_to_u8(value: u16, min: u16, max: u16) -> u8 {
        if max <= min {
            return 0;
        }
        (((value - min) as f32 / (max - min) as f32) * 255.0).clamp(0.0, 255.0) as u8
    }

    /// 8-bit working copy, stretched between the darkest and brightest pixel.
    pub fn to_gray8(&self) -> GrayImage {
        let min = self.pixels.iter().copied().min().unwrap_or(0);
        let max = self.pixels.iter().copied().max().unwrap_or(0);
        let data: Vec<u8> = self
            .pixels
            .as_standard_layout()
            .as_slice()
            .unwrap_or(&[])
            .par_iter()
            .map(|&v| Self::normalize_to_u8(v, min, max))
            .collect();
        ImageBuffer::<Luma<u8>, _>::from_raw(self.width(), self.height(), data)
            .unwrap_or_else(|| GrayImage::new(self.width(), self.height()))
    }
}
