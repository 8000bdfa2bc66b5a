//! Decoding one whole-file record into the values the pipeline works on.

use dicom::{
    core::Tag,
    object::{DefaultDicomObject, from_reader},
    pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use ndarray::{Array2, s};
use thiserror::Error;

use crate::record::{ImageRecord, SeriesKey};
use crate::slice::{AcquisitionInfo, SliceImage};

const PREAMBLE_LENGTH: usize = 128;
const MAGIC: &[u8; 4] = b"DICM";

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),

    #[error("Pixel data error: {0}")]
    PixelData(#[from] dicom::pixeldata::Error),

    #[error("Pixel data has no frames")]
    NoFrames,
}

/// A decoded scan: its series, its own attributes and its first frame.
#[derive(Debug, Clone)]
pub struct ScanImage {
    pub key: SeriesKey,
    /// Attributes only; candidates are filled in after the pipeline ran.
    pub record: ImageRecord,
    pub slice: SliceImage,
}

impl ScanImage {
    /// Parse a complete file, with or without its 128-byte preamble.
    pub fn decode(bytes: &[u8]) -> Result<Self, ScanError> {
        let object = from_reader(strip_preamble(bytes))?;
        let slice = decode_slice(&object)?;
        Ok(Self {
            key: series_key(&object),
            record: image_record(&object),
            slice,
        })
    }
}

fn strip_preamble(bytes: &[u8]) -> &[u8] {
    match bytes.get(PREAMBLE_LENGTH..PREAMBLE_LENGTH + MAGIC.len()) {
        Some(magic) if magic == MAGIC => &bytes[PREAMBLE_LENGTH..],
        _ => bytes,
    }
}

fn text(object: &DefaultDicomObject, tag: Tag) -> Option<String> {
    object
        .element(tag)
        .ok()
        .and_then(|element| element.to_str().ok())
        .map(|value| value.trim_matches(|c: char| c == '\0' || c.is_whitespace()).to_string())
        .filter(|value| !value.is_empty())
}

fn series_key(object: &DefaultDicomObject) -> SeriesKey {
    SeriesKey {
        series_instance_uid: text(object, tags::SERIES_INSTANCE_UID),
        study_date: text(object, tags::STUDY_DATE),
        series_date: text(object, tags::SERIES_DATE),
        study_time: text(object, tags::STUDY_TIME),
        series_time: text(object, tags::SERIES_TIME),
        modality: text(object, tags::MODALITY),
        manufacturer: text(object, tags::MANUFACTURER),
        institution_name: text(object, tags::INSTITUTION_NAME),
        institution_address: text(object, tags::INSTITUTION_ADDRESS),
        station_name: text(object, tags::STATION_NAME),
        study_description: text(object, tags::STUDY_DESCRIPTION),
        patients_name: text(object, tags::PATIENT_NAME),
        patients_id: text(object, tags::PATIENT_ID),
        body_part_examined: text(object, tags::BODY_PART_EXAMINED),
        slice_thickness: text(object, tags::SLICE_THICKNESS),
        kvp: text(object, tags::KVP),
        space_between_slices: text(object, tags::SPACING_BETWEEN_SLICES),
        pixel_spacing: text(object, tags::PIXEL_SPACING),
    }
}

fn image_record(object: &DefaultDicomObject) -> ImageRecord {
    ImageRecord {
        sop_instance_uid: text(object, tags::SOP_INSTANCE_UID),
        image_date: text(object, tags::CONTENT_DATE),
        image_time: text(object, tags::CONTENT_TIME),
        acquisition_number: text(object, tags::ACQUISITION_NUMBER),
        image_number: text(object, tags::INSTANCE_NUMBER),
        image_position: text(object, tags::IMAGE_POSITION_PATIENT),
        image_orientation: text(object, tags::IMAGE_ORIENTATION_PATIENT),
        candidates: Vec::new(),
    }
}

fn acquisition_info(object: &DefaultDicomObject) -> AcquisitionInfo {
    let float = |tag| object.element(tag).ok().and_then(|e| e.to_float64().ok());
    AcquisitionInfo {
        bits_stored: object
            .element(tags::BITS_STORED)
            .ok()
            .and_then(|e| e.to_int::<u16>().ok())
            .unwrap_or(16),
        rescale_slope: float(tags::RESCALE_SLOPE),
        rescale_intercept: float(tags::RESCALE_INTERCEPT),
        pixel_spacing: object
            .element(tags::PIXEL_SPACING)
            .ok()
            .and_then(|e| e.to_multi_float32().ok())
            .and_then(|spacing| Some((*spacing.first()?, *spacing.get(1)?))),
    }
}

/// First frame, first sample, as stored: no modality or VOI transform.
fn decode_slice(object: &DefaultDicomObject) -> Result<SliceImage, ScanError> {
    let pixel_data = object.decode_pixel_data()?;
    let options = ConvertOptions::new()
        .with_modality_lut(ModalityLutOption::None)
        .with_voi_lut(VoiLutOption::Identity);
    let frames = pixel_data.to_ndarray_with_options::<u16>(&options)?;
    if frames.shape().first().copied().unwrap_or(0) == 0 {
        return Err(ScanError::NoFrames);
    }
    let pixels: Array2<u16> = frames.slice_move(s![0, .., .., 0]);
    Ok(SliceImage::new(pixels, acquisition_info(object)))
}
