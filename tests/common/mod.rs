#![allow(dead_code)]

use std::path::{Path, PathBuf};

use dicom::core::{DataElement, PrimitiveValue, VR};
use dicom::object::{FileMetaTableBuilder, InMemDicomObject};
use dicom_dictionary_std::{tags, uids};

pub const SIZE: usize = 64;

/// Dark field around a body, a dark lung inside it and a 6x6 nodule at
/// (28, 28) in the lung. Row-major.
pub fn lung_phantom() -> Vec<u16> {
    let mut pixels = Vec::with_capacity(SIZE * SIZE);
    for y in 0..SIZE {
        for x in 0..SIZE {
            let body = (4..60).contains(&x) && (4..60).contains(&y);
            let lung = (16..48).contains(&x) && (16..48).contains(&y);
            let nodule = (28..34).contains(&x) && (28..34).contains(&y);
            pixels.push(if nodule {
                1000
            } else if lung || !body {
                100
            } else {
                1500
            });
        }
    }
    pixels
}

fn text(tag: dicom::core::Tag, vr: VR, value: &str) -> DataElement<InMemDicomObject> {
    DataElement::new(tag, vr, PrimitiveValue::from(value))
}

fn short(tag: dicom::core::Tag, value: u16) -> DataElement<InMemDicomObject> {
    DataElement::new(tag, VR::US, PrimitiveValue::from(value))
}

/// Write a single-frame 16-bit CT image and return its path.
pub fn write_scan(dir: &Path, name: &str, series_uid: &str, instance_number: &str, pixels: Vec<u16>) -> PathBuf {
    let sop_uid = format!("{series_uid}.{name}");
    let object = InMemDicomObject::from_element_iter([
        text(tags::SOP_CLASS_UID, VR::UI, uids::CT_IMAGE_STORAGE),
        text(tags::SOP_INSTANCE_UID, VR::UI, &sop_uid),
        text(tags::STUDY_DATE, VR::DA, "20240102"),
        text(tags::MODALITY, VR::CS, "CT"),
        text(tags::PATIENT_NAME, VR::PN, "Doe^Jane"),
        text(tags::PATIENT_ID, VR::LO, "P-1"),
        text(tags::SLICE_THICKNESS, VR::DS, "1.25"),
        text(tags::SERIES_INSTANCE_UID, VR::UI, series_uid),
        text(tags::INSTANCE_NUMBER, VR::IS, instance_number),
        text(tags::IMAGE_POSITION_PATIENT, VR::DS, "-150\\-150\\10"),
        short(tags::SAMPLES_PER_PIXEL, 1),
        text(tags::PHOTOMETRIC_INTERPRETATION, VR::CS, "MONOCHROME2"),
        short(tags::ROWS, SIZE as u16),
        short(tags::COLUMNS, SIZE as u16),
        text(tags::PIXEL_SPACING, VR::DS, "0.7\\0.7"),
        short(tags::BITS_ALLOCATED, 16),
        short(tags::BITS_STORED, 16),
        short(tags::HIGH_BIT, 15),
        short(tags::PIXEL_REPRESENTATION, 0),
        DataElement::new(tags::PIXEL_DATA, VR::OW, PrimitiveValue::U16(pixels.into())),
    ]);

    let file = object
        .with_meta(
            FileMetaTableBuilder::new()
                .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
                .media_storage_sop_class_uid(uids::CT_IMAGE_STORAGE)
                .media_storage_sop_instance_uid(&sop_uid),
        )
        .expect("should have built the file meta group");

    let path = dir.join(name);
    file.write_to_file(&path).expect("should have written the scan");
    path
}
