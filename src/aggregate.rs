use thiserror::Error;

use crate::record::{ImageRecord, SeriesKey, SeriesRecord};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregateError {
    #[error("series {series}: image number {value:?} is not an integer")]
    InvalidImageNumber { series: String, value: String },
    #[error("series {series}: image without an image number")]
    MissingImageNumber { series: String },
}

/// Numeric value of an image number with every whitespace character removed,
/// so `" 1 2"` reads as 12.
pub fn parse_image_number(raw: &str) -> Option<i64> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    compact.parse().ok()
}

/// Build the record of one series from its images, delivered in any order.
///
/// Every image is cloned before sorting, so the input may be backed by
/// storage that is reused between items. Images with equal numbers keep
/// their relative input order.
pub fn aggregate<'a>(
    key: &SeriesKey,
    values: impl IntoIterator<Item = &'a ImageRecord>,
) -> Result<SeriesRecord, AggregateError> {
    let mut numbered = Vec::new();
    for image in values {
        let number = image_number(key, image)?;
        numbered.push((number, image.clone()));
    }
    numbered.sort_by_key(|(number, _)| *number);

    Ok(SeriesRecord {
        key: key.clone(),
        images: numbered.into_iter().map(|(_, image)| image).collect(),
    })
}

fn image_number(key: &SeriesKey, image: &ImageRecord) -> Result<i64, AggregateError> {
    let raw = image
        .image_number
        .as_deref()
        .ok_or_else(|| AggregateError::MissingImageNumber {
            series: key.uid().to_string(),
        })?;
    parse_image_number(raw).ok_or_else(|| AggregateError::InvalidImageNumber {
        series: key.uid().to_string(),
        value: raw.to_string(),
    })
}
