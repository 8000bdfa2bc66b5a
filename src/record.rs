//! Values that leave the map phase, cross the shuffle and end up in the
//! output: the series key, per-image records and their candidates.

use std::{
    cmp::Ordering,
    hash::{Hash, Hasher},
};

use serde::Serialize;

/// Written in place of a missing string attribute.
pub const NULL_TOKEN: &str = "null";

/// Attributes shared by every image of one exam series.
///
/// Identity (equality, ordering and hashing) comes from the series instance
/// UID alone. A missing UID is the same identity as the literal `"null"`, the
/// value it turns into after a trip through the codec.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesKey {
    #[serde(rename = "seriesInstanceUID")]
    pub series_instance_uid: Option<String>,
    pub study_date: Option<String>,
    pub series_date: Option<String>,
    pub study_time: Option<String>,
    pub series_time: Option<String>,
    pub modality: Option<String>,
    pub manufacturer: Option<String>,
    pub institution_name: Option<String>,
    pub institution_address: Option<String>,
    pub station_name: Option<String>,
    pub study_description: Option<String>,
    pub patients_name: Option<String>,
    #[serde(rename = "patientsID")]
    pub patients_id: Option<String>,
    pub body_part_examined: Option<String>,
    pub slice_thickness: Option<String>,
    #[serde(rename = "kVP")]
    pub kvp: Option<String>,
    pub space_between_slices: Option<String>,
    pub pixel_spacing: Option<String>,
}

impl SeriesKey {
    pub fn with_uid(uid: impl Into<String>) -> Self {
        Self {
            series_instance_uid: Some(uid.into()),
            ..Self::default()
        }
    }

    pub fn uid(&self) -> &str {
        self.series_instance_uid.as_deref().unwrap_or(NULL_TOKEN)
    }
}

impl PartialEq for SeriesKey {
    fn eq(&self, other: &Self) -> bool {
        self.uid() == other.uid()
    }
}

impl Eq for SeriesKey {}

impl Hash for SeriesKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uid().hash(state);
    }
}

impl PartialOrd for SeriesKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SeriesKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.uid().cmp(other.uid())
    }
}

/// One detected shape inside the extracted region.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Top-left corner of the bounding box.
    pub x: i32,
    pub y: i32,
    /// Bounding box size counted in pixels, so a single pixel is 1 wide.
    pub width: u32,
    pub height: u32,
    pub perimeter: f64,
    pub enclosed_area: f64,
    /// `perimeter² / enclosed_area`, or 0 for a region that encloses no area.
    pub circularity: f64,
}

impl Candidate {
    pub fn new(x: i32, y: i32, width: u32, height: u32, perimeter: f64, enclosed_area: f64) -> Self {
        let circularity = if enclosed_area > 0.0 {
            perimeter * perimeter / enclosed_area
        } else {
            0.0
        };
        Self {
            x,
            y,
            width,
            height,
            perimeter,
            enclosed_area,
            circularity,
        }
    }
}

/// Per-image attributes plus the candidates found in that image.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    #[serde(rename = "SOPInstanceUID")]
    pub sop_instance_uid: Option<String>,
    pub image_date: Option<String>,
    pub image_time: Option<String>,
    pub acquisition_number: Option<String>,
    /// Instance number as stored; may carry padding whitespace.
    pub image_number: Option<String>,
    /// Three coordinates, backslash separated.
    pub image_position: Option<String>,
    /// Six direction cosines, backslash separated.
    pub image_orientation: Option<String>,
    pub candidates: Vec<Candidate>,
}

/// All images of one series, ascending by image number.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesRecord {
    pub key: SeriesKey,
    pub images: Vec<ImageRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn key_identity_is_the_uid() {
        let mut a = SeriesKey::with_uid("1.2.3");
        a.modality = Some("CT".into());
        let mut b = SeriesKey::with_uid("1.2.3");
        b.modality = Some("MR".into());
        b.patients_id = Some("other".into());

        assert_eq!(a, b);
        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
        assert_ne!(SeriesKey::with_uid("1.2.3"), SeriesKey::with_uid("1.2.4"));
    }

    #[test]
    fn missing_uid_matches_null_token() {
        assert_eq!(SeriesKey::default(), SeriesKey::with_uid("null"));
    }

    #[test]
    fn circularity_of_square() {
        let candidate = Candidate::new(3, 4, 6, 6, 20.0, 25.0);
        assert_eq!(candidate.circularity, 16.0);
    }

    #[test]
    fn zero_area_has_zero_circularity() {
        let candidate = Candidate::new(0, 0, 5, 5, 11.3, 0.0);
        assert_eq!(candidate.circularity, 0.0);
    }

    #[test]
    fn renders_original_field_names() {
        let record = SeriesRecord {
            key: SeriesKey::with_uid("1.2"),
            images: vec![ImageRecord {
                image_number: Some("1".into()),
                ..ImageRecord::default()
            }],
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["key"]["seriesInstanceUID"], "1.2");
        assert_eq!(json["key"]["modality"], serde_json::Value::Null);
        assert_eq!(json["images"][0]["imageNumber"], "1");
        assert!(json["key"].get("kVP").is_some());
        assert!(json["images"][0].get("SOPInstanceUID").is_some());
    }
}
