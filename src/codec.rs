//! Fixed-order binary encoding of the records exchanged between the map and
//! reduce phases.
//!
//! The layout is the one of Hadoop `DataOutput` writables, so files written by
//! earlier runs stay readable:
//!
//!  - strings: zero-compressed variable-length byte count, then UTF-8 bytes
//!  - ints: 4 bytes, big-endian
//!  - doubles: 8 bytes, big-endian IEEE-754
//!  - lists: an int count followed by the elements
//!
//! There is no version tag and no optional field. A missing string is written
//! as `"null"` and therefore reads back as `Some("null")`.

use std::io::{self, Read, Write};

use thiserror::Error;

use crate::record::{Candidate, ImageRecord, NULL_TOKEN, SeriesKey, SeriesRecord};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("negative length {0}")]
    NegativeLength(i64),

    #[error("string is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("length {0} does not fit a record field")]
    Oversized(usize),

    #[error("invalid pixel dimension {0}")]
    InvalidDimension(f64),

    #[error("{0} trailing bytes after record")]
    TrailingBytes(usize),
}

pub trait Encode {
    fn encode<W: Write>(&self, out: &mut W) -> Result<(), CodecError>;

    fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        Ok(buf)
    }
}

pub trait Decode: Sized {
    fn decode<R: Read>(input: &mut R) -> Result<Self, CodecError>;

    /// Decode a value that must span the whole buffer.
    fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut cursor = bytes;
        let value = Self::decode(&mut cursor)?;
        if !cursor.is_empty() {
            return Err(CodecError::TrailingBytes(cursor.len()));
        }
        Ok(value)
    }
}

pub fn write_vlong<W: Write>(value: i64, out: &mut W) -> Result<(), CodecError> {
    if (-112..=127).contains(&value) {
        out.write_all(&[value as u8])?;
        return Ok(());
    }

    let (magnitude, mut marker) = if value < 0 {
        (!value, -120i64)
    } else {
        (value, -112i64)
    };
    let mut tmp = magnitude;
    while tmp != 0 {
        tmp >>= 8;
        marker -= 1;
    }
    out.write_all(&[marker as u8])?;

    let byte_count = if marker < -120 {
        -(marker + 120)
    } else {
        -(marker + 112)
    };
    for idx in (0..byte_count).rev() {
        out.write_all(&[(magnitude >> (idx * 8)) as u8])?;
    }
    Ok(())
}

pub fn read_vlong<R: Read>(input: &mut R) -> Result<i64, CodecError> {
    let first = read_array::<1, _>(input)?[0] as i8;
    let first = i64::from(first);
    if first >= -112 {
        return Ok(first);
    }

    let byte_count = if first < -120 {
        -(first + 120)
    } else {
        -(first + 112)
    };
    let mut value = 0i64;
    for _ in 0..byte_count {
        value = (value << 8) | i64::from(read_array::<1, _>(input)?[0]);
    }
    Ok(if first < -120 { !value } else { value })
}

pub fn write_int<W: Write>(value: i32, out: &mut W) -> Result<(), CodecError> {
    out.write_all(&value.to_be_bytes())?;
    Ok(())
}

pub fn read_int<R: Read>(input: &mut R) -> Result<i32, CodecError> {
    Ok(i32::from_be_bytes(read_array(input)?))
}

pub fn write_double<W: Write>(value: f64, out: &mut W) -> Result<(), CodecError> {
    out.write_all(&value.to_bits().to_be_bytes())?;
    Ok(())
}

pub fn read_double<R: Read>(input: &mut R) -> Result<f64, CodecError> {
    Ok(f64::from_bits(u64::from_be_bytes(read_array(input)?)))
}

pub fn write_string<W: Write>(value: Option<&str>, out: &mut W) -> Result<(), CodecError> {
    let bytes = value.unwrap_or(NULL_TOKEN).as_bytes();
    write_vlong(bytes.len() as i64, out)?;
    out.write_all(bytes)?;
    Ok(())
}

pub fn read_string<R: Read>(input: &mut R) -> Result<Option<String>, CodecError> {
    let length = read_vlong(input)?;
    let length = u64::try_from(length).map_err(|_| CodecError::NegativeLength(length))?;

    let mut bytes = Vec::new();
    input.by_ref().take(length).read_to_end(&mut bytes)?;
    if (bytes.len() as u64) < length {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }
    Ok(Some(String::from_utf8(bytes)?))
}

fn write_count<W: Write>(count: usize, out: &mut W) -> Result<(), CodecError> {
    let count = i32::try_from(count).map_err(|_| CodecError::Oversized(count))?;
    write_int(count, out)
}

fn read_count<R: Read>(input: &mut R) -> Result<usize, CodecError> {
    let count = read_int(input)?;
    usize::try_from(count).map_err(|_| CodecError::NegativeLength(i64::from(count)))
}

fn read_array<const N: usize, R: Read>(input: &mut R) -> Result<[u8; N], CodecError> {
    let mut buf = [0u8; N];
    input.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_dimension<R: Read>(input: &mut R) -> Result<u32, CodecError> {
    let value = read_double(input)?;
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 || value > f64::from(u32::MAX) {
        return Err(CodecError::InvalidDimension(value));
    }
    Ok(value as u32)
}

fn decode_list<T: Decode, R: Read>(input: &mut R) -> Result<Vec<T>, CodecError> {
    let count = read_count(input)?;
    // Corrupt counts must not turn into huge allocations.
    let mut items = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        items.push(T::decode(input)?);
    }
    Ok(items)
}

fn encode_list<T: Encode, W: Write>(items: &[T], out: &mut W) -> Result<(), CodecError> {
    write_count(items.len(), out)?;
    items.iter().try_for_each(|item| item.encode(out))
}

impl Encode for SeriesKey {
    fn encode<W: Write>(&self, out: &mut W) -> Result<(), CodecError> {
        [
            &self.series_instance_uid,
            &self.study_date,
            &self.series_date,
            &self.study_time,
            &self.series_time,
            &self.modality,
            &self.manufacturer,
            &self.institution_name,
            &self.institution_address,
            &self.station_name,
            &self.study_description,
            &self.patients_name,
            &self.patients_id,
            &self.body_part_examined,
            &self.slice_thickness,
            &self.kvp,
            &self.space_between_slices,
            &self.pixel_spacing,
        ]
        .into_iter()
        .try_for_each(|field| write_string(field.as_deref(), out))
    }
}

impl Decode for SeriesKey {
    fn decode<R: Read>(input: &mut R) -> Result<Self, CodecError> {
        Ok(Self {
            series_instance_uid: read_string(input)?,
            study_date: read_string(input)?,
            series_date: read_string(input)?,
            study_time: read_string(input)?,
            series_time: read_string(input)?,
            modality: read_string(input)?,
            manufacturer: read_string(input)?,
            institution_name: read_string(input)?,
            institution_address: read_string(input)?,
            station_name: read_string(input)?,
            study_description: read_string(input)?,
            patients_name: read_string(input)?,
            patients_id: read_string(input)?,
            body_part_examined: read_string(input)?,
            slice_thickness: read_string(input)?,
            kvp: read_string(input)?,
            space_between_slices: read_string(input)?,
            pixel_spacing: read_string(input)?,
        })
    }
}

impl Encode for Candidate {
    fn encode<W: Write>(&self, out: &mut W) -> Result<(), CodecError> {
        write_double(self.circularity, out)?;
        write_double(self.enclosed_area, out)?;
        write_double(self.perimeter, out)?;
        write_double(f64::from(self.width), out)?;
        write_double(f64::from(self.height), out)?;
        write_int(self.x, out)?;
        write_int(self.y, out)
    }
}

impl Decode for Candidate {
    fn decode<R: Read>(input: &mut R) -> Result<Self, CodecError> {
        let circularity = read_double(input)?;
        let enclosed_area = read_double(input)?;
        let perimeter = read_double(input)?;
        let width = read_dimension(input)?;
        let height = read_dimension(input)?;
        let x = read_int(input)?;
        let y = read_int(input)?;
        Ok(Self {
            x,
            y,
            width,
            height,
            perimeter,
            enclosed_area,
            circularity,
        })
    }
}

impl Encode for ImageRecord {
    fn encode<W: Write>(&self, out: &mut W) -> Result<(), CodecError> {
        write_string(self.sop_instance_uid.as_deref(), out)?;
        write_string(self.image_date.as_deref(), out)?;
        write_string(self.image_time.as_deref(), out)?;
        write_string(self.acquisition_number.as_deref(), out)?;
        write_string(self.image_number.as_deref(), out)?;
        write_string(self.image_position.as_deref(), out)?;
        write_string(self.image_orientation.as_deref(), out)?;
        encode_list(&self.candidates, out)
    }
}

impl Decode for ImageRecord {
    fn decode<R: Read>(input: &mut R) -> Result<Self, CodecError> {
        Ok(Self {
            sop_instance_uid: read_string(input)?,
            image_date: read_string(input)?,
            image_time: read_string(input)?,
            acquisition_number: read_string(input)?,
            image_number: read_string(input)?,
            image_position: read_string(input)?,
            image_orientation: read_string(input)?,
            candidates: decode_list(input)?,
        })
    }
}

impl Encode for SeriesRecord {
    fn encode<W: Write>(&self, out: &mut W) -> Result<(), CodecError> {
        self.key.encode(out)?;
        encode_list(&self.images, out)
    }
}

impl Decode for SeriesRecord {
    fn decode<R: Read>(input: &mut R) -> Result<Self, CodecError> {
        Ok(Self {
            key: SeriesKey::decode(input)?,
            images: decode_list(input)?,
        })
    }
}
