use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use image::GrayImage;
use log::debug;
use thiserror::Error;

use crate::record::SeriesRecord;
use crate::slice::SliceImage;

pub const SUCCESS_MARKER: &str = "_SUCCESS";

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to render record: {0}")]
    Render(#[from] serde_json::Error),

    #[error("failed to write {path}: {source}")]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> OutputError + '_ {
    move |source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Remove whatever a previous run left in `dir` and recreate it empty.
pub fn prepare_output_dir(dir: &Path) -> Result<(), OutputError> {
    if dir.exists() {
        debug!("Removing previous output {}", dir.display());
        fs::remove_dir_all(dir).map_err(io_error(dir))?;
    }
    fs::create_dir_all(dir).map_err(io_error(dir))
}

pub fn part_file_name(partition: usize) -> String {
    format!("part-r-{partition:05}")
}

/// Write one partition as JSON lines, one series per line, in the given order.
pub fn write_partition(
    dir: &Path,
    partition: usize,
    records: &[SeriesRecord],
) -> Result<PathBuf, OutputError> {
    let path = dir.join(part_file_name(partition));
    let file = File::create(&path).map_err(io_error(&path))?;
    let mut writer = BufWriter::new(file);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n").map_err(io_error(&path))?;
    }
    writer.flush().map_err(io_error(&path))?;
    Ok(path)
}

pub fn mark_success(dir: &Path) -> Result<(), OutputError> {
    let path = dir.join(SUCCESS_MARKER);
    File::create(&path).map_err(io_error(&path))?;
    Ok(())
}

/// Writes 8-bit previews of intermediate results for inspection.
#[derive(Debug, Clone)]
pub struct DebugDumper {
    dir: PathBuf,
}

impl DebugDumper {
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self, OutputError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(io_error(&dir))?;
        Ok(Self { dir })
    }

    fn save(&self, image: &GrayImage, name: String) -> Result<(), OutputError> {
        let path = self.dir.join(name);
        image
            .save(&path)
            .map_err(|source| OutputError::Image { path, source })
    }

    /// `<stem>-region.png` and, when present, `<stem>-candidates.png`.
    pub fn dump(
        &self,
        stem: &str,
        region: &SliceImage,
        candidate_mask: Option<&GrayImage>,
    ) -> Result<(), OutputError> {
        self.save(&region.to_gray8(), format!("{stem}-region.png"))?;
        if let Some(mask) = candidate_mask {
            self.save(mask, format!("{stem}-candidates.png"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ImageRecord, SeriesKey};
    use ndarray::Array2;

    #[test]
    fn part_files_are_zero_padded() {
        assert_eq!(part_file_name(0), "part-r-00000");
        assert_eq!(part_file_name(12), "part-r-00012");
    }

    #[test]
    fn prepare_clears_previous_run() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("out");
        fs::create_dir_all(out.join("nested")).unwrap();
        fs::write(out.join("stale"), b"old").unwrap();

        prepare_output_dir(&out).unwrap();

        assert!(out.is_dir());
        assert_eq!(fs::read_dir(&out).unwrap().count(), 0);
    }

    #[test]
    fn partition_is_one_json_line_per_series() {
        let tmp = tempfile::tempdir().unwrap();
        let records = vec![
            SeriesRecord {
                key: SeriesKey::with_uid("1"),
                images: vec![ImageRecord::default()],
            },
            SeriesRecord {
                key: SeriesKey::with_uid("2"),
                images: Vec::new(),
            },
        ];

        let path = write_partition(tmp.path(), 3, &records).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();

        assert!(path.ends_with("part-r-00003"));
        assert_eq!(lines.len(), 2);
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["key"]["seriesInstanceUID"], "2");
    }

    #[test]
    fn debug_dump_writes_pngs() {
        let tmp = tempfile::tempdir().unwrap();
        let dumper = DebugDumper::create(tmp.path().join("debug")).unwrap();
        let region = SliceImage::from_pixels(Array2::from_elem((4, 4), 2000));
        let mask = GrayImage::new(4, 4);

        dumper.dump("scan", &region, Some(&mask)).unwrap();

        let written = image::open(tmp.path().join("debug/scan-region.png")).unwrap();
        assert_eq!((written.width(), written.height()), (4, 4));
        assert!(tmp.path().join("debug/scan-candidates.png").exists());
    }
}
