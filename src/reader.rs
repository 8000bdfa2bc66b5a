use std::{fs::File, io::Read, path::PathBuf};

use thiserror::Error;

use crate::split::{FileGroup, FileSplit};

/// Largest record a reader hands out, matching a signed 32-bit length.
pub const MAX_RECORD_LENGTH: u64 = i32::MAX as u64;

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("{path} is {length} bytes, longer than the {MAX_RECORD_LENGTH} byte record limit")]
    TooLarge { path: PathBuf, length: u64 },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ReaderError {
    /// Whether a fresh attempt at the same group could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

/// A file read in one piece. Whole-file records carry no key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WholeFileRecord {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

/// Yields exactly one record: the full content of one file.
///
/// Holds no state beyond "already read", so a failed attempt is retried by
/// building a new reader.
#[derive(Debug)]
pub struct WholeFileReader {
    path: PathBuf,
    length: usize,
    processed: bool,
}

impl WholeFileReader {
    /// # Errors
    ///
    /// [`ReaderError::TooLarge`] when the file cannot fit in one record. This
    /// is not retryable.
    pub fn new(split: &FileSplit) -> Result<Self, ReaderError> {
        if split.length > MAX_RECORD_LENGTH {
            return Err(ReaderError::TooLarge {
                path: split.path.clone(),
                length: split.length,
            });
        }
        Ok(Self {
            path: split.path.clone(),
            length: split.length as usize,
            processed: false,
        })
    }

    pub fn is_processed(&self) -> bool {
        self.processed
    }

    /// The file content on the first call, `None` afterwards.
    ///
    /// The buffer is only returned once it has been filled completely; a
    /// short read is an error, never a truncated record.
    pub fn next_record(&mut self) -> Result<Option<WholeFileRecord>, ReaderError> {
        if self.processed {
            return Ok(None);
        }

        let io_error = |source| ReaderError::Io {
            path: self.path.clone(),
            source,
        };
        let mut bytes = vec![0u8; self.length];
        let mut file = File::open(&self.path).map_err(io_error)?;
        file.read_exact(&mut bytes).map_err(io_error)?;

        self.processed = true;
        Ok(Some(WholeFileRecord {
            path: self.path.clone(),
            bytes,
        }))
    }
}

impl Iterator for WholeFileReader {
    type Item = Result<WholeFileRecord, ReaderError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Reads every file of a [`FileGroup`] in turn, one whole-file reader per file.
#[derive(Debug)]
pub struct GroupReader<'a> {
    files: std::slice::Iter<'a, FileSplit>,
    current: Option<WholeFileReader>,
}

impl<'a> GroupReader<'a> {
    pub fn new(group: &'a FileGroup) -> Self {
        Self {
            files: group.files().iter(),
            current: None,
        }
    }
}

impl Iterator for GroupReader<'_> {
    type Item = Result<WholeFileRecord, ReaderError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(reader) = self.current.as_mut() {
                match reader.next() {
                    Some(item) => return Some(item),
                    None => self.current = None,
                }
            }

            let split = self.files.next()?;
            match WholeFileReader::new(split) {
                Ok(reader) => self.current = Some(reader),
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::split::SplitAggregator;
    use std::fs;

    #[test]
    fn reads_whole_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.dcm");
        let content: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        fs::write(&path, &content).unwrap();

        let mut reader = WholeFileReader::new(&FileSplit::whole(&path, 10_000)).unwrap();
        let record = reader.next_record().unwrap().unwrap();
        assert_eq!(record.bytes.len(), 10_000);
        assert_eq!(record.bytes, content);
        assert!(reader.is_processed());
        assert!(reader.next_record().unwrap().is_none());
        assert!(reader.next().is_none());
    }

    #[test]
    fn empty_file_yields_one_empty_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.dcm");
        fs::write(&path, b"").unwrap();

        let records: Vec<_> = WholeFileReader::new(&FileSplit::whole(&path, 0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].bytes.is_empty());
    }

    #[test]
    fn oversized_length_fails_at_construction() {
        let split = FileSplit::whole("huge.dcm", MAX_RECORD_LENGTH + 1);
        let err = WholeFileReader::new(&split).unwrap_err();
        assert!(matches!(err, ReaderError::TooLarge { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn missing_file_is_transient_and_rerunnable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.dcm");
        let split = FileSplit::whole(&path, 4);

        let mut first = WholeFileReader::new(&split).unwrap();
        let err = first.next_record().unwrap_err();
        assert!(err.is_transient());
        assert!(!first.is_processed());

        fs::write(&path, [9u8; 4]).unwrap();
        let mut retry = WholeFileReader::new(&split).unwrap();
        assert_eq!(retry.next_record().unwrap().unwrap().bytes, vec![9u8; 4]);
    }

    #[test]
    fn truncated_file_is_never_exposed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.dcm");
        fs::write(&path, [1u8; 3]).unwrap();

        let mut reader = WholeFileReader::new(&FileSplit::whole(&path, 8)).unwrap();
        assert!(reader.next_record().is_err());
    }

    #[test]
    fn group_reader_yields_one_record_per_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<_> = (0..4)
            .map(|i| {
                let path = dir.path().join(format!("{i}.dcm"));
                fs::write(&path, vec![i as u8; i + 1]).unwrap();
                path
            })
            .collect();

        let groups = SplitAggregator::new(1024).plan_paths(&paths).unwrap();
        assert_eq!(groups.len(), 1);

        let records: Vec<_> = GroupReader::new(&groups[0])
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(records.len(), 4);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.path, paths[i]);
            assert_eq!(record.bytes, vec![i as u8; i + 1]);
        }
    }
}
