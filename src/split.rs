use std::{
    fs,
    path::{Path, PathBuf},
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SplitError {
    #[error("cannot list input directory {path}: {source}")]
    ListInput {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot stat input file {path}: {source}")]
    Stat {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("No input files found in {0}")]
    NoInput(PathBuf),
}

/// One whole file inside a [`FileGroup`]. Files are never split, so the
/// offset is always zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSplit {
    pub path: PathBuf,
    pub length: u64,
    pub offset: u64,
}

impl FileSplit {
    pub fn whole(path: impl Into<PathBuf>, length: u64) -> Self {
        Self {
            path: path.into(),
            length,
            offset: 0,
        }
    }
}

/// The unit of work handed to one map task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileGroup {
    files: Vec<FileSplit>,
    total_length: u64,
}

impl FileGroup {
    fn push(&mut self, split: FileSplit) {
        self.total_length += split.length;
        self.files.push(split);
    }

    pub fn files(&self) -> &[FileSplit] {
        &self.files
    }

    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Packs files into groups whose summed length stays within a budget.
pub struct SplitAggregator {
    max_split_size: u64,
}

impl SplitAggregator {
    pub fn new(max_split_size: u64) -> Self {
        Self { max_split_size }
    }

    /// Stat every path, then group them.
    ///
    /// # Errors
    ///
    /// Fails on the first path that cannot be stat'd, before any group is
    /// produced.
    pub fn plan_paths(&self, paths: &[impl AsRef<Path>]) -> Result<Vec<FileGroup>, SplitError> {
        let splits = paths
            .iter()
            .map(|path| {
                let path = path.as_ref();
                fs::metadata(path)
                    .map(|meta| FileSplit::whole(path, meta.len()))
                    .map_err(|source| SplitError::Stat {
                        path: path.to_path_buf(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(self.plan(splits))
    }

    /// Group already-measured files.
    ///
    /// Files are taken in order and appended to the open group while the
    /// budget allows. A file larger than the budget on its own always lands
    /// in a group by itself.
    pub fn plan(&self, splits: Vec<FileSplit>) -> Vec<FileGroup> {
        let mut groups = Vec::new();
        let mut current = FileGroup::default();

        for split in splits {
            if split.length > self.max_split_size {
                let mut oversized = FileGroup::default();
                oversized.push(split);
                groups.push(oversized);
                continue;
            }

            if !current.is_empty() && current.total_length + split.length > self.max_split_size {
                groups.push(std::mem::take(&mut current));
            }
            current.push(split);
        }

        if !current.is_empty() {
            groups.push(current);
        }

        groups
    }
}

/// Regular files directly inside `dir`, sorted by path.
pub fn list_input_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, SplitError> {
    let dir = dir.as_ref();
    let list_error = |source| SplitError::ListInput {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(list_error)? {
        let entry = entry.map_err(list_error)?;
        let path = entry.path();
        let meta = fs::metadata(&path).map_err(|source| SplitError::Stat {
            path: path.clone(),
            source,
        })?;
        if meta.is_file() {
            paths.push(path);
        }
    }

    if paths.is_empty() {
        return Err(SplitError::NoInput(dir.to_path_buf()));
    }
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn splits(lengths: &[u64]) -> Vec<FileSplit> {
        lengths
            .iter()
            .enumerate()
            .map(|(i, &len)| FileSplit::whole(format!("f{i}.dcm"), len))
            .collect()
    }

    fn assert_complete(input: &[FileSplit], groups: &[FileGroup], max: u64) {
        let mut seen = HashSet::new();
        for group in groups {
            assert!(!group.is_empty());
            if group.len() > 1 {
                assert!(group.total_length() <= max, "group over budget: {group:?}");
            }
            for file in group.files() {
                assert_eq!(file.offset, 0);
                assert!(seen.insert(file.path.clone()), "duplicate {:?}", file.path);
            }
        }
        let expected: HashSet<_> = input.iter().map(|s| s.path.clone()).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn packs_small_files_under_budget() {
        let input = splits(&[40, 40, 40, 40, 40]);
        let groups = SplitAggregator::new(100).plan(input.clone());

        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].total_length(), 80);
        assert_eq!(groups[2].total_length(), 40);
        assert_complete(&input, &groups, 100);
    }

    #[test]
    fn oversized_file_is_a_singleton() {
        let input = splits(&[10, 500, 10]);
        let groups = SplitAggregator::new(100).plan(input.clone());

        let big: Vec<_> = groups
            .iter()
            .filter(|g| g.total_length() > 100)
            .collect();
        assert_eq!(big.len(), 1);
        assert_eq!(big[0].len(), 1);
        assert_complete(&input, &groups, 100);
    }

    #[test]
    fn exact_fit_stays_in_one_group() {
        let input = splits(&[50, 50]);
        let groups = SplitAggregator::new(100).plan(input.clone());
        assert_eq!(groups.len(), 1);
        assert_complete(&input, &groups, 100);
    }

    #[test]
    fn mixed_sizes_cover_every_file() {
        let lengths: Vec<u64> = (0..60).map(|i| (i * 37 % 150) + 1).collect();
        let input = splits(&lengths);
        let groups = SplitAggregator::new(128).plan(input.clone());
        assert_complete(&input, &groups, 128);
    }

    #[test]
    fn empty_input_gives_no_groups() {
        assert!(SplitAggregator::new(128).plan(Vec::new()).is_empty());
    }

    #[test]
    fn missing_file_fails_planning() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("a.dcm");
        fs::write(&present, [0u8; 16]).unwrap();
        let missing = dir.path().join("missing.dcm");

        let result = SplitAggregator::new(128).plan_paths(&[present, missing.clone()]);
        match result {
            Err(SplitError::Stat { path, .. }) => assert_eq!(path, missing),
            other => panic!("expected stat error, got {other:?}"),
        }
    }

    #[test]
    fn lists_only_regular_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.dcm"), [1u8; 3]).unwrap();
        fs::write(dir.path().join("a.dcm"), [1u8; 5]).unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();

        let files = list_input_files(dir.path()).unwrap();
        assert_eq!(
            files,
            vec![dir.path().join("a.dcm"), dir.path().join("b.dcm")]
        );

        let groups = SplitAggregator::new(128).plan_paths(&files).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].total_length(), 8);
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            list_input_files(dir.path()),
            Err(SplitError::NoInput(_))
        ));
    }
}
