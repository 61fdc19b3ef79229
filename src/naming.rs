//! File naming shared by the map-phase writers and the reduce merger.

use std::path::{Path, PathBuf};

/// Name of the intermediate file written by map task `map_task` for
/// reduce partition `reduce_task`.
pub fn reduce_name(job_name: &str, map_task: usize, reduce_task: usize) -> String {
    format!("mrtmp.{}-{}-{}", job_name, map_task, reduce_task)
}

/// Name of the output file of reduce task `reduce_task`.
pub fn merge_name(job_name: &str, reduce_task: usize) -> String {
    format!("mrtmp.{}-res-{}", job_name, reduce_task)
}

/// Resolves file names under a job's working directory.
#[derive(Debug, Clone)]
pub struct FileLayout {
    root: PathBuf,
}

impl FileLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn intermediate(&self, job_name: &str, map_task: usize, reduce_task: usize) -> PathBuf {
        self.root.join(reduce_name(job_name, map_task, reduce_task))
    }

    pub fn output(&self, job_name: &str, reduce_task: usize) -> PathBuf {
        self.root.join(merge_name(job_name, reduce_task))
    }
}
