use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{fmt, hash::Hasher, path::PathBuf};

/// Input of a whole job: name, map inputs and partitioning.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub job_name: String,
    /// One map task per file.
    pub files: Vec<String>,
    pub n_reduce: usize,
    /// Local workers registered by the parallel driver.
    pub n_workers: usize,
    /// Directory holding intermediate and output files.
    pub work_dir: PathBuf,
}

/// Paths of the per-partition output files, indexed by reduce task.
pub type Output = Vec<PathBuf>;

/// A single intermediate or output record.
///
/// Serialized as `{"Key": .., "Value": ..}`, which is what the map-phase
/// writers emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobPhase {
    Map,
    Reduce,
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobPhase::Map => f.write_str("mapPhase"),
            JobPhase::Reduce => f.write_str("reducePhase"),
        }
    }
}

/// Arguments of one remote task attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoTaskArgs {
    pub job_name: String,
    /// Input file of a map task, empty for reduce tasks.
    pub file: String,
    pub phase: JobPhase,
    pub task_number: usize,
    /// nReduce for map tasks, nMap for reduce tasks.
    pub num_other_phase: usize,
}

pub trait MapReduceApp: Send + Sync {
    fn map(&self, filename: &str, contents: &str) -> Vec<KeyValue>;
    fn reduce(&self, key: &str, values: Vec<String>) -> String;
}

#[async_trait]
pub trait MapReduce {
    fn new(spec: JobSpec, mr_app: Box<dyn MapReduceApp>) -> Self;
    async fn run(self) -> anyhow::Result<Output>;
}

/// 64-bit FNV-1a of the key, masked to 31 bits. The reduce partition of a
/// key is `ihash(key) % n_reduce`.
pub fn ihash(key: &str) -> u32 {
    let mut hasher = fnv::FnvHasher::default();
    hasher.write(key.as_bytes());
    (hasher.finish() & 0x7fff_ffff) as u32
}
