//! Map side of a task: split one input file into `n_reduce` intermediate
//! files.

use std::{fs, fs::File, path::Path};

use tracing::debug;

use crate::codec::RecordWriter;
use crate::common::{ihash, KeyValue};
use crate::error::{Error, Result};
use crate::naming::FileLayout;

/// Applies `map_f` to the contents of `in_file` and writes every produced
/// record to the intermediate file of partition `ihash(key) % n_reduce`.
///
/// All `n_reduce` files are created, empty ones included.
pub fn do_map<F>(
    layout: &FileLayout,
    job_name: &str,
    map_task: usize,
    in_file: &Path,
    n_reduce: usize,
    map_f: F,
) -> Result<()>
where
    F: FnOnce(&str, &str) -> Vec<KeyValue>,
{
    let contents = fs::read_to_string(in_file).map_err(|source| Error::Read {
        path: in_file.to_path_buf(),
        source,
    })?;
    let filename: &str = &in_file.to_string_lossy();
    let key_values = map_f(filename, contents.as_str());

    let mut partitions: Vec<Vec<KeyValue>> = vec![Vec::new(); n_reduce];
    if n_reduce > 0 {
        for kv in key_values {
            let r = ihash(&kv.key) as usize % n_reduce;
            partitions[r].push(kv);
        }
    }

    for (r, records) in partitions.into_iter().enumerate() {
        let path = layout.intermediate(job_name, map_task, r);
        let file = File::create(&path).map_err(|source| Error::Create {
            path: path.clone(),
            source,
        })?;
        let mut writer = RecordWriter::new(file);
        for kv in &records {
            writer.write(kv).map_err(|source| Error::Encode {
                path: path.clone(),
                source,
            })?;
        }
        writer
            .finish()
            .map_err(|source| Error::Write { path, source })?;
        debug!("map {} wrote {} records to partition {}", map_task, records.len(), r);
    }

    Ok(())
}
