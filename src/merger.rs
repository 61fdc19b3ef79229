use std::{fs::File, path::Path};

use tracing::debug;

use crate::codec::{RecordReader, RecordWriter};
use crate::common::KeyValue;
use crate::error::{Error, Result};
use crate::naming::FileLayout;

/// Writes one `(key, reduce_f(key, values))` record per distinct key of
/// partition `reduce_task` to `out_file`, in ascending key order.
pub fn do_reduce<F>(
    layout: &FileLayout,
    job_name: &str,
    reduce_task: usize,
    out_file: &Path,
    n_map: usize,
    mut reduce_f: F,
) -> Result<()>
where
    F: FnMut(&str, Vec<String>) -> String,
{
    let mut key_values = Vec::new();
    for m in 0..n_map {
        let path = layout.intermediate(job_name, m, reduce_task);
        read_records(&path, &mut key_values)?;
    }
    debug!(
        "reduce {} read {} records from {} files",
        reduce_task,
        key_values.len(),
        n_map
    );

    // stable: equal keys keep read order
    key_values.sort_by(|a, b| a.key.cmp(&b.key));

    let file = File::create(out_file).map_err(|source| Error::Create {
        path: out_file.to_path_buf(),
        source,
    })?;
    let mut writer = RecordWriter::new(file);
    for (key, values) in group_by_key(key_values) {
        let value = reduce_f(key.as_str(), values);
        writer
            .write(&KeyValue { key, value })
            .map_err(|source| Error::Encode {
                path: out_file.to_path_buf(),
                source,
            })?;
    }
    writer.finish().map_err(|source| Error::Write {
        path: out_file.to_path_buf(),
        source,
    })?;

    Ok(())
}

fn read_records(path: &Path, out: &mut Vec<KeyValue>) -> Result<()> {
    let file = File::open(path).map_err(|source| Error::Open {
        path: path.to_path_buf(),
        source,
    })?;
    for kv in RecordReader::new(file) {
        let kv = kv.map_err(|source| Error::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        out.push(kv);
    }
    Ok(())
}

fn group_by_key(sorted: Vec<KeyValue>) -> Vec<(String, Vec<String>)> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for KeyValue { key, value } in sorted {
        match groups.last_mut() {
            Some((last, values)) if *last == key => values.push(value),
            _ => groups.push((key, vec![value])),
        }
    }
    groups
}
