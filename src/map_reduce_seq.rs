use async_trait::async_trait;
use std::path::Path;

use crate::common::{JobSpec, MapReduce, MapReduceApp, Output};
use crate::map_task::do_map;
use crate::merger::do_reduce;
use crate::naming::FileLayout;

/// Runs every map task and then every reduce task on the calling thread.
pub struct SequentialMapReduce {
    spec: JobSpec,
    mr_app: Box<dyn MapReduceApp>,
}

impl SequentialMapReduce {
    pub fn run_sync(self) -> anyhow::Result<Output> {
        let JobSpec {
            job_name,
            files,
            n_reduce,
            work_dir,
            ..
        } = self.spec;
        let layout = FileLayout::new(work_dir);

        for (m, file) in files.iter().enumerate() {
            do_map(&layout, &job_name, m, Path::new(file), n_reduce, |name, contents| {
                self.mr_app.map(name, contents)
            })?;
        }

        let mut outputs = Vec::with_capacity(n_reduce);
        for r in 0..n_reduce {
            let out = layout.output(&job_name, r);
            do_reduce(&layout, &job_name, r, &out, files.len(), |key, values| {
                self.mr_app.reduce(key, values)
            })?;
            outputs.push(out);
        }

        Ok(outputs)
    }
}

#[async_trait]
impl MapReduce for SequentialMapReduce {
    fn new(spec: JobSpec, mr_app: Box<dyn MapReduceApp>) -> Self {
        Self { spec, mr_app }
    }

    async fn run(self) -> anyhow::Result<Output> {
        self.run_sync()
    }
}
