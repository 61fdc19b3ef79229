use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::common::{DoTaskArgs, JobPhase, MapReduceApp};
use crate::map_task::do_map;
use crate::merger::do_reduce;
use crate::naming::FileLayout;

/// Anything but `Ok(true)` counts as a failed attempt.
#[async_trait]
pub trait TaskInvoker: Send + Sync {
    async fn do_task(&self, worker: &str, args: DoTaskArgs) -> anyhow::Result<bool>;
}

pub struct LocalInvoker {
    app: Arc<dyn MapReduceApp>,
    layout: FileLayout,
}

impl LocalInvoker {
    pub fn new(app: Arc<dyn MapReduceApp>, layout: FileLayout) -> Self {
        Self { app, layout }
    }
}

#[async_trait]
impl TaskInvoker for LocalInvoker {
    async fn do_task(&self, worker: &str, args: DoTaskArgs) -> anyhow::Result<bool> {
        debug!(
            "{} running {} task {} of {}",
            worker, args.phase, args.task_number, args.job_name
        );
        let result = match args.phase {
            JobPhase::Map => do_map(
                &self.layout,
                &args.job_name,
                args.task_number,
                Path::new(&args.file),
                args.num_other_phase,
                |filename, contents| self.app.map(filename, contents),
            ),
            JobPhase::Reduce => do_reduce(
                &self.layout,
                &args.job_name,
                args.task_number,
                &self.layout.output(&args.job_name, args.task_number),
                args.num_other_phase,
                |key, values| self.app.reduce(key, values),
            ),
        };
        match result {
            Ok(()) => Ok(true),
            Err(err) => {
                warn!("{} failed {} task {}: {}", worker, args.phase, args.task_number, err);
                Ok(false)
            }
        }
    }
}
