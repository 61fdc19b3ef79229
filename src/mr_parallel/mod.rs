pub mod invoker;
pub mod scheduler;
pub mod worker_pool;

use std::sync::Arc;

use crate::common::{JobPhase, JobSpec, MapReduce, MapReduceApp, Output};
use crate::naming::FileLayout;
use async_trait::async_trait;
use invoker::{LocalInvoker, TaskInvoker};
use scheduler::schedule;
use tracing::info;
use worker_pool::WorkerRegistry;

/// Runs a job through the scheduler on `n_workers` in-process workers.
pub struct ParallelMapReduce {
    spec: JobSpec,
    mr_app: Arc<dyn MapReduceApp>,
}

#[async_trait]
impl MapReduce for ParallelMapReduce {
    fn new(spec: JobSpec, mr_app: Box<dyn MapReduceApp>) -> Self {
        Self {
            spec,
            mr_app: Arc::from(mr_app),
        }
    }

    async fn run(self) -> anyhow::Result<Output> {
        anyhow::ensure!(self.spec.n_workers > 0, "at least one worker is required");
        let layout = FileLayout::new(self.spec.work_dir.clone());
        let registry = WorkerRegistry::new();
        registry.register_local(self.spec.n_workers)?;
        let invoker: Arc<dyn TaskInvoker> =
            Arc::new(LocalInvoker::new(Arc::clone(&self.mr_app), layout.clone()));

        let spec = self.spec;
        let outputs = tokio::task::spawn_blocking(move || -> anyhow::Result<Output> {
            for phase in [JobPhase::Map, JobPhase::Reduce] {
                schedule(
                    &spec.job_name,
                    &spec.files,
                    spec.n_reduce,
                    phase,
                    &registry,
                    Arc::clone(&invoker),
                )?;
            }
            Ok((0..spec.n_reduce)
                .map(|r| layout.output(&spec.job_name, r))
                .collect())
        })
        .await??;

        info!("job finished with {} output files", outputs.len());
        Ok(outputs)
    }
}
