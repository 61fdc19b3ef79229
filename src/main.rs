use std::path::PathBuf;

use clap::Parser;
use mr_sched::{
    map_reduce_apps::WordCount, map_reduce_seq::SequentialMapReduce,
    mr_parallel::ParallelMapReduce, JobSpec, MapReduce,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Count words in the input files with a local map/reduce job.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Name of the job, used to name intermediate and output files
    #[arg(short, long, default_value = "wcseq")]
    job_name: String,

    /// Number of reduce partitions
    #[arg(short = 'r', long, default_value_t = 3)]
    n_reduce: usize,

    /// Number of local workers
    #[arg(short = 'w', long, default_value_t = 2)]
    workers: usize,

    /// Directory for intermediate and output files
    #[arg(short = 'd', long, default_value = ".")]
    work_dir: PathBuf,

    /// Run every task on the main thread instead of scheduling them
    #[arg(long)]
    sequential: bool,

    /// Input files, one map task each
    #[arg(required = true)]
    files: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mr_sched=info")),
        )
        .init();

    let args = Args::parse();
    std::fs::create_dir_all(&args.work_dir)?;
    let spec = JobSpec {
        job_name: args.job_name,
        files: args.files,
        n_reduce: args.n_reduce,
        n_workers: args.workers,
        work_dir: args.work_dir,
    };

    let outputs = if args.sequential {
        SequentialMapReduce::new(spec, Box::new(WordCount::new())).run().await?
    } else {
        ParallelMapReduce::new(spec, Box::new(WordCount::new())).run().await?
    };

    for out in outputs {
        info!("reduce output: {}", out.display());
    }
    Ok(())
}
