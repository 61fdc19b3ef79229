//! Coordination core of a split-phase (map, then reduce) batch framework.
//!
//! [`mr_parallel::scheduler::schedule`] drives every task of a phase to a
//! successful attempt on a changing pool of workers, and
//! [`merger::do_reduce`] merges the intermediate files of one reduce
//! partition into a sorted, grouped and reduced output file.

pub mod codec;
pub mod common;
pub mod error;
pub mod map_reduce_apps;
pub mod map_reduce_seq;
pub mod map_task;
pub mod merger;
pub mod mr_parallel;
pub mod naming;

pub use common::{DoTaskArgs, JobPhase, JobSpec, KeyValue, MapReduce, MapReduceApp};
pub use error::{Error, Result};
