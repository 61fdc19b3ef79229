use async_channel::{Receiver, Sender};
use tracing::info;
use uuid::Uuid;

use crate::error::{Error, Result};

pub type WorkerAddr = String;

/// Idle workers, in arrival order.
#[derive(Clone)]
pub struct WorkerRegistry {
    sender: Sender<WorkerAddr>,
    receiver: Receiver<WorkerAddr>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        let (sender, receiver) = async_channel::unbounded();
        Self { sender, receiver }
    }

    pub fn register(&self, addr: impl Into<WorkerAddr>) -> Result<()> {
        let addr = addr.into();
        info!("worker {} registered", addr);
        self.push(addr)
    }

    pub fn register_local(&self, count: usize) -> Result<Vec<WorkerAddr>> {
        let mut addrs = Vec::with_capacity(count);
        for _ in 0..count {
            let addr = format!("worker-{}", Uuid::new_v4());
            self.register(addr.clone())?;
            addrs.push(addr);
        }
        Ok(addrs)
    }

    /// Blocks until a worker is idle and takes it out of the pool.
    pub fn next_available(&self) -> Result<WorkerAddr> {
        self.receiver
            .recv_blocking()
            .map_err(|_| Error::RegistryClosed)
    }

    pub fn release(&self, addr: WorkerAddr) -> Result<()> {
        self.push(addr)
    }

    pub fn available(&self) -> usize {
        self.receiver.len()
    }

    fn push(&self, addr: WorkerAddr) -> Result<()> {
        // unbounded: only fails once closed
        self.sender
            .try_send(addr)
            .map_err(|_| Error::RegistryClosed)
    }
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
