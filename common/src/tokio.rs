// Thin layer over the tokio primitives used across the workspace so
// call sites pull them from one place.

pub use ::tokio::{
    select,
    sync::{self, broadcast, mpsc, watch, Mutex, MutexGuard, Notify, RwLock},
    task::{JoinError, JoinHandle},
    time::{self, interval, sleep, timeout},
};

use log::trace;
use std::future::Future;

// Spawn a named task; the name shows up in trace logs on start and exit
pub fn spawn_task<F>(name: &'static str, future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    trace!("spawning task {}", name);
    ::tokio::spawn(async move {
        let output = future.await;
        trace!("task {} exited", name);
        output
    })
}
