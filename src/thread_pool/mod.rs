//! Thread pools used to run sessions.
//!
//! [`SharedQueueThreadPool`] runs jobs on a fixed number of threads fed by a bounded queue and
//! serves the UDP pipeline. [`NaiveThreadPool`] starts a thread per job and serves TCP
//! connections. Both can be joined, so a server never returns while a session is still running.
use crate::Result;

/// A trait for the basic functionality of a thread pool
pub trait ThreadPool {
    /// creates a new thread pool, immediately spawning the specified number of threads.
    ///
    /// # Errors
    /// returns an error if any thread fails to spawn. All previously-spawned threads are
    /// terminated
    fn new(threads: u32) -> Result<Self>
    where
        Self: Sized;

    /// spawns a function into the thread pool
    ///
    /// # Errors
    /// returns an error if the job could not be handed to a thread
    fn spawn<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static;

    /// stops accepting jobs and blocks until every spawned job has finished
    fn join(self);
}

mod naive;
mod shared_queue;

pub use self::naive::NaiveThreadPool;
pub use self::shared_queue::SharedQueueThreadPool;
