use std::thread;

use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::sync::WaitGroup;
use tracing::{debug, error, instrument};

use super::ThreadPool;
use crate::{Result, WhosonError, MAX_QUEUES};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A fixed set of worker threads fed by a bounded job queue.
///
/// The UDP receiver is the only producer and the workers are the consumers of a crossbeam
/// MPMC [`channel`]. When the queue is full, [`spawn`](ThreadPool::spawn) blocks until a worker
/// takes a job off it, so a busy pool slows the receiver down instead of dropping datagrams.
///
/// A worker whose job panics is replaced by a fresh thread. A replacement that cannot be
/// started is only logged; the pool keeps running with one worker less.
///
/// [`channel`]: https://docs.rs/crossbeam/0.8.1/crossbeam/channel/index.html
pub struct SharedQueueThreadPool {
    /// the sending part of the channel
    tx: Sender<Job>,
    /// every worker holds a clone, the pool waits on it to join
    wg: WaitGroup,
}

impl SharedQueueThreadPool {
    /// create a new "thread pool" with the given number of `threads` and a queue that holds at
    /// most `capacity` pending jobs.
    /// Every thread created will have a handle to the receiving end of the channel
    pub fn with_queue(threads: u32, capacity: usize) -> Result<Self> {
        let (tx, rx) = channel::bounded::<Job>(capacity);
        let wg = WaitGroup::new();
        for i in 0..threads {
            let task_rx = TaskReceiver {
                rx: rx.clone(),
                _wg: wg.clone(),
            };
            thread::Builder::new()
                .name(format!("whoson-worker-{}", i))
                .spawn(move || run_tasks(task_rx))?;
        }
        debug!("created thread pool with {} threads", threads);
        Ok(SharedQueueThreadPool { tx, wg })
    }
}

impl ThreadPool for SharedQueueThreadPool {
    fn new(threads: u32) -> Result<Self> {
        SharedQueueThreadPool::with_queue(threads, MAX_QUEUES)
    }

    /// Spawns a function into the thread pool, blocking while the queue is full.
    ///
    /// # Errors
    ///
    /// Errors if the thread pool has no thread left.
    fn spawn<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx
            .send(Box::new(job))
            .map_err(|_| WhosonError::StringErr("There are no threads in the pool".to_string()))
    }

    /// closes the queue, lets the workers drain what is left of it, and waits for them to exit
    fn join(self) {
        let SharedQueueThreadPool { tx, wg } = self;
        drop(tx);
        wg.wait();
        debug!("thread pool joined");
    }
}

/// A type that can receive tasks (i.e. closures) from a channel and run them.
/// Additionally, this type is responsible for restarting any threads that panicked
#[derive(Clone)]
struct TaskReceiver {
    rx: Receiver<Job>,
    _wg: WaitGroup,
}

impl Drop for TaskReceiver {
    fn drop(&mut self) {
        if thread::panicking() {
            debug!("thread panicked, starting a new thread");
            let task_rx = self.clone();
            if let Err(e) = thread::Builder::new().spawn(move || run_tasks(task_rx)) {
                error!("Failed to spawn a thread: {}", e);
            }
        }
    }
}

/// this function waits for a task to arrive on its (wrapped) receiver, and then runs the task.
/// It returns once the pool has been dropped and the queue is empty
#[instrument(skip(rx))]
fn run_tasks(rx: TaskReceiver) {
    while let Ok(task) = rx.rx.recv() {
        task();
    }
    debug!("Thread exited because the thread pool was destroyed.");
}
