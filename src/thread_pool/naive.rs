use std::thread;

use crossbeam::sync::WaitGroup;

use super::ThreadPool;
use crate::Result;

/// a simple thread-pool that is not actually a pool. It starts a new thread on every spawn
/// request, so there is no limit on how many jobs run at once.
/// `threads` is only kept as a hint.
pub struct NaiveThreadPool {
    #[allow(dead_code)]
    threads: u32,
    wg: WaitGroup,
}

impl ThreadPool for NaiveThreadPool {
    fn new(threads: u32) -> Result<Self> {
        Ok(NaiveThreadPool {
            threads,
            wg: WaitGroup::new(),
        })
    }

    fn spawn<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let wg = self.wg.clone();
        thread::Builder::new().spawn(move || {
            job();
            drop(wg);
        })?;
        Ok(())
    }

    fn join(self) {
        self.wg.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn join_waits_for_running_jobs() {
        let pool = NaiveThreadPool::new(0).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            let counter = counter.clone();
            pool.spawn(move || {
                thread::sleep(Duration::from_millis(20));
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.join();
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }
}
