//! Session id generation.
//!
//! Ids are snowflake style 64-bit integers, so ids from different servers (different worker
//! ids) never collide and ids from one generator always increase:
//!
//! ```text
//! | 41 bits: ms since EPOCH | 10 bits: worker id | 12 bits: sequence |
//! ```
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::{Result, WhosonError};

// 2015-01-01T00:00:00Z in milliseconds
const EPOCH_MS: u64 = 1_420_070_400_000;
const WORKER_ID_BITS: u64 = 10;
const SEQUENCE_BITS: u64 = 12;
const MAX_WORKER_ID: u64 = (1 << WORKER_ID_BITS) - 1;
const MAX_SEQUENCE: u64 = (1 << SEQUENCE_BITS) - 1;

/// Generates globally increasing 64-bit ids for session log correlation
#[derive(Debug)]
pub struct IdGenerator {
    worker_id: u64,
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    last_ms: u64,
    sequence: u64,
}

impl IdGenerator {
    /// creates a generator for `worker_id`, normally the server id.
    ///
    /// # Errors
    /// `WhosonError::IdGenerator` if `worker_id` does not fit in 10 bits
    pub fn new(worker_id: u64) -> Result<Self> {
        if worker_id > MAX_WORKER_ID {
            return Err(WhosonError::IdGenerator(format!(
                "worker id {} is larger than {}",
                worker_id, MAX_WORKER_ID
            )));
        }
        Ok(IdGenerator {
            worker_id,
            state: Mutex::new(State::default()),
        })
    }

    /// returns the next id.
    ///
    /// # Errors
    /// `WhosonError::IdGenerator` if the system clock moved backwards
    pub fn next_id(&self) -> Result<u64> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| WhosonError::IdGenerator("id generator lock poisoned".to_string()))?;

        let mut now = now_ms()?;
        if now < state.last_ms {
            return Err(WhosonError::IdGenerator(format!(
                "clock moved backwards by {}ms",
                state.last_ms - now
            )));
        }

        if now == state.last_ms {
            state.sequence = (state.sequence + 1) & MAX_SEQUENCE;
            if state.sequence == 0 {
                // sequence exhausted for this millisecond
                while now <= state.last_ms {
                    std::thread::sleep(Duration::from_micros(100));
                    now = now_ms()?;
                }
            }
        } else {
            state.sequence = 0;
        }
        state.last_ms = now;

        Ok((since_epoch_ms(now)? << (WORKER_ID_BITS + SEQUENCE_BITS))
            | (self.worker_id << SEQUENCE_BITS)
            | state.sequence)
    }

    /// the worker id encoded into every id
    pub fn worker_id(&self) -> u64 {
        self.worker_id
    }
}

/// milliseconds between the id epoch and `now`
fn since_epoch_ms(now: u64) -> Result<u64> {
    now.checked_sub(EPOCH_MS)
        .ok_or_else(|| WhosonError::IdGenerator(format!("clock reads {}ms, before the id epoch", now)))
}

fn now_ms() -> Result<u64> {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| WhosonError::IdGenerator(e.to_string()))?;
    Ok(since_epoch.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_before_epoch_is_an_error() {
        assert!(matches!(since_epoch_ms(EPOCH_MS - 1), Err(WhosonError::IdGenerator(_))));
        assert_eq!(since_epoch_ms(EPOCH_MS + 7).unwrap(), 7);
    }

    #[test]
    fn ids_increase() {
        let ids = IdGenerator::new(1000).unwrap();
        let mut last = 0;
        for _ in 0..10_000 {
            let id = ids.next_id().unwrap();
            assert!(id > last);
            last = id;
        }
    }

    #[test]
    fn worker_id_is_encoded() {
        let ids = IdGenerator::new(42).unwrap();
        let id = ids.next_id().unwrap();
        assert_eq!((id >> SEQUENCE_BITS) & MAX_WORKER_ID, 42);
    }

    #[test]
    fn worker_id_out_of_range() {
        assert!(IdGenerator::new(1024).is_err());
    }
}
