//! Client id allocation
//!
//! The default allocator packs a coarse timestamp, a per-tick sequence and a
//! machine id into 63 bits, so ids are unique per process and roughly ordered
//! by connection time.

use super::types::ClientId;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

const TIME_UNIT_MILLIS: i64 = 10;
const SEQUENCE_BITS: u32 = 8;
const MACHINE_BITS: u32 = 16;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;

/// Issues process-wide unique client identifiers
pub trait IdAllocator: Send + Sync + 'static {
    fn next_id(&self) -> ClientId;
}

/// Clock and sequence based allocator
pub struct SnowflakeIds {
    epoch: DateTime<Utc>,
    machine_id: u16,
    state: Mutex<SnowflakeState>,
}

#[derive(Default)]
struct SnowflakeState {
    elapsed: u64,
    sequence: u64,
}

impl SnowflakeIds {
    /// Allocator with the given machine id and the default 2014-09-01 epoch
    pub fn new(machine_id: u16) -> Self {
        let epoch = Utc
            .with_ymd_and_hms(2014, 9, 1, 0, 0, 0)
            .single()
            .unwrap_or_default();
        Self::with_epoch(machine_id, epoch)
    }

    pub fn with_epoch(machine_id: u16, epoch: DateTime<Utc>) -> Self {
        Self {
            epoch,
            machine_id,
            state: Mutex::new(SnowflakeState {
                elapsed: 0,
                sequence: SEQUENCE_MASK,
            }),
        }
    }

    pub fn machine_id(&self) -> u16 {
        self.machine_id
    }

    fn current_elapsed(&self) -> u64 {
        let millis = (Utc::now() - self.epoch).num_milliseconds().max(0);
        (millis / TIME_UNIT_MILLIS) as u64
    }

    /// Split an id back into (elapsed ticks, sequence, machine id)
    pub fn decompose(id: ClientId) -> (u64, u64, u16) {
        let raw = id.as_u64();
        let machine = (raw & ((1 << MACHINE_BITS) - 1)) as u16;
        let sequence = (raw >> MACHINE_BITS) & SEQUENCE_MASK;
        let elapsed = raw >> (MACHINE_BITS + SEQUENCE_BITS);
        (elapsed, sequence, machine)
    }
}

impl Default for SnowflakeIds {
    fn default() -> Self {
        // Low bits of the process id keep concurrent processes apart
        Self::new((std::process::id() & 0xffff) as u16)
    }
}

impl IdAllocator for SnowflakeIds {
    fn next_id(&self) -> ClientId {
        let now = self.current_elapsed();
        let mut state = self.state.lock();

        if now > state.elapsed {
            state.elapsed = now;
            state.sequence = 0;
        } else {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                // Sequence exhausted for this tick, borrow the next one
                state.elapsed += 1;
            }
        }

        let raw = (state.elapsed << (MACHINE_BITS + SEQUENCE_BITS))
            | (state.sequence << MACHINE_BITS)
            | u64::from(self.machine_id);
        ClientId(raw)
    }
}

/// Atomic counter allocator, useful in tests and single-node setups
#[derive(Debug)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::new()
    }
}

impl IdAllocator for SequentialIds {
    fn next_id(&self) -> ClientId {
        ClientId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}
