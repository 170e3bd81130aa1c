//! Row identifier allocation.
//!
//! [`FlakeIds`] produces time-ordered 63-bit ids through [`sonyflake`]:
//!
//! ```text
//! | 39 bits: time since 2014-09-01 in 10 ms units | 8 bits: sequence | 16 bits: machine id |
//! ```
//!
//! Up to 256 ids are handed out per 10 ms tick; the generator sleeps into the next tick when a
//! tick is exhausted. Ids are unique for the lifetime of one allocator.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use sonyflake::Sonyflake;

use crate::error::AllocatorError;

/// Source of run-unique row identifiers.
pub trait IdAllocator: Send + Sync {
    fn next_id(&self) -> Result<u64, AllocatorError>;
}

/// Time-based id allocator (see the [module docs](self)).
#[derive(Clone)]
pub struct FlakeIds {
    inner: Sonyflake,
}

impl FlakeIds {
    /// Allocator using the low 16 bits of the process id as machine id.
    ///
    /// The generator's default machine id comes from a private IPv4 address, which containers
    /// and offline hosts often lack.
    pub fn new() -> Result<Self, AllocatorError> {
        Self::with_machine_id((std::process::id() & 0xFFFF) as u16)
    }

    pub fn with_machine_id(machine_id: u16) -> Result<Self, AllocatorError> {
        let machine = move || -> Result<u16, Box<dyn std::error::Error + Send + Sync>> {
            Ok(machine_id)
        };
        let inner = Sonyflake::builder().machine_id(&machine).finalize()?;
        Ok(Self { inner })
    }
}

impl fmt::Debug for FlakeIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlakeIds").finish_non_exhaustive()
    }
}

impl IdAllocator for FlakeIds {
    fn next_id(&self) -> Result<u64, AllocatorError> {
        Ok(self.inner.next_id()?)
    }
}

/// Centrally sequenced ids: `start`, `start + 1`, ...
#[derive(Debug)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::new(1)
    }
}

impl IdAllocator for SequentialIds {
    fn next_id(&self) -> Result<u64, AllocatorError> {
        self.next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_add(1))
            .map_err(|_| AllocatorError::Exhausted)
    }
}
