// Copyright 2026 the fdbridge authors. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Per-connection mapping from client handles to the kernel descriptors the
//! server owns.
//!
//! Handles index a fixed-capacity slot array and start at
//! [`constant::FIRST_HANDLE`], keeping 0-2 for the standard streams. A slot
//! is either live or free; released slots are reused by the lowest-free-slot
//! scan, which is the same search the lower-bounded duplicate operation
//! needs. The table never closes a descriptor itself: callers decide, and
//! [`HandleTable::drain`] hands every survivor back at teardown.

use crate::constant::{FIRST_HANDLE, TABLE_CAPACITY};
use crate::error::Error;
use std::os::unix::io::RawFd;

pub struct HandleTable {
    slots: Vec<Option<RawFd>>,
}

impl Default for HandleTable {
    fn default() -> HandleTable {
        HandleTable::new()
    }
}

impl HandleTable {
    pub fn new() -> HandleTable {
        HandleTable {
            slots: vec![None; TABLE_CAPACITY],
        }
    }

    /// Map `fd` to the lowest free handle.
    ///
    /// On [`Error::TableFull`] the caller still owns `fd` and must close it
    /// before reporting the failure.
    pub fn install(&mut self, fd: RawFd) -> Result<i32, Error> {
        self.install_from(fd, FIRST_HANDLE)
    }

    /// Map `fd` to the lowest free handle at or above `min`.
    pub fn install_from(&mut self, fd: RawFd, min: i32) -> Result<i32, Error> {
        let start = if min < FIRST_HANDLE { FIRST_HANDLE } else { min } as usize;

        for handle in start..self.slots.len() {
            if self.slots[handle].is_none() {
                self.slots[handle] = Some(fd);
                return Ok(handle as i32);
            }
        }
        Err(Error::TableFull)
    }

    /// Constant-time lookup. Out-of-range and free slots are bad handles.
    pub fn translate(&self, handle: i32) -> Result<RawFd, Error> {
        if handle < FIRST_HANDLE || handle as usize >= self.slots.len() {
            return Err(Error::BadHandle(handle));
        }

        match self.slots[handle as usize] {
            Some(fd) => Ok(fd),
            None => Err(Error::BadHandle(handle)),
        }
    }

    /// Free the slot. The kernel descriptor stays open; whoever called us
    /// has already decided its fate.
    pub fn release(&mut self, handle: i32) {
        if handle >= FIRST_HANDLE && (handle as usize) < self.slots.len() {
            self.slots[handle as usize] = None;
        }
    }

    /// Empty the table, yielding every descriptor that was still live.
    pub fn drain(&mut self) -> Vec<RawFd> {
        self.slots.iter_mut().filter_map(Option::take).collect()
    }
}
