//
// Copyright (c) The PPP Engine Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::Mutex;

use derive_new::new;
use ppp_utils::pppdev::PppFd;

use crate::debug::Debug;

/// Pool of released kernel PPP units, shared by every session.
///
/// A pooled unit keeps its multiplexor descriptor open so that a later
/// session can adopt it and skip the unit allocation ioctl. The pool is
/// bounded by the `unit-cache` configuration option.
#[derive(Debug, Default)]
pub struct UnitCache {
    units: Mutex<Vec<CachedUnit>>,
}

#[derive(Debug, new)]
struct CachedUnit {
    fd: PppFd,
    unit_idx: i32,
}

// ===== impl UnitCache =====

impl UnitCache {
    /// Takes a pooled unit, if any.
    pub fn try_take(&self, bound: usize) -> Option<(PppFd, i32)> {
        if bound == 0 {
            return None;
        }

        let mut units = self.units.lock().unwrap();
        units.pop().map(|unit| {
            Debug::UnitCacheTake(unit.unit_idx).log();
            (unit.fd, unit.unit_idx)
        })
    }

    /// Offers a released unit to the pool.
    ///
    /// Returns `false` when the pool is full, in which case the descriptor
    /// is closed.
    pub fn try_put(&self, fd: PppFd, unit_idx: i32, bound: usize) -> bool {
        let mut units = self.units.lock().unwrap();
        if units.len() >= bound {
            // The guard is released before `fd` is dropped, keeping the
            // descriptor close outside the lock.
            return false;
        }
        units.push(CachedUnit::new(fd, unit_idx));
        Debug::UnitCachePut(unit_idx).log();
        true
    }

    /// Returns the number of pooled units.
    pub fn len(&self) -> usize {
        self.units.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
