// Copyright (C) 2022-2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of gelf-udp.
//
// gelf-udp is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// gelf-udp is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
// even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with gelf-udp.  If not,
// see <http://www.gnu.org/licenses/>.

//! A free-list of reusable scratch objects.
//!
//! [`Pool`] hands out values wrapped in a [`Pooled`] guard; when the guard is dropped the value
//! is [recycled](Recycle::recycle) & pushed back onto the free list. Acquisition never waits on
//! availability: if the list is empty a new value is constructed on the spot, so the pool grows
//! to the peak number of concurrent borrowers & stays there.

use parking_lot::Mutex;

use std::ops::{Deref, DerefMut};

/// Values that can be returned to a [`Pool`] must know how to wipe themselves clean.
pub trait Recycle {
    /// Restore `self` to a state indistinguishable from a freshly constructed value.
    fn recycle(&mut self);
}

pub struct Pool<T: Recycle> {
    free: Mutex<Vec<T>>,
}

impl<T: Recycle> Pool<T> {
    pub fn new() -> Pool<T> {
        Pool {
            free: Mutex::new(Vec::new()),
        }
    }

    /// Pop a value off the free list, or build one with `make` if the list is empty.
    pub fn get<F: FnOnce() -> T>(&self, make: F) -> Pooled<'_, T> {
        let popped = self.free.lock().pop();
        Pooled {
            pool: self,
            value: Some(popped.unwrap_or_else(make)),
        }
    }

    /// The number of idle values currently on the free list.
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    fn put(&self, mut value: T) {
        value.recycle();
        self.free.lock().push(value);
    }
}

impl<T: Recycle> std::default::Default for Pool<T> {
    fn default() -> Self {
        Pool::new()
    }
}

/// A value on loan from a [`Pool`].
pub struct Pooled<'a, T: Recycle> {
    pool: &'a Pool<T>,
    // Only `None` once `drop` has taken it.
    value: Option<T>,
}

impl<T: Recycle> Deref for Pooled<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        match &self.value {
            Some(value) => value,
            None => unreachable!("pooled value accessed after release"),
        }
    }
}

impl<T: Recycle> DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.value {
            Some(value) => value,
            None => unreachable!("pooled value accessed after release"),
        }
    }
}

impl<T: Recycle> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.pool.put(value);
        }
    }
}
