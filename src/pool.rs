//! Scratch-buffer pools for the evaluator.
//!
//! Buffers are checked out through a [`Pooled`] guard which hands the buffer
//! back on drop, so every exit path (normal return, `?` propagation, unwind)
//! releases it.

use crate::value::Value;
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};

/// Buffers retained per pool once released
const DEFAULT_POOL_CAPACITY: usize = 64;

/// A buffer that can be cleared for reuse
pub trait Reusable: Default {
    fn reset(&mut self);
}

impl<T> Reusable for Vec<T> {
    fn reset(&mut self) {
        self.clear();
    }
}

/// A bounded free list of reusable buffers
pub struct Pool<T: Reusable> {
    free: Mutex<Vec<T>>,
    capacity: usize,
}

impl<T: Reusable> Pool<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Check out a cleared buffer
    pub fn acquire(&self) -> Pooled<'_, T> {
        let item = self.free.lock().pop().unwrap_or_default();
        Pooled { pool: self, item }
    }

    fn release(&self, mut item: T) {
        item.reset();
        let mut free = self.free.lock();
        if free.len() < self.capacity {
            free.push(item);
        }
    }

    /// Number of idle buffers
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }
}

/// Guard over a pooled buffer
pub struct Pooled<'p, T: Reusable> {
    pool: &'p Pool<T>,
    item: T,
}

impl<T: Reusable> Deref for Pooled<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.item
    }
}

impl<T: Reusable> DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.item
    }
}

impl<T: Reusable> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        let item = std::mem::take(&mut self.item);
        self.pool.release(item);
    }
}

/// The pools an evaluation draws from
pub struct EvalPools {
    /// Evaluated function arguments
    pub args: Pool<Vec<Value>>,
    /// Per-iteration comprehension variables
    pub scopes: Pool<Vec<(String, Value)>>,
    /// Comprehension sources and deduplication scratch
    pub values: Pool<Vec<Value>>,
}

impl EvalPools {
    pub fn new(capacity: usize) -> Self {
        Self {
            args: Pool::new(capacity),
            scopes: Pool::new(capacity),
            values: Pool::new(capacity),
        }
    }
}

impl Default for EvalPools {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_on_drop() {
        let pool: Pool<Vec<Value>> = Pool::new(4);
        {
            let mut buf = pool.acquire();
            buf.push(Value::Int(1));
            assert_eq!(pool.idle(), 0);
        }
        assert_eq!(pool.idle(), 1);

        // Released buffers come back cleared
        let buf = pool.acquire();
        assert!(buf.is_empty());
    }

    #[test]
    fn test_release_on_error_path() {
        let pool: Pool<Vec<Value>> = Pool::new(4);

        fn fails(pool: &Pool<Vec<Value>>) -> Result<(), String> {
            let mut buf = pool.acquire();
            buf.push(Value::Null);
            if !buf.is_empty() {
                return Err("boom".to_string());
            }
            Ok(())
        }

        assert!(fails(&pool).is_err());
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_capacity_bound() {
        let pool: Pool<Vec<Value>> = Pool::new(1);
        let a = pool.acquire();
        let b = pool.acquire();
        drop(a);
        drop(b);
        assert_eq!(pool.idle(), 1);
    }
}
