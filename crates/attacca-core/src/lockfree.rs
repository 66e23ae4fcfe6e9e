//! Lock-free primitives.

use std::sync::atomic::Ordering;

use atomic_float::AtomicF64;

/// Cache-line aligned atomic f64 for transport time and tempo.
#[derive(Debug)]
#[repr(align(64))]
pub struct AtomicDouble {
    value: AtomicF64,
}

impl AtomicDouble {
    pub fn new(value: f64) -> Self {
        Self {
            value: AtomicF64::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> f64 {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: f64) {
        self.value.store(value, Ordering::Release);
    }

    #[inline]
    pub fn swap(&self, value: f64) -> f64 {
        self.value.swap(value, Ordering::AcqRel)
    }
}

impl Clone for AtomicDouble {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

impl Default for AtomicDouble {
    fn default() -> Self {
        Self::new(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_double() {
        let val = AtomicDouble::new(1.5);
        assert_eq!(val.get(), 1.5);
        val.set(-2.25);
        assert_eq!(val.get(), -2.25);
        assert_eq!(val.swap(0.5), -2.25);
        assert_eq!(val.get(), 0.5);
    }
}
