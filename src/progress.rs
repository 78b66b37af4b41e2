use std::sync::atomic::{AtomicU32, Ordering};

/// A progress scalar in [0, 1] shared between a worker and an observer.
///
/// The worker only writes, the observer only reads, so plain relaxed
/// atomics on the f32 bit pattern are sufficient.
#[derive(Debug, Default)]
pub struct Progress(AtomicU32);

impl Progress {
    pub fn new() -> Self {
        Progress(AtomicU32::new(0))
    }

    pub fn set(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_and_loads() {
        let p = Progress::new();
        assert_eq!(p.get(), 0.0);
        p.set(0.5);
        assert_eq!(p.get(), 0.5);
        p.set(1.0);
        assert_eq!(p.get(), 1.0);
    }
}
