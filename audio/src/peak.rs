use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Latest peak sample of a client, written by a monitor stream and read by
/// the UI every frame.
#[derive(Debug, Clone, Default)]
pub struct PeakLevel {
    bits: Arc<AtomicU32>,
}

impl PeakLevel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    pub fn set(&self, level: f32) {
        let level = if level.is_nan() {
            0.0
        } else {
            level.clamp(0.0, 1.0)
        };
        self.bits.store(level.to_bits(), Ordering::Relaxed);
    }

    pub fn suspend(&self) {
        self.set(0.0);
    }

    /// Decodes the newest float sample from a native-endian f32 fragment.
    pub fn feed_f32_ne(&self, fragment: &[u8]) -> bool {
        let Some(tail) = fragment.len().checked_sub(4) else {
            return false;
        };
        let mut bytes = [0_u8; 4];
        bytes.copy_from_slice(&fragment[tail..]);
        self.set(f32::from_ne_bytes(bytes));
        true
    }

    pub fn shares(&self, other: &PeakLevel) -> bool {
        Arc::ptr_eq(&self.bits, &other.bits)
    }
}
