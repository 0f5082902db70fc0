//! Occupancy bitmap: one bit per fingerprint set slot.

/// Bit-per-slot map telling occupied spine slots from empty ones.
#[derive(Debug, Clone)]
pub struct OccupancyBitmap {
    bits: Vec<u8>,
    total_slots: usize,
}

impl OccupancyBitmap {
    /// Creates a bitmap with every slot empty.
    pub fn new(total_slots: usize) -> Self {
        let bytes_needed = total_slots.div_ceil(8);
        Self {
            bits: vec![0u8; bytes_needed],
            total_slots,
        }
    }

    /// Marks `slot` occupied. Out-of-range slots are ignored.
    #[inline]
    pub fn set(&mut self, slot: usize) {
        if slot < self.total_slots {
            self.bits[slot / 8] |= 1 << (slot % 8);
        }
    }

    /// Marks `slot` empty. Out-of-range slots are ignored.
    #[inline]
    pub fn clear(&mut self, slot: usize) {
        if slot < self.total_slots {
            self.bits[slot / 8] &= !(1 << (slot % 8));
        }
    }

    /// Whether `slot` is occupied. Out-of-range slots read as empty.
    #[inline]
    pub fn is_set(&self, slot: usize) -> bool {
        if slot >= self.total_slots {
            return false;
        }
        (self.bits[slot / 8] & (1 << (slot % 8))) != 0
    }

    /// Number of occupied slots.
    pub fn count_ones(&self) -> u64 {
        self.bits.iter().map(|b| b.count_ones() as u64).sum()
    }

    /// Bytes of backing storage.
    pub fn byte_len(&self) -> usize {
        self.bits.len()
    }
}
