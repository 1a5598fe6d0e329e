use crate::error::SketchError;

/// Number of bits of a sparse value reserved for an explicit rank. Six bits
/// are enough for any rank of a 64-bit hash.
const RHO_W_BITS: u32 = 6;
const RHO_W_MASK: u32 = (1 << RHO_W_BITS) - 1;

/// Low bit of a sparse value: set when the value carries an explicit rank.
const RHO_FLAG: u32 = 1;

/// Bits below the sparse index in a sparse value (rank trailer + flag).
const VALUE_SHIFT: u32 = RHO_W_BITS + 1;

/// Rank of the lower `bits` of `value`, i.e. one plus the number of leading
/// zeros within that window, where an all-zero window counts as `bits + 1`.
fn window_rho_w(value: u32, bits: u32) -> u8 {
    if value == 0 {
        return (bits + 1) as u8;
    }
    (value.leading_zeros() + 1 - (32 - bits)) as u8
}

/// Rank adjustment when `2^(source - target)` fine registers collapse into
/// one coarse register. The index bits dropped by the downgrade become the
/// leading bits of the coarse suffix, so they determine the new rank unless
/// they are all zero, in which case the old rank continues past them.
fn downgrade_rho_w(index: u32, rho_w: u8, source: u32, target: u32) -> u8 {
    if source == target {
        return rho_w;
    }
    let dropped = index << (32 - (source - target));
    if dropped == 0 {
        rho_w + (source - target) as u8
    } else {
        (dropped.leading_zeros() + 1) as u8
    }
}

/// Register coordinates at the normal precision: the index is the top `p`
/// bits of a hash, the rank is computed over the remaining `64 - p` bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalEncoding {
    pub precision: u32,
}

impl NormalEncoding {
    pub const MIN_PRECISION: u32 = 10;
    pub const MAX_PRECISION: u32 = 24;

    pub fn new(precision: u32) -> Result<Self, SketchError> {
        if !(Self::MIN_PRECISION..=Self::MAX_PRECISION).contains(&precision) {
            return Err(SketchError::InvalidPrecision(format!(
                "normal precision must be between {} and {}, got {}",
                Self::MIN_PRECISION,
                Self::MAX_PRECISION,
                precision
            )));
        }
        Ok(Self { precision })
    }

    pub fn num_registers(&self) -> usize {
        1 << self.precision
    }

    /// Largest rank a register at this precision can hold.
    pub fn max_rho_w(&self) -> u8 {
        (64 - self.precision + 1) as u8
    }

    /// Splits a hash into its register index and rank.
    pub fn pos_rho_w(&self, hash: u64) -> (u32, u8) {
        let pos = (hash >> (64 - self.precision)) as u32;
        let w = hash << self.precision;
        let rho_w = if w == 0 {
            self.max_rho_w()
        } else {
            (w.leading_zeros() + 1) as u8
        };
        (pos, rho_w)
    }

    pub fn downgrade_index(&self, pos: u32, target: NormalEncoding) -> u32 {
        pos >> (self.precision - target.precision)
    }

    /// Rank the register at `pos` contributes to its coarser target register.
    /// An unset register stays unset.
    pub fn downgrade_rho_w(&self, pos: u32, rho_w: u8, target: NormalEncoding) -> u8 {
        if rho_w == 0 {
            return 0;
        }
        downgrade_rho_w(pos, rho_w, self.precision, target.precision)
    }
}

/// The 32-bit sparse value codec.
///
/// A value is `idx_sp << 7 | rhoW << 1 | flag`. The flag is set exactly when
/// the hash bits between the normal and sparse prefixes are all zero; the
/// normal rank cannot be recovered from the index then, so the rank of the
/// bits past the sparse prefix is stored in the 6-bit trailer. With the index
/// above both trailer and flag, numeric order of values equals
/// (sparse index, rank) order, which keeps the difference-encoded stream
/// non-decreasing and entries of one index adjacent, largest rank last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SparseEncoding {
    pub normal: NormalEncoding,
    pub sparse_precision: u32,
}

impl SparseEncoding {
    pub const MAX_SPARSE_PRECISION: u32 = 25;

    pub fn new(normal_precision: u32, sparse_precision: u32) -> Result<Self, SketchError> {
        let normal = NormalEncoding::new(normal_precision)?;
        if sparse_precision < normal_precision
            || sparse_precision > Self::MAX_SPARSE_PRECISION
        {
            return Err(SketchError::InvalidPrecision(format!(
                "sparse precision must be between the normal precision ({}) and {}, got {}",
                normal_precision,
                Self::MAX_SPARSE_PRECISION,
                sparse_precision
            )));
        }
        Ok(Self {
            normal,
            sparse_precision,
        })
    }

    pub fn num_buckets(&self) -> u64 {
        1 << self.sparse_precision
    }

    /// Mask over the low bits of a sparse index that sit between the normal
    /// and sparse prefixes of the hash.
    fn between_mask(&self) -> u32 {
        (1u32 << (self.sparse_precision - self.normal.precision)) - 1
    }

    pub fn encode(&self, hash: u64) -> u32 {
        let index = (hash >> (64 - self.sparse_precision)) as u32;
        if index & self.between_mask() != 0 {
            // The index alone recovers the normal rank.
            return index << VALUE_SHIFT;
        }
        let w = hash << self.sparse_precision;
        let rho_w = if w == 0 {
            64 - self.sparse_precision + 1
        } else {
            w.leading_zeros() + 1
        };
        (index << VALUE_SHIFT) | (rho_w << 1) | RHO_FLAG
    }

    pub fn sparse_index(&self, value: u32) -> u32 {
        value >> VALUE_SHIFT
    }

    pub fn has_rho_w(&self, value: u32) -> bool {
        value & RHO_FLAG != 0
    }

    /// The stored rank trailer; zero when the value carries none.
    pub fn stored_rho_w(&self, value: u32) -> u8 {
        ((value >> 1) & RHO_W_MASK) as u8
    }

    pub fn normal_index(&self, value: u32) -> u32 {
        self.sparse_index(value) >> (self.sparse_precision - self.normal.precision)
    }

    pub fn normal_rho_w(&self, value: u32) -> u8 {
        let delta = self.sparse_precision - self.normal.precision;
        if self.has_rho_w(value) {
            self.stored_rho_w(value) + delta as u8
        } else {
            window_rho_w(self.sparse_index(value) & self.between_mask(), delta)
        }
    }

    /// Decodes a value to its normal-precision register coordinates.
    pub fn decode(&self, value: u32) -> (u32, u8) {
        (self.normal_index(value), self.normal_rho_w(value))
    }

    /// Whether a value is internally consistent: the rank flag must be set
    /// exactly when the between bits of the index are all zero, a stored
    /// rank must be nonzero and within range, and an index-only value must
    /// leave the trailer clear.
    pub fn is_well_formed(&self, value: u32) -> bool {
        let needs_rho_w = self.sparse_index(value) & self.between_mask() == 0;
        if needs_rho_w != self.has_rho_w(value) {
            return false;
        }
        let stored = self.stored_rho_w(value) as u32;
        if self.has_rho_w(value) {
            (1..=64 - self.sparse_precision + 1).contains(&stored)
        } else {
            stored == 0
        }
    }

    /// Re-encodes a value for coarser precisions. `target` must not exceed
    /// this encoding in either dimension.
    pub fn downgrade(&self, value: u32, target: &SparseEncoding) -> u32 {
        let index = self.sparse_index(value);
        let target_index = index >> (self.sparse_precision - target.sparse_precision);
        if target_index & target.between_mask() != 0 {
            return target_index << VALUE_SHIFT;
        }
        // The index bits dropped from the sparse prefix lead the coarser
        // suffix; only when they are all zero does the stored rank carry
        // over. A value without a stored rank cannot reach that case, since
        // its nonzero between-bits would have survived into the target.
        let delta = self.sparse_precision - target.sparse_precision;
        let dropped = if delta == 0 { 0 } else { index << (32 - delta) };
        let rho_w = if dropped == 0 {
            self.stored_rho_w(value) as u32 + delta
        } else {
            dropped.leading_zeros() + 1
        };
        (target_index << VALUE_SHIFT) | (rho_w << 1) | RHO_FLAG
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod normal {
        use super::*;

        #[test]
        fn rejects_out_of_range_precision() {
            assert!(NormalEncoding::new(9).is_err());
            assert!(NormalEncoding::new(25).is_err());
            assert!(NormalEncoding::new(10).is_ok());
            assert!(NormalEncoding::new(24).is_ok());
        }

        #[test]
        fn pos_rho_w_splits_hash() {
            let encoding = NormalEncoding::new(10).unwrap();
            // Three zeros follow the 10-bit prefix before the first one.
            let hash = (0b101110001u64 << 55) | (1 << 50);
            assert_eq!(encoding.pos_rho_w(hash), (0b1011100010, 4));
        }

        #[test]
        fn pos_rho_w_all_zero_suffix() {
            let encoding = NormalEncoding::new(10).unwrap();
            assert_eq!(encoding.pos_rho_w(0b101110001u64 << 55), (0b1011100010, 55));
            assert_eq!(encoding.pos_rho_w(0), (0, 55));
        }

        #[test]
        fn pos_rho_w_all_one_suffix() {
            let encoding = NormalEncoding::new(10).unwrap();
            assert_eq!(encoding.pos_rho_w(u64::MAX), (1023, 1));
        }

        #[test]
        fn downgrade_index_drops_low_bits() {
            let source = NormalEncoding::new(12).unwrap();
            let target = NormalEncoding::new(10).unwrap();
            assert_eq!(source.downgrade_index(0b100000000001, target), 0b1000000000);
        }

        #[test]
        fn downgrade_rho_w_unset_register() {
            let source = NormalEncoding::new(12).unwrap();
            let target = NormalEncoding::new(10).unwrap();
            assert_eq!(source.downgrade_rho_w(0b100000000001, 0, target), 0);
        }

        #[test]
        fn downgrade_rho_w_nonzero_dropped_bits() {
            let source = NormalEncoding::new(12).unwrap();
            let target = NormalEncoding::new(10).unwrap();
            // Dropped bits are 01: one leading zero, new rank 2.
            assert_eq!(source.downgrade_rho_w(0b100000000001, 4, target), 2);
        }

        #[test]
        fn downgrade_rho_w_zero_dropped_bits() {
            let source = NormalEncoding::new(12).unwrap();
            let target = NormalEncoding::new(10).unwrap();
            // Dropped bits are 00: the old rank extends past them.
            assert_eq!(source.downgrade_rho_w(0b100000000000, 4, target), 6);
        }
    }

    mod sparse {
        use super::*;

        #[test]
        fn rejects_invalid_precisions() {
            assert!(SparseEncoding::new(14, 13).is_err());
            assert!(SparseEncoding::new(14, 26).is_err());
            assert!(SparseEncoding::new(9, 25).is_err());
            assert!(SparseEncoding::new(14, 14).is_ok());
            assert!(SparseEncoding::new(24, 25).is_ok());
        }

        #[test]
        fn encode_without_stored_rank() {
            let encoding = SparseEncoding::new(10, 13).unwrap();
            // Bits between the prefixes are 101: the index is lossless.
            let hash = 0b1011100010_101u64 << 51;
            assert_eq!(encoding.encode(hash), 0b1011100010101 << 7);
        }

        #[test]
        fn encode_with_stored_rank() {
            let encoding = SparseEncoding::new(10, 13).unwrap();
            // Bits between the prefixes are 000; ten zeros follow the sparse
            // prefix before the first one, so rank 11 is stored.
            let hash = (0b1011100010_000u64 << 51) | (1 << 40);
            assert_eq!(encoding.encode(hash), (0b1011100010000 << 7) | (11 << 1) | 1);
        }

        #[test]
        fn encode_with_stored_rank_all_zero_suffix() {
            let encoding = SparseEncoding::new(10, 13).unwrap();
            let hash = 0b1011100010_000u64 << 51;
            assert_eq!(encoding.encode(hash), (0b1011100010000 << 7) | (52 << 1) | 1);
        }

        #[test]
        fn encode_when_precisions_equal() {
            let encoding = SparseEncoding::new(10, 10).unwrap();
            // No between bits exist, so every value stores its rank.
            let hash = (0b1011100010u64 << 54) | (1 << 50);
            assert_eq!(encoding.encode(hash), (0b1011100010 << 7) | (4 << 1) | 1);
        }

        #[test]
        fn encode_at_maximum_sparse_precision() {
            let encoding = SparseEncoding::new(24, 25).unwrap();
            assert_eq!(encoding.encode(u64::MAX), ((1u32 << 25) - 1) << 7);
            assert_eq!(encoding.encode(1u64 << 63), (1 << 31) | (40 << 1) | 1);
        }

        #[test]
        fn decode_without_stored_rank() {
            let encoding = SparseEncoding::new(10, 13).unwrap();
            let value = 0b1011100010101u32 << 7;
            assert_eq!(encoding.sparse_index(value), 0b1011100010101);
            assert_eq!(encoding.decode(value), (0b1011100010, 1));
        }

        #[test]
        fn decode_without_stored_rank_deeper_zero_run() {
            let encoding = SparseEncoding::new(10, 13).unwrap();
            // Between bits 001: two zeros before the one, rank 3.
            let value = 0b1011100010001u32 << 7;
            assert_eq!(encoding.decode(value), (0b1011100010, 3));
        }

        #[test]
        fn decode_with_stored_rank() {
            let encoding = SparseEncoding::new(10, 13).unwrap();
            let value = (0b1011100010000u32 << 7) | (11 << 1) | 1;
            assert_eq!(encoding.sparse_index(value), 0b1011100010000);
            // Stored rank plus the three all-zero between bits.
            assert_eq!(encoding.decode(value), (0b1011100010, 14));
        }

        #[test]
        fn encode_decode_agrees_with_normal_coordinates() {
            let encoding = SparseEncoding::new(10, 10).unwrap();
            let hash = (0b1011100010u64 << 54) | (1 << 50);
            assert_eq!(
                encoding.decode(encoding.encode(hash)),
                encoding.normal.pos_rho_w(hash)
            );
        }

        #[test]
        fn numeric_order_follows_index_then_rank() {
            let encoding = SparseEncoding::new(10, 13).unwrap();
            let mut values = vec![
                (0b1011100010000u32 << 7) | (11 << 1) | 1,
                0b1011100010101u32 << 7,
                (0b1011100010000u32 << 7) | (3 << 1) | 1,
                0b1011100010001u32 << 7,
            ];
            values.sort_unstable();
            let indexes: Vec<u32> = values.iter().map(|&v| encoding.sparse_index(v)).collect();
            assert_eq!(
                indexes,
                vec![0b1011100010000, 0b1011100010000, 0b1011100010001, 0b1011100010101]
            );
            // Within one index, larger values carry larger ranks.
            assert!(encoding.normal_rho_w(values[0]) < encoding.normal_rho_w(values[1]));
        }

        #[test]
        fn downgrade_keeps_lossless_index() {
            let source = SparseEncoding::new(11, 15).unwrap();
            let target = SparseEncoding::new(10, 13).unwrap();
            assert_eq!(source.downgrade(0b11111 << 7, &target), 0b111 << 7);
        }

        #[test]
        fn downgrade_stored_rank_to_lossless() {
            let source = SparseEncoding::new(11, 15).unwrap();
            let target = SparseEncoding::new(10, 13).unwrap();
            let value = (0b100000000010000u32 << 7) | (5 << 1) | 1;
            // The surviving between bits are nonzero, so the index suffices.
            assert_eq!(source.downgrade(value, &target), 0b1000000000100 << 7);
        }

        #[test]
        fn downgrade_stored_rank_extends() {
            let source = SparseEncoding::new(11, 15).unwrap();
            let target = SparseEncoding::new(10, 13).unwrap();
            let value = (0b100000000000000u32 << 7) | (5 << 1) | 1;
            // Two dropped index bits are zero: stored rank grows by two.
            assert_eq!(
                source.downgrade(value, &target),
                (0b1000000000000 << 7) | (7 << 1) | 1
            );
        }

        #[test]
        fn downgrade_lossless_to_stored_rank() {
            let source = SparseEncoding::new(11, 15).unwrap();
            let target = SparseEncoding::new(10, 13).unwrap();
            let value = 0b100000000000001u32 << 7;
            // The dropped index bits are 01: one leading zero, rank 2.
            assert_eq!(
                source.downgrade(value, &target),
                (0b1000000000000 << 7) | (2 << 1) | 1
            );
        }

        #[test]
        fn downgrade_to_same_precisions_is_identity() {
            let encoding = SparseEncoding::new(10, 13).unwrap();
            let value = (0b1011100010000u32 << 7) | (11 << 1) | 1;
            assert_eq!(encoding.downgrade(value, &encoding), value);
            let value = 0b1011100010101u32 << 7;
            assert_eq!(encoding.downgrade(value, &encoding), value);
        }
    }
}
