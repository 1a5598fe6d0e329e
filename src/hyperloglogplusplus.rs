use protobuf::Message;

use crate::encoding::{NormalEncoding, SparseEncoding};
use crate::error::SketchError;
use crate::estimator::{self, DefaultCorrectionData};
use crate::normal::NormalRepresentation;
use crate::protos::HyperLogLogPlusUniqueStateProto;
use crate::sparse::SparseRepresentation;

#[derive(Debug, Clone)]
enum Representation {
    Sparse(SparseRepresentation),
    Normal(NormalRepresentation),
}

/// HyperLogLog++ cardinality sketch.
///
/// A sketch starts in the compact sparse mode and promotes itself to the
/// dense register file once the sparse form outgrows its byte budget.
/// Promotion is one-way: reconstructing sparse values from dense registers
/// would be lossy and buys no accuracy back.
///
/// A sketch is a plain value: no interior locking, no I/O. Observing
/// operations (`estimate`, `to_proto`) take `&mut self` because they merge
/// the sparse write buffer first; callers needing shared access should
/// clone.
#[derive(Debug, Clone)]
pub struct HyperLogLogPlusPlus {
    /// Retained across promotion; dense mode keeps it as metadata only.
    sparse_precision: u32,
    representation: Representation,
}

impl HyperLogLogPlusPlus {
    pub const MIN_NORMAL_PRECISION: u32 = NormalEncoding::MIN_PRECISION;
    pub const MAX_NORMAL_PRECISION: u32 = NormalEncoding::MAX_PRECISION;
    pub const MAX_SPARSE_PRECISION: u32 = SparseEncoding::MAX_SPARSE_PRECISION;

    /// Creates an empty sketch. The normal precision must lie in
    /// `[10, 24]` and the sparse precision in `[p, 25]`.
    pub fn new(normal_precision: u32, sparse_precision: u32) -> Result<Self, SketchError> {
        let encoding = SparseEncoding::new(normal_precision, sparse_precision)?;
        Ok(Self {
            sparse_precision,
            representation: Representation::Sparse(SparseRepresentation::new(encoding)),
        })
    }

    /// Restores a sketch from its envelope. Presence of `sparse_data`
    /// selects sparse mode; otherwise the dense register file in `data` is
    /// used (it may be empty for a sketch that never saw a dense write).
    pub fn from_proto(proto: &HyperLogLogPlusUniqueStateProto) -> Result<Self, SketchError> {
        let normal_precision = proto.precision_or_num_buckets();
        let sparse_precision = proto.sparse_precision_or_num_buckets();
        if normal_precision < 0 || sparse_precision < 0 {
            return Err(SketchError::InvalidPrecision(format!(
                "negative precision ({}, {})",
                normal_precision, sparse_precision
            )));
        }
        let encoding = SparseEncoding::new(normal_precision as u32, sparse_precision as u32)?;

        let representation = if proto.has_sparse_data() {
            let sparse =
                SparseRepresentation::from_bytes(encoding, proto.sparse_data().to_vec())?;
            if proto.has_sparse_size() && proto.sparse_size() as usize != sparse.size() {
                return Err(SketchError::CorruptEncoding(format!(
                    "sparse_size {} disagrees with the {} encoded entries",
                    proto.sparse_size(),
                    sparse.size()
                )));
            }
            Representation::Sparse(sparse)
        } else {
            Representation::Normal(NormalRepresentation::from_registers(
                encoding.normal,
                proto.data().to_vec(),
            )?)
        };
        Ok(Self {
            sparse_precision: sparse_precision as u32,
            representation,
        })
    }

    /// Parses a serialized envelope.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SketchError> {
        Self::from_proto(&HyperLogLogPlusUniqueStateProto::parse_from_bytes(bytes)?)
    }

    pub fn precision(&self) -> u32 {
        match &self.representation {
            Representation::Sparse(sparse) => sparse.encoding().normal.precision,
            Representation::Normal(normal) => normal.encoding().precision,
        }
    }

    pub fn sparse_precision(&self) -> u32 {
        self.sparse_precision
    }

    /// Adds a 64-bit hash of an element. The bits must be uniformly
    /// distributed; producing them is the caller's business.
    pub fn add_hash(&mut self, hash: u64) {
        let needs_promotion = match &mut self.representation {
            Representation::Sparse(sparse) => {
                sparse.add_hash(hash);
                sparse.over_max()
            }
            Representation::Normal(normal) => {
                normal.add_hash(hash);
                false
            }
        };
        if needs_promotion {
            self.normalize();
        }
    }

    /// Estimated number of distinct hashes added so far.
    pub fn estimate(&mut self) -> i64 {
        match &mut self.representation {
            Representation::Sparse(sparse) => sparse.estimate(),
            Representation::Normal(normal) => {
                estimator::estimate(normal, &DefaultCorrectionData)
            }
        }
    }

    /// Merges `other` into `self`; the argument is never mutated. The
    /// receiver adopts the lower of the two normal precisions and never
    /// widens its sparse precision.
    pub fn merge(&mut self, other: &HyperLogLogPlusPlus) {
        if other.is_unused() {
            return;
        }

        self.normalize();

        let normalized;
        let theirs = match &other.representation {
            Representation::Normal(normal) => normal,
            Representation::Sparse(sparse) => {
                normalized = Self::to_dense(sparse.clone());
                &normalized
            }
        };

        if let Representation::Normal(mine) = &mut self.representation {
            if mine.encoding().precision < theirs.encoding().precision {
                // The other side is finer: fold its registers down into ours.
                theirs.downgrade_each(mine.encoding(), |pos, rho_w| mine.set_max(pos, rho_w));
            } else {
                if mine.encoding().precision > theirs.encoding().precision {
                    mine.downgrade(theirs.encoding());
                }
                mine.merge(theirs);
            }
        }

        self.sparse_precision = self.sparse_precision.min(other.sparse_precision);
    }

    /// Reduces the precisions of the sketch. A dimension that would grow is
    /// left unchanged instead; the requested pair must still be valid on its
    /// own. Dense registers are rebuilt at the coarser precision; a sparse
    /// sketch re-encodes its values and stays sparse.
    pub fn downgrade(
        &mut self,
        normal_precision: u32,
        sparse_precision: u32,
    ) -> Result<(), SketchError> {
        SparseEncoding::new(normal_precision, sparse_precision)?;
        let normal_precision = normal_precision.min(self.precision());
        let sparse_precision = sparse_precision.min(self.sparse_precision);

        match &mut self.representation {
            Representation::Sparse(sparse) => {
                sparse.downgrade(SparseEncoding::new(normal_precision, sparse_precision)?);
            }
            Representation::Normal(normal) => {
                normal.downgrade(NormalEncoding::new(normal_precision)?);
            }
        }
        self.sparse_precision = sparse_precision;
        Ok(())
    }

    /// Renders the sketch to its envelope. Flushes the sparse buffer, so the
    /// output is canonical for the current contents.
    pub fn to_proto(&mut self) -> HyperLogLogPlusUniqueStateProto {
        let mut proto = HyperLogLogPlusUniqueStateProto::new();
        proto.set_precision_or_num_buckets(self.precision() as i32);
        proto.set_sparse_precision_or_num_buckets(self.sparse_precision as i32);
        match &mut self.representation {
            Representation::Sparse(sparse) => {
                let (data, size) = sparse.flushed_data();
                proto.set_sparse_size(size as i32);
                proto.set_sparse_data(data.to_vec());
            }
            Representation::Normal(normal) => {
                proto.set_data(normal.registers().to_vec());
            }
        }
        proto
    }

    /// Serializes the envelope.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>, SketchError> {
        Ok(self.to_proto().write_to_bytes()?)
    }

    fn is_unused(&self) -> bool {
        match &self.representation {
            Representation::Sparse(sparse) => sparse.is_empty(),
            Representation::Normal(normal) => normal.is_empty(),
        }
    }

    /// Promotes a sparse sketch to the dense register file. Dense mode is
    /// terminal.
    fn normalize(&mut self) {
        if let Representation::Sparse(sparse) = &mut self.representation {
            let mut dense = NormalRepresentation::new(sparse.encoding().normal);
            sparse.iterate(|pos, rho_w| dense.set_max(pos, rho_w));
            self.representation = Representation::Normal(dense);
        }
    }

    fn to_dense(mut sparse: SparseRepresentation) -> NormalRepresentation {
        let mut dense = NormalRepresentation::new(sparse.encoding().normal);
        sparse.iterate(|pos, rho_w| dense.set_max(pos, rho_w));
        dense
    }
}
