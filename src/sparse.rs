use crate::encoding::SparseEncoding;
use crate::error::SketchError;
use crate::utils::difference::{self, DifferenceDecoder, DifferenceEncoder};

/// Fewest buffered values worth merging in one go.
const MIN_BUFFER_VALUES: usize = 32;

/// Sparse mode: a sorted, difference-encoded list of sparse values plus an
/// unsorted write buffer that amortizes the cost of keeping the list sorted.
/// The buffer is merged in ("flushed") when it reaches its cap and before
/// anything observes the list.
#[derive(Debug, Clone)]
pub struct SparseRepresentation {
    encoding: SparseEncoding,
    /// Difference-encoded stream of sorted values, one per sparse index.
    data: Vec<u8>,
    /// Number of values encoded in `data`.
    size: usize,
    buffer: Vec<u32>,
}

impl SparseRepresentation {
    pub fn new(encoding: SparseEncoding) -> Self {
        Self {
            encoding,
            data: Vec::new(),
            size: 0,
            buffer: Vec::new(),
        }
    }

    /// Restores a representation from an envelope stream, verifying varint
    /// framing, ascending order and per-value consistency.
    pub fn from_bytes(encoding: SparseEncoding, data: Vec<u8>) -> Result<Self, SketchError> {
        let size = difference::validate(&data)?;
        let mut previous_index = None;
        for value in DifferenceDecoder::new(&data) {
            let index = encoding.sparse_index(value);
            if index as u64 >= encoding.num_buckets() {
                return Err(SketchError::CorruptEncoding(format!(
                    "sparse index {} out of range for sparse precision {}",
                    index, encoding.sparse_precision
                )));
            }
            if previous_index.is_some_and(|previous| index <= previous) {
                return Err(SketchError::CorruptEncoding(
                    "sparse stream is not strictly ascending by index".to_string(),
                ));
            }
            previous_index = Some(index);
            if !encoding.is_well_formed(value) {
                return Err(SketchError::CorruptEncoding(format!(
                    "inconsistent sparse value {:#x}",
                    value
                )));
            }
        }
        Ok(Self {
            encoding,
            data,
            size,
            buffer: Vec::new(),
        })
    }

    pub fn encoding(&self) -> &SparseEncoding {
        &self.encoding
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0 && self.buffer.is_empty()
    }

    /// Number of entries in the sorted list; exact once flushed.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Byte budget before the representation stops paying for itself:
    /// three quarters of what the dense register file would take.
    fn max_bytes(&self) -> usize {
        self.encoding.normal.num_registers() * 6 / 8
    }

    fn max_buffer_values(&self) -> usize {
        (self.max_bytes() / 16).max(MIN_BUFFER_VALUES)
    }

    pub fn add_hash(&mut self, hash: u64) {
        self.buffer.push(self.encoding.encode(hash));
        if self.buffer.len() >= self.max_buffer_values() {
            self.flush();
        }
    }

    /// True once list and buffer together outgrow the byte budget; the owner
    /// should promote to the dense representation.
    pub fn over_max(&self) -> bool {
        self.data.len() + self.buffer.len() * std::mem::size_of::<u32>() > self.max_bytes()
    }

    /// Merges the buffer into the sorted list. Values sharing a sparse index
    /// collapse to the one with the largest rank, which numeric order puts
    /// last within the index's run.
    pub fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        self.buffer.sort_unstable();

        let (data, size) = {
            let mut merged = DifferenceEncoder::with_capacity(
                self.data.len() + self.buffer.len() * 2,
            );
            let mut size = 0usize;
            let mut list = DifferenceDecoder::new(&self.data).peekable();
            let mut buffered = self.buffer.iter().copied().peekable();
            let mut pending: Option<u32> = None;

            loop {
                let value = match (list.peek(), buffered.peek()) {
                    (Some(&a), Some(&b)) if a <= b => list.next(),
                    (Some(_), Some(_)) | (None, Some(_)) => buffered.next(),
                    (Some(_), None) => list.next(),
                    (None, None) => break,
                };
                let Some(value) = value else { break };
                match pending {
                    Some(previous)
                        if self.encoding.sparse_index(previous)
                            == self.encoding.sparse_index(value) =>
                    {
                        pending = Some(previous.max(value));
                    }
                    Some(previous) => {
                        merged.put(previous);
                        size += 1;
                        pending = Some(value);
                    }
                    None => pending = Some(value),
                }
            }
            if let Some(previous) = pending {
                merged.put(previous);
                size += 1;
            }
            (merged.into_bytes(), size)
        };

        self.data = data;
        self.size = size;
        self.buffer.clear();
    }

    /// Flushes, then hands every entry to `f` as normal-precision register
    /// coordinates, ascending by sparse index.
    pub fn iterate(&mut self, mut f: impl FnMut(u32, u8)) {
        self.flush();
        for value in DifferenceDecoder::new(&self.data) {
            let (pos, rho_w) = self.encoding.decode(value);
            f(pos, rho_w);
        }
    }

    /// Linear counting over the `2^sp` virtual buckets.
    pub fn estimate(&mut self) -> i64 {
        self.flush();
        let buckets = self.encoding.num_buckets() as f64;
        let zeros = buckets - self.size as f64;
        (buckets * (buckets / zeros).ln() + 0.5) as i64
    }

    /// Flushes and returns the encoded stream with its logical entry count.
    pub fn flushed_data(&mut self) -> (&[u8], usize) {
        self.flush();
        (&self.data, self.size)
    }

    /// Re-encodes every stored value for coarser precisions and re-merges.
    pub fn downgrade(&mut self, target: SparseEncoding) {
        if target == self.encoding {
            return;
        }
        self.flush();
        let downgraded: Vec<u32> = DifferenceDecoder::new(&self.data)
            .map(|value| self.encoding.downgrade(value, &target))
            .collect();
        self.encoding = target;
        self.data.clear();
        self.size = 0;
        self.buffer = downgraded;
        self.flush();
    }
}
