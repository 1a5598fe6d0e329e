use crate::encoding::NormalEncoding;
use crate::error::SketchError;

/// Dense register file: one rank byte per `2^p` buckets. The backing vector
/// stays empty until the first write, so an imported or promoted-but-unused
/// sketch costs nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalRepresentation {
    encoding: NormalEncoding,
    registers: Vec<u8>,
}

impl NormalRepresentation {
    pub fn new(encoding: NormalEncoding) -> Self {
        Self {
            encoding,
            registers: Vec::new(),
        }
    }

    /// Restores a register file from an envelope. The payload must be empty
    /// or exactly `2^p` bytes of in-range ranks.
    pub fn from_registers(
        encoding: NormalEncoding,
        registers: Vec<u8>,
    ) -> Result<Self, SketchError> {
        if !registers.is_empty() && registers.len() != encoding.num_registers() {
            return Err(SketchError::CorruptEncoding(format!(
                "register file holds {} bytes, expected {} for precision {}",
                registers.len(),
                encoding.num_registers(),
                encoding.precision
            )));
        }
        if let Some(rho_w) = registers.iter().find(|&&r| r > encoding.max_rho_w()) {
            return Err(SketchError::CorruptEncoding(format!(
                "register value {} exceeds the maximum rank {} at precision {}",
                rho_w,
                encoding.max_rho_w(),
                encoding.precision
            )));
        }
        Ok(Self {
            encoding,
            registers,
        })
    }

    pub fn encoding(&self) -> NormalEncoding {
        self.encoding
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    pub fn registers(&self) -> &[u8] {
        &self.registers
    }

    fn ensure_registers(&mut self) {
        if self.registers.is_empty() {
            self.registers = vec![0; self.encoding.num_registers()];
        }
    }

    pub fn add_hash(&mut self, hash: u64) {
        let (pos, rho_w) = self.encoding.pos_rho_w(hash);
        self.set_max(pos, rho_w);
    }

    /// Raises the register at `pos` to `rho_w` if it is lower.
    pub fn set_max(&mut self, pos: u32, rho_w: u8) {
        self.ensure_registers();
        let register = &mut self.registers[pos as usize];
        if *register < rho_w {
            *register = rho_w;
        }
    }

    /// Element-wise max with another register file at the same precision.
    pub fn merge(&mut self, other: &NormalRepresentation) {
        debug_assert_eq!(self.encoding, other.encoding);
        if other.is_empty() {
            return;
        }
        self.ensure_registers();
        for (register, &rho_w) in self.registers.iter_mut().zip(&other.registers) {
            if *register < rho_w {
                *register = rho_w;
            }
        }
    }

    /// Feeds every register through the precision change. Several source
    /// registers collapse into one target register, so the receiver must
    /// take the max of what it is handed.
    pub fn downgrade_each(&self, target: NormalEncoding, mut f: impl FnMut(u32, u8)) {
        for (pos, &rho_w) in self.registers.iter().enumerate() {
            let pos = pos as u32;
            f(
                self.encoding.downgrade_index(pos, target),
                self.encoding.downgrade_rho_w(pos, rho_w, target),
            );
        }
    }

    /// Rebuilds the register file at a coarser precision.
    pub fn downgrade(&mut self, target: NormalEncoding) {
        if target.precision >= self.encoding.precision {
            return;
        }
        if self.registers.is_empty() {
            self.encoding = target;
            return;
        }
        let mut next = NormalRepresentation::new(target);
        next.ensure_registers();
        self.downgrade_each(target, |pos, rho_w| next.set_max(pos, rho_w));
        *self = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoding(precision: u32) -> NormalEncoding {
        NormalEncoding::new(precision).unwrap()
    }

    #[test]
    fn allocates_on_first_write() {
        let mut representation = NormalRepresentation::new(encoding(10));
        assert!(representation.is_empty());
        representation.add_hash(1);
        assert_eq!(representation.registers().len(), 1 << 10);
    }

    #[test]
    fn add_hash_keeps_largest_rank() {
        let mut representation = NormalRepresentation::new(encoding(10));
        // Same register, ranks 4 and 2.
        representation.add_hash((0b1011100010u64 << 54) | (1 << 50));
        representation.add_hash((0b1011100010u64 << 54) | (1 << 52));
        assert_eq!(representation.registers()[0b1011100010], 4);
    }

    #[test]
    fn merge_takes_element_wise_max() {
        let mut a = NormalRepresentation::new(encoding(10));
        let mut b = NormalRepresentation::new(encoding(10));
        a.set_max(1, 5);
        a.set_max(2, 1);
        b.set_max(2, 7);
        a.merge(&b);
        assert_eq!(a.registers()[1], 5);
        assert_eq!(a.registers()[2], 7);
    }

    #[test]
    fn merge_with_empty_is_noop() {
        let mut a = NormalRepresentation::new(encoding(10));
        a.set_max(1, 5);
        let before = a.clone();
        a.merge(&NormalRepresentation::new(encoding(10)));
        assert_eq!(a, before);
    }

    #[test]
    fn downgrade_collapses_registers() {
        let mut representation = NormalRepresentation::new(encoding(12));
        // Registers 2048 and 2049 both map to coarse register 512.
        representation.set_max(0b100000000000, 4); // dropped bits 00 -> rank 6
        representation.set_max(0b100000000001, 9); // dropped bits 01 -> rank 2
        representation.downgrade(encoding(10));
        assert_eq!(representation.encoding().precision, 10);
        assert_eq!(representation.registers()[0b1000000000], 6);
    }

    #[test]
    fn downgrade_of_unwritten_file_keeps_it_empty() {
        let mut representation = NormalRepresentation::new(encoding(12));
        representation.downgrade(encoding(10));
        assert_eq!(representation.encoding().precision, 10);
        assert!(representation.is_empty());
    }

    #[test]
    fn from_registers_validates_length() {
        assert!(matches!(
            NormalRepresentation::from_registers(encoding(10), vec![0; 17]),
            Err(SketchError::CorruptEncoding(_))
        ));
        assert!(NormalRepresentation::from_registers(encoding(10), Vec::new()).is_ok());
        assert!(NormalRepresentation::from_registers(encoding(10), vec![0; 1 << 10]).is_ok());
    }

    #[test]
    fn from_registers_validates_rank_range() {
        let mut registers = vec![0; 1 << 10];
        registers[3] = 56; // max rank at precision 10 is 55
        assert!(matches!(
            NormalRepresentation::from_registers(encoding(10), registers),
            Err(SketchError::CorruptEncoding(_))
        ));
    }
}
