//! Register identifiers, register sets and the scratch register pool.
//!
//! The backend does not allocate registers for its caller; the caller decides
//! which registers hold its values. What the backend does need is a small pool of
//! scratch registers it may borrow while expanding one operation into several
//! instructions. [`TempRegisterPool`] lends those out strictly last-in first-out.

/// Maximum number of register banks supported (GP, FP).
pub const MAX_REGISTER_BANKS: usize = 2;

/// Type for register bank indices.
pub type RegBank = u8;

/// Type for register IDs within a bank.
pub type RegId = u8;

/// General-purpose register bank.
pub const GP_BANK: RegBank = 0;

/// Floating-point register bank.
pub const FP_BANK: RegBank = 1;

/// Combined register identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AsmReg {
    pub bank: RegBank,
    pub id: RegId,
}

impl AsmReg {
    pub const fn new(bank: RegBank, id: RegId) -> Self {
        Self { bank, id }
    }
}

/// Bit set for tracking register sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegBitSet {
    banks: [u64; MAX_REGISTER_BANKS],
}

impl RegBitSet {
    pub const fn new() -> Self {
        Self {
            banks: [0; MAX_REGISTER_BANKS],
        }
    }

    /// Build a set from a list of registers.
    pub fn from_regs(regs: &[AsmReg]) -> Self {
        let mut set = Self::new();
        for &reg in regs {
            set.set(reg);
        }
        set
    }

    pub fn contains(&self, reg: AsmReg) -> bool {
        (self.banks[reg.bank as usize] & (1u64 << reg.id)) != 0
    }

    pub fn set(&mut self, reg: AsmReg) {
        self.banks[reg.bank as usize] |= 1u64 << reg.id;
    }

    pub fn clear(&mut self, reg: AsmReg) {
        self.banks[reg.bank as usize] &= !(1u64 << reg.id);
    }

    pub fn intersects(&self, other: &RegBitSet) -> bool {
        (0..MAX_REGISTER_BANKS).any(|i| self.banks[i] & other.banks[i] != 0)
    }

    pub fn count_in_bank(&self, bank: RegBank) -> u32 {
        self.banks[bank as usize].count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.banks.iter().all(|&b| b == 0)
    }
}

/// Fixed-capacity stack of scratch registers.
///
/// `checkout` hands out the next register of the pool; `release` must return the
/// most recently checked-out one. Exhausting the pool or releasing out of order
/// means an operation was composed incorrectly and panics.
#[derive(Debug, Clone)]
pub struct TempRegisterPool {
    regs: &'static [AsmReg],
    depth: usize,
    lent: RegBitSet,
    high_water: usize,
}

impl TempRegisterPool {
    /// Create a pool lending `regs` in order. `reserved` lists registers that
    /// must never be lent out.
    pub fn new(regs: &'static [AsmReg], reserved: &RegBitSet) -> Self {
        let pool = RegBitSet::from_regs(regs);
        assert!(
            !pool.intersects(reserved),
            "temp pool overlaps the reserved registers"
        );
        assert!(
            regs.len() as u32 == pool.count_in_bank(GP_BANK) + pool.count_in_bank(FP_BANK),
            "temp pool lists a register twice"
        );
        Self {
            regs,
            depth: 0,
            lent: RegBitSet::new(),
            high_water: 0,
        }
    }

    pub fn checkout(&mut self) -> AsmReg {
        assert!(
            self.depth < self.regs.len(),
            "temp register pool exhausted ({} in use)",
            self.depth
        );
        let reg = self.regs[self.depth];
        self.depth += 1;
        self.high_water = self.high_water.max(self.depth);
        self.lent.set(reg);
        reg
    }

    pub fn release(&mut self, reg: AsmReg) {
        assert!(self.depth > 0, "release of {reg:?} with no temp checked out");
        let top = self.regs[self.depth - 1];
        assert_eq!(top, reg, "temp registers must be released in reverse checkout order");
        self.depth -= 1;
        self.lent.clear(reg);
    }

    /// Number of registers currently lent out.
    pub fn in_use(&self) -> usize {
        self.depth
    }

    pub fn is_lent(&self, reg: AsmReg) -> bool {
        self.lent.contains(reg)
    }

    /// Deepest nesting seen since the pool was created or reset.
    pub fn high_water(&self) -> usize {
        self.high_water
    }

    pub fn capacity(&self) -> usize {
        self.regs.len()
    }

    pub fn reset(&mut self) {
        self.depth = 0;
        self.lent = RegBitSet::new();
        self.high_water = 0;
    }
}
