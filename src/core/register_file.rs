//! Architecture register file descriptions.
//!
//! A [`RegisterFile`] is the read-only description of a processor's registers
//! that the lifter consults while building RTL: names, widths, which registers
//! alias a bit range of a wider one, and the named flag groups carved out of
//! status registers. Registers are identified by a bank and an index within
//! the bank, the same way for every architecture.

use hashbrown::HashMap;

/// Maximum number of register banks supported (GP, S, D, Q, system...).
pub const MAX_REGISTER_BANKS: usize = 8;

/// Maximum number of registers per bank.
pub const MAX_REGISTERS_PER_BANK: usize = 64;

/// Type for register bank indices.
pub type RegBank = u8;

/// Type for register IDs within a bank.
pub type RegId = u8;

/// Combined register identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reg {
    pub bank: RegBank,
    pub id: RegId,
}

impl Reg {
    pub const fn new(bank: RegBank, id: RegId) -> Self {
        Self { bank, id }
    }

    /// Get the linear register index for array indexing.
    pub fn linear_index(&self) -> usize {
        (self.bank as usize) * MAX_REGISTERS_PER_BANK + (self.id as usize)
    }
}

/// Bit set for efficiently tracking register sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegBitSet {
    banks: [u64; MAX_REGISTER_BANKS],
}

impl RegBitSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, reg: Reg) -> bool {
        if reg.bank as usize >= MAX_REGISTER_BANKS || reg.id >= 64 {
            return false;
        }
        (self.banks[reg.bank as usize] & (1u64 << reg.id)) != 0
    }

    pub fn set(&mut self, reg: Reg) {
        if (reg.bank as usize) < MAX_REGISTER_BANKS && reg.id < 64 {
            self.banks[reg.bank as usize] |= 1u64 << reg.id;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.banks.iter().all(|b| *b == 0)
    }

    /// Registers in the set, ordered by bank then id.
    pub fn iter(&self) -> impl Iterator<Item = Reg> + '_ {
        self.banks.iter().enumerate().flat_map(|(bank, bits)| {
            (0..64u8)
                .filter(move |id| bits & (1u64 << id) != 0)
                .map(move |id| Reg::new(bank as RegBank, id))
        })
    }

    pub fn clear_all(&mut self) {
        self.banks.fill(0);
    }
}

/// One architectural register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterDef {
    pub reg: Reg,
    pub name: String,
    pub bits: u32,
    /// Wider register this one occupies a bit range of, with the bit offset.
    pub parent: Option<(Reg, u32)>,
}

/// A named subset of a status register's bits treated as one value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlagGroup {
    pub register: Reg,
    pub mask: u64,
    pub name: String,
}

/// Errors raised while building a register file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterFileError {
    /// Invalid register bank or ID.
    InvalidRegister,
    /// A register with the same name or id was already defined.
    Duplicate(String),
}

impl std::fmt::Display for RegisterFileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegisterFileError::InvalidRegister => write!(f, "Invalid register bank or id"),
            RegisterFileError::Duplicate(name) => write!(f, "Register defined twice: {name}"),
        }
    }
}

impl std::error::Error for RegisterFileError {}

/// Register definitions for one architecture.
///
/// Built once by an architecture module and then shared read-only by every
/// rewrite session.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    defs: Vec<Option<RegisterDef>>,
    by_name: HashMap<String, Reg>,
    flag_groups: Vec<FlagGroup>,
    stack_pointer: Option<Reg>,
    pointer_bits: u32,
}

impl RegisterFile {
    pub fn new(pointer_bits: u32) -> Self {
        Self {
            defs: vec![None; MAX_REGISTER_BANKS * MAX_REGISTERS_PER_BANK],
            by_name: HashMap::new(),
            flag_groups: Vec::new(),
            stack_pointer: None,
            pointer_bits,
        }
    }

    /// Define a register.
    pub fn define(
        &mut self,
        reg: Reg,
        name: impl Into<String>,
        bits: u32,
    ) -> Result<Reg, RegisterFileError> {
        if reg.bank as usize >= MAX_REGISTER_BANKS || reg.id as usize >= MAX_REGISTERS_PER_BANK {
            return Err(RegisterFileError::InvalidRegister);
        }
        let name = name.into();
        let slot = &mut self.defs[reg.linear_index()];
        if slot.is_some() || self.by_name.contains_key(&name) {
            return Err(RegisterFileError::Duplicate(name));
        }
        *slot = Some(RegisterDef {
            reg,
            name: name.clone(),
            bits,
            parent: None,
        });
        self.by_name.insert(name, reg);
        Ok(reg)
    }

    /// Record that `child` occupies bits `offset..offset + width(child)` of `parent`.
    pub fn alias(&mut self, child: Reg, parent: Reg, offset: u32) -> Result<(), RegisterFileError> {
        if self.get(parent).is_none() {
            return Err(RegisterFileError::InvalidRegister);
        }
        let def = self
            .defs
            .get_mut(child.linear_index())
            .and_then(Option::as_mut)
            .ok_or(RegisterFileError::InvalidRegister)?;
        def.parent = Some((parent, offset));
        Ok(())
    }

    pub fn define_flag_group(&mut self, register: Reg, mask: u64, name: impl Into<String>) {
        self.flag_groups.push(FlagGroup {
            register,
            mask,
            name: name.into(),
        });
    }

    pub fn set_stack_pointer(&mut self, reg: Reg) {
        self.stack_pointer = Some(reg);
    }

    pub fn stack_pointer(&self) -> Option<Reg> {
        self.stack_pointer
    }

    pub fn pointer_bits(&self) -> u32 {
        self.pointer_bits
    }

    pub fn get(&self, reg: Reg) -> Option<&RegisterDef> {
        self.defs.get(reg.linear_index()).and_then(Option::as_ref)
    }

    pub fn by_name(&self, name: &str) -> Option<Reg> {
        self.by_name.get(name).copied()
    }

    /// Bit width of a register, zero for undefined registers.
    pub fn width(&self, reg: Reg) -> u32 {
        self.get(reg).map_or(0, |def| def.bits)
    }

    pub fn name(&self, reg: Reg) -> &str {
        self.get(reg).map_or("?", |def| def.name.as_str())
    }

    pub fn flag_group(&self, name: &str) -> Option<&FlagGroup> {
        self.flag_groups.iter().find(|g| g.name == name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_regfile() -> RegisterFile {
        let mut regs = RegisterFile::new(32);
        for i in 0..4u8 {
            regs.define(Reg::new(0, i), format!("r{i}"), 32).unwrap();
        }
        regs.define(Reg::new(1, 0), "d0", 64).unwrap();
        regs.define(Reg::new(2, 0), "q0", 128).unwrap();
        regs.alias(Reg::new(1, 0), Reg::new(2, 0), 0).unwrap();
        regs
    }

    #[test]
    fn test_regbitset_operations() {
        let mut set = RegBitSet::new();
        let reg = Reg::new(0, 5);

        assert!(!set.contains(reg));
        set.set(reg);
        assert!(set.contains(reg));
        assert!(!set.is_empty());
        set.clear_all();
        assert!(set.is_empty());
    }

    #[test]
    fn test_regbitset_iteration_order() {
        let mut set = RegBitSet::new();
        set.set(Reg::new(2, 1));
        set.set(Reg::new(0, 7));
        set.set(Reg::new(0, 3));
        let regs: Vec<_> = set.iter().collect();
        assert_eq!(regs, vec![Reg::new(0, 3), Reg::new(0, 7), Reg::new(2, 1)]);
    }

    #[test]
    fn test_lookup_by_name_and_width() {
        let regs = create_test_regfile();
        let r2 = regs.by_name("r2").unwrap();
        assert_eq!(r2, Reg::new(0, 2));
        assert_eq!(regs.width(r2), 32);
        assert_eq!(regs.name(Reg::new(2, 0)), "q0");
        assert_eq!(regs.width(Reg::new(5, 5)), 0);
        assert_eq!(regs.len(), 6);
    }

    #[test]
    fn test_alias_and_duplicates() {
        let mut regs = create_test_regfile();
        assert_eq!(regs.get(Reg::new(1, 0)).unwrap().parent, Some((Reg::new(2, 0), 0)));
        assert_eq!(
            regs.define(Reg::new(0, 9), "r1", 32),
            Err(RegisterFileError::Duplicate("r1".to_string()))
        );
        assert_eq!(
            regs.define(Reg::new(9, 0), "x", 32),
            Err(RegisterFileError::InvalidRegister)
        );
    }
}
