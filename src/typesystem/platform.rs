//! Target platform parameters consumed by layout and register constraints.

use std::fmt;

/// A physical register of the target, identified by its encoding number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Register(u8);

impl Register {
    /// Creates a register from its encoding number.
    #[must_use]
    pub const fn new(number: u8) -> Self {
        Register(number)
    }

    /// Returns the encoding number.
    #[must_use]
    pub const fn number(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Size, alignment and calling-convention facts about the compilation target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformAbstraction {
    memory_alignment: u32,
    pointer_size: u32,
    object_header_size: u32,
    argument_registers: Vec<Register>,
    return_register: Register,
}

impl Default for PlatformAbstraction {
    fn default() -> Self {
        Self::embedded32()
    }
}

impl PlatformAbstraction {
    /// A 32-bit microcontroller: 4-byte pointers and alignment, an 8-byte
    /// object header, the first four arguments in `r0`-`r3`, results in `r0`.
    #[must_use]
    pub fn embedded32() -> Self {
        PlatformAbstraction {
            memory_alignment: 4,
            pointer_size: 4,
            object_header_size: 8,
            argument_registers: (0..4).map(Register::new).collect(),
            return_register: Register::new(0),
        }
    }

    /// A 64-bit host: 8-byte pointers and alignment, a 16-byte object header,
    /// six argument registers.
    #[must_use]
    pub fn host64() -> Self {
        PlatformAbstraction {
            memory_alignment: 8,
            pointer_size: 8,
            object_header_size: 16,
            argument_registers: (0..6).map(Register::new).collect(),
            return_register: Register::new(0),
        }
    }

    /// Overrides the maximum alignment applied to fields and data objects.
    ///
    /// Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_memory_alignment(mut self, alignment: u32) -> Self {
        self.memory_alignment = alignment.max(1);
        self
    }

    /// Returns the maximum alignment, in bytes, the target requires.
    #[must_use]
    pub const fn memory_alignment(&self) -> u32 {
        self.memory_alignment
    }

    /// Returns the size of a pointer in bytes.
    #[must_use]
    pub const fn pointer_size(&self) -> u32 {
        self.pointer_size
    }

    /// Returns the size of the header preceding every heap object's fields.
    #[must_use]
    pub const fn object_header_size(&self) -> u32 {
        self.object_header_size
    }

    /// Returns the registers carrying the leading arguments, in order.
    #[must_use]
    pub fn argument_registers(&self) -> &[Register] {
        &self.argument_registers
    }

    /// Returns the register holding a method's return value.
    #[must_use]
    pub const fn return_register(&self) -> Register {
        self.return_register
    }
}
