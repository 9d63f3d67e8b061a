//! CIL instruction representation, operand types, and control-flow classification.
//!
//! The engine works on already decoded instructions: an external metadata reader turns the
//! method's IL bytes into a list of [`Instruction`]s whose branch operands are *indices into
//! that same list* ([`Operand::Target`], [`Operand::Switch`]). Offsets are informational on
//! input and recomputed by the code generator on output.
//!
//! # Key Components
//!
//! - [`Instruction`] - Decoded instruction with classification queries and target rewriting
//! - [`Operand`] - Type-safe operand representation
//! - [`Immediate`] - Immediate value types
//! - [`FlowType`] - Control flow behavior classification
//! - [`StackBehavior`] - Stack effect metadata
//!
//! # Examples
//!
//! ```rust
//! use cilflow::assembly::{Instruction, Operand};
//!
//! let mut branch = Instruction::new("blt.s", Operand::Target(7))?;
//! assert!(branch.is_conditional_branch());
//! assert!(branch.can_flip());
//!
//! branch.flip();
//! assert_eq!(branch.mnemonic, "bge.s");
//!
//! branch.update_targets(&[3])?;
//! assert_eq!(branch.targets(), vec![3]);
//! # Ok::<(), cilflow::Error>(())
//! ```

use std::{
    fmt::{self, UpperHex},
    sync::OnceLock,
};

use rustc_hash::FxHashMap;

use crate::{
    assembly::{
        instructions::{CilInstruction, INSTRUCTIONS, INSTRUCTIONS_FE},
        opcodes,
    },
    metadata::token::Token,
    Error, Result,
};

/// Types of operands for CIL instructions.
///
/// Each variant corresponds to the encoding that follows the opcode in the IL byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    /// No operand
    None,
    /// Signed 8-bit immediate (also short branch displacements)
    Int8,
    /// Unsigned 8-bit immediate
    UInt8,
    /// Signed 16-bit immediate
    Int16,
    /// Unsigned 16-bit immediate
    UInt16,
    /// Signed 32-bit immediate (also long branch displacements)
    Int32,
    /// Unsigned 32-bit immediate
    UInt32,
    /// Signed 64-bit immediate
    Int64,
    /// Unsigned 64-bit immediate
    UInt64,
    /// 32-bit floating point immediate
    Float32,
    /// 64-bit floating point immediate
    Float64,
    /// Metadata token
    Token,
    /// Switch table operand
    Switch,
}

impl OperandType {
    /// Returns the size in bytes of this operand type.
    ///
    /// Returns `None` for `Switch`, whose size depends on the number of targets.
    #[must_use]
    pub const fn size(&self) -> Option<usize> {
        match self {
            OperandType::None => Some(0),
            OperandType::Int8 | OperandType::UInt8 => Some(1),
            OperandType::Int16 | OperandType::UInt16 => Some(2),
            OperandType::Int32
            | OperandType::UInt32
            | OperandType::Float32
            | OperandType::Token => Some(4),
            OperandType::Int64 | OperandType::UInt64 | OperandType::Float64 => Some(8),
            OperandType::Switch => None,
        }
    }
}

/// Immediate operand values.
#[derive(Debug, Clone, Copy, PartialEq)]
#[allow(missing_docs)]
pub enum Immediate {
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
}

impl UpperHex for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immediate::Int8(value) => write!(f, "{value:X}"),
            Immediate::UInt8(value) => write!(f, "{value:X}"),
            Immediate::Int16(value) => write!(f, "{value:X}"),
            Immediate::UInt16(value) => write!(f, "{value:X}"),
            Immediate::Int32(value) => write!(f, "{value:X}"),
            Immediate::UInt32(value) => write!(f, "{value:X}"),
            Immediate::Int64(value) => write!(f, "{value:X}"),
            Immediate::UInt64(value) => write!(f, "{value:X}"),
            Immediate::Float32(value) => write!(f, "{:X}", value.to_bits()),
            Immediate::Float64(value) => write!(f, "{:X}", value.to_bits()),
        }
    }
}

/// Instruction operand.
///
/// Branch operands are resolved: they hold the index of the target instruction inside the
/// instruction list the branch belongs to, never a raw displacement.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand present
    None,
    /// Immediate value (constants, local/argument indices, prefix arguments)
    Immediate(Immediate),
    /// Index of the branch target instruction
    Target(usize),
    /// Metadata token
    Token(Token),
    /// Indices of the switch case targets
    Switch(Vec<usize>),
}

/// Control flow behavior of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Normal execution continues to next instruction
    Sequential,
    /// Conditional branch to another location
    ConditionalBranch,
    /// Always branches to another location (unconditional jump)
    UnconditionalBranch,
    /// Call to another method (`jmp` doesn't return)
    Call,
    /// Returns from current method
    Return,
    /// Multi-way branch (switch statement)
    Switch,
    /// Exception throwing (`throw`, `rethrow`)
    Throw,
    /// End of finally or fault block
    EndFinally,
    /// End of a filter block
    EndFilter,
    /// Leave protected region (try/catch/finally)
    Leave,
}

/// Stack effect of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackBehavior {
    /// Number of items popped from stack
    pub pops: u8,
    /// Number of items pushed to stack
    pub pushes: u8,
    /// Net effect on stack depth (pushes - pops)
    pub net_effect: i8,
}

impl StackBehavior {
    /// Creates a stack behavior from pop and push counts.
    #[must_use]
    pub const fn new(pops: u8, pushes: u8) -> Self {
        #[allow(clippy::cast_possible_wrap)]
        let net_effect = pushes as i8 - pops as i8;
        StackBehavior {
            pops,
            pushes,
            net_effect,
        }
    }
}

static MNEMONIC_LOOKUP: OnceLock<FxHashMap<&'static str, (u8, u8)>> = OnceLock::new();

fn mnemonic_lookup() -> &'static FxHashMap<&'static str, (u8, u8)> {
    MNEMONIC_LOOKUP.get_or_init(|| {
        let mut map = FxHashMap::default();
        for (opcode, instr) in (0u8..).zip(INSTRUCTIONS.iter()) {
            if !instr.instr.is_empty() {
                map.insert(instr.instr, (0, opcode));
            }
        }
        for (opcode, instr) in (0u8..).zip(INSTRUCTIONS_FE.iter()) {
            if !instr.instr.is_empty() {
                map.insert(instr.instr, (opcodes::FE_PREFIX, opcode));
            }
        }
        map
    })
}

fn table_entry(prefix: u8, opcode: u8) -> Option<&'static CilInstruction<'static>> {
    let entry = match prefix {
        0 => INSTRUCTIONS.get(opcode as usize),
        opcodes::FE_PREFIX => INSTRUCTIONS_FE.get(opcode as usize),
        _ => None,
    }?;
    (!entry.instr.is_empty()).then_some(entry)
}

/// A decoded CIL instruction.
///
/// `Instruction` is plain data; it can be cloned freely and moved between blocks. All
/// control-flow relevant properties are derived from `prefix`/`opcode` through the static
/// opcode tables.
#[derive(Clone, PartialEq)]
pub struct Instruction {
    /// Offset of the instruction within the method body, in bytes
    pub offset: u32,
    /// The opcode byte (second byte for `0xFE` prefixed opcodes)
    pub opcode: u8,
    /// `0xFE` for two-byte opcodes, 0 otherwise
    pub prefix: u8,
    /// Dotted ECMA-335 mnemonic
    pub mnemonic: &'static str,
    /// Operand encoding
    pub op_type: OperandType,
    /// Control-flow class
    pub flow_type: FlowType,
    /// The operand
    pub operand: Operand,
    /// Stack effect
    pub stack_behavior: StackBehavior,
}

impl Instruction {
    /// Creates an instruction from its mnemonic.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMnemonic`] if the mnemonic is unknown, and [`Error::Malformed`]
    /// if the operand doesn't fit the instruction's operand type.
    pub fn new(mnemonic: &str, operand: Operand) -> Result<Self> {
        let Some(&(prefix, opcode)) = mnemonic_lookup().get(mnemonic) else {
            return Err(Error::InvalidMnemonic(mnemonic.to_string()));
        };
        Self::from_opcode(prefix, opcode, operand)
    }

    /// Creates an instruction from its encoding.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] for reserved opcodes, and if the operand doesn't fit the
    /// instruction's operand type.
    pub fn from_opcode(prefix: u8, opcode: u8, operand: Operand) -> Result<Self> {
        let Some(entry) = table_entry(prefix, opcode) else {
            return Err(malformed_error!("Reserved opcode: {:02X} {:02X}", prefix, opcode));
        };

        let fits = match (entry.op_type, &operand) {
            (OperandType::None, Operand::None)
            | (OperandType::Token, Operand::Token(_))
            | (OperandType::Switch, Operand::Switch(_)) => true,
            (OperandType::Int8 | OperandType::Int32, Operand::Target(_)) => {
                matches!(
                    entry.flow,
                    FlowType::ConditionalBranch | FlowType::UnconditionalBranch | FlowType::Leave
                )
            }
            (op_type, Operand::Immediate(_)) => {
                !matches!(
                    op_type,
                    OperandType::None | OperandType::Token | OperandType::Switch
                ) && !matches!(
                    entry.flow,
                    FlowType::ConditionalBranch | FlowType::UnconditionalBranch | FlowType::Leave
                )
            }
            _ => false,
        };
        if !fits {
            return Err(malformed_error!(
                "Operand {:?} doesn't fit {}",
                operand,
                entry.instr
            ));
        }

        Ok(Self::from_entry(prefix, opcode, entry, operand))
    }

    fn from_entry(
        prefix: u8,
        opcode: u8,
        entry: &'static CilInstruction<'static>,
        operand: Operand,
    ) -> Self {
        Instruction {
            offset: 0,
            opcode,
            prefix,
            mnemonic: entry.instr,
            op_type: entry.op_type,
            flow_type: entry.flow,
            operand,
            stack_behavior: StackBehavior::new(entry.stack_pops, entry.stack_pushes),
        }
    }

    /// Creates a `nop`.
    #[must_use]
    pub fn nop() -> Self {
        Self::from_entry(
            0,
            opcodes::NOP,
            &INSTRUCTIONS[opcodes::NOP as usize],
            Operand::None,
        )
    }

    /// Creates a long-form unconditional `br` to the instruction at `target`.
    #[must_use]
    pub fn branch(target: usize) -> Self {
        Self::from_entry(
            0,
            opcodes::BR,
            &INSTRUCTIONS[opcodes::BR as usize],
            Operand::Target(target),
        )
    }

    /// Overrides the table stack behavior, for signature dependent instructions such as
    /// `call` or `ret`.
    #[must_use]
    pub fn with_stack_behavior(mut self, pops: u8, pushes: u8) -> Self {
        self.stack_behavior = StackBehavior::new(pops, pushes);
        self
    }

    /// Returns `true` if the instruction has branch target operand(s): conditional and
    /// unconditional branches, `leave` and `switch`.
    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(
            self.flow_type,
            FlowType::ConditionalBranch
                | FlowType::UnconditionalBranch
                | FlowType::Switch
                | FlowType::Leave
        )
    }

    /// Returns `true` for the plain unconditional branches `br` and `br.s`.
    #[must_use]
    pub fn is_br(&self) -> bool {
        self.prefix == 0 && matches!(self.opcode, opcodes::BR | opcodes::BR_S)
    }

    /// Returns `true` for `leave` and `leave.s`.
    #[must_use]
    pub fn is_leave(&self) -> bool {
        self.flow_type == FlowType::Leave
    }

    /// Returns `true` for two-way conditional branches.
    #[must_use]
    pub fn is_conditional_branch(&self) -> bool {
        self.flow_type == FlowType::ConditionalBranch
    }

    /// Returns `true` for `switch`.
    #[must_use]
    pub fn is_switch(&self) -> bool {
        self.flow_type == FlowType::Switch
    }

    /// Returns `true` for `nop`.
    #[must_use]
    pub fn is_nop(&self) -> bool {
        self.prefix == 0 && self.opcode == opcodes::NOP
    }

    /// Returns `true` if execution may continue with the next instruction.
    ///
    /// True for sequential instructions, conditional branches, `switch`, and calls other than
    /// `jmp`.
    #[must_use]
    pub fn falls_through(&self) -> bool {
        match self.flow_type {
            FlowType::Sequential | FlowType::ConditionalBranch | FlowType::Switch => true,
            FlowType::Call => !(self.prefix == 0 && self.opcode == opcodes::JMP),
            _ => false,
        }
    }

    /// Returns `true` if the instruction must be the last one of its basic block.
    #[must_use]
    pub fn ends_block(&self) -> bool {
        self.is_branch() || !self.falls_through()
    }

    /// Returns `true` if the instruction empties the evaluation stack (`leave`, `endfinally`).
    #[must_use]
    pub fn clears_stack(&self) -> bool {
        matches!(self.flow_type, FlowType::Leave | FlowType::EndFinally)
    }

    fn flipped_opcode(&self) -> Option<u8> {
        if self.prefix != 0 {
            return None;
        }

        let flipped = match self.opcode {
            opcodes::BGE => opcodes::BLT,
            opcodes::BGE_S => opcodes::BLT_S,
            opcodes::BGE_UN => opcodes::BLT_UN,
            opcodes::BGE_UN_S => opcodes::BLT_UN_S,
            opcodes::BLT => opcodes::BGE,
            opcodes::BLT_S => opcodes::BGE_S,
            opcodes::BLT_UN => opcodes::BGE_UN,
            opcodes::BLT_UN_S => opcodes::BGE_UN_S,
            opcodes::BGT => opcodes::BLE,
            opcodes::BGT_S => opcodes::BLE_S,
            opcodes::BGT_UN => opcodes::BLE_UN,
            opcodes::BGT_UN_S => opcodes::BLE_UN_S,
            opcodes::BLE => opcodes::BGT,
            opcodes::BLE_S => opcodes::BGT_S,
            opcodes::BLE_UN => opcodes::BGT_UN,
            opcodes::BLE_UN_S => opcodes::BGT_UN_S,
            opcodes::BRFALSE => opcodes::BRTRUE,
            opcodes::BRFALSE_S => opcodes::BRTRUE_S,
            opcodes::BRTRUE => opcodes::BRFALSE,
            opcodes::BRTRUE_S => opcodes::BRFALSE_S,
            _ => return None,
        };
        Some(flipped)
    }

    /// Returns `true` if [`Instruction::flip`] can invert this conditional branch.
    ///
    /// `beq` and `bne.un` have no single-opcode inverse and can't be flipped.
    #[must_use]
    pub fn can_flip(&self) -> bool {
        self.flipped_opcode().is_some()
    }

    /// Inverts the condition of a conditional branch, keeping its operand.
    ///
    /// Returns `false` and leaves the instruction untouched if it can't be flipped.
    pub fn flip(&mut self) -> bool {
        match self.flipped_opcode() {
            Some(opcode) => {
                self.set_opcode(opcode);
                true
            }
            None => false,
        }
    }

    /// Returns the target indices of a branch or switch, empty for other instructions.
    #[must_use]
    pub fn targets(&self) -> Vec<usize> {
        match &self.operand {
            Operand::Target(target) if self.is_branch() => vec![*target],
            Operand::Switch(targets) => targets.clone(),
            _ => Vec::new(),
        }
    }

    /// Rewrites the branch target operand(s).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEdgeArity`] if single-target branches don't receive exactly one
    /// target, or non-branch instructions receive any.
    pub fn update_targets(&mut self, targets: &[usize]) -> Result<()> {
        match self.flow_type {
            FlowType::ConditionalBranch | FlowType::UnconditionalBranch | FlowType::Leave => {
                if targets.len() != 1 {
                    return Err(Error::InvalidEdgeArity {
                        mnemonic: self.mnemonic,
                        expected: "exactly 1",
                        found: targets.len(),
                    });
                }
                self.operand = Operand::Target(targets[0]);
            }
            FlowType::Switch => {
                self.operand = Operand::Switch(targets.to_vec());
            }
            _ => {
                if !targets.is_empty() {
                    return Err(Error::InvalidEdgeArity {
                        mnemonic: self.mnemonic,
                        expected: "0",
                        found: targets.len(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Returns `true` for branches encoded with an 8-bit displacement.
    #[must_use]
    pub fn is_short_branch(&self) -> bool {
        self.prefix == 0
            && matches!(
                self.opcode,
                opcodes::BR_S..=opcodes::BLT_UN_S | opcodes::LEAVE_S
            )
    }

    /// Converts a long-form branch to its short form. Returns `false` if there is none.
    pub fn to_short_form(&mut self) -> bool {
        if self.prefix != 0 {
            return false;
        }
        let short = match self.opcode {
            opcodes::BR..=opcodes::BLT_UN => self.opcode - (opcodes::BR - opcodes::BR_S),
            opcodes::LEAVE => opcodes::LEAVE_S,
            _ => return false,
        };
        self.set_opcode(short);
        true
    }

    /// Converts a short-form branch to its long form. Returns `false` if it isn't one.
    pub fn to_long_form(&mut self) -> bool {
        if !self.is_short_branch() {
            return false;
        }
        let long = match self.opcode {
            opcodes::LEAVE_S => opcodes::LEAVE,
            short => short + (opcodes::BR - opcodes::BR_S),
        };
        self.set_opcode(long);
        true
    }

    fn set_opcode(&mut self, opcode: u8) {
        let entry = &INSTRUCTIONS[opcode as usize];
        self.opcode = opcode;
        self.mnemonic = entry.instr;
        self.op_type = entry.op_type;
        self.flow_type = entry.flow;
    }

    /// Returns the encoded size of the instruction in bytes.
    #[must_use]
    pub fn size(&self) -> u32 {
        let opcode_size = if self.prefix == 0 { 1 } else { 2 };
        let operand_size = match (&self.operand, self.op_type.size()) {
            (Operand::Switch(targets), _) => 4 + 4 * targets.len(),
            (_, Some(size)) => size,
            (_, None) => 4,
        };
        u32::try_from(opcode_size + operand_size).unwrap_or(u32::MAX)
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_{:04X} - ", self.offset)?;

        if self.prefix != 0 {
            write!(f, "{:02X}:", self.prefix)?;
        }

        write!(f, "{:02X} - {:<12}", self.opcode, self.mnemonic)?;

        match &self.operand {
            Operand::None => {}
            Operand::Immediate(imm) => write!(f, " 0x{imm:X}")?,
            Operand::Target(target) => write!(f, " -> #{target}")?,
            Operand::Token(token) => write!(f, " token:0x{:08X}", token.value())?,
            Operand::Switch(items) => {
                write!(f, " switch[{}]:(", items.len())?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "#{item}")?;
                    if i >= 5 && items.len() > 6 {
                        write!(f, ", ...{} more", items.len() - 6)?;
                        break;
                    }
                }
                write!(f, ")")?;
            }
        }

        if self.flow_type != FlowType::Sequential {
            write!(f, " | {:?}", self.flow_type)?;
        }

        if self.stack_behavior.net_effect != 0 {
            write!(f, " | stack:{:+}", self.stack_behavior.net_effect)?;
        }

        Ok(())
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic)?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::Immediate(imm) => write!(f, " 0x{imm:X}"),
            Operand::Target(target) => write!(f, " #{target}"),
            Operand::Token(token) => write!(f, " {token}"),
            Operand::Switch(items) => {
                let items: Vec<String> = items.iter().map(|i| format!("#{i}")).collect();
                write!(f, " ({})", items.join(", "))
            }
        }
    }
}
