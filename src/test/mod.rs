//! Fixtures shared by the unit tests.

use crate::{
    assembly::{Instruction, Operand},
    metadata::method::MethodBody,
};

/// An instruction without operand.
pub fn instr(mnemonic: &str) -> Instruction {
    Instruction::new(mnemonic, Operand::None).unwrap()
}

/// A branch to instruction index `target`.
pub fn target_instr(mnemonic: &str, target: usize) -> Instruction {
    Instruction::new(mnemonic, Operand::Target(target)).unwrap()
}

/// The mnemonics of a body, in order.
pub fn mnemonics(body: &MethodBody) -> Vec<&'static str> {
    body.instructions.iter().map(|i| i.mnemonic).collect()
}
