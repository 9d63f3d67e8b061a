//! CIL opcode byte constants (ECMA-335) that the control-flow engine inspects directly.
//!
//! Single-byte opcodes are named after their mnemonic (e.g. [`BR`] = `0x38`). Two-byte opcodes
//! that use the `0xFE` prefix have their second byte stored with an `FE_` prefix (e.g.
//! [`FE_ENDFILTER`] = `0x11` for `endfilter`, encoded `0xFE 0x11`). Every other opcode is only
//! reachable through the tables in [`crate::assembly::instructions`].
#![allow(missing_docs)]

/// Shared first byte of all two-byte opcodes
pub const FE_PREFIX: u8 = 0xFE;

// Misc
pub const NOP: u8 = 0x00;
pub const BREAK: u8 = 0x01;
pub const LDC_I4_0: u8 = 0x16;
pub const LDC_I4_1: u8 = 0x17;
pub const DUP: u8 = 0x25;
pub const POP: u8 = 0x26;

// Method exits
pub const JMP: u8 = 0x27;
pub const CALL: u8 = 0x28;
pub const RET: u8 = 0x2A;

// Branches (short form, int8 displacement)
pub const BR_S: u8 = 0x2B;
pub const BRFALSE_S: u8 = 0x2C;
pub const BRTRUE_S: u8 = 0x2D;
pub const BEQ_S: u8 = 0x2E;
pub const BGE_S: u8 = 0x2F;
pub const BGT_S: u8 = 0x30;
pub const BLE_S: u8 = 0x31;
pub const BLT_S: u8 = 0x32;
pub const BNE_UN_S: u8 = 0x33;
pub const BGE_UN_S: u8 = 0x34;
pub const BGT_UN_S: u8 = 0x35;
pub const BLE_UN_S: u8 = 0x36;
pub const BLT_UN_S: u8 = 0x37;

// Branches (long form, int32 displacement)
pub const BR: u8 = 0x38;
pub const BRFALSE: u8 = 0x39;
pub const BRTRUE: u8 = 0x3A;
pub const BEQ: u8 = 0x3B;
pub const BGE: u8 = 0x3C;
pub const BGT: u8 = 0x3D;
pub const BLE: u8 = 0x3E;
pub const BLT: u8 = 0x3F;
pub const BNE_UN: u8 = 0x40;
pub const BGE_UN: u8 = 0x41;
pub const BGT_UN: u8 = 0x42;
pub const BLE_UN: u8 = 0x43;
pub const BLT_UN: u8 = 0x44;
pub const SWITCH: u8 = 0x45;

// Exceptions
pub const THROW: u8 = 0x7A;
pub const ENDFINALLY: u8 = 0xDC;
pub const LEAVE: u8 = 0xDD;
pub const LEAVE_S: u8 = 0xDE;

// ── Two-byte opcodes (second byte after 0xFE) ──────────────────────────────
pub const FE_ENDFILTER: u8 = 0x11;
pub const FE_RETHROW: u8 = 0x1A;
