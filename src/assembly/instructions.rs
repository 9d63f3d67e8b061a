//! Static opcode tables for all ECMA-335 CIL instructions.
//!
//! [`INSTRUCTIONS`] is indexed by the single opcode byte, [`INSTRUCTIONS_FE`] by the second
//! byte of `0xFE`-prefixed opcodes. Unassigned encodings are [`RESERVED`] entries with an empty
//! mnemonic.
//!
//! The stack columns hold the fixed pop/push counts of each opcode. Call-class instructions
//! (`call`, `callvirt`, `calli`, `newobj`, `jmp`) and `ret` depend on a method signature and are
//! listed with their signature-independent part only; callers that know the signature supply the
//! real numbers through [`crate::assembly::Instruction::with_stack_behavior`].

use crate::assembly::instruction::{FlowType as F, OperandType as T};

/// Static description of one CIL opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CilInstruction<'a> {
    /// Operand encoding following the opcode
    pub op_type: T,
    /// Mnemonic in dotted ECMA-335 spelling, empty for reserved encodings
    pub instr: &'a str,
    /// Control-flow class
    pub flow: F,
    /// Items popped from the evaluation stack
    pub stack_pops: u8,
    /// Items pushed onto the evaluation stack
    pub stack_pushes: u8,
}

/// Placeholder for an unassigned encoding.
pub const RESERVED: CilInstruction<'static> = op("", T::None, F::Sequential, 0, 0);

const fn op(
    instr: &'static str,
    op_type: T,
    flow: F,
    stack_pops: u8,
    stack_pushes: u8,
) -> CilInstruction<'static> {
    CilInstruction {
        op_type,
        instr,
        flow,
        stack_pops,
        stack_pushes,
    }
}

/// Single-byte opcodes `0x00..=0xE0`.
pub static INSTRUCTIONS: [CilInstruction<'static>; 225] = [
    op("nop", T::None, F::Sequential, 0, 0), // 0x00
    op("break", T::None, F::Sequential, 0, 0), // 0x01
    op("ldarg.0", T::None, F::Sequential, 0, 1), // 0x02
    op("ldarg.1", T::None, F::Sequential, 0, 1), // 0x03
    op("ldarg.2", T::None, F::Sequential, 0, 1), // 0x04
    op("ldarg.3", T::None, F::Sequential, 0, 1), // 0x05
    op("ldloc.0", T::None, F::Sequential, 0, 1), // 0x06
    op("ldloc.1", T::None, F::Sequential, 0, 1), // 0x07
    op("ldloc.2", T::None, F::Sequential, 0, 1), // 0x08
    op("ldloc.3", T::None, F::Sequential, 0, 1), // 0x09
    op("stloc.0", T::None, F::Sequential, 1, 0), // 0x0A
    op("stloc.1", T::None, F::Sequential, 1, 0), // 0x0B
    op("stloc.2", T::None, F::Sequential, 1, 0), // 0x0C
    op("stloc.3", T::None, F::Sequential, 1, 0), // 0x0D
    op("ldarg.s", T::UInt8, F::Sequential, 0, 1), // 0x0E
    op("ldarga.s", T::UInt8, F::Sequential, 0, 1), // 0x0F
    op("starg.s", T::UInt8, F::Sequential, 1, 0), // 0x10
    op("ldloc.s", T::UInt8, F::Sequential, 0, 1), // 0x11
    op("ldloca.s", T::UInt8, F::Sequential, 0, 1), // 0x12
    op("stloc.s", T::UInt8, F::Sequential, 1, 0), // 0x13
    op("ldnull", T::None, F::Sequential, 0, 1), // 0x14
    op("ldc.i4.m1", T::None, F::Sequential, 0, 1), // 0x15
    op("ldc.i4.0", T::None, F::Sequential, 0, 1), // 0x16
    op("ldc.i4.1", T::None, F::Sequential, 0, 1), // 0x17
    op("ldc.i4.2", T::None, F::Sequential, 0, 1), // 0x18
    op("ldc.i4.3", T::None, F::Sequential, 0, 1), // 0x19
    op("ldc.i4.4", T::None, F::Sequential, 0, 1), // 0x1A
    op("ldc.i4.5", T::None, F::Sequential, 0, 1), // 0x1B
    op("ldc.i4.6", T::None, F::Sequential, 0, 1), // 0x1C
    op("ldc.i4.7", T::None, F::Sequential, 0, 1), // 0x1D
    op("ldc.i4.8", T::None, F::Sequential, 0, 1), // 0x1E
    op("ldc.i4.s", T::Int8, F::Sequential, 0, 1), // 0x1F
    op("ldc.i4", T::Int32, F::Sequential, 0, 1), // 0x20
    op("ldc.i8", T::Int64, F::Sequential, 0, 1), // 0x21
    op("ldc.r4", T::Float32, F::Sequential, 0, 1), // 0x22
    op("ldc.r8", T::Float64, F::Sequential, 0, 1), // 0x23
    RESERVED, // 0x24
    op("dup", T::None, F::Sequential, 1, 2), // 0x25
    op("pop", T::None, F::Sequential, 1, 0), // 0x26
    op("jmp", T::Token, F::Call, 0, 0), // 0x27
    op("call", T::Token, F::Call, 0, 0), // 0x28
    op("calli", T::Token, F::Call, 0, 0), // 0x29
    op("ret", T::None, F::Return, 0, 0), // 0x2A
    op("br.s", T::Int8, F::UnconditionalBranch, 0, 0), // 0x2B
    op("brfalse.s", T::Int8, F::ConditionalBranch, 1, 0), // 0x2C
    op("brtrue.s", T::Int8, F::ConditionalBranch, 1, 0), // 0x2D
    op("beq.s", T::Int8, F::ConditionalBranch, 2, 0), // 0x2E
    op("bge.s", T::Int8, F::ConditionalBranch, 2, 0), // 0x2F
    op("bgt.s", T::Int8, F::ConditionalBranch, 2, 0), // 0x30
    op("ble.s", T::Int8, F::ConditionalBranch, 2, 0), // 0x31
    op("blt.s", T::Int8, F::ConditionalBranch, 2, 0), // 0x32
    op("bne.un.s", T::Int8, F::ConditionalBranch, 2, 0), // 0x33
    op("bge.un.s", T::Int8, F::ConditionalBranch, 2, 0), // 0x34
    op("bgt.un.s", T::Int8, F::ConditionalBranch, 2, 0), // 0x35
    op("ble.un.s", T::Int8, F::ConditionalBranch, 2, 0), // 0x36
    op("blt.un.s", T::Int8, F::ConditionalBranch, 2, 0), // 0x37
    op("br", T::Int32, F::UnconditionalBranch, 0, 0), // 0x38
    op("brfalse", T::Int32, F::ConditionalBranch, 1, 0), // 0x39
    op("brtrue", T::Int32, F::ConditionalBranch, 1, 0), // 0x3A
    op("beq", T::Int32, F::ConditionalBranch, 2, 0), // 0x3B
    op("bge", T::Int32, F::ConditionalBranch, 2, 0), // 0x3C
    op("bgt", T::Int32, F::ConditionalBranch, 2, 0), // 0x3D
    op("ble", T::Int32, F::ConditionalBranch, 2, 0), // 0x3E
    op("blt", T::Int32, F::ConditionalBranch, 2, 0), // 0x3F
    op("bne.un", T::Int32, F::ConditionalBranch, 2, 0), // 0x40
    op("bge.un", T::Int32, F::ConditionalBranch, 2, 0), // 0x41
    op("bgt.un", T::Int32, F::ConditionalBranch, 2, 0), // 0x42
    op("ble.un", T::Int32, F::ConditionalBranch, 2, 0), // 0x43
    op("blt.un", T::Int32, F::ConditionalBranch, 2, 0), // 0x44
    op("switch", T::Switch, F::Switch, 1, 0), // 0x45
    op("ldind.i1", T::None, F::Sequential, 1, 1), // 0x46
    op("ldind.u1", T::None, F::Sequential, 1, 1), // 0x47
    op("ldind.i2", T::None, F::Sequential, 1, 1), // 0x48
    op("ldind.u2", T::None, F::Sequential, 1, 1), // 0x49
    op("ldind.i4", T::None, F::Sequential, 1, 1), // 0x4A
    op("ldind.u4", T::None, F::Sequential, 1, 1), // 0x4B
    op("ldind.i8", T::None, F::Sequential, 1, 1), // 0x4C
    op("ldind.i", T::None, F::Sequential, 1, 1), // 0x4D
    op("ldind.r4", T::None, F::Sequential, 1, 1), // 0x4E
    op("ldind.r8", T::None, F::Sequential, 1, 1), // 0x4F
    op("ldind.ref", T::None, F::Sequential, 1, 1), // 0x50
    op("stind.ref", T::None, F::Sequential, 2, 0), // 0x51
    op("stind.i1", T::None, F::Sequential, 2, 0), // 0x52
    op("stind.i2", T::None, F::Sequential, 2, 0), // 0x53
    op("stind.i4", T::None, F::Sequential, 2, 0), // 0x54
    op("stind.i8", T::None, F::Sequential, 2, 0), // 0x55
    op("stind.r4", T::None, F::Sequential, 2, 0), // 0x56
    op("stind.r8", T::None, F::Sequential, 2, 0), // 0x57
    op("add", T::None, F::Sequential, 2, 1), // 0x58
    op("sub", T::None, F::Sequential, 2, 1), // 0x59
    op("mul", T::None, F::Sequential, 2, 1), // 0x5A
    op("div", T::None, F::Sequential, 2, 1), // 0x5B
    op("div.un", T::None, F::Sequential, 2, 1), // 0x5C
    op("rem", T::None, F::Sequential, 2, 1), // 0x5D
    op("rem.un", T::None, F::Sequential, 2, 1), // 0x5E
    op("and", T::None, F::Sequential, 2, 1), // 0x5F
    op("or", T::None, F::Sequential, 2, 1), // 0x60
    op("xor", T::None, F::Sequential, 2, 1), // 0x61
    op("shl", T::None, F::Sequential, 2, 1), // 0x62
    op("shr", T::None, F::Sequential, 2, 1), // 0x63
    op("shr.un", T::None, F::Sequential, 2, 1), // 0x64
    op("neg", T::None, F::Sequential, 1, 1), // 0x65
    op("not", T::None, F::Sequential, 1, 1), // 0x66
    op("conv.i1", T::None, F::Sequential, 1, 1), // 0x67
    op("conv.i2", T::None, F::Sequential, 1, 1), // 0x68
    op("conv.i4", T::None, F::Sequential, 1, 1), // 0x69
    op("conv.i8", T::None, F::Sequential, 1, 1), // 0x6A
    op("conv.r4", T::None, F::Sequential, 1, 1), // 0x6B
    op("conv.r8", T::None, F::Sequential, 1, 1), // 0x6C
    op("conv.u4", T::None, F::Sequential, 1, 1), // 0x6D
    op("conv.u8", T::None, F::Sequential, 1, 1), // 0x6E
    op("callvirt", T::Token, F::Call, 0, 0), // 0x6F
    op("cpobj", T::Token, F::Sequential, 2, 0), // 0x70
    op("ldobj", T::Token, F::Sequential, 1, 1), // 0x71
    op("ldstr", T::Token, F::Sequential, 0, 1), // 0x72
    op("newobj", T::Token, F::Call, 0, 1), // 0x73
    op("castclass", T::Token, F::Sequential, 1, 1), // 0x74
    op("isinst", T::Token, F::Sequential, 1, 1), // 0x75
    op("conv.r.un", T::None, F::Sequential, 1, 1), // 0x76
    RESERVED, // 0x77
    RESERVED, // 0x78
    op("unbox", T::Token, F::Sequential, 1, 1), // 0x79
    op("throw", T::None, F::Throw, 1, 0), // 0x7A
    op("ldfld", T::Token, F::Sequential, 1, 1), // 0x7B
    op("ldflda", T::Token, F::Sequential, 1, 1), // 0x7C
    op("stfld", T::Token, F::Sequential, 2, 0), // 0x7D
    op("ldsfld", T::Token, F::Sequential, 0, 1), // 0x7E
    op("ldsflda", T::Token, F::Sequential, 0, 1), // 0x7F
    op("stsfld", T::Token, F::Sequential, 1, 0), // 0x80
    op("stobj", T::Token, F::Sequential, 2, 0), // 0x81
    op("conv.ovf.i1.un", T::None, F::Sequential, 1, 1), // 0x82
    op("conv.ovf.i2.un", T::None, F::Sequential, 1, 1), // 0x83
    op("conv.ovf.i4.un", T::None, F::Sequential, 1, 1), // 0x84
    op("conv.ovf.i8.un", T::None, F::Sequential, 1, 1), // 0x85
    op("conv.ovf.u1.un", T::None, F::Sequential, 1, 1), // 0x86
    op("conv.ovf.u2.un", T::None, F::Sequential, 1, 1), // 0x87
    op("conv.ovf.u4.un", T::None, F::Sequential, 1, 1), // 0x88
    op("conv.ovf.u8.un", T::None, F::Sequential, 1, 1), // 0x89
    op("conv.ovf.i.un", T::None, F::Sequential, 1, 1), // 0x8A
    op("conv.ovf.u.un", T::None, F::Sequential, 1, 1), // 0x8B
    op("box", T::Token, F::Sequential, 1, 1), // 0x8C
    op("newarr", T::Token, F::Sequential, 1, 1), // 0x8D
    op("ldlen", T::None, F::Sequential, 1, 1), // 0x8E
    op("ldelema", T::Token, F::Sequential, 2, 1), // 0x8F
    op("ldelem.i1", T::None, F::Sequential, 2, 1), // 0x90
    op("ldelem.u1", T::None, F::Sequential, 2, 1), // 0x91
    op("ldelem.i2", T::None, F::Sequential, 2, 1), // 0x92
    op("ldelem.u2", T::None, F::Sequential, 2, 1), // 0x93
    op("ldelem.i4", T::None, F::Sequential, 2, 1), // 0x94
    op("ldelem.u4", T::None, F::Sequential, 2, 1), // 0x95
    op("ldelem.i8", T::None, F::Sequential, 2, 1), // 0x96
    op("ldelem.i", T::None, F::Sequential, 2, 1), // 0x97
    op("ldelem.r4", T::None, F::Sequential, 2, 1), // 0x98
    op("ldelem.r8", T::None, F::Sequential, 2, 1), // 0x99
    op("ldelem.ref", T::None, F::Sequential, 2, 1), // 0x9A
    op("stelem.i", T::None, F::Sequential, 3, 0), // 0x9B
    op("stelem.i1", T::None, F::Sequential, 3, 0), // 0x9C
    op("stelem.i2", T::None, F::Sequential, 3, 0), // 0x9D
    op("stelem.i4", T::None, F::Sequential, 3, 0), // 0x9E
    op("stelem.i8", T::None, F::Sequential, 3, 0), // 0x9F
    op("stelem.r4", T::None, F::Sequential, 3, 0), // 0xA0
    op("stelem.r8", T::None, F::Sequential, 3, 0), // 0xA1
    op("stelem.ref", T::None, F::Sequential, 3, 0), // 0xA2
    op("ldelem", T::Token, F::Sequential, 2, 1), // 0xA3
    op("stelem", T::Token, F::Sequential, 3, 0), // 0xA4
    op("unbox.any", T::Token, F::Sequential, 1, 1), // 0xA5
    RESERVED, // 0xA6
    RESERVED, // 0xA7
    RESERVED, // 0xA8
    RESERVED, // 0xA9
    RESERVED, // 0xAA
    RESERVED, // 0xAB
    RESERVED, // 0xAC
    RESERVED, // 0xAD
    RESERVED, // 0xAE
    RESERVED, // 0xAF
    RESERVED, // 0xB0
    RESERVED, // 0xB1
    RESERVED, // 0xB2
    op("conv.ovf.i1", T::None, F::Sequential, 1, 1), // 0xB3
    op("conv.ovf.u1", T::None, F::Sequential, 1, 1), // 0xB4
    op("conv.ovf.i2", T::None, F::Sequential, 1, 1), // 0xB5
    op("conv.ovf.u2", T::None, F::Sequential, 1, 1), // 0xB6
    op("conv.ovf.i4", T::None, F::Sequential, 1, 1), // 0xB7
    op("conv.ovf.u4", T::None, F::Sequential, 1, 1), // 0xB8
    op("conv.ovf.i8", T::None, F::Sequential, 1, 1), // 0xB9
    op("conv.ovf.u8", T::None, F::Sequential, 1, 1), // 0xBA
    RESERVED, // 0xBB
    RESERVED, // 0xBC
    RESERVED, // 0xBD
    RESERVED, // 0xBE
    RESERVED, // 0xBF
    RESERVED, // 0xC0
    RESERVED, // 0xC1
    op("refanyval", T::Token, F::Sequential, 1, 1), // 0xC2
    op("ckfinite", T::None, F::Sequential, 1, 1), // 0xC3
    RESERVED, // 0xC4
    RESERVED, // 0xC5
    op("mkrefany", T::Token, F::Sequential, 1, 1), // 0xC6
    RESERVED, // 0xC7
    RESERVED, // 0xC8
    RESERVED, // 0xC9
    RESERVED, // 0xCA
    RESERVED, // 0xCB
    RESERVED, // 0xCC
    RESERVED, // 0xCD
    RESERVED, // 0xCE
    RESERVED, // 0xCF
    op("ldtoken", T::Token, F::Sequential, 0, 1), // 0xD0
    op("conv.u2", T::None, F::Sequential, 1, 1), // 0xD1
    op("conv.u1", T::None, F::Sequential, 1, 1), // 0xD2
    op("conv.i", T::None, F::Sequential, 1, 1), // 0xD3
    op("conv.ovf.i", T::None, F::Sequential, 1, 1), // 0xD4
    op("conv.ovf.u", T::None, F::Sequential, 1, 1), // 0xD5
    op("add.ovf", T::None, F::Sequential, 2, 1), // 0xD6
    op("add.ovf.un", T::None, F::Sequential, 2, 1), // 0xD7
    op("mul.ovf", T::None, F::Sequential, 2, 1), // 0xD8
    op("mul.ovf.un", T::None, F::Sequential, 2, 1), // 0xD9
    op("sub.ovf", T::None, F::Sequential, 2, 1), // 0xDA
    op("sub.ovf.un", T::None, F::Sequential, 2, 1), // 0xDB
    op("endfinally", T::None, F::EndFinally, 0, 0), // 0xDC
    op("leave", T::Int32, F::Leave, 0, 0), // 0xDD
    op("leave.s", T::Int8, F::Leave, 0, 0), // 0xDE
    op("stind.i", T::None, F::Sequential, 2, 0), // 0xDF
    op("conv.u", T::None, F::Sequential, 1, 1), // 0xE0
];

/// Two-byte opcodes `0xFE 0x00..=0xFE 0x1E`.
pub static INSTRUCTIONS_FE: [CilInstruction<'static>; 31] = [
    op("arglist", T::None, F::Sequential, 0, 1), // 0x00
    op("ceq", T::None, F::Sequential, 2, 1), // 0x01
    op("cgt", T::None, F::Sequential, 2, 1), // 0x02
    op("cgt.un", T::None, F::Sequential, 2, 1), // 0x03
    op("clt", T::None, F::Sequential, 2, 1), // 0x04
    op("clt.un", T::None, F::Sequential, 2, 1), // 0x05
    op("ldftn", T::Token, F::Sequential, 0, 1), // 0x06
    op("ldvirtftn", T::Token, F::Sequential, 1, 1), // 0x07
    RESERVED, // 0x08
    op("ldarg", T::UInt16, F::Sequential, 0, 1), // 0x09
    op("ldarga", T::UInt16, F::Sequential, 0, 1), // 0x0A
    op("starg", T::UInt16, F::Sequential, 1, 0), // 0x0B
    op("ldloc", T::UInt16, F::Sequential, 0, 1), // 0x0C
    op("ldloca", T::UInt16, F::Sequential, 0, 1), // 0x0D
    op("stloc", T::UInt16, F::Sequential, 1, 0), // 0x0E
    op("localloc", T::None, F::Sequential, 1, 1), // 0x0F
    RESERVED, // 0x10
    op("endfilter", T::None, F::EndFilter, 1, 0), // 0x11
    op("unaligned.", T::UInt8, F::Sequential, 0, 0), // 0x12
    op("volatile.", T::None, F::Sequential, 0, 0), // 0x13
    op("tail.", T::None, F::Sequential, 0, 0), // 0x14
    op("initobj", T::Token, F::Sequential, 1, 0), // 0x15
    op("constrained.", T::Token, F::Sequential, 0, 0), // 0x16
    op("cpblk", T::None, F::Sequential, 3, 0), // 0x17
    op("initblk", T::None, F::Sequential, 3, 0), // 0x18
    op("no.", T::UInt8, F::Sequential, 0, 0), // 0x19
    op("rethrow", T::None, F::Throw, 0, 0), // 0x1A
    RESERVED, // 0x1B
    op("sizeof", T::Token, F::Sequential, 0, 1), // 0x1C
    op("refanytype", T::None, F::Sequential, 1, 1), // 0x1D
    op("readonly.", T::None, F::Sequential, 0, 0), // 0x1E
];
