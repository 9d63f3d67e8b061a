#![no_main]

use cilflow::{
    assembly::{Immediate, Instruction, Operand},
    blocks::GraphBuilder,
    deobfuscation::{DeobfuscationEngine, EngineConfig},
    metadata::{
        method::{ExceptionHandler, MethodBody},
        token::Token,
    },
};
use libfuzzer_sys::fuzz_target;

const MAX_INSTRUCTIONS: usize = 256;

fn instruction(bytes: &[u8], count: usize) -> Option<Instruction> {
    let prefix = if bytes[1] & 1 == 1 { 0xFE } else { 0x00 };
    let target = usize::from(bytes[2]) % count;
    let operands = [
        Operand::None,
        Operand::Target(target),
        Operand::Immediate(Immediate::Int32(i32::from(bytes[2]))),
        Operand::Token(Token::new(0x0A00_0000 | u32::from(bytes[2]))),
        Operand::Switch(vec![target, (target + 1) % count]),
    ];
    operands
        .into_iter()
        .find_map(|operand| Instruction::from_opcode(prefix, bytes[0], operand).ok())
}

fn handler(bytes: &[u8], count: usize) -> ExceptionHandler {
    let at = |b: u8| usize::from(b) % (count + 1);
    let try_range = at(bytes[1])..at(bytes[2]);
    let handler_range = at(bytes[3])..at(bytes[4]);
    match bytes[0] % 3 {
        0 => ExceptionHandler::finally(try_range, handler_range),
        1 => ExceptionHandler::fault(try_range, handler_range),
        _ => ExceptionHandler::catch(try_range, handler_range, Token::new(0x0100_0001)),
    }
}

fuzz_target!(|data: &[u8]| {
    let Some((&rows, rest)) = data.split_first() else {
        return;
    };
    let rows = usize::from(rows % 4);
    let split = rest.len().saturating_sub(rows * 5);
    let (code, table) = rest.split_at(split);

    let count = (code.len() / 3).min(MAX_INSTRUCTIONS);
    if count == 0 {
        return;
    }
    let Some(instructions) = code
        .chunks_exact(3)
        .take(count)
        .map(|bytes| instruction(bytes, count))
        .collect::<Option<Vec<_>>>()
    else {
        return;
    };
    let handlers = table
        .chunks_exact(5)
        .map(|bytes| handler(bytes, count))
        .collect();
    let body = MethodBody::new(instructions, handlers);

    let engine = DeobfuscationEngine::new(EngineConfig::aggressive().with_parallel(false));
    if let Ok(output) = engine.process_method(Token::new(0x0600_0001), &body) {
        // whatever the engine emits has to be accepted again
        assert!(GraphBuilder::new(&output).build().is_ok());
    }
});
