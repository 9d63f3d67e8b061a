use crate::{assembly::Instruction, metadata::method::ExceptionHandler};

/// A decoded method body: the flat instruction list and its exception handler table.
///
/// This is both the input of [`crate::blocks::GraphBuilder`] and the output of
/// [`crate::blocks::CodeGenerator`]. Branch operands and exception boundaries are indices into
/// `instructions`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodBody {
    /// The instructions in program order
    pub instructions: Vec<Instruction>,
    /// A list of exception handlers this method has
    pub exception_handlers: Vec<ExceptionHandler>,
}

impl MethodBody {
    /// Creates a method body from its parts.
    #[must_use]
    pub fn new(instructions: Vec<Instruction>, exception_handlers: Vec<ExceptionHandler>) -> Self {
        MethodBody {
            instructions,
            exception_handlers,
        }
    }

    /// Size of the encoded instructions in bytes.
    #[must_use]
    pub fn code_size(&self) -> u32 {
        self.instructions.iter().map(Instruction::size).sum()
    }

    /// Recomputes the byte offset of every instruction from the encoded sizes.
    pub fn update_offsets(&mut self) {
        let mut offset = 0u32;
        for instr in &mut self.instructions {
            instr.offset = offset;
            offset += instr.size();
        }
    }

    /// Computes the maximum evaluation stack depth by simulating every reachable path.
    ///
    /// Handler entries start with the exception object on the stack for catch and filter
    /// clauses. Depths that would go negative are clamped to zero.
    #[must_use]
    pub fn max_stack(&self) -> usize {
        let count = self.instructions.len();
        let mut depth_at: Vec<Option<usize>> = vec![None; count];
        let mut worklist = Vec::new();

        if count > 0 {
            worklist.push((0usize, 0usize));
        }
        for handler in &self.exception_handlers {
            let initial = usize::from(handler.pushes_exception());
            if let Some(filter_start) = handler.filter_start {
                worklist.push((filter_start, initial));
            }
            worklist.push((handler.handler_start, initial));
        }

        let mut max = 0;
        while let Some((start, depth)) = worklist.pop() {
            let mut index = start;
            let mut depth = depth;
            while index < count && depth_at[index].is_none() {
                depth_at[index] = Some(depth);
                max = max.max(depth);

                let instr = &self.instructions[index];
                depth = depth.saturating_sub(usize::from(instr.stack_behavior.pops))
                    + usize::from(instr.stack_behavior.pushes);
                if instr.clears_stack() {
                    depth = 0;
                }
                max = max.max(depth);

                for target in instr.targets() {
                    worklist.push((target, depth));
                }
                if !instr.falls_through() {
                    break;
                }
                index += 1;
            }
        }

        max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{Immediate, Operand},
        metadata::token::Token,
    };

    fn instr(mnemonic: &str) -> Instruction {
        Instruction::new(mnemonic, Operand::None).unwrap()
    }

    #[test]
    fn test_offsets_and_size() {
        let mut body = MethodBody::new(
            vec![
                Instruction::new("ldc.i4.s", Operand::Immediate(Immediate::Int8(3))).unwrap(),
                Instruction::new("brtrue", Operand::Target(3)).unwrap(),
                instr("nop"),
                instr("ret"),
            ],
            vec![],
        );
        body.update_offsets();
        let offsets: Vec<u32> = body.instructions.iter().map(|i| i.offset).collect();
        assert_eq!(offsets, vec![0, 2, 7, 8]);
        assert_eq!(body.code_size(), 9);
    }

    #[test]
    fn test_max_stack() {
        let body = MethodBody::new(
            vec![
                instr("ldc.i4.0"),
                instr("ldc.i4.1"),
                instr("add"),
                Instruction::new("leave.s", Operand::Target(5)).unwrap(),
                instr("pop"),
                instr("ret"),
            ],
            vec![ExceptionHandler::catch(0..4, 4..5, Token(0x0100_0001))],
        );
        assert_eq!(body.max_stack(), 2);
    }
}
