//! End-to-end scenarios for the block tree.
//!
//! Each test decodes nothing: bodies are written out as instruction lists, then
//!
//! 1. lifted with [`GraphBuilder`]
//! 2. restructured (dead code, merging, layout) where the scenario asks for it
//! 3. regenerated with [`CodeGenerator`] and compared against the expected listing

use cilflow::{
    assembly::{Instruction, Operand},
    blocks::{
        repartition, CodeGenerator, DeadCodeEliminator, GraphBuilder, MethodBlocks, NodeKind,
    },
    metadata::{
        method::{ExceptionHandler, MethodBody},
        token::Token,
    },
    Error,
};

fn instr(mnemonic: &str) -> Instruction {
    Instruction::new(mnemonic, Operand::None).unwrap()
}

fn target_instr(mnemonic: &str, target: usize) -> Instruction {
    Instruction::new(mnemonic, Operand::Target(target)).unwrap()
}

fn mnemonics(body: &MethodBody) -> Vec<&'static str> {
    body.instructions.iter().map(|i| i.mnemonic).collect()
}

/// Checks that every edge is mirrored in the target's source list and vice versa.
fn assert_edges_symmetric(blocks: &MethodBlocks) {
    for id in blocks.all_blocks().unwrap() {
        let block = blocks.block(id).unwrap();
        for successor in block.successors() {
            let expected = block.successors().iter().filter(|&&s| s == successor).count();
            let found = blocks
                .block(successor)
                .unwrap()
                .sources()
                .iter()
                .filter(|&&s| s == id)
                .count();
            assert_eq!(expected, found, "edge {id} -> {successor} is not mirrored");
        }
        for &source in block.sources() {
            assert!(blocks.block(source).unwrap().successors().contains(&id));
        }
    }
    blocks.verify().unwrap();
}

#[test]
fn test_unconditional_branch_kept() {
    // A: br B, B: ret
    let body = MethodBody::new(vec![target_instr("br", 1), instr("ret")], vec![]);
    let blocks = GraphBuilder::new(&body)
        .strip_branches(false)
        .build()
        .unwrap();

    let ids = blocks.all_blocks().unwrap();
    assert_eq!(ids.len(), 2);
    let (a, b) = (ids[0], ids[1]);
    assert_eq!(blocks.block(a).unwrap().fallthrough(), None);
    assert_eq!(blocks.block(a).unwrap().targets(), Some(&[b][..]));
    assert_eq!(blocks.block(b).unwrap().sources(), &[a]);

    let output = CodeGenerator::new(&blocks).generate().unwrap();
    assert_eq!(mnemonics(&output), vec!["br.s", "ret"]);
    assert_eq!(output.instructions[0].targets(), vec![1]);
    assert!(output.exception_handlers.is_empty());
}

#[test]
fn test_unconditional_branch_stripped() {
    let body = MethodBody::new(vec![target_instr("br", 1), instr("ret")], vec![]);
    let blocks = GraphBuilder::new(&body).build().unwrap();

    let ids = blocks.all_blocks().unwrap();
    let a = blocks.block(ids[0]).unwrap();
    assert!(a.is_empty());
    assert_eq!(a.fallthrough(), Some(ids[1]));
    assert!(a.targets().is_none());

    // the empty block still occupies a slot in the output
    let output = CodeGenerator::new(&blocks).generate().unwrap();
    assert_eq!(mnemonics(&output), vec!["nop", "ret"]);
}

#[test]
fn test_try_catch_region() {
    // 0: nop  1: leave 4  | 2: pop  3: rethrow | 4: ret
    let catch_type = Token::new(0x0100_0001);
    let body = MethodBody::new(
        vec![
            instr("nop"),
            target_instr("leave", 4),
            instr("pop"),
            instr("rethrow"),
            instr("ret"),
        ],
        vec![ExceptionHandler::catch(0..2, 2..4, catch_type)],
    );
    let mut blocks = GraphBuilder::new(&body).build().unwrap();

    let root = blocks.root();
    let top = blocks.children(root).unwrap().to_vec();
    assert_eq!(top.len(), 2);
    assert!(matches!(
        blocks.node(top[0]).unwrap().kind(),
        NodeKind::ProtectedRegion(_)
    ));
    assert!(blocks.is_block(top[1]));

    let handlers = blocks.handlers(top[0]).unwrap().to_vec();
    assert_eq!(handlers.len(), 1);
    let handler = blocks.region_handler(handlers[0]).unwrap();
    assert_eq!(handler.catch_type(), Some(catch_type));
    assert!(handler.filter().is_none());
    assert!(handler.pushes_exception());

    assert_eq!(DeadCodeEliminator::new(&mut blocks).run().unwrap(), 0);
    assert_edges_symmetric(&blocks);

    let output = CodeGenerator::new(&blocks).generate().unwrap();
    assert_eq!(
        mnemonics(&output),
        vec!["nop", "leave.s", "pop", "rethrow", "ret"]
    );
    assert_eq!(output.exception_handlers.len(), 1);
    let row = &output.exception_handlers[0];
    assert_eq!((row.try_start, row.try_end), (0, 2));
    assert_eq!((row.handler_start, row.handler_end), (2, 4));
    assert!(row.is_catch());
}

#[test]
fn test_conditional_not_merged_unconditional_merged() {
    let mut blocks = MethodBlocks::new();
    let root = blocks.root();
    // A: ldarg.0; brtrue D (falls into B)
    let a = blocks.new_block(vec![instr("ldarg.0"), target_instr("brtrue", 0)]);
    // B: ldc.i4.0; br C
    let b = blocks.new_block(vec![instr("ldc.i4.0"), target_instr("br", 0)]);
    // C: pop; ret
    let c = blocks.new_block(vec![instr("pop"), instr("ret")]);
    // D: ret
    let d = blocks.new_block(vec![instr("ret")]);
    for id in [a, b, c, d] {
        blocks.add(root, id).unwrap();
    }
    blocks.set_fallthrough(a, Some(b)).unwrap();
    blocks.set_targets(a, Some(vec![d])).unwrap();
    blocks.set_targets(b, Some(vec![c])).unwrap();

    assert!(!blocks.can_merge(a, b).unwrap());
    assert!(blocks.can_merge(b, c).unwrap());

    let merged = blocks.merge_blocks(root).unwrap();
    assert_eq!(merged, 1);
    assert!(!blocks.contains(c));

    let merged_block = blocks.block(b).unwrap();
    let listing: Vec<&str> = merged_block
        .instructions()
        .iter()
        .map(|i| i.mnemonic)
        .collect();
    assert_eq!(listing, vec!["ldc.i4.0", "pop", "ret"]);
    assert_eq!(merged_block.count_targets(), 0);
    assert_edges_symmetric(&blocks);
}

#[test]
fn test_misaligned_handler_ranges_rejected() {
    // two handlers of the same try overlap each other
    let catch_type = Token::new(0x0100_0001);
    let body = MethodBody::new(
        vec![
            instr("nop"),
            target_instr("leave", 5),
            instr("pop"),
            instr("pop"),
            target_instr("leave", 5),
            instr("ret"),
        ],
        vec![
            ExceptionHandler::catch(0..2, 2..4, catch_type),
            ExceptionHandler::catch(0..2, 3..5, catch_type),
        ],
    );
    let result = GraphBuilder::new(&body).build();
    assert!(matches!(result, Err(Error::MalformedExceptionTable { .. })));
}

#[test]
fn test_handler_past_end_rejected() {
    let body = MethodBody::new(
        vec![instr("nop"), instr("ret")],
        vec![ExceptionHandler::finally(0..1, 1..4)],
    );
    let result = GraphBuilder::new(&body).build();
    assert!(matches!(result, Err(Error::MalformedExceptionTable { .. })));
}

#[test]
fn test_branch_out_of_range_rejected() {
    let body = MethodBody::new(vec![target_instr("br", 9)], vec![]);
    assert!(matches!(
        GraphBuilder::new(&body).build(),
        Err(Error::Malformed { .. })
    ));
}

#[test]
fn test_roundtrip_keeps_listing() {
    let body = MethodBody::new(
        vec![
            instr("ldarg.0"),
            target_instr("brtrue", 4),
            instr("ldc.i4.0"),
            instr("ret"),
            instr("ldc.i4.1"),
            instr("ret"),
        ],
        vec![],
    );
    let blocks = GraphBuilder::new(&body).build().unwrap();
    let output = CodeGenerator::new(&blocks).generate().unwrap();

    assert_eq!(
        mnemonics(&output),
        vec!["ldarg.0", "brtrue.s", "ldc.i4.0", "ret", "ldc.i4.1", "ret"]
    );
    assert_eq!(output.instructions[1].targets(), vec![4]);

    // regenerating the output gives the same listing again
    let again = CodeGenerator::new(&GraphBuilder::new(&output).build().unwrap())
        .generate()
        .unwrap();
    assert_eq!(again, output);
}

#[test]
fn test_switch_edges_symmetric() {
    // 0: ldarg.0  1: switch (3, 3, 5)  2: ret  3: ldc.i4.0  4: ret  5: ldc.i4.1  6: ret
    let body = MethodBody::new(
        vec![
            instr("ldarg.0"),
            Instruction::new("switch", Operand::Switch(vec![3, 3, 5])).unwrap(),
            instr("ret"),
            instr("ldc.i4.0"),
            instr("ret"),
            instr("ldc.i4.1"),
            instr("ret"),
        ],
        vec![],
    );
    let blocks = GraphBuilder::new(&body).build().unwrap();
    let ids = blocks.all_blocks().unwrap();
    assert_eq!(ids.len(), 4);
    assert_eq!(blocks.block(ids[0]).unwrap().count_targets(), 4);
    // the duplicated case shows up twice in the sources
    assert_eq!(blocks.block(ids[2]).unwrap().sources(), &[ids[0], ids[0]]);
    assert_edges_symmetric(&blocks);
}

#[test]
fn test_exit_first_entries_stay_first() {
    // 0: leave 4 | 1: ldnull  2: throw | 3: endfinally | 4: ret
    let body = MethodBody::new(
        vec![
            target_instr("leave", 4),
            instr("ldnull"),
            instr("throw"),
            instr("endfinally"),
            instr("ret"),
        ],
        vec![ExceptionHandler::finally(0..3, 3..4)],
    );
    let mut blocks = GraphBuilder::new(&body).build().unwrap();
    repartition(&mut blocks).unwrap();
    let output = CodeGenerator::new(&blocks).generate().unwrap();
    assert_eq!(
        mnemonics(&output),
        vec!["leave.s", "ldnull", "throw", "endfinally", "ret"]
    );
    let row = &output.exception_handlers[0];
    assert_eq!(output.instructions[row.try_start].mnemonic, "leave.s");
    assert_eq!(output.instructions[row.handler_start].mnemonic, "endfinally");

    // a method whose entry already returns
    let body = MethodBody::new(vec![instr("ret"), instr("ldnull"), instr("throw")], vec![]);
    let blocks = GraphBuilder::new(&body).build().unwrap();
    let output = CodeGenerator::new(&blocks).generate().unwrap();
    assert_eq!(output.instructions[0].mnemonic, "ret");
}

#[test]
fn test_reorder_keeps_loop_valid() {
    // 0: br 3  1: ldarg.0  2: pop  3: ldarg.0  4: brtrue 1  5: ret
    let body = MethodBody::new(
        vec![
            target_instr("br", 3),
            instr("ldarg.0"),
            instr("pop"),
            instr("ldarg.0"),
            target_instr("brtrue", 1),
            instr("ret"),
        ],
        vec![],
    );
    let mut blocks = GraphBuilder::new(&body)
        .strip_branches(false)
        .build()
        .unwrap();
    repartition(&mut blocks).unwrap();
    assert_edges_symmetric(&blocks);

    let output = CodeGenerator::new(&blocks).generate().unwrap();
    assert!(output.instructions.len() >= 5);
    assert_eq!(
        output.instructions.iter().filter(|i| i.mnemonic == "ret").count(),
        1
    );
    for instruction in &output.instructions {
        for target in instruction.targets() {
            assert!(target < output.instructions.len());
        }
    }
}

#[test]
fn test_large_method() {
    // a long chain of trampolines: i: br i+1, then ret
    const COUNT: usize = 5_000;
    let mut instructions: Vec<Instruction> =
        (0..COUNT).map(|i| target_instr("br", i + 1)).collect();
    instructions.push(instr("ret"));
    let body = MethodBody::new(instructions, vec![]);

    let mut blocks = GraphBuilder::new(&body)
        .strip_branches(false)
        .build()
        .unwrap();
    assert_eq!(blocks.all_blocks().unwrap().len(), COUNT + 1);
    assert_eq!(DeadCodeEliminator::new(&mut blocks).run().unwrap(), 0);
    repartition(&mut blocks).unwrap();
    blocks.verify().unwrap();

    let output = CodeGenerator::new(&blocks).generate().unwrap();
    assert_eq!(output.instructions.len(), COUNT + 1);

    let root = blocks.root();
    assert_eq!(blocks.merge_blocks(root).unwrap(), COUNT);
    let output = CodeGenerator::new(&blocks).generate().unwrap();
    assert_eq!(mnemonics(&output), vec!["ret"]);
}
