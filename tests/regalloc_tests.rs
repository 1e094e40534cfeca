//! Allocation invariants checked over whole compiled functions.

use bumpalo::Bump;
use cube_backend::core::register_file::PhysReg;
use cube_backend::core::{compute_live_intervals, CompilationSession, Compiler};
use cube_backend::ir::VirtualRegister;
use cube_backend::test_ir::parse_program;
use cube_backend::{CompileError, Instr, LinearScan, Opcode, Operand, VReg, Width};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

fn load_program(filename: &str) -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/programs").join(filename);
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e))
}

/// Slot of every virtual register, checking each register keeps one slot throughout.
fn slot_map(instrs: &[Instr]) -> HashMap<VReg, PhysReg> {
    let mut slots = HashMap::new();
    for instr in instrs {
        for reg in instr.virtual_registers() {
            let slot = reg.slot.unwrap_or_else(|| panic!("{} left unallocated in {instr}", reg.index));
            let previous = *slots.entry(reg.index).or_insert(slot);
            assert_eq!(previous, slot, "{} changed slot", reg.index);
        }
    }
    slots
}

#[test]
fn test_compiled_functions_respect_allocation_invariants() {
    let _ = env_logger::builder().is_test(true).try_init();
    for file in ["factorial.cube", "structs.cube", "arrays.cube", "control.cube"] {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let program = parse_program(&session, &load_program(file)).unwrap();
        let compiler = Compiler::new(&session);
        for func in &program.functions {
            let ctx = compiler.lower_function(func).unwrap();
            let intervals = compute_live_intervals(&ctx.instrs);
            let allocation = LinearScan::new(6).allocate(ctx.instrs).unwrap();
            let slots = slot_map(&allocation.instrs);

            for a in &intervals {
                for b in &intervals {
                    if a.vreg != b.vreg && a.overlaps(b) {
                        assert_ne!(slots[&a.vreg], slots[&b.vreg], "{file}/{}: {} and {} overlap", func.name, a.vreg, b.vreg);
                    }
                }
            }

            // every push before a call is matched by a pop in reverse order after it
            let instrs = &allocation.instrs;
            for (at, instr) in instrs.iter().enumerate().filter(|(_, i)| i.op == Opcode::Call) {
                let pushes: Vec<_> =
                    instrs[..at].iter().rev().take_while(|i| i.op == Opcode::PushReg).map(|i| i.a0.clone()).collect();
                let pops: Vec<_> =
                    instrs[at + 1..].iter().take_while(|i| i.op == Opcode::PopReg).map(|i| i.a0.clone()).collect();
                assert_eq!(pushes, pops, "{file}/{}: unbalanced saves around {instr}", func.name);
            }
        }
    }
}

#[test]
fn test_sequential_statements_reuse_the_first_slot() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let source = "fn f(a: i32) -> i32 { (let b i32 (+ a 1)) (let c i32 (* b 3)) (return c) }";
    let program = parse_program(&session, source).unwrap();
    let compiled = Compiler::new(&session).compile_function(&program.functions[0]).unwrap();
    let slots = slot_map(&compiled.instrs);
    assert!(slots.len() >= 3);
    assert!(slots.values().all(|slot| *slot == PhysReg(0)));
}

#[test]
fn test_saves_follow_call_order() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let source = "extern g() -> i64
                  fn f(x: i64, y: i64) -> i64 { (return (+ x (+ y (+ (g) (g))))) }";
    let program = parse_program(&session, source).unwrap();
    let compiled = Compiler::new(&session).compile_function(&program.functions[0]).unwrap();

    let ops: Vec<Opcode> = compiled.instrs.iter().map(|i| i.op).collect();
    let calls: Vec<usize> = ops.iter().enumerate().filter(|(_, op)| **op == Opcode::Call).map(|(p, _)| p).collect();
    assert_eq!(calls.len(), 2);
    // x and y are live across the first call; x, y and the first result across the second
    assert_eq!(&ops[calls[0] - 2..calls[0]], &[Opcode::PushReg, Opcode::PushReg]);
    assert_eq!(&ops[calls[1] - 3..calls[1]], &[Opcode::PushReg, Opcode::PushReg, Opcode::PushReg]);
    assert_eq!(compiled.save_restore_pairs, 5);
}

#[test]
fn test_exhaustion_reports_position() {
    let reg = |n| Operand::vreg(VReg(n));
    let mut instrs: Vec<Instr> = (0..4).map(|n| Instr::new(Opcode::Copy, reg(n), Operand::Literal(n as i64), Width::B4)).collect();
    for n in (1..4).rev() {
        instrs.push(Instr::new(Opcode::Add, reg(n - 1), reg(n), Width::B4));
    }
    assert!(LinearScan::new(4).allocate(instrs.clone()).is_ok());
    let err = LinearScan::new(3).allocate(instrs).unwrap_err();
    assert_eq!(err, CompileError::RegisterExhaustion { available: 3, position: 3 });
}

#[test]
fn test_unallocated_operands_only_in_saves() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let program = parse_program(&session, &load_program("factorial.cube")).unwrap();
    let output = Compiler::new(&session).compile_program(&program).unwrap();
    for func in &output.functions {
        for instr in &func.instrs {
            let physical = instr.operands().any(|o| matches!(o, Operand::Physical(_)));
            assert_eq!(physical, matches!(instr.op, Opcode::PushReg | Opcode::PopReg), "{instr}");
            assert!(instr.virtual_registers().all(|r: &VirtualRegister| r.slot.is_some()));
        }
    }
}
