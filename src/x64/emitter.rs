// This module renders allocated IR as NASM text. The translation is mechanical: every
// instruction becomes one or more lines, operands are printed from their allocated physical slot
// (sized by the instruction width) or from their literal, frame-offset or register-offset form.
// The emitter tracks how many bytes the function has pushed since the prologue so that a call
// can pad rsp to 16 bytes before pushing stack arguments. Division goes through rax/rdx with the
// divisor spilled to the stack, and byte-wide multiplication uses the 32-bit form because x86
// has no two-operand 8-bit imul.

//! NASM text emitter.

use super::calling_convention::{ArgAssigner, ArgLocation, FixedRegisterAssigner};
use super::{register_name, TargetConfig};
use crate::core::error::{CompileError, CompileResult};
use crate::ir::{FunctionRef, Instr, LabelId, Opcode, Operand, VirtualRegister, Width};
use std::fmt::Write;

/// Renders the allocated IR of functions into one assembly text.
pub struct AsmEmitter<'c> {
    config: &'c TargetConfig,
    out: String,
    /// Bytes pushed since the prologue.
    pushed: i64,
    /// Argument locations of the call being emitted.
    args: FixedRegisterAssigner,
}

impl<'c> AsmEmitter<'c> {
    pub fn new(config: &'c TargetConfig) -> Self {
        Self { config, out: String::new(), pushed: 0, args: FixedRegisterAssigner::new(&config.arg_registers) }
    }

    pub fn finish(self) -> String {
        self.out
    }

    fn line(&mut self, text: impl AsRef<str>) {
        self.out.push_str("    ");
        self.out.push_str(text.as_ref());
        self.out.push('\n');
    }

    /// Header of the text section.
    pub fn emit_header(&mut self, globals: &[&str], externs: &[&str]) {
        self.out.push_str("section .text\n");
        for name in globals {
            let _ = writeln!(self.out, "global {name}");
        }
        for name in externs {
            let _ = writeln!(self.out, "extern {name}");
        }
    }

    pub fn emit_function(&mut self, name: &str, instrs: &[Instr]) -> CompileResult<()> {
        self.pushed = 0;
        let _ = writeln!(self.out, "\n{name}:");
        for instr in instrs {
            if self.config.emit_comments && instr.op != Opcode::Label {
                self.line(format!(";{instr}"));
            }
            self.emit(instr)?;
        }
        if self.pushed != 0 {
            return Err(CompileError::internal(format!("unbalanced stack in {name}: {} bytes", self.pushed)));
        }
        Ok(())
    }

    /// Read-only data section with the string pool.
    pub fn emit_strings(&mut self, strings: &[String]) {
        if strings.is_empty() {
            return;
        }
        self.out.push_str("\nsection .rodata\n");
        for (index, text) in strings.iter().enumerate() {
            let _ = writeln!(self.out, "__str_{index}: db {}", string_bytes(text));
        }
    }

    fn reg(&self, reg: &VirtualRegister, width: Width) -> CompileResult<String> {
        let slot = reg
            .slot
            .ok_or_else(|| CompileError::internal(format!("{} has no physical register", reg.index)))?;
        self.config.slot_name(slot, width)
    }

    fn is_slot(&self, reg: &VirtualRegister, base: &str) -> bool {
        reg.slot.and_then(|slot| self.config.slot_base(slot).ok()) == Some(base)
    }

    fn value(&self, operand: &Operand, width: Width) -> CompileResult<String> {
        match operand {
            Operand::Virtual(reg) => self.reg(reg, width),
            Operand::Physical(reg) => self.config.slot_name(*reg, width),
            Operand::Literal(value) => Ok(value.to_string()),
            Operand::FramePointer => Ok("rbp".to_string()),
            other => Err(CompileError::internal(format!("expected a register or literal, found {other}"))),
        }
    }

    fn address(&self, operand: &Operand) -> CompileResult<String> {
        match operand {
            Operand::FrameOffset { offset, index } => {
                let mut text = format!("[rbp{}", signed(-offset));
                if let Some((reg, scale)) = index {
                    text.push_str(&format!("+{}*{scale}", self.reg(reg, Width::B8)?));
                }
                text.push(']');
                Ok(text)
            }
            Operand::RegOffset { base, offset } => Ok(format!("[{}{}]", self.reg(base, Width::B8)?, signed(-offset))),
            Operand::Virtual(reg) => Ok(format!("[{}]", self.reg(reg, Width::B8)?)),
            other => Err(CompileError::internal(format!("expected an address, found {other}"))),
        }
    }

    fn memory(&self, operand: &Operand, width: Width) -> CompileResult<String> {
        Ok(format!("{} {}", width.ptr_keyword(), self.address(operand)?))
    }

    fn label(operand: &Operand) -> CompileResult<LabelId> {
        match operand {
            Operand::Label(label) => Ok(*label),
            other => Err(CompileError::internal(format!("expected a label, found {other}"))),
        }
    }

    fn emit(&mut self, instr: &Instr) -> CompileResult<()> {
        let w = instr.width;
        let a0 = instr.a0.as_ref();
        let a1 = instr.a1.as_ref();
        let first = || a0.ok_or_else(|| CompileError::internal(format!("{} without operand", instr.op.mnemonic())));
        let second = || a1.ok_or_else(|| CompileError::internal(format!("{} without second operand", instr.op.mnemonic())));

        match instr.op {
            Opcode::Copy => {
                let dst = self.value(first()?, w)?;
                let src = match second()? {
                    Operand::FramePointer => {
                        let dst = self.value(first()?, Width::B8)?;
                        self.line(format!("mov {dst}, rbp"));
                        return Ok(());
                    }
                    other => self.value(other, w)?,
                };
                if dst != src {
                    self.line(format!("mov {dst}, {src}"));
                }
            }
            Opcode::AddressOf => {
                let dst = self.value(first()?, Width::B8)?;
                let addr = self.address(second()?)?;
                self.line(format!("lea {dst}, {addr}"));
            }
            Opcode::LoadDeref | Opcode::LoadRegOffset | Opcode::LoadFrame => {
                let dst = self.value(first()?, w)?;
                let src = self.memory(second()?, w)?;
                self.line(format!("mov {dst}, {src}"));
            }
            Opcode::StoreDeref | Opcode::StoreFrame => {
                let dst = self.memory(first()?, w)?;
                let src = self.value(second()?, w)?;
                self.line(format!("mov {dst}, {src}"));
            }
            Opcode::Add | Opcode::Sub | Opcode::Compare => {
                let mnemonic = match instr.op {
                    Opcode::Add => "add",
                    Opcode::Sub => "sub",
                    _ => "cmp",
                };
                let lhs = self.value(first()?, w)?;
                let rhs = self.value(second()?, w)?;
                self.line(format!("{mnemonic} {lhs}, {rhs}"));
            }
            Opcode::Mul => {
                let w = if w == Width::B1 { Width::B4 } else { w };
                let lhs = self.value(first()?, w)?;
                match second()? {
                    Operand::Literal(value) => self.line(format!("imul {lhs}, {lhs}, {value}")),
                    other => {
                        let rhs = self.value(other, w)?;
                        self.line(format!("imul {lhs}, {rhs}"));
                    }
                }
            }
            Opcode::Div => self.emit_div(first()?, second()?, w)?,
            Opcode::Sal => {
                let lhs = self.value(first()?, w)?;
                let rhs = self.value(second()?, w)?;
                self.line(format!("sal {lhs}, {rhs}"));
            }
            Opcode::Inc | Opcode::Dec | Opcode::Neg => {
                let reg = self.value(first()?, w)?;
                let mnemonic = match instr.op {
                    Opcode::Inc => "inc",
                    Opcode::Dec => "dec",
                    _ => "neg",
                };
                self.line(format!("{mnemonic} {reg}"));
            }
            Opcode::Extend => {
                let wide = self.value(first()?, Width::B8)?;
                let narrow = self.value(first()?, w)?;
                match w {
                    Width::B1 | Width::B2 => self.line(format!("movsx {wide}, {narrow}")),
                    Width::B4 => self.line(format!("movsxd {wide}, {narrow}")),
                    Width::B8 => {}
                }
            }
            Opcode::StringRef => {
                let dst = self.value(first()?, Width::B8)?;
                match second()? {
                    Operand::StringRef(index) => self.line(format!("lea {dst}, [rel __str_{index}]")),
                    other => return Err(CompileError::internal(format!("expected a string, found {other}"))),
                }
            }
            Opcode::Jump => {
                let label = Self::label(first()?)?;
                self.line(format!("jmp {label}"));
            }
            Opcode::JumpIf(cond) => {
                let label = Self::label(first()?)?;
                self.line(format!("{} {label}", cond.jump()));
            }
            Opcode::Label => {
                let label = Self::label(first()?)?;
                let _ = writeln!(self.out, "{label}:");
            }
            Opcode::Call => match first()? {
                Operand::Function(func) => self.emit_call(func, a1, w)?,
                other => return Err(CompileError::internal(format!("call target {other}"))),
            },
            Opcode::PushReg => {
                let reg = self.value(first()?, Width::B8)?;
                self.line(format!("push {reg}"));
                self.pushed += 8;
            }
            Opcode::PopReg => {
                let reg = self.value(first()?, Width::B8)?;
                self.line(format!("pop {reg}"));
                self.pushed -= 8;
            }
            Opcode::PushArg => {
                let slot = self.address(second()?)?;
                if w.bytes() <= 2 {
                    let wide = self.value(first()?, Width::B4)?;
                    let narrow = self.value(first()?, w)?;
                    self.line(format!("movsx {wide}, {narrow}"));
                    self.line(format!("mov DWORD {slot}, {wide}"));
                } else {
                    let value = self.value(first()?, w)?;
                    self.line(format!("mov {} {slot}, {value}", w.ptr_keyword()));
                }
            }
            Opcode::PopArg => {
                let slot = self.memory(first()?, w)?;
                let position = match second()? {
                    Operand::Literal(position) => *position as u32,
                    other => return Err(CompileError::internal(format!("argument position {other}"))),
                };
                match self.args.location(position) {
                    ArgLocation::Register(base) => self.line(format!("mov {slot}, {}", register_name(base, w))),
                    ArgLocation::Stack(k) => {
                        self.line(format!("mov rax, QWORD [rbp+{}]", 16 + 8 * k as i64));
                        self.line(format!("mov {slot}, {}", register_name("ax", w)));
                    }
                }
            }
            Opcode::Prologue => {
                let frame = match first()? {
                    Operand::Literal(frame) => *frame,
                    other => return Err(CompileError::internal(format!("frame size {other}"))),
                };
                self.line("push rbp");
                self.line("mov rbp, rsp");
                self.line(format!("sub rsp, {frame}"));
                self.line("push rbx");
            }
            Opcode::Epilogue => {
                self.line("pop rbx");
                self.line("leave");
                self.line("ret");
            }
            Opcode::Return => {
                if let Some(Operand::Virtual(reg)) = a0 {
                    if !self.is_slot(reg, "ax") {
                        let src = self.reg(reg, w)?;
                        self.line(format!("mov {}, {src}", register_name("ax", w)));
                    }
                }
                self.line(format!("jmp {}", LabelId::RETURN));
            }
        }
        Ok(())
    }

    /// `a = a / b` through rax/rdx. Caller-visible registers other than `a` are preserved.
    fn emit_div(&mut self, lhs: &Operand, rhs: &Operand, w: Width) -> CompileResult<()> {
        let lhs_reg = match lhs {
            Operand::Virtual(reg) => *reg,
            other => return Err(CompileError::internal(format!("division accumulator {other}"))),
        };
        let divisor = self.value(rhs, Width::B8)?;
        self.line(format!("push {divisor}"));
        let mut saved = Vec::new();
        for base in ["ax", "dx"] {
            if !self.is_slot(&lhs_reg, base) {
                self.line(format!("push {}", register_name(base, Width::B8)));
                saved.push(base);
            }
        }
        let acc = register_name("ax", w);
        let dst = self.reg(&lhs_reg, w)?;
        if !self.is_slot(&lhs_reg, "ax") {
            self.line(format!("mov {acc}, {dst}"));
        }
        self.line(match w {
            Width::B1 => "cbw",
            Width::B2 => "cwd",
            Width::B4 => "cdq",
            Width::B8 => "cqo",
        });
        self.line(format!("idiv {} [rsp+{}]", w.ptr_keyword(), 8 * saved.len()));
        if dst != acc {
            self.line(format!("mov {dst}, {acc}"));
        }
        for base in saved.iter().rev() {
            self.line(format!("pop {}", register_name(base, Width::B8)));
        }
        self.line("add rsp, 8");
        Ok(())
    }

    fn emit_call(&mut self, func: &FunctionRef, result: Option<&Operand>, w: Width) -> CompileResult<()> {
        self.args.reset();
        let mut stack_slots = Vec::new();
        for position in 0..func.arg_count {
            let slot = format!("QWORD [rbp{}]", signed(-func.slot_offset(position)));
            match self.args.assign_arg() {
                ArgLocation::Register(base) => {
                    self.line(format!("mov {}, {slot}", register_name(base, Width::B8)));
                }
                ArgLocation::Stack(_) => stack_slots.push(slot),
            }
        }
        let stack_bytes = 8 * self.args.stack_count() as i64;
        let pad = if (self.pushed + stack_bytes) % 16 != 0 { 8 } else { 0 };
        if pad != 0 {
            self.line(format!("sub rsp, {pad}"));
        }
        for slot in stack_slots.iter().rev() {
            self.line(format!("push {slot}"));
        }
        self.line("xor eax, eax");
        self.line(format!("call {}", func.name));
        if stack_bytes + pad != 0 {
            self.line(format!("add rsp, {}", stack_bytes + pad));
        }
        if let Some(Operand::Virtual(reg)) = result {
            if !self.is_slot(reg, "ax") {
                let dst = self.reg(reg, w)?;
                self.line(format!("mov {dst}, {}", register_name("ax", w)));
            }
        }
        Ok(())
    }
}

fn signed(value: i64) -> String {
    if value < 0 {
        format!("-{}", -value)
    } else {
        format!("+{value}")
    }
}

/// NASM `db` operand list for a string, NUL-terminated.
fn string_bytes(text: &str) -> String {
    let mut parts = Vec::new();
    let mut run = String::new();
    for byte in text.bytes() {
        if (0x20..0x7f).contains(&byte) && byte != b'"' {
            run.push(byte as char);
        } else {
            if !run.is_empty() {
                parts.push(format!("\"{run}\""));
                run.clear();
            }
            parts.push(byte.to_string());
        }
    }
    if !run.is_empty() {
        parts.push(format!("\"{run}\""));
    }
    parts.push("0".to_string());
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::register_file::PhysReg;
    use crate::ir::{Condition, VReg};

    fn reg(index: u32, slot: u8) -> Operand {
        Operand::Virtual(VirtualRegister { index: VReg(index), slot: Some(PhysReg(slot)) })
    }

    fn render(instrs: &[Instr]) -> String {
        let config = TargetConfig::default();
        let mut emitter = AsmEmitter::new(&config);
        emitter.emit_function("f", instrs).unwrap();
        emitter.finish()
    }

    #[test]
    fn test_basic_moves() {
        let out = render(&[
            Instr::new(Opcode::Copy, reg(0, 1), Operand::Literal(5), Width::B4),
            Instr::new(Opcode::LoadFrame, reg(1, 2), Operand::frame(8), Width::B8),
            Instr::new(Opcode::StoreFrame, Operand::frame(4), reg(0, 1), Width::B4),
            Instr::new(Opcode::Copy, reg(2, 3), Operand::FramePointer, Width::B8),
        ]);
        assert!(out.contains("mov ebx, 5"));
        assert!(out.contains("mov rdx, QWORD [rbp-8]"));
        assert!(out.contains("mov DWORD [rbp-4], ebx"));
        assert!(out.contains("mov rdi, rbp"));
    }

    #[test]
    fn test_byte_registers() {
        let out = render(&[
            Instr::new(Opcode::Add, reg(0, 3), reg(1, 4), Width::B1),
            Instr::new(Opcode::Mul, reg(0, 3), reg(1, 4), Width::B1),
        ]);
        assert!(out.contains("add dil, sil"));
        assert!(out.contains("imul edi, esi"));
    }

    #[test]
    fn test_division_sequence() {
        let out = render(&[Instr::new(Opcode::Div, reg(0, 1), reg(1, 5), Width::B4)]);
        let expected = [
            "push rcx", "push rax", "push rdx", "mov eax, ebx", "cdq", "idiv DWORD [rsp+16]", "mov ebx, eax",
            "pop rdx", "pop rax", "add rsp, 8",
        ];
        let mut rest = out.as_str();
        for pattern in expected {
            let at = rest.find(pattern).unwrap_or_else(|| panic!("missing {pattern} in\n{out}"));
            rest = &rest[at + pattern.len()..];
        }
    }

    #[test]
    fn test_call_with_stack_arguments() {
        let func = FunctionRef { name: "g".into(), arg_count: 8, arg_area: 64 };
        let out = render(&[Instr::new(Opcode::Call, Operand::Function(func), reg(9, 1), Width::B4)]);
        assert!(out.contains("mov rdi, QWORD [rbp-64]"));
        assert!(out.contains("mov r9, QWORD [rbp-24]"));
        let push_last = out.find("push QWORD [rbp-8]").unwrap();
        let push_first = out.find("push QWORD [rbp-16]").unwrap();
        assert!(push_last < push_first);
        assert!(!out.contains("sub rsp"));
        assert!(out.contains("call g\n    add rsp, 16"));
        assert!(out.contains("mov ebx, eax"));
    }

    #[test]
    fn test_argument_locations_restart_per_call() {
        let wide = FunctionRef { name: "g".into(), arg_count: 8, arg_area: 64 };
        let narrow = FunctionRef { name: "k".into(), arg_count: 2, arg_area: 80 };
        let out = render(&[
            Instr::unary(Opcode::Call, Operand::Function(wide), Width::B8),
            Instr::unary(Opcode::Call, Operand::Function(narrow), Width::B8),
        ]);
        assert!(out.contains("call g\n    add rsp, 16\n"));
        assert!(out.contains("mov rdi, QWORD [rbp-80]\n    mov rsi, QWORD [rbp-72]\n    xor eax, eax\n    call k\n"));
        assert!(out.ends_with("call k\n"));
    }

    #[test]
    fn test_call_pads_after_odd_saves() {
        let func = FunctionRef { name: "h".into(), arg_count: 0, arg_area: 0 };
        let out = render(&[
            Instr::unary(Opcode::PushReg, Operand::Physical(PhysReg(1)), Width::B8),
            Instr::unary(Opcode::Call, Operand::Function(func), Width::B8),
            Instr::unary(Opcode::PopReg, Operand::Physical(PhysReg(1)), Width::B8),
        ]);
        assert!(out.contains("push rbx\n    sub rsp, 8\n    xor eax, eax\n    call h\n    add rsp, 8\n    pop rbx"));
    }

    #[test]
    fn test_pop_arg_from_register_and_stack() {
        let out = render(&[
            Instr::new(Opcode::PopArg, Operand::frame(4), Operand::Literal(0), Width::B4),
            Instr::new(Opcode::PopArg, Operand::frame(5), Operand::Literal(1), Width::B1),
            Instr::new(Opcode::PopArg, Operand::frame(16), Operand::Literal(7), Width::B8),
        ]);
        assert!(out.contains("mov DWORD [rbp-4], edi"));
        assert!(out.contains("mov BYTE [rbp-5], sil"));
        assert!(out.contains("mov rax, QWORD [rbp+24]\n    mov QWORD [rbp-16], rax"));
    }

    #[test]
    fn test_jumps_and_return() {
        let out = render(&[
            Instr::unary(Opcode::JumpIf(Condition::Ge), Operand::Label(LabelId(2)), Width::B8),
            Instr::unary(Opcode::Label, Operand::Label(LabelId(2)), Width::B8),
            Instr::unary(Opcode::Return, reg(0, 2), Width::B4),
        ]);
        assert!(out.contains("jge .L2"));
        assert!(out.contains("\n.L2:\n"));
        assert!(out.contains("mov eax, edx\n    jmp .L0"));
    }

    #[test]
    fn test_unallocated_register_is_internal_error() {
        let config = TargetConfig::default();
        let mut emitter = AsmEmitter::new(&config);
        let instr = Instr::new(Opcode::Copy, Operand::vreg(VReg(0)), Operand::Literal(1), Width::B8);
        let err = emitter.emit_function("f", &[instr]).unwrap_err();
        assert!(!err.is_user_facing());
    }

    #[test]
    fn test_string_bytes() {
        assert_eq!(string_bytes("hi\n"), "\"hi\", 10, 0");
        assert_eq!(string_bytes(""), "0");
    }
}
