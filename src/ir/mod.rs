// This module defines the flat intermediate representation produced by instruction selection
// and consumed by the register allocator and the text emitter. An Instr is an opcode, up to two
// operands and a primitive width (1/2/4/8 bytes). Operands are virtual registers (which later
// carry their allocated physical slot), physical registers (only in save/restore instructions
// inserted around calls), immediates, the frame pointer, frame-pointer and register relative
// addresses, function references, labels and string pool references. Opcode::destination
// encodes which operand an opcode writes; the allocator and the tests rely on that table.

//! Virtual-register IR.

use crate::ast::{CmpOp, Type};
use crate::core::error::{CompileError, CompileResult};
use crate::core::register_file::PhysReg;
use std::fmt;

/// Virtual register index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VReg(pub u32);

impl fmt::Display for VReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Function-local label. Label 0 is the shared epilogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub u32);

impl LabelId {
    pub const RETURN: LabelId = LabelId(0);
}

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ".L{}", self.0)
    }
}

/// Operation width in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Width {
    B1,
    B2,
    B4,
    B8,
}

impl Width {
    pub fn bytes(self) -> u32 {
        match self {
            Width::B1 => 1,
            Width::B2 => 2,
            Width::B4 => 4,
            Width::B8 => 8,
        }
    }

    pub fn from_size(size: u32) -> Option<Width> {
        match size {
            1 => Some(Width::B1),
            2 => Some(Width::B2),
            4 => Some(Width::B4),
            8 => Some(Width::B8),
            _ => None,
        }
    }

    /// Width of a value of type `ty`, or an error naming `operation`.
    pub fn of(ty: &Type<'_>, operation: &'static str) -> CompileResult<Width> {
        let size = ty.size();
        Width::from_size(size).ok_or(CompileError::UnsupportedWidth { operation, width: size })
    }

    /// NASM size keyword for memory operands.
    pub fn ptr_keyword(self) -> &'static str {
        match self {
            Width::B1 => "BYTE",
            Width::B2 => "WORD",
            Width::B4 => "DWORD",
            Width::B8 => "QWORD",
        }
    }
}

impl fmt::Display for Width {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bytes())
    }
}

/// Condition of a conditional jump (signed comparisons).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Condition {
    pub fn negate(self) -> Condition {
        match self {
            Condition::Eq => Condition::Ne,
            Condition::Ne => Condition::Eq,
            Condition::Lt => Condition::Ge,
            Condition::Le => Condition::Gt,
            Condition::Gt => Condition::Le,
            Condition::Ge => Condition::Lt,
        }
    }

    /// Jump mnemonic.
    pub fn jump(self) -> &'static str {
        match self {
            Condition::Eq => "je",
            Condition::Ne => "jne",
            Condition::Lt => "jl",
            Condition::Le => "jle",
            Condition::Gt => "jg",
            Condition::Ge => "jge",
        }
    }
}

impl From<CmpOp> for Condition {
    fn from(op: CmpOp) -> Self {
        match op {
            CmpOp::Eq => Condition::Eq,
            CmpOp::Ne => Condition::Ne,
            CmpOp::Lt => Condition::Lt,
            CmpOp::Le => Condition::Le,
            CmpOp::Gt => Condition::Gt,
            CmpOp::Ge => Condition::Ge,
        }
    }
}

/// A virtual register operand together with its allocated slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualRegister {
    pub index: VReg,
    pub slot: Option<PhysReg>,
}

impl VirtualRegister {
    pub fn new(index: VReg) -> Self {
        Self { index, slot: None }
    }
}

/// Call target with the information the emitter needs to marshal arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionRef {
    pub name: String,
    /// Number of argument slots (struct arguments count once per chunk).
    pub arg_count: u32,
    /// Frame offset of the first outgoing argument slot; slot `i` lives at `arg_area - 8 * i`.
    pub arg_area: i64,
}

impl FunctionRef {
    pub fn slot_offset(&self, position: u32) -> i64 {
        self.arg_area - 8 * position as i64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Virtual(VirtualRegister),
    Physical(PhysReg),
    Literal(i64),
    FramePointer,
    /// `[rbp - offset + index * scale]`
    FrameOffset { offset: i64, index: Option<(VirtualRegister, u8)> },
    /// `[base - offset]`
    RegOffset { base: VirtualRegister, offset: i64 },
    Function(FunctionRef),
    Label(LabelId),
    StringRef(u32),
}

impl Operand {
    pub fn vreg(index: VReg) -> Self {
        Operand::Virtual(VirtualRegister::new(index))
    }

    pub fn frame(offset: i64) -> Self {
        Operand::FrameOffset { offset, index: None }
    }

    /// Virtual registers mentioned by this operand, including address components.
    pub fn virtual_registers(&self) -> Option<&VirtualRegister> {
        match self {
            Operand::Virtual(reg) => Some(reg),
            Operand::RegOffset { base, .. } => Some(base),
            Operand::FrameOffset { index: Some((reg, _)), .. } => Some(reg),
            _ => None,
        }
    }

    pub fn virtual_registers_mut(&mut self) -> Option<&mut VirtualRegister> {
        match self {
            Operand::Virtual(reg) => Some(reg),
            Operand::RegOffset { base, .. } => Some(base),
            Operand::FrameOffset { index: Some((reg, _)), .. } => Some(reg),
            _ => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn reg(r: &VirtualRegister) -> String {
            match r.slot {
                Some(slot) => format!("{}:{}", r.index, slot),
                None => r.index.to_string(),
            }
        }
        match self {
            Operand::Virtual(r) => write!(f, "{}", reg(r)),
            Operand::Physical(p) => write!(f, "{p}"),
            Operand::Literal(v) => write!(f, "{v}"),
            Operand::FramePointer => write!(f, "fp"),
            Operand::FrameOffset { offset, index: None } => write!(f, "[fp-{offset}]"),
            Operand::FrameOffset { offset, index: Some((r, scale)) } => {
                write!(f, "[fp-{offset}+{}*{scale}]", reg(r))
            }
            Operand::RegOffset { base, offset } => write!(f, "[{}-{offset}]", reg(base)),
            Operand::Function(func) => write!(f, "@{}/{}", func.name, func.arg_count),
            Operand::Label(label) => write!(f, "{label}"),
            Operand::StringRef(index) => write!(f, "str{index}"),
        }
    }
}

/// Which operand an opcode writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Operand 0 receives the result.
    Operand0,
    /// Operand 0 encodes the address written; operand 1 is the stored value.
    AddressInOperand0,
    /// Operand 0 is both input and result.
    Accumulator0,
    /// Operand 1, when present, receives the return value; operand 0 is the target.
    CallResult1,
    /// Side effect only.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Copy,
    AddressOf,
    LoadDeref,
    StoreDeref,
    LoadRegOffset,
    LoadFrame,
    StoreFrame,
    Add,
    Sub,
    Mul,
    Div,
    Compare,
    Jump,
    JumpIf(Condition),
    Label,
    Call,
    PushReg,
    PopReg,
    PushArg,
    PopArg,
    Extend,
    Inc,
    Dec,
    Neg,
    Sal,
    StringRef,
    Prologue,
    Epilogue,
    Return,
}

impl Opcode {
    pub fn destination(self) -> Destination {
        use Opcode::*;
        match self {
            Copy | Extend | AddressOf | LoadDeref | LoadRegOffset | LoadFrame | StringRef | Inc
            | Dec | Neg => Destination::Operand0,
            StoreDeref | StoreFrame => Destination::AddressInOperand0,
            Add | Sub | Mul | Div | Sal | Compare => Destination::Accumulator0,
            Call => Destination::CallResult1,
            PushReg | PopReg | PushArg | PopArg | Jump | JumpIf(_) | Label | Prologue
            | Epilogue | Return => Destination::None,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            Copy => "copy",
            AddressOf => "addr",
            LoadDeref => "load.deref",
            StoreDeref => "store.deref",
            LoadRegOffset => "load.regoff",
            LoadFrame => "load.frame",
            StoreFrame => "store.frame",
            Add => "add",
            Sub => "sub",
            Mul => "mul",
            Div => "div",
            Compare => "cmp",
            Jump => "jmp",
            JumpIf(_) => "jcc",
            Label => "label",
            Call => "call",
            PushReg => "push.reg",
            PopReg => "pop.reg",
            PushArg => "push.arg",
            PopArg => "pop.arg",
            Extend => "ext64",
            Inc => "inc",
            Dec => "dec",
            Neg => "neg",
            Sal => "sal",
            StringRef => "strref",
            Prologue => "prologue",
            Epilogue => "epilogue",
            Return => "ret",
        }
    }
}

/// One IR instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instr {
    pub op: Opcode,
    pub a0: Option<Operand>,
    pub a1: Option<Operand>,
    pub width: Width,
}

impl Instr {
    pub fn new(op: Opcode, a0: Operand, a1: Operand, width: Width) -> Self {
        Self { op, a0: Some(a0), a1: Some(a1), width }
    }

    pub fn unary(op: Opcode, a0: Operand, width: Width) -> Self {
        Self { op, a0: Some(a0), a1: None, width }
    }

    pub fn nullary(op: Opcode) -> Self {
        Self { op, a0: None, a1: None, width: Width::B8 }
    }

    pub fn operands(&self) -> impl Iterator<Item = &Operand> {
        self.a0.iter().chain(self.a1.iter())
    }

    /// Every virtual register referenced by the instruction, in operand order.
    pub fn virtual_registers(&self) -> impl Iterator<Item = &VirtualRegister> {
        self.operands().filter_map(Operand::virtual_registers)
    }

    pub fn virtual_registers_mut(&mut self) -> impl Iterator<Item = &mut VirtualRegister> {
        self.a0.iter_mut().chain(self.a1.iter_mut()).filter_map(Operand::virtual_registers_mut)
    }

    /// The virtual register this instruction writes, per [`Opcode::destination`].
    pub fn defined_register(&self) -> Option<VReg> {
        let operand = match self.op.destination() {
            Destination::Operand0 | Destination::Accumulator0 => self.a0.as_ref(),
            Destination::CallResult1 => self.a1.as_ref(),
            Destination::AddressInOperand0 | Destination::None => None,
        };
        match operand {
            Some(Operand::Virtual(reg)) => Some(reg.index),
            _ => None,
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            Opcode::Label => {
                return match &self.a0 {
                    Some(label) => write!(f, "{label}:"),
                    None => write!(f, "<label>:"),
                }
            }
            Opcode::JumpIf(cond) => write!(f, "  {}", cond.jump())?,
            op => write!(f, "  {}.{}", op.mnemonic(), self.width)?,
        }
        let mut first = true;
        for operand in self.operands() {
            write!(f, "{} {operand}", if first { "" } else { "," })?;
            first = false;
        }
        Ok(())
    }
}

/// Render an instruction list, one instruction per line.
pub fn listing(instrs: &[Instr]) -> String {
    let mut out = String::new();
    for instr in instrs {
        out.push_str(&instr.to_string());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_table() {
        assert_eq!(Opcode::Copy.destination(), Destination::Operand0);
        assert_eq!(Opcode::LoadFrame.destination(), Destination::Operand0);
        assert_eq!(Opcode::LoadDeref.destination(), Destination::Operand0);
        assert_eq!(Opcode::Neg.destination(), Destination::Operand0);
        assert_eq!(Opcode::StoreDeref.destination(), Destination::AddressInOperand0);
        assert_eq!(Opcode::StoreFrame.destination(), Destination::AddressInOperand0);
        assert_eq!(Opcode::Div.destination(), Destination::Accumulator0);
        assert_eq!(Opcode::Compare.destination(), Destination::Accumulator0);
        assert_eq!(Opcode::Call.destination(), Destination::CallResult1);
        assert_eq!(Opcode::PushArg.destination(), Destination::None);
        assert_eq!(Opcode::PopReg.destination(), Destination::None);
    }

    #[test]
    fn test_defined_register() {
        let copy = Instr::new(Opcode::Copy, Operand::vreg(VReg(3)), Operand::Literal(5), Width::B4);
        assert_eq!(copy.defined_register(), Some(VReg(3)));

        let func = FunctionRef { name: "f".into(), arg_count: 0, arg_area: 0 };
        let call = Instr::new(Opcode::Call, Operand::Function(func), Operand::vreg(VReg(7)), Width::B8);
        assert_eq!(call.defined_register(), Some(VReg(7)));

        let store = Instr::new(Opcode::StoreFrame, Operand::frame(8), Operand::vreg(VReg(1)), Width::B4);
        assert_eq!(store.defined_register(), None);
    }

    #[test]
    fn test_virtual_registers_include_addresses() {
        let load = Instr::new(
            Opcode::LoadFrame,
            Operand::vreg(VReg(0)),
            Operand::FrameOffset { offset: 16, index: Some((VirtualRegister::new(VReg(4)), 4)) },
            Width::B4,
        );
        let regs: Vec<_> = load.virtual_registers().map(|r| r.index).collect();
        assert_eq!(regs, vec![VReg(0), VReg(4)]);
    }

    #[test]
    fn test_condition_negate() {
        for cond in [Condition::Eq, Condition::Ne, Condition::Lt, Condition::Le, Condition::Gt, Condition::Ge] {
            assert_eq!(cond.negate().negate(), cond);
        }
        assert_eq!(Condition::Lt.negate().jump(), "jge");
        assert_eq!(Condition::Le.negate().jump(), "jg");
    }

    #[test]
    fn test_display() {
        let add = Instr::new(Opcode::Add, Operand::vreg(VReg(0)), Operand::Literal(2), Width::B4);
        assert_eq!(add.to_string(), "  add.4 v0, 2");
        let label = Instr::unary(Opcode::Label, Operand::Label(LabelId(3)), Width::B8);
        assert_eq!(label.to_string(), ".L3:");
    }
}
