//! Instruction set.
//!
//! Every instruction starts with a one-byte opcode followed by its operands
//! inline, little-endian. Opcodes `0x00..=0x4C` are named instructions;
//! `0x50..=0xFF` push the small constant `opcode - 0x60`; `0x4D..=0x4F` are
//! unassigned.
//!
//! # Example
//!
//! ```
//! use sctools_compiler::bytecode::{Op, Opcode};
//!
//! assert_eq!(Op::from_byte(0x2E), Op::Named(Opcode::Call));
//! assert_eq!(Op::from_byte(0x5F), Op::PushConstSmall(-1));
//! assert_eq!(Op::from_byte(0x4E), Op::Invalid(0x4E));
//! assert_eq!(Op::PushConstSmall(-1).mnemonic(), "PUSH_CONST_M1");
//! ```

use std::borrow::Cow;

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Named opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0x00,

    // =========================================================================
    // Integer arithmetic and comparison
    // =========================================================================
    IAdd = 0x01,
    ISub,
    IMul,
    IDiv,
    IMod,
    INot,
    INeg,
    IEq,
    INe,
    IGt,
    IGe,
    ILt,
    ILe,

    // =========================================================================
    // Float arithmetic and comparison
    // =========================================================================
    FAdd = 0x0E,
    FSub,
    FMul,
    FDiv,
    FMod,
    FNeg,
    FEq,
    FNe,
    FGt,
    FGe,
    FLt,
    FLe,

    // =========================================================================
    // Vector arithmetic
    // =========================================================================
    VAdd = 0x1A,
    VSub,
    VMul,
    VDiv,
    VNeg,

    // =========================================================================
    // Bitwise
    // =========================================================================
    IAnd = 0x1F,
    IOr,
    IXor,

    // =========================================================================
    // Jumps and conversions
    // =========================================================================
    /// Operand: u32 absolute target.
    J = 0x22,
    /// Operand: u32 absolute target.
    Jz,
    /// Operand: u32 absolute target.
    Jnz,
    I2F,
    F2I,
    F2V,

    // =========================================================================
    // Constants and stack
    // =========================================================================
    /// Operand: u16.
    PushConstU16 = 0x28,
    /// Operand: u32.
    PushConstU32,
    /// Operand: f32.
    PushConstF,
    Dup,
    Drop,

    // =========================================================================
    // Calls and frames
    // =========================================================================
    /// Operands: u8 params, u8 returns, u32 command hash.
    Native = 0x2D,
    /// Operand: u32 absolute function address.
    Call,
    /// Operands: u8 params, u16 frame size, u8 name length, name bytes.
    Enter,
    /// Operands: u8 params, u8 returns.
    Leave,

    // =========================================================================
    // Memory
    // =========================================================================
    Load = 0x31,
    Store,
    StoreRev,
    LoadN,
    StoreN,
    Local0,
    Local1,
    Local2,
    Local3,
    Local4,
    Local5,
    Local6,
    Local7,
    Local,
    Static,
    Global,
    Array,

    // =========================================================================
    // Misc
    // =========================================================================
    /// Operands: u8 case count, then (u32 value, u32 target) per case.
    Switch = 0x42,
    /// Operands: u8 length including NUL (0: u16 length follows), bytes, NUL.
    String,
    Null,
    /// Operand: u8 text label length.
    TextLabelAssignString,
    /// Operand: u8 text label length.
    TextLabelAssignInt,
    /// Operand: u8 text label length.
    TextLabelAppendString,
    /// Operand: u8 text label length.
    TextLabelAppendInt,
    Catch,
    Throw,
    TextLabelCopy,
    CallIndirect = 0x4C,
}

/// How the bytes after an opcode are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandLayout {
    None,
    /// Text label length.
    U8,
    U16,
    U32,
    F32,
    /// u32 absolute address of a label.
    Label,
    /// u32 absolute address of a function.
    Function,
    Native,
    Enter,
    Leave,
    Switch,
    String,
}

impl Opcode {
    /// All named opcodes, in encoding order.
    pub fn all() -> impl Iterator<Item = Opcode> {
        (0x00..=0x4Cu8).filter_map(|b| Opcode::try_from(b).ok())
    }

    pub const fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::IAdd => "IADD",
            Opcode::ISub => "ISUB",
            Opcode::IMul => "IMUL",
            Opcode::IDiv => "IDIV",
            Opcode::IMod => "IMOD",
            Opcode::INot => "INOT",
            Opcode::INeg => "INEG",
            Opcode::IEq => "IEQ",
            Opcode::INe => "INE",
            Opcode::IGt => "IGT",
            Opcode::IGe => "IGE",
            Opcode::ILt => "ILT",
            Opcode::ILe => "ILE",
            Opcode::FAdd => "FADD",
            Opcode::FSub => "FSUB",
            Opcode::FMul => "FMUL",
            Opcode::FDiv => "FDIV",
            Opcode::FMod => "FMOD",
            Opcode::FNeg => "FNEG",
            Opcode::FEq => "FEQ",
            Opcode::FNe => "FNE",
            Opcode::FGt => "FGT",
            Opcode::FGe => "FGE",
            Opcode::FLt => "FLT",
            Opcode::FLe => "FLE",
            Opcode::VAdd => "VADD",
            Opcode::VSub => "VSUB",
            Opcode::VMul => "VMUL",
            Opcode::VDiv => "VDIV",
            Opcode::VNeg => "VNEG",
            Opcode::IAnd => "IAND",
            Opcode::IOr => "IOR",
            Opcode::IXor => "IXOR",
            Opcode::J => "J",
            Opcode::Jz => "JZ",
            Opcode::Jnz => "JNZ",
            Opcode::I2F => "I2F",
            Opcode::F2I => "F2I",
            Opcode::F2V => "F2V",
            Opcode::PushConstU16 => "PUSH_CONST_U16",
            Opcode::PushConstU32 => "PUSH_CONST_U32",
            Opcode::PushConstF => "PUSH_CONST_F",
            Opcode::Dup => "DUP",
            Opcode::Drop => "DROP",
            Opcode::Native => "NATIVE",
            Opcode::Call => "CALL",
            Opcode::Enter => "ENTER",
            Opcode::Leave => "LEAVE",
            Opcode::Load => "LOAD",
            Opcode::Store => "STORE",
            Opcode::StoreRev => "STORE_REV",
            Opcode::LoadN => "LOAD_N",
            Opcode::StoreN => "STORE_N",
            Opcode::Local0 => "LOCAL_0",
            Opcode::Local1 => "LOCAL_1",
            Opcode::Local2 => "LOCAL_2",
            Opcode::Local3 => "LOCAL_3",
            Opcode::Local4 => "LOCAL_4",
            Opcode::Local5 => "LOCAL_5",
            Opcode::Local6 => "LOCAL_6",
            Opcode::Local7 => "LOCAL_7",
            Opcode::Local => "LOCAL",
            Opcode::Static => "STATIC",
            Opcode::Global => "GLOBAL",
            Opcode::Array => "ARRAY",
            Opcode::Switch => "SWITCH",
            Opcode::String => "STRING",
            Opcode::Null => "NULL",
            Opcode::TextLabelAssignString => "TEXT_LABEL_ASSIGN_STRING",
            Opcode::TextLabelAssignInt => "TEXT_LABEL_ASSIGN_INT",
            Opcode::TextLabelAppendString => "TEXT_LABEL_APPEND_STRING",
            Opcode::TextLabelAppendInt => "TEXT_LABEL_APPEND_INT",
            Opcode::Catch => "CATCH",
            Opcode::Throw => "THROW",
            Opcode::TextLabelCopy => "TEXT_LABEL_COPY",
            Opcode::CallIndirect => "CALLINDIRECT",
        }
    }

    /// Case-insensitive mnemonic lookup.
    pub fn from_mnemonic(mnemonic: &str) -> Option<Opcode> {
        Opcode::all().find(|op| op.mnemonic().eq_ignore_ascii_case(mnemonic))
    }

    pub const fn layout(self) -> OperandLayout {
        match self {
            Opcode::J | Opcode::Jz | Opcode::Jnz => OperandLayout::Label,
            Opcode::Call => OperandLayout::Function,
            Opcode::PushConstU16 => OperandLayout::U16,
            Opcode::PushConstU32 => OperandLayout::U32,
            Opcode::PushConstF => OperandLayout::F32,
            Opcode::Native => OperandLayout::Native,
            Opcode::Enter => OperandLayout::Enter,
            Opcode::Leave => OperandLayout::Leave,
            Opcode::Switch => OperandLayout::Switch,
            Opcode::String => OperandLayout::String,
            Opcode::TextLabelAssignString
            | Opcode::TextLabelAssignInt
            | Opcode::TextLabelAppendString
            | Opcode::TextLabelAppendInt => OperandLayout::U8,
            _ => OperandLayout::None,
        }
    }

    /// Instruction size when it does not depend on the operands.
    pub const fn constant_size(self) -> Option<usize> {
        match self.layout() {
            OperandLayout::None => Some(1),
            OperandLayout::U8 => Some(2),
            OperandLayout::U16 | OperandLayout::Leave => Some(3),
            OperandLayout::U32
            | OperandLayout::F32
            | OperandLayout::Label
            | OperandLayout::Function => Some(5),
            OperandLayout::Native => Some(7),
            OperandLayout::Enter | OperandLayout::Switch | OperandLayout::String => None,
        }
    }

    #[inline]
    pub const fn is_jump(self) -> bool {
        matches!(self, Opcode::J | Opcode::Jz | Opcode::Jnz)
    }

    /// `LOCAL_n` for `n` in `0..=7`.
    pub fn local_n(n: u8) -> Option<Opcode> {
        if n <= 7 {
            Opcode::try_from(Opcode::Local0 as u8 + n).ok()
        } else {
            None
        }
    }
}

// ============================================================================
// Op
// ============================================================================

/// First small constant with a dedicated opcode.
pub const PUSH_CONST_SMALL_MIN: i32 = -16;
/// Last small constant with a dedicated opcode.
pub const PUSH_CONST_SMALL_MAX: i32 = 159;

const PUSH_CONST_SMALL_BIAS: i32 = 0x60;

/// Any opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Named(Opcode),
    /// `PUSH_CONST_{n}`, one byte, `n` in `-16..=159`.
    PushConstSmall(i16),
    /// `0x4D..=0x4F`.
    Invalid(u8),
}

impl Op {
    pub fn from_byte(b: u8) -> Op {
        if let Ok(op) = Opcode::try_from(b) {
            Op::Named(op)
        } else if b >= 0x50 {
            Op::PushConstSmall((b as i32 - PUSH_CONST_SMALL_BIAS) as i16)
        } else {
            Op::Invalid(b)
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Op::Named(op) => op.into(),
            Op::PushConstSmall(v) => (v as i32 + PUSH_CONST_SMALL_BIAS) as u8,
            Op::Invalid(b) => b,
        }
    }

    /// The one-byte push for `v`, if it has one.
    pub fn push_const_small(v: i64) -> Option<Op> {
        if (PUSH_CONST_SMALL_MIN as i64..=PUSH_CONST_SMALL_MAX as i64).contains(&v) {
            Some(Op::PushConstSmall(v as i16))
        } else {
            None
        }
    }

    pub fn mnemonic(self) -> Cow<'static, str> {
        match self {
            Op::Named(op) => Cow::Borrowed(op.mnemonic()),
            Op::PushConstSmall(v) if v < 0 => Cow::Owned(format!("PUSH_CONST_M{}", -v)),
            Op::PushConstSmall(v) => Cow::Owned(format!("PUSH_CONST_{v}")),
            Op::Invalid(b) => Cow::Owned(format!("INVALID_{b:02X}")),
        }
    }

    /// Parse a mnemonic, including the `PUSH_CONST_{n}` / `PUSH_CONST_M{n}`
    /// family.
    pub fn from_mnemonic(mnemonic: &str) -> Option<Op> {
        if let Some(op) = Opcode::from_mnemonic(mnemonic) {
            return Some(Op::Named(op));
        }
        let upper = mnemonic.to_ascii_uppercase();
        let rest = upper.strip_prefix("PUSH_CONST_")?;
        let value: i64 = match rest.strip_prefix('M') {
            Some(neg) => -neg.parse::<i64>().ok()?,
            None => rest.parse().ok()?,
        };
        Op::push_const_small(value)
    }

    /// Length in bytes of the instruction starting at `code[0]`, or `None`
    /// if `code` is too short to tell.
    pub fn instruction_size(code: &[u8]) -> Option<usize> {
        let first = *code.first()?;
        match Op::from_byte(first) {
            Op::PushConstSmall(_) | Op::Invalid(_) => Some(1),
            Op::Named(op) => match op.constant_size() {
                Some(size) => Some(size),
                None => match op {
                    Opcode::Enter => code.get(4).map(|&len| 5 + len as usize),
                    Opcode::Switch => code.get(1).map(|&n| 2 + 8 * n as usize),
                    Opcode::String => {
                        let len = *code.get(1)?;
                        if len == 0 {
                            let long = u16::from_le_bytes([*code.get(2)?, *code.get(3)?]);
                            Some(4 + long as usize)
                        } else {
                            Some(2 + len as usize)
                        }
                    }
                    _ => None,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_opcode_values() {
        assert_eq!(u8::from(Opcode::IXor), 0x21);
        assert_eq!(u8::from(Opcode::F2V), 0x27);
        assert_eq!(u8::from(Opcode::Local7), 0x3D);
        assert_eq!(u8::from(Opcode::Array), 0x41);
        assert_eq!(u8::from(Opcode::TextLabelAppendInt), 0x48);
        assert_eq!(Opcode::all().count(), 0x4D);
    }

    #[test]
    fn small_constants() {
        assert_eq!(Op::from_byte(0x50), Op::PushConstSmall(-16));
        assert_eq!(Op::from_byte(0x60), Op::PushConstSmall(0));
        assert_eq!(Op::from_byte(0xFF), Op::PushConstSmall(159));
        assert_eq!(Op::PushConstSmall(159).to_byte(), 0xFF);
        assert_eq!(Op::push_const_small(-17), None);
        assert_eq!(Op::push_const_small(160), None);
    }

    #[test]
    fn invalid_range() {
        for b in 0x4D..=0x4F {
            assert_eq!(Op::from_byte(b), Op::Invalid(b));
        }
    }

    #[test]
    fn mnemonic_parsing() {
        assert_eq!(Op::from_mnemonic("store_rev"), Some(Op::Named(Opcode::StoreRev)));
        assert_eq!(Op::from_mnemonic("PUSH_CONST_M16"), Some(Op::PushConstSmall(-16)));
        assert_eq!(Op::from_mnemonic("PUSH_CONST_7"), Some(Op::PushConstSmall(7)));
        assert_eq!(Op::from_mnemonic("PUSH_CONST_U16"), Some(Op::Named(Opcode::PushConstU16)));
        assert_eq!(Op::from_mnemonic("PUSH_CONST_200"), None);
        assert_eq!(Op::from_mnemonic("FROB"), None);
    }

    #[test]
    fn sizes() {
        assert_eq!(Op::instruction_size(&[0x2D, 0, 0, 0, 0, 0, 0]), Some(7));
        assert_eq!(Op::instruction_size(&[0x30, 1, 1]), Some(3));
        // ENTER with "f\0"
        assert_eq!(Op::instruction_size(&[0x2F, 0, 2, 0, 2, b'f', 0]), Some(7));
        assert_eq!(Op::instruction_size(&[0x42, 2]), Some(18));
        assert_eq!(Op::instruction_size(&[0x43, 3, b'h', b'i', 0]), Some(5));
        assert_eq!(Op::instruction_size(&[0x43, 0, 0x00, 0x01]), Some(260));
        assert_eq!(Op::instruction_size(&[0x2F, 0, 2]), None);
        assert_eq!(Op::instruction_size(&[0x4E]), Some(1));
    }

    #[test]
    fn local_n() {
        assert_eq!(Opcode::local_n(0), Some(Opcode::Local0));
        assert_eq!(Opcode::local_n(7), Some(Opcode::Local7));
        assert_eq!(Opcode::local_n(8), None);
    }
}
