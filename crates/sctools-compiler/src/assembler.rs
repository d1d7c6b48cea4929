//! Two-pass assembler.
//!
//! [`assemble`] turns [`FunctionDefinition`]s into code bytes and
//! [`StaticField`]s into the static segment. [`assemble_with_globals`] also
//! fills the global segment.
//!
//! Pass 1 encodes every instruction into a [`CodeBuffer`], leaving zeroed
//! placeholders for label addresses. Pass 2 patches them.
//!
//! # Labels
//!
//! Every function name is a global label at the function's first byte.
//! Labels inside a function are local to it: a `loop` label in two functions
//! does not clash. Like every name, labels are case-insensitive. An identifier operand resolves to the function-local label
//! first, then to a function.
//!
//! # Example
//!
//! ```
//! use sctools_compiler::{AsmStatement, CodegenOptions, FunctionDefinition, Operand, assemble};
//!
//! let main = FunctionDefinition::new(
//!     "main",
//!     false,
//!     vec![],
//!     vec![],
//!     None,
//!     vec![AsmStatement::new("LEAVE", vec![Operand::Int(0), Operand::Int(0)])],
//! )
//! .unwrap();
//!
//! let script = assemble(vec![main], &[], CodegenOptions::default()).unwrap();
//! // ENTER 0, 2 then LEAVE 0, 0
//! assert_eq!(script.code, [0x2F, 0, 2, 0, 0, 0x30, 0, 0]);
//! ```

use rustc_hash::FxHashSet;
use tracing::debug;

use sctools_core::{EncodingError, ScriptValue, SymbolId};

use crate::bytecode::{CodeBuffer, FixupKind, Op, Opcode, OperandLayout};
use crate::function_def::{AsmStatement, FunctionDefinition, Operand, StaticField};
use crate::options::CodegenOptions;
use crate::static_init::build_static_segment;

/// Pseudo-mnemonic that picks the smallest integer or float push.
pub const PUSH_CONST_PSEUDO: &str = "PUSH_CONST";

/// Longest function name embedded in `ENTER`, excluding the NUL.
pub const MAX_ENTER_NAME_LENGTH: usize = 254;

/// Assembled code and data.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AssembledScript {
    pub code: Vec<u8>,
    pub statics: Vec<ScriptValue>,
    pub globals: Vec<ScriptValue>,
    /// Trailing static slots that hold script arguments.
    pub args_count: u32,
    /// Function names and entry IPs, in emission order.
    pub functions: Vec<(String, usize)>,
}

/// Move the entry point to position zero by swapping it with the first
/// function.
pub fn order_functions(functions: &mut [FunctionDefinition]) {
    if let Some(idx) = functions.iter().position(FunctionDefinition::is_entry_point) {
        functions.swap(0, idx);
    }
}

/// Assemble a script without a global segment.
pub fn assemble(
    functions: Vec<FunctionDefinition>,
    statics: &[StaticField],
    options: CodegenOptions,
) -> Result<AssembledScript, EncodingError> {
    assemble_with_globals(functions, statics, &[], options)
}

/// Assemble a script. `globals` are laid out like statics, into the global
/// segment.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn assemble_with_globals(
    mut functions: Vec<FunctionDefinition>,
    statics: &[StaticField],
    globals: &[StaticField],
    options: CodegenOptions,
) -> Result<AssembledScript, EncodingError> {
    order_functions(&mut functions);

    let mut asm = Assembler::new(options);
    for function in &functions {
        asm.emit_function(function)?;
    }
    let functions = asm.functions;
    let code = asm.buffer.resolve()?;
    let segment = build_static_segment(statics)?;
    let global_segment = build_static_segment(globals)?;

    debug!(
        functions = functions.len(),
        code_len = code.len(),
        statics = segment.values.len(),
        globals = global_segment.values.len(),
        args = segment.args_count,
        "assembled script"
    );

    Ok(AssembledScript {
        code,
        statics: segment.values,
        globals: global_segment.values,
        args_count: segment.args_count,
        functions,
    })
}

/// Label table key of a function.
fn global_key(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// Label table key of a label local to `function`.
fn local_key(function: &str, label: &str) -> String {
    format!("{}.{}", function.to_ascii_lowercase(), label.to_ascii_lowercase())
}

/// Pass 1 state.
struct Assembler {
    options: CodegenOptions,
    buffer: CodeBuffer,
    functions: Vec<(String, usize)>,
    /// Labels defined in the function being emitted, lowercase.
    local_labels: FxHashSet<String>,
    current: String,
}

impl Assembler {
    fn new(options: CodegenOptions) -> Self {
        Self {
            options,
            buffer: CodeBuffer::new(),
            functions: Vec::new(),
            local_labels: FxHashSet::default(),
            current: String::new(),
        }
    }

    fn emit_function(&mut self, function: &FunctionDefinition) -> Result<(), EncodingError> {
        self.current = function.name().to_string();
        self.local_labels = function
            .statements()
            .iter()
            .filter_map(|s| s.label.as_deref().map(str::to_ascii_lowercase))
            .collect();

        let start = self.buffer.ip();
        self.buffer.define_label(&global_key(function.name()))?;
        self.functions.push((function.name().to_string(), start));

        if !function.is_naked() {
            let params = narrow_u8("ENTER", function.arg_slots() as i64)?;
            let frame = narrow_u16("ENTER", function.frame_size() as i64)?;
            let name = self.options.include_function_names.then(|| function.name());
            self.write_enter(params, frame, name);
        }

        for statement in function.statements() {
            self.emit_statement(statement)?;
        }
        Ok(())
    }

    fn emit_statement(&mut self, statement: &AsmStatement) -> Result<(), EncodingError> {
        if let Some(label) = &statement.label {
            let key = local_key(&self.current, label);
            self.buffer
                .define_label(&key)
                .map_err(|_| EncodingError::DuplicateLabel {
                    name: label.clone(),
                })?;
        }
        if let Some(mnemonic) = &statement.mnemonic {
            self.emit_instruction(mnemonic, &statement.operands)?;
            self.buffer.end_instruction();
        }
        Ok(())
    }

    fn resolve_key(&self, name: &str) -> String {
        if self.local_labels.contains(&name.to_ascii_lowercase()) {
            local_key(&self.current, name)
        } else {
            global_key(name)
        }
    }

    // =========================================================================
    // Instruction encoding
    // =========================================================================

    fn emit_instruction(&mut self, mnemonic: &str, operands: &[Operand]) -> Result<(), EncodingError> {
        if mnemonic.eq_ignore_ascii_case(PUSH_CONST_PSEUDO) {
            expect_count(mnemonic, operands, 1)?;
            return match &operands[0] {
                Operand::Int(v) => self.push_int(mnemonic, *v),
                Operand::Float(v) => {
                    self.buffer.write_op(Op::Named(Opcode::PushConstF));
                    self.buffer.write_f32(*v);
                    Ok(())
                }
                _ => Err(operand_type(mnemonic, 0, "a number")),
            };
        }

        let op = Op::from_mnemonic(mnemonic).ok_or_else(|| EncodingError::UnknownMnemonic {
            mnemonic: mnemonic.to_string(),
        })?;
        let opcode = match op {
            Op::Named(opcode) => opcode,
            Op::PushConstSmall(_) | Op::Invalid(_) => {
                expect_count(mnemonic, operands, 0)?;
                self.buffer.write_op(op);
                return Ok(());
            }
        };

        match opcode.layout() {
            OperandLayout::None => {
                expect_count(mnemonic, operands, 0)?;
                self.buffer.write_op(op);
            }
            OperandLayout::U8 => {
                expect_count(mnemonic, operands, 1)?;
                let v = narrow_u8(mnemonic, int_operand(mnemonic, operands, 0)?)?;
                self.buffer.write_op(op);
                self.buffer.write_u8(v);
            }
            OperandLayout::U16 => {
                expect_count(mnemonic, operands, 1)?;
                let v = narrow_u16(mnemonic, int_operand(mnemonic, operands, 0)?)?;
                self.buffer.write_op(op);
                self.buffer.write_u16(v);
            }
            OperandLayout::U32 => {
                expect_count(mnemonic, operands, 1)?;
                let v = narrow_u32(mnemonic, int_operand(mnemonic, operands, 0)?)?;
                self.buffer.write_op(op);
                self.buffer.write_u32(v);
            }
            OperandLayout::F32 => {
                expect_count(mnemonic, operands, 1)?;
                let v = match &operands[0] {
                    Operand::Float(f) => *f,
                    Operand::Int(i) => *i as f32,
                    _ => return Err(operand_type(mnemonic, 0, "a number")),
                };
                self.buffer.write_op(op);
                self.buffer.write_f32(v);
            }
            OperandLayout::Label | OperandLayout::Function => {
                expect_count(mnemonic, operands, 1)?;
                let name = ident_operand(mnemonic, operands, 0)?;
                let key = if opcode == Opcode::Call {
                    global_key(name)
                } else {
                    self.resolve_key(name)
                };
                self.buffer.write_op(op);
                self.buffer.write_label_ref(&key, name, FixupKind::AbsoluteU32);
            }
            OperandLayout::Native => {
                expect_count(mnemonic, operands, 3)?;
                let params = narrow_u8(mnemonic, int_operand(mnemonic, operands, 0)?)?;
                let returns = narrow_u8(mnemonic, int_operand(mnemonic, operands, 1)?)?;
                let hash = match &operands[2] {
                    Operand::Identifier(name) => SymbolId::from_name(name).as_u32(),
                    Operand::Int(v) => narrow_u32(mnemonic, *v)?,
                    _ => return Err(operand_type(mnemonic, 2, "a native name or hash")),
                };
                self.buffer.write_op(op);
                self.buffer.write_u8(params);
                self.buffer.write_u8(returns);
                self.buffer.write_u32(hash);
            }
            OperandLayout::Enter => {
                if !(2..=3).contains(&operands.len()) {
                    return Err(EncodingError::OperandCount {
                        mnemonic: mnemonic.to_string(),
                        expected: "2 or 3".into(),
                        found: operands.len(),
                    });
                }
                let params = narrow_u8(mnemonic, int_operand(mnemonic, operands, 0)?)?;
                let frame = narrow_u16(mnemonic, int_operand(mnemonic, operands, 1)?)?;
                let name = match operands.get(2) {
                    Some(Operand::String(s) | Operand::Identifier(s)) => Some(s.as_str()),
                    Some(_) => return Err(operand_type(mnemonic, 2, "a name")),
                    None => None,
                };
                self.write_enter(params, frame, name);
            }
            OperandLayout::Leave => {
                expect_count(mnemonic, operands, 2)?;
                let params = narrow_u8(mnemonic, int_operand(mnemonic, operands, 0)?)?;
                let returns = narrow_u8(mnemonic, int_operand(mnemonic, operands, 1)?)?;
                self.buffer.write_op(op);
                self.buffer.write_u8(params);
                self.buffer.write_u8(returns);
            }
            OperandLayout::Switch => {
                let count = narrow_u8(mnemonic, operands.len() as i64)?;
                self.buffer.write_op(op);
                self.buffer.write_u8(count);
                for (i, operand) in operands.iter().enumerate() {
                    let Operand::SwitchCase(value, label) = operand else {
                        return Err(operand_type(mnemonic, i, "a switch case"));
                    };
                    let value = narrow_u32(mnemonic, *value)?;
                    let key = self.resolve_key(label);
                    self.buffer.write_u32(value);
                    self.buffer.write_label_ref(&key, label, FixupKind::AbsoluteU32);
                }
            }
            OperandLayout::String => {
                expect_count(mnemonic, operands, 1)?;
                let Operand::String(s) = &operands[0] else {
                    return Err(operand_type(mnemonic, 0, "a string"));
                };
                self.write_string(mnemonic, s)?;
            }
        }
        Ok(())
    }

    fn push_int(&mut self, mnemonic: &str, v: i64) -> Result<(), EncodingError> {
        if let Some(small) = Op::push_const_small(v) {
            self.buffer.write_op(small);
        } else if (0..=u16::MAX as i64).contains(&v) {
            self.buffer.write_op(Op::Named(Opcode::PushConstU16));
            self.buffer.write_u16(v as u16);
        } else {
            let v = narrow_u32(mnemonic, v)?;
            self.buffer.write_op(Op::Named(Opcode::PushConstU32));
            self.buffer.write_u32(v);
        }
        Ok(())
    }

    fn write_enter(&mut self, params: u8, frame: u16, name: Option<&str>) {
        self.buffer.write_op(Op::Named(Opcode::Enter));
        self.buffer.write_u8(params);
        self.buffer.write_u16(frame);
        match name {
            Some(name) if !name.is_empty() => {
                let bytes = &name.as_bytes()[..name.len().min(MAX_ENTER_NAME_LENGTH)];
                self.buffer.write_u8(bytes.len() as u8 + 1);
                self.buffer.write_bytes(bytes);
                self.buffer.write_u8(0);
            }
            _ => self.buffer.write_u8(0),
        }
        self.buffer.end_instruction();
    }

    fn write_string(&mut self, mnemonic: &str, s: &str) -> Result<(), EncodingError> {
        let len = s.len() + 1;
        self.buffer.write_op(Op::Named(Opcode::String));
        if len <= u8::MAX as usize {
            self.buffer.write_u8(len as u8);
        } else {
            let long = narrow_u16(mnemonic, len as i64)?;
            self.buffer.write_u8(0);
            self.buffer.write_u16(long);
        }
        self.buffer.write_bytes(s.as_bytes());
        self.buffer.write_u8(0);
        Ok(())
    }
}

// ============================================================================
// Operand helpers
// ============================================================================

fn expect_count(mnemonic: &str, operands: &[Operand], expected: usize) -> Result<(), EncodingError> {
    if operands.len() == expected {
        Ok(())
    } else {
        Err(EncodingError::OperandCount {
            mnemonic: mnemonic.to_string(),
            expected: expected.to_string(),
            found: operands.len(),
        })
    }
}

fn operand_type(mnemonic: &str, index: usize, expected: &'static str) -> EncodingError {
    EncodingError::OperandType {
        mnemonic: mnemonic.to_string(),
        index,
        expected,
    }
}

fn int_operand(mnemonic: &str, operands: &[Operand], index: usize) -> Result<i64, EncodingError> {
    match operands.get(index) {
        Some(Operand::Int(v)) => Ok(*v),
        _ => Err(operand_type(mnemonic, index, "an integer")),
    }
}

fn ident_operand<'a>(mnemonic: &str, operands: &'a [Operand], index: usize) -> Result<&'a str, EncodingError> {
    match operands.get(index) {
        Some(Operand::Identifier(name)) => Ok(name),
        _ => Err(operand_type(mnemonic, index, "an identifier")),
    }
}

fn out_of_range(mnemonic: &str, value: i64, width: &'static str) -> EncodingError {
    EncodingError::OperandOutOfRange {
        mnemonic: mnemonic.to_string(),
        value,
        width,
    }
}

fn narrow_u8(mnemonic: &str, v: i64) -> Result<u8, EncodingError> {
    u8::try_from(v).map_err(|_| out_of_range(mnemonic, v, "u8"))
}

fn narrow_u16(mnemonic: &str, v: i64) -> Result<u16, EncodingError> {
    u16::try_from(v).map_err(|_| out_of_range(mnemonic, v, "u16"))
}

/// Accepts the whole `i32` and `u32` ranges; negatives are stored as their
/// two's complement bits.
fn narrow_u32(mnemonic: &str, v: i64) -> Result<u32, EncodingError> {
    if (i32::MIN as i64..=u32::MAX as i64).contains(&v) {
        Ok(v as u32)
    } else {
        Err(out_of_range(mnemonic, v, "32 bits"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function_def::FieldDef;
    use sctools_core::Literal;
    use sctools_registry::Type;

    fn naked(name: &str, statements: Vec<AsmStatement>) -> FunctionDefinition {
        FunctionDefinition::new(name, true, vec![], vec![], None, statements).unwrap()
    }

    fn push(v: i64) -> AsmStatement {
        AsmStatement::new("PUSH_CONST", vec![Operand::Int(v)])
    }

    fn code_of(statements: Vec<AsmStatement>) -> Vec<u8> {
        assemble(vec![naked("main", statements)], &[], CodegenOptions::default())
            .unwrap()
            .code
    }

    #[test]
    fn push_const_width_selection() {
        assert_eq!(code_of(vec![push(-17)]), [0x29, 0xEF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(code_of(vec![push(-16)]), [0x50]);
        assert_eq!(code_of(vec![push(159)]), [0xFF]);
        assert_eq!(code_of(vec![push(160)]), [0x28, 160, 0]);
        assert_eq!(code_of(vec![push(65535)]), [0x28, 0xFF, 0xFF]);
        assert_eq!(code_of(vec![push(65536)]), [0x29, 0, 0, 1, 0]);
    }

    #[test]
    fn push_const_float() {
        let code = code_of(vec![AsmStatement::new("PUSH_CONST", vec![Operand::Float(1.0)])]);
        assert_eq!(code, [0x2A, 0x00, 0x00, 0x80, 0x3F]);
    }

    #[test]
    fn entry_point_is_emitted_first() {
        let helper = naked("helper", vec![AsmStatement::new("NOP", vec![])]);
        let other = naked("other", vec![AsmStatement::new("NOP", vec![])]);
        let main = naked("main", vec![AsmStatement::new("DROP", vec![])]);
        let script = assemble(vec![helper, other, main], &[], CodegenOptions::default()).unwrap();
        assert_eq!(script.code[0], 0x2C);
        let names: Vec<_> = script.functions.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["main", "other", "helper"]);
    }

    #[test]
    fn enter_prologue_and_name() {
        let f = FunctionDefinition::new(
            "fn",
            false,
            vec![FieldDef::new("a", Type::Int)],
            vec![FieldDef::new("v", Type::Vector)],
            None,
            vec![],
        )
        .unwrap();
        let script = assemble(vec![f], &[], CodegenOptions::default().with_function_names(true)).unwrap();
        // params 1, frame 1 + 2 + 3
        assert_eq!(script.code, [0x2F, 1, 6, 0, 3, b'f', b'n', 0]);
    }

    #[test]
    fn long_names_are_truncated() {
        let name = "x".repeat(300);
        let f = FunctionDefinition::new(name, false, vec![], vec![], None, vec![]).unwrap();
        let script = assemble(vec![f], &[], CodegenOptions::default().with_function_names(true)).unwrap();
        assert_eq!(script.code[4], 255);
        assert_eq!(script.code.len(), 5 + 255);
    }

    #[test]
    fn labels_are_function_local() {
        let a = naked(
            "main",
            vec![
                AsmStatement::label("loop"),
                AsmStatement::new("J", vec![Operand::ident("loop")]),
            ],
        );
        let b = naked(
            "b",
            vec![
                AsmStatement::new("NOP", vec![]).with_label("loop"),
                AsmStatement::new("J", vec![Operand::ident("loop")]),
            ],
        );
        let script = assemble(vec![a, b], &[], CodegenOptions::default()).unwrap();
        assert_eq!(&script.code[..5], [0x22, 0, 0, 0, 0]);
        // b starts at 5: NOP, then J 5
        assert_eq!(&script.code[5..], [0x00, 0x22, 5, 0, 0, 0]);
    }

    #[test]
    fn labels_ignore_case() {
        let code = code_of(vec![
            AsmStatement::new("NOP", vec![]).with_label("Loop"),
            AsmStatement::new("J", vec![Operand::ident("LOOP")]),
        ]);
        assert_eq!(code, [0x00, 0x22, 0, 0, 0, 0]);

        let twice = naked("main", vec![AsmStatement::label("end"), AsmStatement::label("END")]);
        assert_eq!(
            assemble(vec![twice], &[], CodegenOptions::default()),
            Err(EncodingError::DuplicateLabel { name: "END".into() })
        );
    }

    #[test]
    fn globals_fill_their_own_segment() {
        let main = naked("main", vec![AsmStatement::new("NOP", vec![])]);
        let statics = [StaticField::new("s", Type::Int, Some(Literal::Int(1)))];
        let globals = [
            StaticField::new("n", Type::Int, None),
            StaticField::new("v", Type::Vector, None),
            StaticField::new("m", Type::Int, Some(Literal::Int(5))),
        ];
        let script = assemble_with_globals(vec![main], &statics, &globals, CodegenOptions::default()).unwrap();
        let raw: Vec<i32> = script.globals.iter().map(|v| v.as_i32()).collect();
        assert_eq!(raw, [0, 0, 0, 0, 5]);
        assert_eq!(script.statics, [ScriptValue::from_i32(1)]);

        let without = assemble(vec![naked("main", vec![])], &statics, CodegenOptions::default()).unwrap();
        assert!(without.globals.is_empty());
    }

    #[test]
    fn call_resolves_function_address() {
        let main = naked(
            "main",
            vec![AsmStatement::new("CALL", vec![Operand::ident("Helper")])],
        );
        let helper = naked("helper", vec![AsmStatement::new("NOP", vec![])]);
        let script = assemble(vec![main, helper], &[], CodegenOptions::default()).unwrap();
        assert_eq!(script.code, [0x2E, 5, 0, 0, 0, 0x00]);
    }

    #[test]
    fn native_by_name_or_hash() {
        let code = code_of(vec![
            AsmStatement::new(
                "NATIVE",
                vec![Operand::Int(1), Operand::Int(0), Operand::ident("WAIT")],
            ),
            AsmStatement::new(
                "NATIVE",
                vec![Operand::Int(0), Operand::Int(1), Operand::Int(0x1234)],
            ),
        ]);
        let hash = SymbolId::from_name("WAIT").as_u32().to_le_bytes();
        assert_eq!(&code[..3], [0x2D, 1, 0]);
        assert_eq!(&code[3..7], hash);
        assert_eq!(&code[7..], [0x2D, 0, 1, 0x34, 0x12, 0, 0]);
    }

    #[test]
    fn switch_encoding() {
        let code = code_of(vec![
            AsmStatement::new(
                "SWITCH",
                vec![
                    Operand::SwitchCase(1, "one".into()),
                    Operand::SwitchCase(2, "two".into()),
                ],
            ),
            AsmStatement::label("one"),
            AsmStatement::new("NOP", vec![]).with_label("two"),
        ]);
        assert_eq!(code.len(), 18 + 1);
        assert_eq!(code[1], 2);
        assert_eq!(&code[2..10], [1, 0, 0, 0, 18, 0, 0, 0]);
        assert_eq!(&code[10..18], [2, 0, 0, 0, 18, 0, 0, 0]);
    }

    #[test]
    fn strings() {
        let code = code_of(vec![AsmStatement::new("STRING", vec![Operand::String("hi".into())])]);
        assert_eq!(code, [0x43, 3, b'h', b'i', 0]);

        let long = "a".repeat(300);
        let code = code_of(vec![AsmStatement::new("STRING", vec![Operand::String(long)])]);
        assert_eq!(&code[..4], [0x43, 0, 0x2D, 0x01]);
        assert_eq!(code.len(), 4 + 301);
    }

    #[test]
    fn errors() {
        let run = |s: AsmStatement| assemble(vec![naked("main", vec![s])], &[], CodegenOptions::default());
        assert!(matches!(
            run(AsmStatement::new("FROB", vec![])),
            Err(EncodingError::UnknownMnemonic { .. })
        ));
        assert!(matches!(
            run(AsmStatement::new("IADD", vec![Operand::Int(1)])),
            Err(EncodingError::OperandCount { .. })
        ));
        assert!(matches!(
            run(AsmStatement::new("PUSH_CONST_U16", vec![Operand::Int(70_000)])),
            Err(EncodingError::OperandOutOfRange { .. })
        ));
        assert!(matches!(
            run(AsmStatement::new("J", vec![Operand::ident("nowhere")])),
            Err(EncodingError::UnresolvedLabel { .. })
        ));
        assert!(matches!(
            run(AsmStatement::new("J", vec![Operand::Int(3)])),
            Err(EncodingError::OperandType { .. })
        ));
    }

    #[test]
    fn duplicate_local_label() {
        let f = naked(
            "main",
            vec![AsmStatement::label("a"), AsmStatement::label("a")],
        );
        assert_eq!(
            assemble(vec![f], &[], CodegenOptions::default()),
            Err(EncodingError::DuplicateLabel { name: "a".into() })
        );
    }
}
