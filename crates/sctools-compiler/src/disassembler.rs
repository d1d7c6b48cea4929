//! Two-pass disassembler.
//!
//! Pass 1 walks the code with the opcode length rule and names every
//! address that something refers to: `ENTER` addresses become function
//! labels (the embedded name, `main` at address 0, else `func_{ip}`) and jump
//! or switch targets become `lbl_{ip}`. Pass 2 decodes the operands of every
//! instruction, resolving targets to those names.
//!
//! Operands come back as assembler [`Operand`]s, so a listing can be fed to
//! [`assemble`](crate::assemble) again.
//!
//! # Example
//!
//! ```
//! use sctools_compiler::{NativeDb, disassemble};
//!
//! // ENTER 0, 2; PUSH_CONST_1; DROP; LEAVE 0, 0
//! let code = [0x2F, 0, 2, 0, 0, 0x61, 0x2C, 0x30, 0, 0];
//! let listing = disassemble(&code, &NativeDb::new()).unwrap();
//! assert_eq!(listing.instructions.len(), 4);
//! assert_eq!(listing.instructions[0].label.as_deref(), Some("main"));
//! assert_eq!(listing.instructions[1].mnemonic(), "PUSH_CONST_1");
//! ```

use std::borrow::Cow;
use std::io::{self, Cursor, Read};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use sctools_core::{EncodingError, SymbolId};

use crate::bytecode::{Op, Opcode, OperandLayout};
use crate::function_def::{ENTRY_POINT_NAME, Operand};

const FUNCTION_LABEL_PREFIX: &str = "func_";
const CODE_LABEL_PREFIX: &str = "lbl_";

// ============================================================================
// Native database
// ============================================================================

/// Native command names by hash.
#[derive(Debug, Clone, Default)]
pub struct NativeDb {
    names: FxHashMap<u32, String>,
}

impl NativeDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from native names, hashing each.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut db = Self::new();
        for name in names {
            db.insert(name);
        }
        db
    }

    /// Parse a list with one native per line, either `0xHASH NAME` or a bare
    /// `NAME`. Blank lines and `#` comments are skipped.
    pub fn parse(text: &str) -> Self {
        let mut db = Self::new();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.split_whitespace();
            let (Some(first), second) = (parts.next(), parts.next()) else {
                continue;
            };
            match (first.strip_prefix("0x").or_else(|| first.strip_prefix("0X")), second) {
                (Some(hex), Some(name)) => match u32::from_str_radix(hex, 16) {
                    Ok(hash) => db.insert_hash(hash, name),
                    Err(_) => warn!(line = number + 1, "skipping native with malformed hash"),
                },
                (Some(_), None) => warn!(line = number + 1, "skipping native hash without a name"),
                (None, _) => db.insert(first),
            }
        }
        db
    }

    pub fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let db = Self::parse(&text);
        debug!(path = %path.as_ref().display(), natives = db.len(), "loaded native database");
        Ok(db)
    }

    pub fn insert(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.names.insert(SymbolId::from_name(&name).as_u32(), name);
    }

    pub fn insert_hash(&mut self, hash: u32, name: impl Into<String>) {
        self.names.insert(hash, name.into());
    }

    pub fn name(&self, hash: u32) -> Option<&str> {
        self.names.get(&hash).map(String::as_str)
    }

    /// The name, or the hash as `0x{hash:08X}`.
    pub fn display(&self, hash: u32) -> Cow<'_, str> {
        match self.name(hash) {
            Some(name) => Cow::Borrowed(name),
            None => Cow::Owned(format!("0x{hash:08X}")),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

// ============================================================================
// Disassembly
// ============================================================================

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub label: Option<String>,
    pub ip: usize,
    pub op: Op,
    pub operands: Vec<Operand>,
    pub bytes: Vec<u8>,
}

impl Instruction {
    pub fn mnemonic(&self) -> Cow<'static, str> {
        self.op.mnemonic()
    }
}

/// A decoded code segment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Disassembly {
    pub instructions: Vec<Instruction>,
    /// Every named address, including one just past the last instruction.
    pub labels: FxHashMap<usize, String>,
    pub code_len: usize,
}

impl Disassembly {
    pub fn label_at(&self, ip: usize) -> Option<&str> {
        self.labels.get(&ip).map(String::as_str)
    }

    /// A label on the end of the code, which no instruction carries.
    pub fn end_label(&self) -> Option<&str> {
        self.label_at(self.code_len)
    }
}

/// Disassemble a code segment. Native hashes are named from `natives` where
/// possible.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn disassemble(code: &[u8], natives: &NativeDb) -> Result<Disassembly, EncodingError> {
    let spans = walk(code)?;
    let labels = collect_labels(code, &spans);

    let mut instructions = Vec::with_capacity(spans.len());
    for &(ip, size) in &spans {
        let bytes = &code[ip..ip + size];
        let op = Op::from_byte(bytes[0]);
        let (operands, consumed) = decode_operands(op, code, ip, &labels, natives)?;
        if consumed != size {
            return Err(EncodingError::LengthMismatch {
                ip,
                mnemonic: op.mnemonic().into_owned(),
                declared: size,
                consumed,
            });
        }
        instructions.push(Instruction {
            label: labels.get(&ip).cloned(),
            ip,
            op,
            operands,
            bytes: bytes.to_vec(),
        });
    }

    debug!(
        instructions = instructions.len(),
        labels = labels.len(),
        code_len = code.len(),
        "disassembled code"
    );

    Ok(Disassembly {
        instructions,
        labels,
        code_len: code.len(),
    })
}

/// `(ip, size)` of every instruction.
fn walk(code: &[u8]) -> Result<Vec<(usize, usize)>, EncodingError> {
    let mut spans = Vec::new();
    let mut ip = 0;
    while ip < code.len() {
        let size = Op::instruction_size(&code[ip..]).ok_or(EncodingError::TruncatedInstruction { ip })?;
        if ip + size > code.len() {
            return Err(EncodingError::TruncatedInstruction { ip });
        }
        spans.push((ip, size));
        ip += size;
    }
    Ok(spans)
}

fn collect_labels(code: &[u8], spans: &[(usize, usize)]) -> FxHashMap<usize, String> {
    let mut labels = FxHashMap::default();
    let mut targets = Vec::new();

    for &(ip, size) in spans {
        let bytes = &code[ip..ip + size];
        match Op::from_byte(bytes[0]) {
            Op::Named(Opcode::Enter) => {
                let name = enter_name(bytes).unwrap_or_else(|| {
                    if ip == 0 {
                        ENTRY_POINT_NAME.to_string()
                    } else {
                        format!("{FUNCTION_LABEL_PREFIX}{ip}")
                    }
                });
                labels.insert(ip, name);
            }
            Op::Named(op) if op.is_jump() => targets.push(read_u32_at(bytes, 1) as usize),
            Op::Named(Opcode::Switch) => {
                let count = bytes[1] as usize;
                targets.extend((0..count).map(|i| read_u32_at(bytes, 2 + 8 * i + 4) as usize));
            }
            _ => {}
        }
    }

    for target in targets {
        labels
            .entry(target)
            .or_insert_with(|| format!("{CODE_LABEL_PREFIX}{target}"));
    }
    labels
}

/// Little-endian u32 inside an instruction whose size was already checked.
fn read_u32_at(bytes: &[u8], offset: usize) -> u32 {
    let mut cursor = bytes.get(offset..).unwrap_or_default();
    cursor.read_u32::<LittleEndian>().unwrap_or_default()
}

/// The name embedded in an `ENTER`. Leading `0xFF` bytes are padding.
fn enter_name(bytes: &[u8]) -> Option<String> {
    let len = *bytes.get(4)? as usize;
    if len < 2 {
        return None;
    }
    let raw = bytes.get(5..5 + len)?;
    let raw = &raw[raw.iter().take_while(|&&b| b == 0xFF).count()..];
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let name = String::from_utf8_lossy(&raw[..end]).into_owned();
    (!name.is_empty()).then_some(name)
}

/// Decode the operands of the instruction at `ip`. Returns the operands and
/// the bytes consumed, opcode included.
fn decode_operands(
    op: Op,
    code: &[u8],
    ip: usize,
    labels: &FxHashMap<usize, String>,
    natives: &NativeDb,
) -> Result<(Vec<Operand>, usize), EncodingError> {
    let Op::Named(opcode) = op else {
        return Ok((Vec::new(), 1));
    };

    let mut r = Cursor::new(&code[ip + 1..]);
    let truncated = |_: io::Error| EncodingError::TruncatedInstruction { ip };
    let target = |addr: u32| match labels.get(&(addr as usize)) {
        Some(label) => Operand::ident(label.clone()),
        None => Operand::Int(addr as i64),
    };

    let operands = match opcode.layout() {
        OperandLayout::None => Vec::new(),
        OperandLayout::U8 => vec![Operand::Int(r.read_u8().map_err(truncated)? as i64)],
        OperandLayout::U16 => vec![Operand::Int(r.read_u16::<LittleEndian>().map_err(truncated)? as i64)],
        OperandLayout::U32 => vec![Operand::Int(r.read_u32::<LittleEndian>().map_err(truncated)? as i64)],
        OperandLayout::F32 => vec![Operand::Float(r.read_f32::<LittleEndian>().map_err(truncated)?)],
        OperandLayout::Label | OperandLayout::Function => {
            vec![target(r.read_u32::<LittleEndian>().map_err(truncated)?)]
        }
        OperandLayout::Native => {
            let params = r.read_u8().map_err(truncated)?;
            let returns = r.read_u8().map_err(truncated)?;
            let hash = r.read_u32::<LittleEndian>().map_err(truncated)?;
            let command = match natives.name(hash) {
                Some(name) => Operand::ident(name),
                None => Operand::Int(hash as i64),
            };
            vec![Operand::Int(params as i64), Operand::Int(returns as i64), command]
        }
        OperandLayout::Enter => {
            let params = r.read_u8().map_err(truncated)?;
            let frame = r.read_u16::<LittleEndian>().map_err(truncated)?;
            let name_len = r.read_u8().map_err(truncated)? as usize;
            let mut name = vec![0; name_len];
            r.read_exact(&mut name).map_err(truncated)?;
            let mut operands = vec![Operand::Int(params as i64), Operand::Int(frame as i64)];
            if let Some(name) = enter_name(&code[ip..]) {
                operands.push(Operand::String(name));
            }
            operands
        }
        OperandLayout::Leave => {
            let params = r.read_u8().map_err(truncated)?;
            let returns = r.read_u8().map_err(truncated)?;
            vec![Operand::Int(params as i64), Operand::Int(returns as i64)]
        }
        OperandLayout::Switch => {
            let count = r.read_u8().map_err(truncated)?;
            let mut cases = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let value = r.read_i32::<LittleEndian>().map_err(truncated)?;
                let addr = r.read_u32::<LittleEndian>().map_err(truncated)?;
                let label = match target(addr) {
                    Operand::Identifier(label) => label,
                    _ => addr.to_string(),
                };
                cases.push(Operand::SwitchCase(value as i64, label));
            }
            cases
        }
        OperandLayout::String => {
            let mut len = r.read_u8().map_err(truncated)? as usize;
            if len == 0 {
                len = r.read_u16::<LittleEndian>().map_err(truncated)? as usize;
            }
            let mut raw = vec![0; len];
            r.read_exact(&mut raw).map_err(truncated)?;
            let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
            vec![Operand::String(String::from_utf8_lossy(&raw[..end]).into_owned())]
        }
    };

    Ok((operands, 1 + r.position() as usize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;
    use crate::function_def::{AsmStatement, FunctionDefinition};
    use crate::options::CodegenOptions;

    fn function(name: &str, statements: Vec<AsmStatement>) -> FunctionDefinition {
        FunctionDefinition::new(name, false, vec![], vec![], None, statements).unwrap()
    }

    fn leave() -> AsmStatement {
        AsmStatement::new("LEAVE", vec![Operand::Int(0), Operand::Int(0)])
    }

    #[test]
    fn labels_functions_and_jump_targets() {
        let main = function(
            "main",
            vec![
                AsmStatement::new("J", vec![Operand::ident("done")]),
                AsmStatement::new("CALL", vec![Operand::ident("helper")]),
                AsmStatement::label("done"),
                leave(),
            ],
        );
        let helper = function("helper", vec![leave()]);
        let script = assemble(vec![main, helper], &[], CodegenOptions::default()).unwrap();

        let listing = disassemble(&script.code, &NativeDb::new()).unwrap();
        let names: Vec<_> = listing.instructions.iter().map(|i| i.mnemonic().into_owned()).collect();
        assert_eq!(names, ["ENTER", "J", "CALL", "LEAVE", "ENTER", "LEAVE"]);

        // ENTER(5) J(5) CALL(5) -> done at 15, helper at 18
        assert_eq!(listing.instructions[0].label.as_deref(), Some("main"));
        assert_eq!(listing.instructions[1].operands, [Operand::ident("lbl_15")]);
        assert_eq!(listing.instructions[2].operands, [Operand::ident("func_18")]);
        assert_eq!(listing.instructions[3].label.as_deref(), Some("lbl_15"));
        assert_eq!(listing.instructions[4].label.as_deref(), Some("func_18"));
    }

    #[test]
    fn embedded_function_names() {
        let helper = function("helper", vec![leave()]);
        let script = assemble(
            vec![function("main", vec![leave()]), helper],
            &[],
            CodegenOptions::default().with_function_names(true),
        )
        .unwrap();
        let listing = disassemble(&script.code, &NativeDb::new()).unwrap();
        assert_eq!(listing.instructions[0].operands[2], Operand::String("main".into()));
        assert_eq!(listing.label_at(script.functions[1].1), Some("helper"));
    }

    #[test]
    fn enter_name_skips_padding() {
        let code = [0x2F, 1, 5, 0, 5, 0xFF, 0xFF, b'f', b'n', 0, 0x30, 1, 0];
        let listing = disassemble(&code, &NativeDb::new()).unwrap();
        assert_eq!(listing.instructions[0].label.as_deref(), Some("fn"));
        assert_eq!(
            listing.instructions[0].operands,
            [Operand::Int(1), Operand::Int(5), Operand::String("fn".into())]
        );
    }

    #[test]
    fn natives_by_name_or_hash() {
        let hash = SymbolId::from_name("WAIT").as_u32();
        let mut code = vec![0x2D, 1, 0];
        code.extend_from_slice(&hash.to_le_bytes());
        code.extend_from_slice(&[0x2D, 0, 0, 0x78, 0x56, 0x34, 0x12]);

        let natives = NativeDb::from_names(["WAIT"]);
        let listing = disassemble(&code, &natives).unwrap();
        assert_eq!(listing.instructions[0].operands[2], Operand::ident("WAIT"));
        assert_eq!(listing.instructions[1].operands[2], Operand::Int(0x1234_5678));
        assert_eq!(natives.display(0x1234_5678), "0x12345678");
    }

    #[test]
    fn strings_switches_and_invalid_opcodes() {
        let mut code = vec![0x43, 3, b'h', b'i', 0, 0x4E, 0x42, 1];
        code.extend_from_slice(&(-2i32).to_le_bytes());
        code.extend_from_slice(&5u32.to_le_bytes());
        let listing = disassemble(&code, &NativeDb::new()).unwrap();

        assert_eq!(listing.instructions[0].operands, [Operand::String("hi".into())]);
        assert_eq!(listing.instructions[1].op, Op::Invalid(0x4E));
        assert_eq!(listing.instructions[1].bytes, [0x4E]);
        assert_eq!(
            listing.instructions[2].operands,
            [Operand::SwitchCase(-2, "lbl_5".into())]
        );
        assert_eq!(listing.instructions[1].label.as_deref(), Some("lbl_5"));
    }

    #[test]
    fn truncated_code_fails() {
        assert_eq!(
            disassemble(&[0x61, 0x29, 1, 2], &NativeDb::new()),
            Err(EncodingError::TruncatedInstruction { ip: 1 })
        );
        assert_eq!(
            disassemble(&[0x43, 0, 9], &NativeDb::new()),
            Err(EncodingError::TruncatedInstruction { ip: 0 })
        );
    }

    #[test]
    fn label_past_the_end() {
        let code = [0x22, 5, 0, 0, 0];
        let listing = disassemble(&code, &NativeDb::new()).unwrap();
        assert_eq!(listing.end_label(), Some("lbl_5"));
    }

    #[test]
    fn native_db_text_format() {
        let db = NativeDb::parse("# natives\n0x0000ABCD DO_THING\nWAIT\n\n0xZZ BROKEN\n0x12\n");
        assert_eq!(db.len(), 2);
        assert_eq!(db.name(0xABCD), Some("DO_THING"));
        assert_eq!(db.name(SymbolId::from_name("wait").as_u32()), Some("WAIT"));
    }

    #[test]
    fn native_db_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("natives.txt");
        std::fs::write(&path, "0x00000001 ONE\n").unwrap();
        let db = NativeDb::load(&path).unwrap();
        assert_eq!(db.name(1), Some("ONE"));
        assert!(NativeDb::load(dir.path().join("missing.txt")).is_err());
    }
}
