//! Text listing of a compiled script.
//!
//! ```text
//! .script_name 'hello'
//! .static
//!         .int 3 dup (0)
//!
//! .code
//!
//! main:
//!         ENTER 0, 2
//!         LEAVE 0, 0
//! ```
//!
//! Runs of equal values in the data segments are folded into
//! `.int N dup (V)`.

use std::fmt::{self, Write};

use sctools_core::{EncodingError, ScriptValue};

use crate::bytecode::{Op, Opcode};
use crate::disassembler::{Disassembly, Instruction, NativeDb, disassemble};
use crate::function_def::Operand;

/// The parts of a compiled script a listing shows.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptParts<'a> {
    pub name: &'a str,
    pub code: &'a [u8],
    pub statics: &'a [ScriptValue],
    pub globals: &'a [ScriptValue],
    /// Trailing static slots that hold script arguments.
    pub args_count: u32,
    pub globals_signature: u32,
}

/// A disassembled script, printed through [`fmt::Display`].
#[derive(Debug, Clone)]
pub struct Listing<'a> {
    parts: ScriptParts<'a>,
    disassembly: Disassembly,
    natives: &'a NativeDb,
}

impl<'a> Listing<'a> {
    pub fn new(parts: ScriptParts<'a>, natives: &'a NativeDb) -> Result<Self, EncodingError> {
        let disassembly = disassemble(parts.code, natives)?;
        Ok(Self {
            parts,
            disassembly,
            natives,
        })
    }

    pub fn disassembly(&self) -> &Disassembly {
        &self.disassembly
    }

    fn write_instruction(&self, f: &mut fmt::Formatter<'_>, inst: &Instruction) -> fmt::Result {
        if let Some(label) = &inst.label {
            if is_function(inst.op) {
                writeln!(f)?;
                writeln!(f, "{label}:")?;
            } else {
                writeln!(f, "\t{label}:")?;
            }
        }

        write!(f, "\t\t{}", inst.mnemonic())?;
        for (i, operand) in inst.operands.iter().enumerate() {
            f.write_str(if i == 0 { " " } else { ", " })?;
            match (inst.op, operand) {
                (Op::Named(Opcode::Native), Operand::Int(hash)) if i == 2 => {
                    f.write_str(&self.natives.display(*hash as u32))?
                }
                _ => write_operand(f, operand)?,
            }
        }
        writeln!(f)
    }
}

fn is_function(op: Op) -> bool {
    op == Op::Named(Opcode::Enter)
}

fn write_operand(f: &mut fmt::Formatter<'_>, operand: &Operand) -> fmt::Result {
    match operand {
        Operand::Int(v) => write!(f, "{v}"),
        Operand::Float(v) => write!(f, "{v:?}"),
        Operand::String(s) => write!(f, "'{}'", escape(s)),
        Operand::Identifier(name) => f.write_str(name),
        Operand::SwitchCase(v, label) => write!(f, "{v}:{label}"),
    }
}

/// Fold runs of equal values.
fn write_values(f: &mut fmt::Formatter<'_>, indent: &str, values: &[ScriptValue]) -> fmt::Result {
    let mut iter = values.iter().map(|v| v.as_i32()).peekable();
    while let Some(value) = iter.next() {
        let mut count = 1;
        while iter.next_if_eq(&value).is_some() {
            count += 1;
        }
        if count == 1 {
            writeln!(f, "{indent}.int {value}")?;
        } else {
            writeln!(f, "{indent}.int {count} dup ({value})")?;
        }
    }
    Ok(())
}

/// Escape a string for a single-quoted operand.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

impl fmt::Display for Listing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = &self.parts;
        writeln!(f, ".script_name '{}'", escape(parts.name))?;
        if parts.globals_signature != 0 {
            writeln!(f, ".globals_signature 0x{:08X}", parts.globals_signature)?;
        }

        if !parts.globals.is_empty() {
            writeln!(f, ".global")?;
            write_values(f, "", parts.globals)?;
        }

        let args_start = parts.statics.len().saturating_sub(parts.args_count as usize);
        let (statics, args) = parts.statics.split_at(args_start);
        if !statics.is_empty() {
            writeln!(f, ".static")?;
            write_values(f, "\t\t", statics)?;
            writeln!(f)?;
        }
        if !args.is_empty() {
            writeln!(f, ".arg")?;
            write_values(f, "\t\t", args)?;
            writeln!(f)?;
        }

        if !self.disassembly.instructions.is_empty() {
            writeln!(f, ".code")?;
            for inst in &self.disassembly.instructions {
                self.write_instruction(f, inst)?;
            }
            if let Some(label) = self.disassembly.end_label() {
                writeln!(f, "\t{label}:")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;
    use crate::function_def::{AsmStatement, FunctionDefinition, StaticField};
    use crate::options::CodegenOptions;
    use sctools_core::Literal;
    use sctools_registry::Type;

    #[test]
    fn full_listing() {
        let main = FunctionDefinition::new(
            "main",
            false,
            vec![],
            vec![],
            None,
            vec![
                AsmStatement::new("STRING", vec![Operand::String("it's".into())]),
                AsmStatement::new("NATIVE", vec![Operand::Int(1), Operand::Int(0), Operand::ident("PRINT")]),
                AsmStatement::new("NATIVE", vec![Operand::Int(0), Operand::Int(0), Operand::Int(0xBEEF)]),
                AsmStatement::new("J", vec![Operand::ident("end")]),
                AsmStatement::new("LEAVE", vec![Operand::Int(0), Operand::Int(0)]).with_label("end"),
            ],
        )
        .unwrap();
        let statics = [
            StaticField::new("a", Type::Int, None),
            StaticField::new("b", Type::Int, None),
            StaticField::new("c", Type::Int, Some(Literal::Int(7))),
            StaticField::arg("d", Type::Float, None),
        ];
        let script = assemble(vec![main], &statics, CodegenOptions::default()).unwrap();

        let natives = NativeDb::from_names(["PRINT"]);
        let parts = ScriptParts {
            name: "demo",
            code: &script.code,
            statics: &script.statics,
            globals: &[],
            args_count: script.args_count,
            globals_signature: 0xCAFE,
        };
        let text = Listing::new(parts, &natives).unwrap().to_string();
        // ENTER(5) STRING(2+5) NATIVE(7) NATIVE(7) J(5) -> end at 31
        let expected = "\
.script_name 'demo'
.globals_signature 0x0000CAFE
.static
\t\t.int 2 dup (0)
\t\t.int 7

.arg
\t\t.int 0

.code

main:
\t\tENTER 0, 2
\t\tSTRING 'it\\'s'
\t\tNATIVE 1, 0, PRINT
\t\tNATIVE 0, 0, 0x0000BEEF
\t\tJ lbl_31
\tlbl_31:
\t\tLEAVE 0, 0
";
        assert_eq!(text, expected);
    }

    #[test]
    fn globals_are_folded() {
        let globals = [
            ScriptValue::from_i32(1),
            ScriptValue::from_i32(1),
            ScriptValue::from_i32(1),
            ScriptValue::from_i32(-4),
        ];
        let natives = NativeDb::new();
        let parts = ScriptParts {
            name: "g",
            globals: &globals,
            ..ScriptParts::default()
        };
        let text = Listing::new(parts, &natives).unwrap().to_string();
        assert_eq!(text, ".script_name 'g'\n.global\n.int 3 dup (1)\n.int -4\n");
    }

    #[test]
    fn escapes() {
        assert_eq!(escape("a\\b\n\u{1}"), "a\\\\b\\n\\x01");
    }
}
