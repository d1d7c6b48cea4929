//! Code buffer with deferred label fix-ups.
//!
//! Assembly is two passes over one buffer. Pass 1 appends instruction bytes,
//! records label definitions, and writes a zeroed placeholder wherever a label
//! address is needed, remembering it in a side table of [`Fixup`]s. Pass 2,
//! [`CodeBuffer::resolve`], patches every placeholder once all labels are
//! known.
//!
//! # Example
//!
//! ```
//! use sctools_compiler::bytecode::{CodeBuffer, FixupKind, Op, Opcode};
//!
//! let mut buf = CodeBuffer::new();
//! buf.write_op(Op::Named(Opcode::J));
//! buf.write_label_ref("end", "end", FixupKind::AbsoluteU32);
//! buf.end_instruction();
//! buf.write_op(Op::Named(Opcode::Nop));
//! buf.define_label("end").unwrap();
//! buf.write_op(Op::Named(Opcode::Nop));
//!
//! let code = buf.resolve().unwrap();
//! assert_eq!(code, [0x22, 6, 0, 0, 0, 0x00, 0x00]);
//! ```

use byteorder::{ByteOrder, LittleEndian};
use rustc_hash::FxHashMap;

use sctools_core::EncodingError;

use super::Op;

/// How a placeholder is patched.
///
/// The GTA IV and Max Payne 3 instruction sets only use [`AbsoluteU32`].
/// The narrower kinds are for callers emitting raw code with 24-bit call
/// targets or 16-bit relative jumps; the assembler never produces them.
///
/// [`AbsoluteU32`]: FixupKind::AbsoluteU32
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixupKind {
    /// Label IP as u32. Jumps, `CALL` and `SWITCH` targets.
    AbsoluteU32,
    /// Label IP as u24.
    AbsoluteU24,
    /// Label IP minus the IP of the next instruction, as i16. Fails with
    /// [`EncodingError::JumpOutOfRange`] past the `i16` range.
    RelativeS16,
}

impl FixupKind {
    #[inline]
    pub const fn width(self) -> usize {
        match self {
            FixupKind::AbsoluteU32 => 4,
            FixupKind::AbsoluteU24 => 3,
            FixupKind::RelativeS16 => 2,
        }
    }
}

/// A placeholder waiting for a label address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fixup {
    /// Byte offset of the placeholder.
    pub offset: usize,
    /// Lookup key in the label table.
    pub key: String,
    /// Label as written, for error messages.
    pub name: String,
    pub kind: FixupKind,
    /// IP of the instruction after the one holding the placeholder.
    pub next_ip: Option<usize>,
}

/// Instruction bytes under construction.
#[derive(Debug, Clone, Default)]
pub struct CodeBuffer {
    code: Vec<u8>,
    fixups: Vec<Fixup>,
    labels: FxHashMap<String, usize>,
}

impl CodeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current instruction pointer.
    #[inline]
    pub fn ip(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn fixups(&self) -> &[Fixup] {
        &self.fixups
    }

    // =========================================================================
    // Writers
    // =========================================================================

    #[inline]
    pub fn write_op(&mut self, op: Op) {
        self.code.push(op.to_byte());
    }

    #[inline]
    pub fn write_u8(&mut self, v: u8) {
        self.code.push(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        let mut buf = [0; 2];
        LittleEndian::write_u16(&mut buf, v);
        self.code.extend_from_slice(&buf);
    }

    pub fn write_s16(&mut self, v: i16) {
        let mut buf = [0; 2];
        LittleEndian::write_i16(&mut buf, v);
        self.code.extend_from_slice(&buf);
    }

    /// Low 24 bits of `v`.
    pub fn write_u24(&mut self, v: u32) {
        let mut buf = [0; 3];
        LittleEndian::write_u24(&mut buf, v & 0x00FF_FFFF);
        self.code.extend_from_slice(&buf);
    }

    pub fn write_u32(&mut self, v: u32) {
        let mut buf = [0; 4];
        LittleEndian::write_u32(&mut buf, v);
        self.code.extend_from_slice(&buf);
    }

    pub fn write_f32(&mut self, v: f32) {
        let mut buf = [0; 4];
        LittleEndian::write_f32(&mut buf, v);
        self.code.extend_from_slice(&buf);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.code.extend_from_slice(bytes);
    }

    // =========================================================================
    // Labels
    // =========================================================================

    /// Bind `key` to the current IP.
    pub fn define_label(&mut self, key: &str) -> Result<(), EncodingError> {
        let ip = self.ip();
        self.define_label_at(key, ip)
    }

    pub fn define_label_at(&mut self, key: &str, ip: usize) -> Result<(), EncodingError> {
        if self.labels.contains_key(key) {
            return Err(EncodingError::DuplicateLabel { name: key.into() });
        }
        self.labels.insert(key.into(), ip);
        Ok(())
    }

    pub fn label_address(&self, key: &str) -> Option<usize> {
        self.labels.get(key).copied()
    }

    /// Write a zeroed placeholder for `key` and record a fix-up.
    pub fn write_label_ref(&mut self, key: &str, name: &str, kind: FixupKind) {
        self.fixups.push(Fixup {
            offset: self.ip(),
            key: key.into(),
            name: name.into(),
            kind,
            next_ip: None,
        });
        self.code.resize(self.code.len() + kind.width(), 0);
    }

    /// Mark the end of the current instruction. Relative fix-ups written
    /// since the last call are measured from here.
    pub fn end_instruction(&mut self) {
        let ip = self.ip();
        for fixup in self.fixups.iter_mut().rev() {
            if fixup.next_ip.is_some() {
                break;
            }
            fixup.next_ip = Some(ip);
        }
    }

    // =========================================================================
    // Pass 2
    // =========================================================================

    /// Patch every fix-up and return the final code.
    pub fn resolve(mut self) -> Result<Vec<u8>, EncodingError> {
        for fixup in &self.fixups {
            let Some(&target) = self.labels.get(&fixup.key) else {
                return Err(EncodingError::UnresolvedLabel {
                    name: fixup.name.clone(),
                });
            };
            let at = fixup.offset;
            let field = &mut self.code[at..at + fixup.kind.width()];
            match fixup.kind {
                FixupKind::AbsoluteU32 => {
                    let value = u32::try_from(target).map_err(|_| out_of_range(fixup, target as i64))?;
                    LittleEndian::write_u32(field, value);
                }
                FixupKind::AbsoluteU24 => {
                    if target > 0x00FF_FFFF {
                        return Err(out_of_range(fixup, target as i64));
                    }
                    LittleEndian::write_u24(field, target as u32);
                }
                FixupKind::RelativeS16 => {
                    let base = fixup.next_ip.unwrap_or(at + fixup.kind.width());
                    let delta = target as i64 - base as i64;
                    let value = i16::try_from(delta).map_err(|_| out_of_range(fixup, delta))?;
                    LittleEndian::write_i16(field, value);
                }
            }
        }
        Ok(self.code)
    }
}

fn out_of_range(fixup: &Fixup, offset: i64) -> EncodingError {
    EncodingError::JumpOutOfRange {
        label: fixup.name.clone(),
        offset,
    }
}
