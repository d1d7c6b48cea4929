//! The 4-byte storage cell of the static and global segments.

use std::fmt;

/// A 32-bit value reinterpretable as `i32`, `u32` or `f32`.
///
/// The bits are stored as-is; reading it as another type never converts
/// numerically. `ScriptValue::from_f32(1.0).as_u32()` is `0x3F80_0000`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct ScriptValue(u32);

impl ScriptValue {
    pub const ZERO: ScriptValue = ScriptValue(0);

    /// Size in bytes of one value.
    pub const SIZE: usize = 4;

    #[inline]
    pub const fn from_u32(v: u32) -> Self {
        ScriptValue(v)
    }

    #[inline]
    pub const fn from_i32(v: i32) -> Self {
        ScriptValue(v as u32)
    }

    #[inline]
    pub fn from_f32(v: f32) -> Self {
        ScriptValue(v.to_bits())
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn as_i32(self) -> i32 {
        self.0 as i32
    }

    #[inline]
    pub fn as_f32(self) -> f32 {
        f32::from_bits(self.0)
    }

    #[inline]
    pub const fn to_le_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    #[inline]
    pub const fn from_le_bytes(bytes: [u8; 4]) -> Self {
        ScriptValue(u32::from_le_bytes(bytes))
    }

    /// Split a byte buffer into values. Trailing bytes that do not fill a
    /// whole value are ignored.
    pub fn vec_from_bytes(bytes: &[u8]) -> Vec<ScriptValue> {
        bytes
            .chunks_exact(Self::SIZE)
            .map(|c| ScriptValue::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    /// Flatten values into their raw little-endian bytes.
    pub fn slice_to_bytes(values: &[ScriptValue]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }
}

impl fmt::Debug for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScriptValue({:#010x})", self.0)
    }
}
