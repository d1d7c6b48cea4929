//! Binary container formats.
//!
//! Every container starts with the same little-endian header:
//!
//! ```text
//! magic, codeLength, staticsCount, globalsCount, argsCount, globalsSignature
//! ```
//!
//! Version 0x11 Payne containers add one more `u32` after the header. Payne
//! containers then always carry a `compressedSize` field (zero when the
//! payload is not compressed); GTA IV containers only carry it in the
//! compressed format.
//!
//! The payload is one of:
//!
//! - plain: `code ++ statics ++ globals`
//! - encrypted: `enc(code) ++ enc(statics) ++ enc(globals)`, each segment
//!   encrypted on its own
//! - compressed: `compressedSize ++ enc(zlib(code ++ statics ++ globals))`

use std::fmt;
use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use sctools_core::{FormatError, KeyError, ScriptValue};
use tracing::{debug, trace};

use crate::compression;
use crate::crypto::{self, AesKey};
use crate::keys::KeyTarget;

/// Game family a container is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Gta4,
    Payne,
}

impl Target {
    /// The key needed to read and write this target's encrypted formats.
    pub fn key_target(self) -> KeyTarget {
        match self {
            Target::Gta4 => KeyTarget::Gta4Pc,
            Target::Payne => KeyTarget::Mp3Pc,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Gta4 => f.write_str("GTA IV"),
            Target::Payne => f.write_str("Max Payne 3"),
        }
    }
}

/// Leading `u32` of a container; selects the format variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum Magic {
    /// `SCR\x0D`
    Gta4Plain = 0x0D52_4353,
    /// `scr\x0E`
    Gta4Encrypted = 0x0E72_6373,
    /// `Scr\x0E`
    Gta4Compressed = 0x0E72_6353,
    /// `scr\x10`
    PayneV10Encrypted = 0x1072_6373,
    /// `Scr\x10`
    PayneV10Compressed = 0x1072_6353,
    /// `scr\x11`
    PayneV11Encrypted = 0x1172_6373,
    /// `Scr\x11`
    PayneV11Compressed = 0x1172_6353,
}

impl Magic {
    pub fn target(self) -> Target {
        match self {
            Magic::Gta4Plain | Magic::Gta4Encrypted | Magic::Gta4Compressed => Target::Gta4,
            _ => Target::Payne,
        }
    }

    pub fn is_encrypted(self) -> bool {
        self != Magic::Gta4Plain
    }

    pub fn is_compressed(self) -> bool {
        matches!(
            self,
            Magic::Gta4Compressed | Magic::PayneV10Compressed | Magic::PayneV11Compressed
        )
    }

    /// Whether the header carries the extra version 0x11 field.
    pub fn has_version_extra(self) -> bool {
        matches!(self, Magic::PayneV11Encrypted | Magic::PayneV11Compressed)
    }

    fn has_compressed_size(self) -> bool {
        self.target() == Target::Payne || self.is_compressed()
    }

    /// Parse a magic value, accepting only the formats of `target`.
    pub fn for_target(value: u32, target: Target) -> Result<Magic, FormatError> {
        match Magic::try_from(value) {
            Ok(magic) if magic.target() == target => Ok(magic),
            _ => Err(FormatError::UnrecognizedMagic { magic: value }),
        }
    }
}

/// Value of the version 0x11 extra field when the format lacks it.
pub const DEFAULT_VERSION_EXTRA: u32 = 0xFFFF_FFFF;

/// A compiled script image.
///
/// Counts and lengths are not stored; [`encode`] derives them from the
/// segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub magic: Magic,
    pub code: Vec<u8>,
    pub statics: Vec<ScriptValue>,
    pub globals: Vec<ScriptValue>,
    /// Trailing static slots that hold script arguments.
    pub args_count: u32,
    pub globals_signature: u32,
    pub version_extra: u32,
}

impl Container {
    pub fn new(magic: Magic) -> Self {
        Self {
            magic,
            code: Vec::new(),
            statics: Vec::new(),
            globals: Vec::new(),
            args_count: 0,
            globals_signature: 0,
            version_extra: DEFAULT_VERSION_EXTRA,
        }
    }

    pub fn target(&self) -> Target {
        self.magic.target()
    }
}

struct Header {
    magic: Magic,
    code_length: usize,
    statics_count: usize,
    globals_count: usize,
    args_count: u32,
    globals_signature: u32,
    version_extra: u32,
}

impl Header {
    fn read(r: &mut Cursor<&[u8]>, target: Target) -> Result<Self, FormatError> {
        let magic = Magic::for_target(r.read_u32::<LittleEndian>()?, target)?;
        let code_length = r.read_u32::<LittleEndian>()? as usize;
        let statics_count = r.read_u32::<LittleEndian>()? as usize;
        let globals_count = r.read_u32::<LittleEndian>()? as usize;
        let args_count = r.read_u32::<LittleEndian>()?;
        let globals_signature = r.read_u32::<LittleEndian>()?;
        let version_extra = if magic.has_version_extra() {
            r.read_u32::<LittleEndian>()?
        } else {
            DEFAULT_VERSION_EXTRA
        };

        Ok(Self {
            magic,
            code_length,
            statics_count,
            globals_count,
            args_count,
            globals_signature,
            version_extra,
        })
    }

    fn payload_length(&self) -> Result<usize, FormatError> {
        self.statics_count
            .checked_add(self.globals_count)
            .and_then(|n| n.checked_mul(4))
            .and_then(|n| n.checked_add(self.code_length))
            .ok_or_else(|| FormatError::Truncated {
                context: "segment counts overflow".to_string(),
            })
    }
}

/// Decode a container of `target`.
///
/// `key` is required by every encrypted format.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn decode(
    bytes: &[u8],
    target: Target,
    key: Option<&AesKey>,
) -> sctools_core::Result<Container> {
    let mut r = Cursor::new(bytes);
    let header = Header::read(&mut r, target)?;
    let magic = header.magic;
    debug!(
        magic = ?magic,
        code_length = header.code_length,
        statics = header.statics_count,
        globals = header.globals_count,
        "decoding container"
    );

    let key = required_key(magic, key)?;

    let compressed_size = if magic.has_compressed_size() {
        Some(r.read_u32::<LittleEndian>().map_err(FormatError::from)? as usize)
    } else {
        None
    };

    let (code, statics, globals) = match (magic.is_compressed(), key) {
        (true, Some(key)) => {
            let size = compressed_size.unwrap_or_default();
            let mut blob = read_segment(&mut r, size, "compressed payload")?;
            crypto::decrypt(&mut blob, key);
            let payload = compression::decompress(&blob, header.payload_length()?)?;

            let (code, data) = payload.split_at(header.code_length);
            let (statics, globals) = data.split_at(header.statics_count * 4);
            (
                code.to_vec(),
                ScriptValue::vec_from_bytes(statics),
                ScriptValue::vec_from_bytes(globals),
            )
        }
        (_, key) => {
            header.payload_length()?;
            let mut code = read_segment(&mut r, header.code_length, "code")?;
            let mut statics = read_segment(&mut r, header.statics_count * 4, "statics")?;
            let mut globals = read_segment(&mut r, header.globals_count * 4, "globals")?;
            if let Some(key) = key {
                crypto::decrypt(&mut code, key);
                crypto::decrypt(&mut statics, key);
                crypto::decrypt(&mut globals, key);
            }
            (
                code,
                ScriptValue::vec_from_bytes(&statics),
                ScriptValue::vec_from_bytes(&globals),
            )
        }
    };

    let trailing = bytes.len() as u64 - r.position();
    if trailing != 0 {
        trace!(trailing, "ignoring bytes after container payload");
    }

    Ok(Container {
        magic,
        code,
        statics,
        globals,
        args_count: header.args_count,
        globals_signature: header.globals_signature,
        version_extra: header.version_extra,
    })
}

fn read_segment(
    r: &mut Cursor<&[u8]>,
    len: usize,
    what: &'static str,
) -> Result<Vec<u8>, FormatError> {
    let remaining = r.get_ref().len() as u64 - r.position();
    if (len as u64) > remaining {
        return Err(FormatError::Truncated {
            context: format!("{what} needs {len} bytes, {remaining} left"),
        });
    }
    let mut buf = vec![0; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Encode a container.
///
/// Lengths and counts are taken from the segments themselves.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn encode(container: &Container, key: Option<&AesKey>) -> sctools_core::Result<Vec<u8>> {
    let key = required_key(container.magic, key)?;
    Ok(write_container(container, key)?)
}

/// The key an encrypted format needs; plain formats never use one.
fn required_key(magic: Magic, key: Option<&AesKey>) -> Result<Option<&AesKey>, KeyError> {
    match (magic.is_encrypted(), key) {
        (false, _) => Ok(None),
        (true, Some(key)) => Ok(Some(key)),
        (true, None) => Err(KeyError::Missing {
            target: magic.target().key_target().to_string(),
        }),
    }
}

fn write_container(container: &Container, key: Option<&AesKey>) -> Result<Vec<u8>, FormatError> {
    let magic = container.magic;
    let code_length = segment_length(container.code.len(), "code")?;
    let statics_count = segment_length(container.statics.len(), "statics")?;
    let globals_count = segment_length(container.globals.len(), "globals")?;
    debug!(
        magic = ?magic,
        code_length, statics_count, globals_count, "encoding container"
    );

    let mut out = Vec::with_capacity(32 + container.code.len());
    out.write_u32::<LittleEndian>(magic.into())?;
    out.write_u32::<LittleEndian>(code_length)?;
    out.write_u32::<LittleEndian>(statics_count)?;
    out.write_u32::<LittleEndian>(globals_count)?;
    out.write_u32::<LittleEndian>(container.args_count)?;
    out.write_u32::<LittleEndian>(container.globals_signature)?;
    if magic.has_version_extra() {
        out.write_u32::<LittleEndian>(container.version_extra)?;
    }

    let statics = ScriptValue::slice_to_bytes(&container.statics);
    let globals = ScriptValue::slice_to_bytes(&container.globals);

    match (magic.is_compressed(), key) {
        (true, Some(key)) => {
            let mut payload =
                Vec::with_capacity(container.code.len() + statics.len() + globals.len());
            payload.extend_from_slice(&container.code);
            payload.extend_from_slice(&statics);
            payload.extend_from_slice(&globals);

            let mut blob = compression::compress(&payload)?;
            crypto::encrypt(&mut blob, key);
            out.write_u32::<LittleEndian>(segment_length(blob.len(), "compressed payload")?)?;
            out.extend_from_slice(&blob);
        }
        (_, key) => {
            if magic.has_compressed_size() {
                out.write_u32::<LittleEndian>(0)?;
            }
            for mut segment in [container.code.clone(), statics, globals] {
                if let Some(key) = key {
                    crypto::encrypt(&mut segment, key);
                }
                out.extend_from_slice(&segment);
            }
        }
    }

    Ok(out)
}

fn segment_length(len: usize, what: &'static str) -> Result<u32, FormatError> {
    u32::try_from(len).map_err(|_| FormatError::LengthMismatch {
        what,
        expected: u32::MAX as usize,
        actual: len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sctools_core::ScToolsError;

    const KEY: AesKey = [0x5A; 32];

    fn sample(magic: Magic) -> Container {
        Container {
            magic,
            code: (0..10u8).collect(),
            statics: vec![ScriptValue::from_i32(-1), ScriptValue::from_f32(1.5)],
            globals: vec![],
            args_count: 1,
            globals_signature: 0x1234_5678,
            version_extra: DEFAULT_VERSION_EXTRA,
        }
    }

    const ALL: [Magic; 7] = [
        Magic::Gta4Plain,
        Magic::Gta4Encrypted,
        Magic::Gta4Compressed,
        Magic::PayneV10Encrypted,
        Magic::PayneV10Compressed,
        Magic::PayneV11Encrypted,
        Magic::PayneV11Compressed,
    ];

    #[test]
    fn every_format_roundtrips() {
        for magic in ALL {
            let mut container = sample(magic);
            if magic.has_version_extra() {
                container.version_extra = 7;
            }
            let bytes = encode(&container, Some(&KEY)).unwrap();
            let decoded = decode(&bytes, magic.target(), Some(&KEY)).unwrap();
            assert_eq!(decoded, container, "{magic:?}");
        }
    }

    #[test]
    fn encrypted_segments_are_encrypted_separately() {
        let container = sample(Magic::Gta4Encrypted);
        let bytes = encode(&container, Some(&KEY)).unwrap();

        // header(24) + code(10) + statics(8) + globals(0)
        assert_eq!(bytes.len(), 42);
        // Segments shorter than a block are stored as-is.
        assert_eq!(&bytes[24..34], &container.code[..]);
        assert_eq!(
            &bytes[34..42],
            &ScriptValue::slice_to_bytes(&container.statics)[..]
        );
    }

    #[test]
    fn header_layout() {
        let bytes = encode(&sample(Magic::PayneV11Encrypted), Some(&KEY)).unwrap();
        let words: Vec<u32> = bytes[..32]
            .chunks_exact(4)
            .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
            .collect();
        assert_eq!(
            words,
            [0x1172_6373, 10, 2, 0, 1, 0x1234_5678, 0xFFFF_FFFF, 0]
        );

        let plain = encode(&sample(Magic::Gta4Plain), None).unwrap();
        assert_eq!(&plain[..4], b"SCR\x0D");
        assert_eq!(plain.len(), 24 + 10 + 8);
    }

    #[test]
    fn version_extra_defaults_when_absent() {
        let mut container = sample(Magic::PayneV10Encrypted);
        container.version_extra = 99;
        let bytes = encode(&container, Some(&KEY)).unwrap();
        let decoded = decode(&bytes, Target::Payne, Some(&KEY)).unwrap();
        assert_eq!(decoded.version_extra, DEFAULT_VERSION_EXTRA);
    }

    #[test]
    fn counts_come_from_segments() {
        let mut container = sample(Magic::Gta4Plain);
        container.globals = vec![ScriptValue::from_u32(3); 5];
        let bytes = encode(&container, None).unwrap();
        assert_eq!(u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]), 5);
    }

    #[test]
    fn empty_segments() {
        for magic in ALL {
            let container = Container::new(magic);
            let bytes = encode(&container, Some(&KEY)).unwrap();
            assert_eq!(decode(&bytes, magic.target(), Some(&KEY)).unwrap(), container);
        }
    }

    #[test]
    fn unknown_magic() {
        let mut bytes = encode(&sample(Magic::Gta4Plain), None).unwrap();
        bytes[..4].copy_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        let err = decode(&bytes, Target::Gta4, None).unwrap_err();
        assert_eq!(
            err,
            ScToolsError::Format(FormatError::UnrecognizedMagic { magic: 0xDEAD_BEEF })
        );
    }

    #[test]
    fn magic_of_other_target_is_rejected() {
        let bytes = encode(&sample(Magic::PayneV10Encrypted), Some(&KEY)).unwrap();
        let err = decode(&bytes, Target::Gta4, Some(&KEY)).unwrap_err();
        assert!(matches!(
            err,
            ScToolsError::Format(FormatError::UnrecognizedMagic { magic: 0x1072_6373 })
        ));
    }

    #[test]
    fn truncated_payload() {
        let bytes = encode(&sample(Magic::Gta4Encrypted), Some(&KEY)).unwrap();
        let err = decode(&bytes[..bytes.len() - 3], Target::Gta4, Some(&KEY)).unwrap_err();
        assert!(matches!(err, ScToolsError::Format(FormatError::Truncated { .. })));

        let err = decode(&bytes[..10], Target::Gta4, Some(&KEY)).unwrap_err();
        assert!(matches!(err, ScToolsError::Format(FormatError::Truncated { .. })));
    }

    #[test]
    fn compressed_count_mismatch() {
        let mut bytes = encode(&sample(Magic::Gta4Compressed), Some(&KEY)).unwrap();
        // Claim one more static than the payload holds.
        bytes[8..12].copy_from_slice(&3u32.to_le_bytes());
        let err = decode(&bytes, Target::Gta4, Some(&KEY)).unwrap_err();
        assert!(matches!(
            err,
            ScToolsError::Format(FormatError::LengthMismatch { expected: 22, actual: 18, .. })
        ));
    }

    #[test]
    fn compressed_payload_longer_than_declared() {
        let mut bytes = encode(&sample(Magic::Gta4Compressed), Some(&KEY)).unwrap();
        // Claim one static fewer; inflation stops one byte past the claim.
        bytes[8..12].copy_from_slice(&1u32.to_le_bytes());
        let err = decode(&bytes, Target::Gta4, Some(&KEY)).unwrap_err();
        assert!(matches!(
            err,
            ScToolsError::Format(FormatError::LengthMismatch { expected: 14, actual: 15, .. })
        ));
    }

    #[test]
    fn encrypted_formats_need_a_key() {
        let container = sample(Magic::PayneV11Compressed);
        let err = encode(&container, None).unwrap_err();
        assert!(matches!(err, ScToolsError::Key(KeyError::Missing { .. })));

        let bytes = encode(&container, Some(&KEY)).unwrap();
        let err = decode(&bytes, Target::Payne, None).unwrap_err();
        assert!(matches!(err, ScToolsError::Key(KeyError::Missing { .. })));
    }

    #[test]
    fn wrong_key_does_not_inflate() {
        let bytes = encode(&sample(Magic::Gta4Compressed), Some(&KEY)).unwrap();
        let err = decode(&bytes, Target::Gta4, Some(&[0x11; 32])).unwrap_err();
        assert!(matches!(err, ScToolsError::Format(_)));
    }
}
