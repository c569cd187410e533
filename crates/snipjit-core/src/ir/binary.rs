//! Binary IR container
//!
//! Layout (little endian):
//!
//! | offset | size | field                          |
//! |--------|------|--------------------------------|
//! | 0      | 4    | magic `SJBC`                   |
//! | 4      | 2    | format version (1)             |
//! | 6      | 2    | flags (0)                      |
//! | 8      | 4    | payload length in bytes        |
//! | 12     | n    | zlib-compressed IR text        |

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use thiserror::Error;

use super::text::{from_text, to_text, IrTextError};
use super::IrModule;

pub const MAGIC: [u8; 4] = *b"SJBC";
pub const VERSION: u16 = 1;
const HEADER_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum IrBinaryError {
    #[error("IR container is truncated ({0} bytes)")]
    Truncated(usize),

    #[error("not an IR container (bad magic)")]
    BadMagic,

    #[error("unsupported IR container version {0}")]
    UnsupportedVersion(u16),

    #[error("unknown IR container flags {0:#06x}")]
    UnknownFlags(u16),

    #[error("payload length {declared} does not match {actual} bytes present")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("compression error: {0}")]
    Compression(#[from] std::io::Error),

    #[error(transparent)]
    Text(#[from] IrTextError),
}

/// Serialize a module into the binary container
pub fn to_binary(module: &IrModule) -> Result<Vec<u8>, IrBinaryError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(to_text(module).as_bytes())?;
    let payload = encoder.finish()?;

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Parse a binary container produced by [`to_binary`]
pub fn from_binary(bytes: &[u8]) -> Result<IrModule, IrBinaryError> {
    if bytes.len() < HEADER_LEN {
        return Err(IrBinaryError::Truncated(bytes.len()));
    }
    if bytes[..4] != MAGIC {
        return Err(IrBinaryError::BadMagic);
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != VERSION {
        return Err(IrBinaryError::UnsupportedVersion(version));
    }
    let flags = u16::from_le_bytes([bytes[6], bytes[7]]);
    if flags != 0 {
        return Err(IrBinaryError::UnknownFlags(flags));
    }
    let declared = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    let payload = &bytes[HEADER_LEN..];
    if payload.len() != declared {
        return Err(IrBinaryError::LengthMismatch {
            declared,
            actual: payload.len(),
        });
    }

    let mut text = Vec::new();
    ZlibDecoder::new(payload).read_to_end(&mut text)?;
    Ok(from_text(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::DeclLinkage;
    use cranelift_codegen::ir::Signature;
    use cranelift_codegen::isa::CallConv;

    fn module() -> IrModule {
        let mut module = IrModule::new("bin", "aarch64-unknown-linux-gnu");
        module.declare(
            "unused",
            DeclLinkage::Export,
            Signature::new(CallConv::SystemV),
        );
        module
    }

    #[test]
    fn header_layout() {
        let bytes = to_binary(&module()).unwrap();
        assert_eq!(&bytes[..4], b"SJBC");
        assert_eq!(u16::from_le_bytes([bytes[4], bytes[5]]), 1);
        assert_eq!(u16::from_le_bytes([bytes[6], bytes[7]]), 0);
        let len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        assert_eq!(len, bytes.len() - 12);
    }

    #[test]
    fn rejects_damaged_containers() {
        let bytes = to_binary(&module()).unwrap();
        assert!(matches!(from_binary(&bytes[..5]), Err(IrBinaryError::Truncated(5))));

        let mut bad = bytes.clone();
        bad[0] = b'X';
        assert!(matches!(from_binary(&bad), Err(IrBinaryError::BadMagic)));

        let mut bad = bytes.clone();
        bad[4] = 9;
        assert!(matches!(
            from_binary(&bad),
            Err(IrBinaryError::UnsupportedVersion(9))
        ));

        let mut bad = bytes.clone();
        bad[6] = 1;
        assert!(matches!(from_binary(&bad), Err(IrBinaryError::UnknownFlags(1))));

        let short = &bytes[..bytes.len() - 1];
        assert!(matches!(
            from_binary(short),
            Err(IrBinaryError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn payload_is_ir_text() {
        let bytes = to_binary(&module()).unwrap();
        let mut text = String::new();
        ZlibDecoder::new(&bytes[12..])
            .read_to_string(&mut text)
            .unwrap();
        assert!(text.starts_with(crate::ir::text::HEADER));
        assert!(text.contains("; declare 0 export \"unused\""));
    }
}
