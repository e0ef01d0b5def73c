use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use memmap2::Mmap;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::input::InputError;
use crate::input::hash::hash_bytes;
use crate::model::ModelError;
use crate::model::candidate::Candidate;
use crate::model::matrix::ExpressionMatrix;
use crate::model::structure::StructureCheckResult;

pub const BLOB_EXTENSION: &str = "ktq";

const BLOB_MAGIC: &[u8; 4] = b"KTRJ";
const BLOB_VERSION: u16 = 1;
const HEADER_BYTES: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobKind {
    ExpressionMatrix,
    Candidate,
    StructureCheck,
}

impl BlobKind {
    fn tag(self) -> u16 {
        match self {
            BlobKind::ExpressionMatrix => 1,
            BlobKind::Candidate => 2,
            BlobKind::StructureCheck => 3,
        }
    }

    fn from_tag(tag: u16) -> Option<Self> {
        match tag {
            1 => Some(BlobKind::ExpressionMatrix),
            2 => Some(BlobKind::Candidate),
            3 => Some(BlobKind::StructureCheck),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BlobKind::ExpressionMatrix => "expression matrix",
            BlobKind::Candidate => "candidate",
            BlobKind::StructureCheck => "structure check",
        }
    }
}

/// Types that can travel in a blob; `check` runs after decoding.
pub trait BlobPayload: Serialize + DeserializeOwned {
    const KIND: BlobKind;

    fn check(&self) -> Result<(), ModelError>;
}

impl BlobPayload for ExpressionMatrix {
    const KIND: BlobKind = BlobKind::ExpressionMatrix;

    fn check(&self) -> Result<(), ModelError> {
        self.validate()
    }
}

impl BlobPayload for Candidate {
    const KIND: BlobKind = BlobKind::Candidate;

    fn check(&self) -> Result<(), ModelError> {
        self.validate()
    }
}

impl BlobPayload for StructureCheckResult {
    const KIND: BlobKind = BlobKind::StructureCheck;

    fn check(&self) -> Result<(), ModelError> {
        self.validate()
    }
}

pub fn encode_blob<T: BlobPayload>(value: &T) -> Result<Vec<u8>, InputError> {
    let payload = bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| InputError::Blob(format!("encode {}: {e}", T::KIND.name())))?;

    let mut bytes = Vec::with_capacity(HEADER_BYTES + payload.len());
    bytes.extend_from_slice(BLOB_MAGIC);
    bytes.extend_from_slice(&BLOB_VERSION.to_le_bytes());
    bytes.extend_from_slice(&T::KIND.tag().to_le_bytes());
    bytes.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&hash_bytes(&payload).to_le_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

pub fn decode_blob<T: BlobPayload>(bytes: &[u8]) -> Result<T, InputError> {
    let kind = parse_header(bytes)?;
    if kind != T::KIND {
        return Err(InputError::Blob(format!(
            "expected a {} blob, found a {} blob",
            T::KIND.name(),
            kind.name()
        )));
    }
    let payload = &bytes[HEADER_BYTES..];
    let (value, consumed): (T, usize) =
        bincode::serde::decode_from_slice(payload, bincode::config::standard())
            .map_err(|e| InputError::Blob(format!("decode {}: {e}", T::KIND.name())))?;
    if consumed != payload.len() {
        return Err(InputError::Blob(format!(
            "trailing bytes after payload: {}",
            payload.len() - consumed
        )));
    }
    value.check().map_err(|source| InputError::Model {
        context: format!("{} blob", T::KIND.name()),
        source,
    })?;
    Ok(value)
}

pub fn write_blob<T: BlobPayload>(path: &Path, value: &T) -> Result<(), InputError> {
    let bytes = encode_blob(value)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

pub fn read_blob<T: BlobPayload>(path: &Path) -> Result<T, InputError> {
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };
    decode_blob(&mmap[..]).map_err(|e| match e {
        InputError::Blob(msg) => InputError::Blob(format!("{}: {msg}", path.display())),
        other => other,
    })
}

fn parse_header(bytes: &[u8]) -> Result<BlobKind, InputError> {
    if bytes.len() < HEADER_BYTES {
        return Err(InputError::Blob("blob too small for header".to_string()));
    }
    if &bytes[0..4] != BLOB_MAGIC {
        return Err(InputError::Blob("invalid magic; expected KTRJ".to_string()));
    }
    let version = read_u16(bytes, 4)?;
    if version != BLOB_VERSION {
        return Err(InputError::Blob(format!("unsupported version: {version}")));
    }
    let tag = read_u16(bytes, 6)?;
    let kind = BlobKind::from_tag(tag)
        .ok_or_else(|| InputError::Blob(format!("unknown payload kind: {tag}")))?;
    let payload_len = read_u64(bytes, 8)? as usize;
    if payload_len != bytes.len() - HEADER_BYTES {
        return Err(InputError::Blob(format!(
            "payload length {} does not match file ({} bytes after header)",
            payload_len,
            bytes.len() - HEADER_BYTES
        )));
    }
    if read_u64(bytes, 16)? != hash_bytes(&bytes[HEADER_BYTES..]) {
        return Err(InputError::Blob("payload checksum mismatch".to_string()));
    }
    Ok(kind)
}

fn read_u16(bytes: &[u8], offset: usize) -> Result<u16, InputError> {
    let raw = bytes[offset..offset + 2]
        .as_array()
        .ok_or_else(|| InputError::Blob("truncated header".to_string()))?;
    Ok(u16::from_le_bytes(*raw))
}

fn read_u64(bytes: &[u8], offset: usize) -> Result<u64, InputError> {
    let raw = bytes[offset..offset + 8]
        .as_array()
        .ok_or_else(|| InputError::Blob("truncated header".to_string()))?;
    Ok(u64::from_le_bytes(*raw))
}

#[cfg(test)]
#[path = "../../tests/src_inline/input/blob.rs"]
mod tests;
