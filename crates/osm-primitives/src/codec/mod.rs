//! Binary snapshot codec for persisted primitive state.
//!
//! A snapshot serializes the common state of one primitive in a fixed field
//! order: id, user id, version, changeset id, timestamp, tags, flags. The
//! container is a 4-byte magic (`OSMP` raw, `OSMZ` zstd-compressed) followed
//! by a format version byte; the compressed form additionally declares its
//! uncompressed size and is verified against it after decompression.
//!
//! The decoder treats input as untrusted: every length is bounded by
//! [`crate::limits`] and structurally invalid payloads (empty or duplicate
//! keys, trailing bytes) are rejected.

mod primitives;

use log::debug;
use rustc_hash::FxHashSet;

use crate::error::{DecodeError, EncodeError};
use crate::limits::{MAX_SNAPSHOT_BYTES, MAX_TAG_BYTES, MAX_TAG_COUNT};
use primitives::{Reader, Writer};

/// Magic bytes of an uncompressed snapshot.
pub const MAGIC: [u8; 4] = *b"OSMP";

/// Magic bytes of a zstd-compressed snapshot.
pub const MAGIC_COMPRESSED: [u8; 4] = *b"OSMZ";

/// Snapshot format version written by this crate.
pub const FORMAT_VERSION: u8 = 1;

/// Decoded persisted state of one primitive.
///
/// The user is carried as a numeric id and resolved through a
/// [`crate::model::UserRegistry`] when the snapshot is applied; flag bits are
/// crate-internal and not exposed raw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimitiveSnapshot {
    pub id: i64,
    pub user_id: Option<i64>,
    pub version: i32,
    pub changeset_id: i32,
    pub timestamp: i32,
    pub tags: Vec<(String, String)>,
    pub(crate) flags: u16,
}

fn encode_fields(snapshot: &PrimitiveSnapshot, writer: &mut Writer) -> Result<(), EncodeError> {
    writer.write_signed(snapshot.id);
    writer.write_signed(snapshot.user_id.unwrap_or(-1));
    writer.write_varint(snapshot.version as u32 as u64);
    writer.write_varint(snapshot.changeset_id as u32 as u64);
    writer.write_varint(snapshot.timestamp as u32 as u64);

    if snapshot.tags.len() > MAX_TAG_COUNT {
        return Err(EncodeError::LengthExceedsLimit {
            field: "tags",
            len: snapshot.tags.len(),
            max: MAX_TAG_COUNT,
        });
    }
    writer.write_varint(snapshot.tags.len() as u64);
    for (key, value) in &snapshot.tags {
        if key.len() > MAX_TAG_BYTES {
            return Err(EncodeError::LengthExceedsLimit {
                field: "tag key",
                len: key.len(),
                max: MAX_TAG_BYTES,
            });
        }
        if value.len() > MAX_TAG_BYTES {
            return Err(EncodeError::LengthExceedsLimit {
                field: "tag value",
                len: value.len(),
                max: MAX_TAG_BYTES,
            });
        }
        writer.write_string(key);
        writer.write_string(value);
    }

    writer.write_u16(snapshot.flags);
    Ok(())
}

fn read_u32_field(reader: &mut Reader<'_>, field: &'static str) -> Result<u32, DecodeError> {
    let value = reader.read_varint(field)?;
    u32::try_from(value).map_err(|_| DecodeError::ValueOutOfRange { field })
}

fn decode_fields(reader: &mut Reader<'_>) -> Result<PrimitiveSnapshot, DecodeError> {
    let id = reader.read_signed("id")?;
    let raw_user_id = reader.read_signed("user id")?;
    let user_id = (raw_user_id >= 0).then_some(raw_user_id);
    let version = read_u32_field(reader, "version")? as i32;
    let changeset_id = read_u32_field(reader, "changeset id")? as i32;
    let timestamp = read_u32_field(reader, "timestamp")? as i32;

    let tag_count = reader.read_varint("tag count")? as usize;
    if tag_count > MAX_TAG_COUNT {
        return Err(DecodeError::LengthExceedsLimit {
            field: "tags",
            len: tag_count,
            max: MAX_TAG_COUNT,
        });
    }
    let mut tags = Vec::with_capacity(tag_count);
    let mut seen = FxHashSet::default();
    for _ in 0..tag_count {
        let key = reader.read_string(MAX_TAG_BYTES, "tag key")?;
        let value = reader.read_string(MAX_TAG_BYTES, "tag value")?;
        if key.trim().is_empty() {
            return Err(DecodeError::EmptyKey);
        }
        if !seen.insert(key.clone()) {
            return Err(DecodeError::DuplicateKey { key });
        }
        tags.push((key, value));
    }

    let flags = reader.read_u16("flags")?;
    if !reader.is_empty() {
        return Err(DecodeError::TrailingBytes { remaining: reader.remaining_len() });
    }
    Ok(PrimitiveSnapshot { id, user_id, version, changeset_id, timestamp, tags, flags })
}

/// Encodes a snapshot into the uncompressed container.
pub fn encode_snapshot(snapshot: &PrimitiveSnapshot) -> Result<Vec<u8>, EncodeError> {
    let mut writer = Writer::new();
    writer.write_bytes(&MAGIC);
    writer.write_byte(FORMAT_VERSION);
    encode_fields(snapshot, &mut writer)?;
    Ok(writer.into_bytes())
}

/// Encodes a snapshot into the zstd-compressed container.
pub fn encode_snapshot_compressed(
    snapshot: &PrimitiveSnapshot,
    level: i32,
) -> Result<Vec<u8>, EncodeError> {
    let mut payload = Writer::new();
    encode_fields(snapshot, &mut payload)?;
    let payload = payload.into_bytes();
    let compressed = zstd::bulk::compress(&payload, level)
        .map_err(|e| EncodeError::CompressionFailed(e.to_string()))?;

    let mut writer = Writer::new();
    writer.write_bytes(&MAGIC_COMPRESSED);
    writer.write_byte(FORMAT_VERSION);
    writer.write_varint(payload.len() as u64);
    writer.write_bytes(&compressed);
    Ok(writer.into_bytes())
}

/// Decodes a snapshot from either container format, detected by magic.
pub fn decode_snapshot(data: &[u8]) -> Result<PrimitiveSnapshot, DecodeError> {
    let mut reader = Reader::new(data);
    let magic = reader.read_magic()?;
    if magic != MAGIC && magic != MAGIC_COMPRESSED {
        return Err(DecodeError::InvalidMagic { found: magic });
    }
    let version = reader.read_byte("format version")?;
    if version != FORMAT_VERSION {
        return Err(DecodeError::UnsupportedVersion { version });
    }

    if magic == MAGIC {
        return decode_fields(&mut reader);
    }

    let declared = reader.read_varint("uncompressed size")? as usize;
    if declared > MAX_SNAPSHOT_BYTES {
        return Err(DecodeError::LengthExceedsLimit {
            field: "uncompressed size",
            len: declared,
            max: MAX_SNAPSHOT_BYTES,
        });
    }
    let payload = zstd::bulk::decompress(reader.remaining(), declared)
        .map_err(|e| DecodeError::DecompressionFailed(e.to_string()))?;
    if payload.len() != declared {
        return Err(DecodeError::UncompressedSizeMismatch {
            declared,
            actual: payload.len(),
        });
    }
    debug!("decompressed snapshot payload: {} bytes", payload.len());
    decode_fields(&mut Reader::new(&payload))
}
