//! Security limits for decoding untrusted snapshots.
//!
//! Every allocation performed by the decoder is bounded by one of these
//! constants, so a hostile snapshot cannot force excessive memory use.

/// Maximum encoded length of a varint (enough for any u64).
pub const MAX_VARINT_BYTES: usize = 10;

/// Maximum number of tags in one snapshot.
///
/// Typical primitives carry tens of tags; this is far above anything a
/// legitimate editor produces.
pub const MAX_TAG_COUNT: usize = 4096;

/// Maximum byte length of a single tag key or value (UTF-8).
pub const MAX_TAG_BYTES: usize = 1024;

/// Maximum declared uncompressed size of a compressed snapshot container.
pub const MAX_SNAPSHOT_BYTES: usize = 16 * 1024 * 1024;
