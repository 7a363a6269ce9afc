//! Numeric identity and version state of a primitive.
//!
//! Fields are individually atomic so that concurrent readers never race with
//! the single logical writer; consistency *across* fields is the writer's
//! responsibility, exactly like the flag bits. Plain relaxed ordering is
//! sufficient here because no field publishes other memory.

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwapOption;

use crate::error::PrimitiveError;
use crate::model::user::User;

/// Identity as known to the backing server.
///
/// An id `<= 0` means the object has not been uploaded yet ("new"); the
/// version is only meaningful once the id is positive. The changeset id is
/// `0` until the object was uploaded in a changeset, and never positive while
/// the object is new.
#[derive(Debug)]
pub(crate) struct Metadata {
    id: AtomicI64,
    version: AtomicI32,
    changeset_id: AtomicI32,
    /// Seconds since the epoch, read back as unsigned. 0 = unset.
    timestamp: AtomicI32,
    user: ArcSwapOption<User>,
}

impl Metadata {
    pub(crate) fn new(id: i64) -> Self {
        Metadata {
            id: AtomicI64::new(id),
            version: AtomicI32::new(0),
            changeset_id: AtomicI32::new(0),
            timestamp: AtomicI32::new(0),
            user: ArcSwapOption::empty(),
        }
    }

    pub(crate) fn from_parts(
        id: i64,
        version: i32,
        changeset_id: i32,
        timestamp: i32,
        user: Option<Arc<User>>,
    ) -> Self {
        let meta = Metadata::new(id);
        meta.version.store(version, Ordering::Relaxed);
        meta.changeset_id.store(changeset_id, Ordering::Relaxed);
        meta.timestamp.store(timestamp, Ordering::Relaxed);
        meta.user.store(user);
        meta
    }

    /// The server id, clamped to zero for new objects.
    pub(crate) fn id(&self) -> i64 {
        self.unique_id().max(0)
    }

    /// The raw id: positive for uploaded objects, a process-unique negative
    /// value for new ones.
    pub(crate) fn unique_id(&self) -> i64 {
        self.id.load(Ordering::Relaxed)
    }

    pub(crate) fn is_new(&self) -> bool {
        self.unique_id() <= 0
    }

    pub(crate) fn version(&self) -> i32 {
        self.version.load(Ordering::Relaxed)
    }

    /// Assigns the server id and version after an upload or download.
    ///
    /// Fails without side effect if either value is not positive.
    pub(crate) fn set_osm_id(&self, id: i64, version: i32) -> Result<(), PrimitiveError> {
        if id <= 0 {
            return Err(PrimitiveError::IdNotPositive(id));
        }
        if version <= 0 {
            return Err(PrimitiveError::VersionNotPositive(version));
        }
        self.id.store(id, Ordering::Relaxed);
        self.version.store(version, Ordering::Relaxed);
        Ok(())
    }

    pub(crate) fn changeset_id(&self) -> i32 {
        self.changeset_id.load(Ordering::Relaxed)
    }

    /// Records the changeset the object was last uploaded in.
    ///
    /// A no-op when unchanged. Fails without side effect on a negative id, or
    /// on a positive id while the object is still new.
    pub(crate) fn set_changeset_id(&self, changeset_id: i32) -> Result<(), PrimitiveError> {
        if self.changeset_id() == changeset_id {
            return Ok(());
        }
        if changeset_id < 0 {
            return Err(PrimitiveError::ChangesetIdNegative(changeset_id));
        }
        if changeset_id > 0 && self.is_new() {
            return Err(PrimitiveError::ChangesetIdOnNew(changeset_id));
        }
        self.changeset_id.store(changeset_id, Ordering::Relaxed);
        Ok(())
    }

    pub(crate) fn raw_timestamp(&self) -> i32 {
        self.timestamp.load(Ordering::Relaxed)
    }

    pub(crate) fn set_raw_timestamp(&self, timestamp: i32) {
        self.timestamp.store(timestamp, Ordering::Relaxed);
    }

    pub(crate) fn is_timestamp_empty(&self) -> bool {
        self.raw_timestamp() == 0
    }

    pub(crate) fn instant(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.raw_timestamp() as u32 as u64)
    }

    pub(crate) fn set_instant(&self, instant: SystemTime) {
        let seconds = instant
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.set_raw_timestamp(seconds as i32);
    }

    pub(crate) fn user(&self) -> Option<Arc<User>> {
        self.user.load_full()
    }

    pub(crate) fn set_user(&self, user: Option<Arc<User>>) {
        self.user.store(user);
    }

    /// Copies identity from `other`.
    ///
    /// The version travels only with a positive id; a non-positive id resets
    /// version and changeset to zero. The changeset id is propagated only when
    /// both sides end up with a positive id: clones of objects with a negative
    /// id and an assigned changeset id have been observed in the wild, and
    /// for those the changeset id is deliberately not carried over.
    pub(crate) fn clone_from(&self, other: &Metadata) {
        let id = other.unique_id();
        self.id.store(id, Ordering::Relaxed);
        if id <= 0 {
            self.version.store(0, Ordering::Relaxed);
            self.changeset_id.store(0, Ordering::Relaxed);
        }
        self.timestamp.store(other.raw_timestamp(), Ordering::Relaxed);
        if id > 0 {
            self.version.store(other.version(), Ordering::Relaxed);
        }
        self.user.store(other.user());
        if id > 0 && other.changeset_id() > 0 {
            self.changeset_id.store(other.changeset_id(), Ordering::Relaxed);
        }
    }

    /// Resets to a fresh "new" state with the given generated id.
    pub(crate) fn reset(&self, new_id: i64) {
        self.id.store(new_id, Ordering::Relaxed);
        self.version.store(0, Ordering::Relaxed);
        self.changeset_id.store(0, Ordering::Relaxed);
        self.timestamp.store(0, Ordering::Relaxed);
        self.user.store(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_metadata() {
        let meta = Metadata::new(-1);
        assert!(meta.is_new());
        assert_eq!(meta.id(), 0);
        assert_eq!(meta.unique_id(), -1);
        assert_eq!(meta.version(), 0);
        assert!(meta.is_timestamp_empty());
    }

    #[test]
    fn test_set_osm_id() {
        let meta = Metadata::new(-1);
        meta.set_osm_id(42, 3).unwrap();
        assert_eq!(meta.id(), 42);
        assert_eq!(meta.unique_id(), 42);
        assert_eq!(meta.version(), 3);
        assert!(!meta.is_new());
    }

    #[test]
    fn test_set_osm_id_rejects_non_positive_values() {
        let meta = Metadata::new(-1);
        assert_eq!(meta.set_osm_id(0, 1), Err(PrimitiveError::IdNotPositive(0)));
        assert_eq!(meta.set_osm_id(1, 0), Err(PrimitiveError::VersionNotPositive(0)));
        // State unchanged after both failures.
        assert_eq!(meta.unique_id(), -1);
        assert_eq!(meta.version(), 0);
    }

    #[test]
    fn test_changeset_id_transitions() {
        let meta = Metadata::new(-1);
        // Unchanged value is a no-op even while new.
        meta.set_changeset_id(0).unwrap();
        assert_eq!(
            meta.set_changeset_id(-1),
            Err(PrimitiveError::ChangesetIdNegative(-1))
        );
        assert_eq!(
            meta.set_changeset_id(7),
            Err(PrimitiveError::ChangesetIdOnNew(7))
        );
        assert_eq!(meta.changeset_id(), 0);

        meta.set_osm_id(1, 1).unwrap();
        meta.set_changeset_id(7).unwrap();
        assert_eq!(meta.changeset_id(), 7);
    }

    #[test]
    fn test_timestamp_roundtrip() {
        let meta = Metadata::new(-1);
        let instant = UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        meta.set_instant(instant);
        assert_eq!(meta.instant(), instant);
        assert!(!meta.is_timestamp_empty());
        assert_eq!(meta.raw_timestamp(), 1_600_000_000);
    }

    #[test]
    fn test_clone_from_negative_id_resets_version_and_changeset() {
        let source = Metadata::from_parts(-5, 3, 7, 123, None);
        let target = Metadata::new(-1);
        target.clone_from(&source);
        assert_eq!(target.unique_id(), -5);
        assert_eq!(target.version(), 0);
        assert_eq!(target.changeset_id(), 0);
        assert_eq!(target.raw_timestamp(), 123);
    }

    #[test]
    fn test_clone_from_positive_id_propagates_changeset() {
        let source = Metadata::from_parts(42, 3, 7, 123, None);
        let target = Metadata::new(-1);
        target.clone_from(&source);
        assert_eq!(target.unique_id(), 42);
        assert_eq!(target.version(), 3);
        assert_eq!(target.changeset_id(), 7);
    }

    #[test]
    fn test_reset() {
        let meta = Metadata::from_parts(42, 3, 7, 123, Some(Arc::new(User::new(1, "a"))));
        meta.reset(-9);
        assert_eq!(meta.unique_id(), -9);
        assert_eq!(meta.version(), 0);
        assert_eq!(meta.changeset_id(), 0);
        assert!(meta.is_timestamp_empty());
        assert!(meta.user().is_none());
    }
}
