//! The primitive aggregate and its injected capabilities.
//!
//! A [`Primitive`] composes identity metadata, packed state flags and
//! copy-on-write tag storage ([`TagStore`]) behind one public contract. What differs per concrete entity kind (node, way, relation) is
//! injected at construction instead of inherited: an [`IdGenerator`] hands
//! out ids for new objects, and a [`TagChangeHook`] is notified after every
//! tag mutation so the owning kind can recompute derived flags.
//!
//! One primitive may be read by arbitrarily many threads while a single
//! logical writer mutates it. All mutators take `&self`; writer serialization
//! is the caller's responsibility, as documented on [`TagStore`].

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::SystemTime;

use rustc_hash::FxHashSet;

use crate::classify;
use crate::codec::PrimitiveSnapshot;
use crate::error::PrimitiveError;
use crate::model::flags::Flags;
use crate::model::meta::Metadata;
use crate::model::tags::{Keys, TagMap, TagStore};
use crate::model::user::{User, UserRegistry};

/// Source of ids for objects the server does not know yet.
pub trait IdGenerator: Send + Sync {
    /// Hands out a process-unique id `<= 0`, so new objects never collide
    /// with server-assigned positive ids.
    fn generate_unique_id(&self) -> i64;
}

/// Monotonically decreasing negative id source.
#[derive(Debug, Default)]
pub struct UniqueIdGenerator {
    counter: AtomicI64,
}

impl UniqueIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently handed-out id, 0 if none yet.
    pub fn current_unique_id(&self) -> i64 {
        self.counter.load(Ordering::SeqCst)
    }
}

impl IdGenerator for UniqueIdGenerator {
    fn generate_unique_id(&self) -> i64 {
        self.counter.fetch_sub(1, Ordering::SeqCst) - 1
    }
}

/// Notification hook for tag changes.
///
/// Called after every tag mutation (never for flag mutation) with the
/// pre-mutation tag map, so implementations can diff against the current
/// state and recompute derived flags such as TAGGED or ANNOTATED. Supplied
/// per concrete entity kind.
pub trait TagChangeHook: Send + Sync {
    fn tags_changed(&self, primitive: &Primitive, original: &TagMap);
}

/// Standard hook: recomputes TAGGED and ANNOTATED from the current tags via
/// the process-wide classifier.
#[derive(Debug, Default)]
pub struct DerivedFlagsHook;

impl TagChangeHook for DerivedFlagsHook {
    fn tags_changed(&self, primitive: &Primitive, _original: &TagMap) {
        let classifier = classify::classifier();
        let mut tagged = false;
        let mut annotated = false;
        primitive.visit_keys(|key, _| {
            tagged |= !classifier.is_uninteresting_key(key);
            annotated |= classifier.is_work_in_progress_key(key);
        });
        primitive.set_tagged(tagged);
        primitive.set_annotated(annotated);
    }
}

/// Common state of a map-editable entity.
pub struct Primitive {
    meta: Metadata,
    flags: Flags,
    tags: TagStore,
    id_generator: Arc<dyn IdGenerator>,
    tag_hook: Arc<dyn TagChangeHook>,
}

impl Primitive {
    /// Creates a fresh, new primitive: generated id `<= 0`, visible, no tags.
    pub fn new(id_generator: Arc<dyn IdGenerator>, tag_hook: Arc<dyn TagChangeHook>) -> Self {
        let id = id_generator.generate_unique_id();
        Primitive {
            meta: Metadata::new(id),
            flags: Flags::new(),
            tags: TagStore::new(),
            id_generator,
            tag_hook,
        }
    }

    /// Creates a primitive for an object already known to the server.
    pub fn with_osm_id(
        id: i64,
        version: i32,
        id_generator: Arc<dyn IdGenerator>,
        tag_hook: Arc<dyn TagChangeHook>,
    ) -> Result<Self, PrimitiveError> {
        let primitive = Primitive {
            meta: Metadata::new(0),
            flags: Flags::new(),
            tags: TagStore::new(),
            id_generator,
            tag_hook,
        };
        primitive.set_osm_id(id, version)?;
        Ok(primitive)
    }

    /* -------------------
     * Identity and version
     * ------------------- */

    /// The server id, 0 for new objects.
    pub fn id(&self) -> i64 {
        self.meta.id()
    }

    /// The raw unique id: server id if assigned, unique negative value
    /// otherwise.
    pub fn unique_id(&self) -> i64 {
        self.meta.unique_id()
    }

    /// Whether this primitive has not been assigned a server id yet.
    pub fn is_new(&self) -> bool {
        self.meta.is_new()
    }

    pub fn version(&self) -> i32 {
        self.meta.version()
    }

    /// Assigns server id and version; clears INCOMPLETE.
    pub fn set_osm_id(&self, id: i64, version: i32) -> Result<(), PrimitiveError> {
        self.meta.set_osm_id(id, version)?;
        self.flags.set_incomplete(false);
        Ok(())
    }

    pub fn changeset_id(&self) -> i32 {
        self.meta.changeset_id()
    }

    pub fn set_changeset_id(&self, changeset_id: i32) -> Result<(), PrimitiveError> {
        self.meta.set_changeset_id(changeset_id)
    }

    pub fn user(&self) -> Option<Arc<User>> {
        self.meta.user()
    }

    pub fn set_user(&self, user: Option<Arc<User>>) {
        self.meta.set_user(user);
    }

    pub fn instant(&self) -> SystemTime {
        self.meta.instant()
    }

    pub fn set_instant(&self, instant: SystemTime) {
        self.meta.set_instant(instant);
    }

    pub fn raw_timestamp(&self) -> i32 {
        self.meta.raw_timestamp()
    }

    pub fn set_raw_timestamp(&self, timestamp: i32) {
        self.meta.set_raw_timestamp(timestamp);
    }

    pub fn is_timestamp_empty(&self) -> bool {
        self.meta.is_timestamp_empty()
    }

    /// Copies tags, identity, flags and user from `other`.
    ///
    /// Fires the tag-change hook once for the tag replacement. See
    /// `Metadata::clone_from` for the version/changeset rules.
    pub fn clone_from(&self, other: &Primitive) {
        self.set_keys(&other.get_keys());
        self.meta.clone_from(&other.meta);
        self.flags.set_bits(other.flags.bits());
    }

    /// Resets to a fresh "new" state: a newly generated unique id, version,
    /// changeset, timestamp and user cleared, INCOMPLETE and DELETED
    /// cleared, VISIBLE set.
    pub fn clear_osm_metadata(&self) {
        self.meta.reset(self.id_generator.generate_unique_id());
        self.flags.set_incomplete(false);
        self.flags.set_deleted(false);
        self.flags.set_visible(true);
    }

    /* -----
     * Flags
     * ----- */

    pub fn is_modified(&self) -> bool {
        self.flags.is_modified()
    }

    pub fn set_modified(&self, modified: bool) {
        self.flags.set_modified(modified);
    }

    pub fn is_visible(&self) -> bool {
        self.flags.is_visible()
    }

    /// Sets visibility. A new primitive is always visible; clearing
    /// visibility on one fails with no side effect.
    pub fn set_visible(&self, visible: bool) -> Result<(), PrimitiveError> {
        if !visible && self.is_new() {
            return Err(PrimitiveError::NewPrimitiveInvisible);
        }
        self.flags.set_visible(visible);
        Ok(())
    }

    pub fn is_deleted(&self) -> bool {
        self.flags.is_deleted()
    }

    /// Sets DELETED and couples MODIFIED to `deleted XOR !visible`.
    pub fn set_deleted(&self, deleted: bool) {
        self.flags.set_deleted(deleted);
    }

    pub fn is_incomplete(&self) -> bool {
        self.flags.is_incomplete()
    }

    pub fn set_incomplete(&self, incomplete: bool) {
        self.flags.set_incomplete(incomplete);
    }

    pub fn is_usable(&self) -> bool {
        self.flags.is_usable()
    }

    pub fn is_drawable(&self) -> bool {
        self.flags.is_drawable()
    }

    /// Deleted on the server, restored locally.
    pub fn is_undeleted(&self) -> bool {
        self.flags.is_undeleted()
    }

    pub fn is_new_or_undeleted(&self) -> bool {
        self.is_new() || self.flags.is_undeleted()
    }

    pub fn is_disabled(&self) -> bool {
        self.flags.is_disabled()
    }

    pub fn is_disabled_and_hidden(&self) -> bool {
        self.flags.is_disabled_and_hidden()
    }

    pub fn set_disabled_state(&self, hidden: bool) -> bool {
        self.flags.set_disabled_state(hidden)
    }

    pub fn unset_disabled_state(&self) -> bool {
        self.flags.unset_disabled_state()
    }

    pub fn has_disabled_type(&self) -> bool {
        self.flags.has_disabled_type()
    }

    pub fn set_disabled_type(&self, explicit: bool) {
        self.flags.set_disabled_type(explicit);
    }

    pub fn has_hidden_type(&self) -> bool {
        self.flags.has_hidden_type()
    }

    pub fn set_hidden_type(&self, explicit: bool) {
        self.flags.set_hidden_type(explicit);
    }

    pub fn is_tagged(&self) -> bool {
        self.flags.is_tagged()
    }

    pub fn set_tagged(&self, tagged: bool) {
        self.flags.set_tagged(tagged);
    }

    pub fn is_annotated(&self) -> bool {
        self.flags.is_annotated()
    }

    pub fn set_annotated(&self, annotated: bool) {
        self.flags.set_annotated(annotated);
    }

    pub fn has_direction_keys(&self) -> bool {
        self.flags.has_direction_keys()
    }

    pub fn set_has_directions(&self, has_directions: bool) {
        self.flags.set_has_directions(has_directions);
    }

    pub fn reversed_direction(&self) -> bool {
        self.flags.reversed_direction()
    }

    pub fn set_direction_reversed(&self, reversed: bool) {
        self.flags.set_direction_reversed(reversed);
    }

    pub fn is_highlighted(&self) -> bool {
        self.flags.is_highlighted()
    }

    pub fn set_highlighted(&self, highlighted: bool) {
        self.flags.set_highlighted(highlighted);
    }

    pub fn is_preserved(&self) -> bool {
        self.flags.is_preserved()
    }

    pub fn set_preserved(&self, preserved: bool) {
        self.flags.set_preserved(preserved);
    }

    pub fn is_referrers_downloaded(&self) -> bool {
        self.is_new() || self.flags.all_referrers_downloaded()
    }

    pub fn set_referrers_downloaded(&self, downloaded: bool) {
        self.flags.set_referrers_downloaded(downloaded);
    }

    /* ----
     * Tags
     * ---- */

    pub fn get(&self, key: &str) -> Option<String> {
        self.tags.get(key)
    }

    pub fn get_ignore_case(&self, key: &str) -> Option<String> {
        self.tags.get_ignore_case(key)
    }

    pub fn get_keys(&self) -> TagMap {
        self.tags.get_keys()
    }

    pub fn num_keys(&self) -> usize {
        self.tags.num_keys()
    }

    pub fn has_keys(&self) -> bool {
        self.tags.has_keys()
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.tags.has_key(key)
    }

    pub fn has_any_key(&self, keys: &[&str]) -> bool {
        self.tags.has_any_key(keys)
    }

    pub fn key_set(&self) -> FxHashSet<String> {
        self.tags.key_set()
    }

    pub fn keys(&self) -> Keys {
        self.tags.keys()
    }

    pub fn visit_keys<F: FnMut(&str, &str)>(&self, visitor: F) {
        self.tags.visit_keys(visitor);
    }

    /// Sets `key` to `value`; `None` removes the key.
    pub fn put(&self, key: &str, value: Option<&str>) {
        if let Some(original) = self.tags.put(key, value) {
            self.tags_changed(&original);
        }
    }

    pub fn put_all(&self, tags: &TagMap) {
        if let Some(original) = self.tags.put_all(tags) {
            self.tags_changed(&original);
        }
    }

    pub fn remove(&self, key: &str) {
        if let Some(original) = self.tags.remove(key) {
            self.tags_changed(&original);
        }
    }

    pub fn remove_all(&self) {
        if let Some(original) = self.tags.remove_all() {
            self.tags_changed(&original);
        }
    }

    /// Replaces the whole tag set; an empty map clears all tags.
    pub fn set_keys(&self, tags: &TagMap) {
        let original = self.tags.set_keys(tags);
        self.tags_changed(&original);
    }

    /// The tags whose keys the process-wide classifier does not consider
    /// uninteresting.
    pub fn interesting_tags(&self) -> TagMap {
        classify::classifier().interesting_tags(&self.tags)
    }

    fn tags_changed(&self, original: &TagMap) {
        let hook = Arc::clone(&self.tag_hook);
        hook.tags_changed(self, original);
    }

    /* ---------
     * Snapshots
     * --------- */

    /// Captures the persistable state: identity, tags and flags.
    pub fn to_snapshot(&self) -> PrimitiveSnapshot {
        let mut tags = Vec::with_capacity(self.num_keys());
        self.visit_keys(|key, value| tags.push((key.to_string(), value.to_string())));
        PrimitiveSnapshot {
            id: self.unique_id(),
            user_id: self.user().map(|user| user.id()),
            version: self.version(),
            changeset_id: self.changeset_id(),
            timestamp: self.raw_timestamp(),
            tags,
            flags: self.flags.bits(),
        }
    }

    /// Restores a primitive from a decoded snapshot.
    ///
    /// State is installed verbatim and the tag-change hook is not fired; the
    /// stored user id is resolved through `users` and silently dropped if
    /// unknown there.
    pub fn from_snapshot(
        snapshot: &PrimitiveSnapshot,
        users: &dyn UserRegistry,
        id_generator: Arc<dyn IdGenerator>,
        tag_hook: Arc<dyn TagChangeHook>,
    ) -> Self {
        let user = snapshot.user_id.and_then(|id| users.lookup_by_id(id));
        let meta = Metadata::from_parts(
            snapshot.id,
            snapshot.version,
            snapshot.changeset_id,
            snapshot.timestamp,
            user,
        );
        let flags = Flags::new();
        flags.set_bits(snapshot.flags);
        let tags = TagStore::new();
        let mut pairs = Vec::with_capacity(snapshot.tags.len() * 2);
        for (key, value) in &snapshot.tags {
            pairs.push(key.clone());
            pairs.push(value.clone());
        }
        tags.set_raw(Some(pairs));
        Primitive { meta, flags, tags, id_generator, tag_hook }
    }
}

impl fmt::Debug for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Primitive")
            .field("id", &self.unique_id())
            .field("version", &self.version())
            .field("flags", &self.flags)
            .field("tags", &self.num_keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::Mutex;

    /// Hook that records every pre-mutation tag map it sees.
    #[derive(Default)]
    struct RecordingHook {
        originals: Mutex<Vec<TagMap>>,
    }

    impl TagChangeHook for RecordingHook {
        fn tags_changed(&self, _primitive: &Primitive, original: &TagMap) {
            self.originals.lock().unwrap().push(original.clone());
        }
    }

    fn fresh() -> Primitive {
        Primitive::new(
            Arc::new(UniqueIdGenerator::new()),
            Arc::new(DerivedFlagsHook),
        )
    }

    fn map(entries: &[(&str, &str)]) -> TagMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_fresh_primitive_is_new_and_visible() {
        let primitive = fresh();
        assert!(primitive.is_new());
        assert_eq!(primitive.id(), 0);
        assert!(primitive.unique_id() < 0);
        assert!(primitive.is_visible());
        assert!(!primitive.is_modified());
        assert!(primitive.is_new() == (primitive.unique_id() <= 0));
    }

    #[test]
    fn test_generated_ids_are_distinct_and_decreasing() {
        let generator = Arc::new(UniqueIdGenerator::new());
        assert_eq!(generator.generate_unique_id(), -1);
        assert_eq!(generator.generate_unique_id(), -2);
        assert_eq!(generator.current_unique_id(), -2);
    }

    #[test]
    fn test_new_primitive_cannot_be_invisible() {
        let primitive = fresh();
        let err = primitive.set_visible(false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert!(primitive.is_visible());

        primitive.set_osm_id(1, 1).unwrap();
        primitive.set_visible(false).unwrap();
        assert!(!primitive.is_visible());
    }

    #[test]
    fn test_set_osm_id() {
        let primitive = fresh();
        primitive.set_incomplete(true);
        primitive.set_osm_id(42, 3).unwrap();
        assert_eq!(primitive.id(), 42);
        assert_eq!(primitive.version(), 3);
        assert!(!primitive.is_incomplete());
        assert!(!primitive.is_new());
    }

    #[test]
    fn test_set_osm_id_invalid_arguments_leave_state_unchanged() {
        let primitive = fresh();
        let before = primitive.unique_id();
        assert_eq!(
            primitive.set_osm_id(0, 1).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            primitive.set_osm_id(1, 0).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(primitive.unique_id(), before);
        assert_eq!(primitive.version(), 0);
    }

    #[test]
    fn test_delete_fresh_primitive_marks_modified() {
        let primitive = fresh();
        primitive.set_deleted(true);
        assert!(primitive.is_modified());
        // Idempotent under the XOR rule: visibility has not changed.
        primitive.set_deleted(true);
        assert!(primitive.is_modified());
    }

    #[test]
    fn test_clear_osm_metadata() {
        let primitive = fresh();
        let old_id = primitive.unique_id();
        primitive.set_osm_id(42, 3).unwrap();
        primitive.set_changeset_id(7).unwrap();
        primitive.set_raw_timestamp(123);
        primitive.set_deleted(true);
        primitive.set_incomplete(true);

        primitive.clear_osm_metadata();
        assert!(primitive.unique_id() <= 0);
        assert_ne!(primitive.unique_id(), old_id);
        assert_eq!(primitive.version(), 0);
        assert_eq!(primitive.changeset_id(), 0);
        assert!(primitive.is_timestamp_empty());
        assert!(primitive.user().is_none());
        assert!(!primitive.is_incomplete());
        assert!(!primitive.is_deleted());
        assert!(primitive.is_visible());
    }

    #[test]
    fn test_referrers_downloaded_defaults() {
        let primitive = fresh();
        // New objects have no referrers on the server by definition.
        assert!(primitive.is_referrers_downloaded());
        primitive.set_osm_id(1, 1).unwrap();
        assert!(!primitive.is_referrers_downloaded());
        primitive.set_referrers_downloaded(true);
        assert!(primitive.is_referrers_downloaded());
    }

    #[test]
    fn test_hook_receives_pre_mutation_maps() {
        let hook = Arc::new(RecordingHook::default());
        let primitive = Primitive::new(Arc::new(UniqueIdGenerator::new()), hook.clone());

        primitive.put("a", Some("1"));
        primitive.put("b", Some("2"));
        primitive.remove("a");
        primitive.put("", Some("ignored"));

        let originals = hook.originals.lock().unwrap();
        assert_eq!(originals.len(), 3);
        assert!(originals[0].is_empty());
        assert_eq!(originals[1], map(&[("a", "1")]));
        assert_eq!(originals[2], map(&[("a", "1"), ("b", "2")]));
    }

    #[test]
    fn test_derived_flags_hook_recomputes_tagged_and_annotated() {
        let primitive = fresh();
        assert!(!primitive.is_tagged());

        primitive.put("highway", Some("residential"));
        assert!(primitive.is_tagged());
        assert!(!primitive.is_annotated());

        primitive.put("note", Some("check this"));
        assert!(primitive.is_annotated());

        primitive.remove("highway");
        assert!(!primitive.is_tagged());
        assert!(primitive.is_annotated());

        primitive.remove_all();
        assert!(!primitive.is_tagged());
        assert!(!primitive.is_annotated());
    }

    #[test]
    fn test_interesting_tags() {
        let primitive = fresh();
        primitive.put("source", Some("survey"));
        primitive.put("name", Some("Main Street"));
        let interesting = primitive.interesting_tags();
        assert_eq!(interesting.len(), 1);
        assert!(interesting.contains_key("name"));
    }

    #[test]
    fn test_clone_from_copies_tags_flags_and_identity() {
        let source = fresh();
        source.set_osm_id(42, 3).unwrap();
        source.set_changeset_id(7).unwrap();
        source.put("name", Some("Main Street"));
        source.set_deleted(true);

        let target = fresh();
        target.clone_from(&source);
        assert_eq!(target.unique_id(), 42);
        assert_eq!(target.version(), 3);
        assert_eq!(target.changeset_id(), 7);
        assert_eq!(target.get("name").as_deref(), Some("Main Street"));
        assert!(target.is_deleted());
        assert!(target.is_modified());
    }

    #[test]
    fn test_clone_from_negative_id_drops_changeset() {
        // Snapshots of objects with a negative id and an assigned changeset
        // id exist in the wild; restoring one reproduces that state.
        let snapshot = PrimitiveSnapshot {
            id: -5,
            user_id: None,
            version: 3,
            changeset_id: 7,
            timestamp: 0,
            tags: vec![("name".to_string(), "x".to_string())],
            flags: 0x0002,
        };
        let registry = crate::model::user::UserStore::new();
        let source = Primitive::from_snapshot(
            &snapshot,
            &registry,
            Arc::new(UniqueIdGenerator::new()),
            Arc::new(DerivedFlagsHook),
        );
        assert_eq!(source.changeset_id(), 7);

        let target = fresh();
        target.clone_from(&source);
        assert_eq!(target.unique_id(), -5);
        assert_eq!(target.version(), 0);
        assert_eq!(target.changeset_id(), 0);
        assert_eq!(target.get("name").as_deref(), Some("x"));
    }

    #[test]
    fn test_changeset_id_contract() {
        let primitive = fresh();
        assert_eq!(
            primitive.set_changeset_id(7).unwrap_err().kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(
            primitive.set_changeset_id(-1).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        primitive.set_osm_id(1, 1).unwrap();
        primitive.set_changeset_id(7).unwrap();
        assert_eq!(primitive.changeset_id(), 7);
    }
}
