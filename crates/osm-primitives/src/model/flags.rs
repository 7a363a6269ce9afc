//! Packed lifecycle and display state.
//!
//! All boolean attributes of a primitive live in one atomic 16-bit field so
//! that a primitive stays small and readers never need a lock. Individual bits
//! are atomic; compound operations such as [`Flags::set_disabled_state`] may be
//! observed half-applied by a concurrent reader (accepted looseness, see the
//! crate-level concurrency notes).
//!
//! Raw bit values never leave this module; callers see named accessors only.

use std::fmt;
use std::sync::atomic::{AtomicU16, Ordering};

/// Changed by the user; the object will be sent to the server on upload.
const MODIFIED: u16 = 1 << 0;

/// False if the object is marked as deleted on the server.
const VISIBLE: u16 = 1 << 1;

/// Deleted by the user; a deletion request is sent on upload.
const DELETED: u16 = 1 << 2;

/// Only id and type are known; the rest has not been fetched yet.
const INCOMPLETE: u16 = 1 << 3;

/// Disabled by the filter mechanism; shown grayed out or hidden.
const DISABLED: u16 = 1 << 4;

/// Only relevant while DISABLED is set: completely hidden rather than grayed.
/// Unset whenever DISABLED is unset.
const HIDE_IF_DISABLED: u16 = 1 << 5;

/// Filter-internal flag.
const DISABLED_TYPE: u16 = 1 << 6;

/// Filter-internal flag.
const HIDDEN_TYPE: u16 = 1 << 7;

/// The tags make the direction of the object significant (e.g. a oneway).
const HAS_DIRECTIONS: u16 = 1 << 8;

/// The object carries at least one substantive tag; trivial tags such as
/// source=* do not count.
const TAGGED: u16 = 1 << 9;

/// Only relevant while HAS_DIRECTIONS is set: direction arrows are reversed.
const DIRECTION_REVERSED: u16 = 1 << 10;

/// The object is currently highlighted as a hover target.
const HIGHLIGHTED: u16 = 1 << 11;

/// The object carries a work-in-progress tag such as note or fixme.
const ANNOTATED: u16 = 1 << 12;

/// The object is preserved from the filter mechanism.
const PRESERVED: u16 = 1 << 13;

/// All referrers of the object are present locally.
const ALL_REFERRERS_DOWNLOADED: u16 = 1 << 14;

/// Atomic bitset of primitive state flags.
///
/// Freshly constructed flags have exactly VISIBLE set.
pub struct Flags(AtomicU16);

impl Flags {
    /// Creates flags for a fresh primitive: visible, nothing else.
    pub fn new() -> Self {
        Flags(AtomicU16::new(VISIBLE))
    }

    #[inline]
    fn get(&self, mask: u16) -> bool {
        self.0.load(Ordering::Acquire) & mask != 0
    }

    /// Sets or clears one bit. Returns whether the bit actually changed.
    #[inline]
    fn update(&self, mask: u16, value: bool) -> bool {
        let prev = if value {
            self.0.fetch_or(mask, Ordering::AcqRel)
        } else {
            self.0.fetch_and(!mask, Ordering::AcqRel)
        };
        (prev & mask != 0) != value
    }

    pub fn is_modified(&self) -> bool {
        self.get(MODIFIED)
    }

    pub fn set_modified(&self, modified: bool) {
        self.update(MODIFIED, modified);
    }

    pub fn is_visible(&self) -> bool {
        self.get(VISIBLE)
    }

    /// Sets visibility without any lifecycle check. The aggregate enforces
    /// that a new primitive is never made invisible.
    pub fn set_visible(&self, visible: bool) {
        self.update(VISIBLE, visible);
    }

    pub fn is_deleted(&self) -> bool {
        self.get(DELETED)
    }

    /// Sets DELETED, then couples MODIFIED to `deleted XOR !visible`.
    ///
    /// Deleting a visible object marks it modified; re-deleting an object that
    /// is already invisible on the server does not, so nothing is uploaded for
    /// it. The coupling encodes upload semantics and must not be "simplified".
    pub fn set_deleted(&self, deleted: bool) {
        self.update(DELETED, deleted);
        self.update(MODIFIED, deleted ^ !self.is_visible());
    }

    pub fn is_incomplete(&self) -> bool {
        self.get(INCOMPLETE)
    }

    pub fn set_incomplete(&self, incomplete: bool) {
        self.update(INCOMPLETE, incomplete);
    }

    /// Not deleted and not incomplete.
    pub fn is_usable(&self) -> bool {
        self.0.load(Ordering::Acquire) & (DELETED | INCOMPLETE) == 0
    }

    /// Not deleted, not incomplete, and not hidden by a filter.
    pub fn is_drawable(&self) -> bool {
        self.0.load(Ordering::Acquire) & (DELETED | INCOMPLETE | HIDE_IF_DISABLED) == 0
    }

    /// Neither visible nor deleted: deleted on the server, restored locally.
    pub fn is_undeleted(&self) -> bool {
        self.0.load(Ordering::Acquire) & (VISIBLE | DELETED) == 0
    }

    pub fn is_disabled(&self) -> bool {
        self.get(DISABLED)
    }

    pub fn is_disabled_and_hidden(&self) -> bool {
        let bits = self.0.load(Ordering::Acquire);
        bits & DISABLED != 0 && bits & HIDE_IF_DISABLED != 0
    }

    /// Disables the object, optionally hiding it completely.
    ///
    /// Returns whether any bit changed, so callers can skip redundant
    /// repaints.
    pub fn set_disabled_state(&self, hidden: bool) -> bool {
        let disabled_changed = self.update(DISABLED, true);
        let hidden_changed = self.update(HIDE_IF_DISABLED, hidden);
        disabled_changed || hidden_changed
    }

    /// Clears DISABLED and HIDE_IF_DISABLED together.
    ///
    /// Returns whether any bit changed.
    pub fn unset_disabled_state(&self) -> bool {
        let disabled_changed = self.update(DISABLED, false);
        let hidden_changed = self.update(HIDE_IF_DISABLED, false);
        disabled_changed || hidden_changed
    }

    pub fn has_disabled_type(&self) -> bool {
        self.get(DISABLED_TYPE)
    }

    pub fn set_disabled_type(&self, explicit: bool) {
        self.update(DISABLED_TYPE, explicit);
    }

    pub fn has_hidden_type(&self) -> bool {
        self.get(HIDDEN_TYPE)
    }

    pub fn set_hidden_type(&self, explicit: bool) {
        self.update(HIDDEN_TYPE, explicit);
    }

    pub fn has_direction_keys(&self) -> bool {
        self.get(HAS_DIRECTIONS)
    }

    pub fn set_has_directions(&self, has_directions: bool) {
        self.update(HAS_DIRECTIONS, has_directions);
    }

    pub fn reversed_direction(&self) -> bool {
        self.get(DIRECTION_REVERSED)
    }

    pub fn set_direction_reversed(&self, reversed: bool) {
        self.update(DIRECTION_REVERSED, reversed);
    }

    pub fn is_tagged(&self) -> bool {
        self.get(TAGGED)
    }

    pub fn set_tagged(&self, tagged: bool) {
        self.update(TAGGED, tagged);
    }

    pub fn is_annotated(&self) -> bool {
        self.get(ANNOTATED)
    }

    pub fn set_annotated(&self, annotated: bool) {
        self.update(ANNOTATED, annotated);
    }

    pub fn is_highlighted(&self) -> bool {
        self.get(HIGHLIGHTED)
    }

    pub fn set_highlighted(&self, highlighted: bool) {
        self.update(HIGHLIGHTED, highlighted);
    }

    pub fn is_preserved(&self) -> bool {
        self.get(PRESERVED)
    }

    pub fn set_preserved(&self, preserved: bool) {
        self.update(PRESERVED, preserved);
    }

    pub fn all_referrers_downloaded(&self) -> bool {
        self.get(ALL_REFERRERS_DOWNLOADED)
    }

    pub fn set_referrers_downloaded(&self, downloaded: bool) {
        self.update(ALL_REFERRERS_DOWNLOADED, downloaded);
    }

    /// Raw bit image, for snapshot encoding and the clone procedure.
    pub(crate) fn bits(&self) -> u16 {
        self.0.load(Ordering::Acquire)
    }

    /// Replaces the whole bit image, for snapshot decoding and cloning.
    pub(crate) fn set_bits(&self, bits: u16) {
        self.0.store(bits, Ordering::Release);
    }
}

impl Default for Flags {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Flags {
    /// Compact one-letter rendering of the lifecycle bits: I, M, V, D.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Flags(")?;
        if self.is_incomplete() {
            write!(f, "I")?;
        }
        if self.is_modified() {
            write!(f, "M")?;
        }
        if self.is_visible() {
            write!(f, "V")?;
        }
        if self.is_deleted() {
            write!(f, "D")?;
        }
        write!(f, ")")
    }
}
