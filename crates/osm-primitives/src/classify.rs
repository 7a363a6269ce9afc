//! Tag key classification: uninteresting, discardable, work-in-progress.
//!
//! Three configuration-sourced key sets decide whether a tag set makes a
//! primitive substantively "tagged", may be silently dropped, or merely marks
//! the object as "annotated". The sets are loaded once per process and cached;
//! a configuration change is picked up only through an explicit [`init_from`]
//! or [`reset`], never automatically.
//!
//! Entries ending in `:` match a whole namespace: a key matches if its
//! substring up to and including the first `:` equals the entry. Only the
//! first namespace level is considered.

use std::sync::{Arc, RwLock};

use lazy_static::lazy_static;
use log::debug;
use rustc_hash::FxHashSet;

use crate::model::tags::{TagMap, TagStore};

/// Configuration provider for the classifier key lists.
///
/// Keys are `tags.uninteresting`, `tags.discardable` and
/// `tags.workinprogress`. Returning `None` accepts the built-in default for
/// that list.
pub trait TagConfig: Send + Sync {
    fn string_list(&self, key: &str) -> Option<Vec<String>>;
}

/// Namespace prefix of tags imported from GPX traces.
const GPX_PREFIX: &str = "gpx:";

/// Keys that do not make an object "tagged" on their own.
const BASE_UNINTERESTING_KEYS: &[&str] = &[
    "source",
    "source_ref",
    "source:",
    "comment",
    "import",
    "watch",
    "watch:",
    "description",
    "attribution",
    GPX_PREFIX,
];

/// Keys deemed uninteresting to the point that they can be silently removed
/// from data which is being edited (provenance and import bookkeeping).
const DISCARDABLE_KEYS: &[&str] = &[
    "created_by",
    "converted_by",
    "current_id",
    "geobase:datasetName",
    "geobase:uuid",
    "KSJ2:ADS",
    "KSJ2:ARE",
    "KSJ2:AdminArea",
    "KSJ2:COP_label",
    "KSJ2:DFD",
    "KSJ2:INT",
    "KSJ2:INT_label",
    "KSJ2:LOC",
    "KSJ2:LPN",
    "KSJ2:OPC",
    "KSJ2:PubFacAdmin",
    "KSJ2:RAC",
    "KSJ2:RAC_label",
    "KSJ2:RIC",
    "KSJ2:RIN",
    "KSJ2:WSC",
    "KSJ2:coordinate",
    "KSJ2:curve_id",
    "KSJ2:curve_type",
    "KSJ2:filename",
    "KSJ2:lake_id",
    "KSJ2:lat",
    "KSJ2:long",
    "KSJ2:river_id",
    "odbl",
    "odbl:note",
    "osmarender:nameDirection",
    "osmarender:renderName",
    "osmarender:renderRef",
    "osmarender:rendernames",
    "SK53_bulk:load",
    "sub_sea:type",
    "tiger:source",
    "tiger:separated",
    "tiger:tlid",
    "tiger:upload_uuid",
    "import_uuid",
    "gnis:import_uuid",
    "yh:LINE_NAME",
    "yh:LINE_NUM",
    "yh:STRUCTURE",
    "yh:TOTYUMONO",
    "yh:TYPE",
    "yh:WIDTH",
    "yh:WIDTH_RANK",
];

/// Keys that mark an object as "annotated" rather than "tagged".
const WORK_IN_PROGRESS_KEYS: &[&str] = &["note", "fixme", "FIXME"];

/// Accepts the built-in default for every list.
struct Defaults;

impl TagConfig for Defaults {
    fn string_list(&self, _key: &str) -> Option<Vec<String>> {
        None
    }
}

fn list_or_default(config: &dyn TagConfig, key: &str, default: Vec<String>) -> FxHashSet<String> {
    config
        .string_list(key)
        .unwrap_or(default)
        .into_iter()
        .collect()
}

/// Immutable classifier built from one configuration read.
#[derive(Debug, Clone)]
pub struct TagClassifier {
    uninteresting: FxHashSet<String>,
    discardable: FxHashSet<String>,
    work_in_progress: FxHashSet<String>,
}

impl TagClassifier {
    /// Builds a classifier from `config`, falling back to the built-in lists.
    ///
    /// The default uninteresting set is the base list plus the discardable
    /// and work-in-progress sets; a configured `tags.uninteresting` list
    /// replaces that union entirely.
    pub fn from_config(config: &dyn TagConfig) -> Self {
        let discardable = list_or_default(
            config,
            "tags.discardable",
            DISCARDABLE_KEYS.iter().map(|k| k.to_string()).collect(),
        );
        let work_in_progress = list_or_default(
            config,
            "tags.workinprogress",
            WORK_IN_PROGRESS_KEYS.iter().map(|k| k.to_string()).collect(),
        );
        let default_uninteresting: Vec<String> = BASE_UNINTERESTING_KEYS
            .iter()
            .map(|k| k.to_string())
            .chain(discardable.iter().cloned())
            .chain(work_in_progress.iter().cloned())
            .collect();
        let uninteresting =
            list_or_default(config, "tags.uninteresting", default_uninteresting);
        TagClassifier { uninteresting, discardable, work_in_progress }
    }

    /// Builds a classifier from the built-in lists only.
    pub fn with_defaults() -> Self {
        TagClassifier::from_config(&Defaults)
    }

    /// Whether `key` does not make an object "tagged".
    ///
    /// Exact match first; otherwise a key containing `:` matches an entry
    /// that names its first namespace (entry ends in `:`).
    pub fn is_uninteresting_key(&self, key: &str) -> bool {
        if self.uninteresting.contains(key) {
            return true;
        }
        match key.find(':') {
            Some(pos) if pos > 0 => self.uninteresting.contains(&key[..=pos]),
            _ => false,
        }
    }

    /// Whether `key` may be silently dropped from edited data.
    pub fn is_discardable_key(&self, key: &str) -> bool {
        self.discardable.contains(key)
    }

    /// Whether `key` marks an object as "annotated".
    pub fn is_work_in_progress_key(&self, key: &str) -> bool {
        self.work_in_progress.contains(key)
    }

    pub fn uninteresting_keys(&self) -> &FxHashSet<String> {
        &self.uninteresting
    }

    pub fn discardable_keys(&self) -> &FxHashSet<String> {
        &self.discardable
    }

    pub fn work_in_progress_keys(&self) -> &FxHashSet<String> {
        &self.work_in_progress
    }

    /// The subset of `tags` whose keys are not uninteresting.
    ///
    /// Higher layers use a non-empty result to decide that a primitive counts
    /// as "tagged" for styling and selection purposes.
    pub fn interesting_tags(&self, tags: &TagStore) -> TagMap {
        let mut result = TagMap::default();
        tags.visit_keys(|key, value| {
            if !self.is_uninteresting_key(key) {
                result.insert(key.to_string(), value.to_string());
            }
        });
        result
    }
}

lazy_static! {
    static ref CLASSIFIER: RwLock<Option<Arc<TagClassifier>>> = RwLock::new(None);
}

/// The process-wide classifier.
///
/// Built from the built-in defaults on first use; the first successful load
/// wins. Use [`init_from`] to install a configuration-backed classifier and
/// [`reset`] to drop the cache.
pub fn classifier() -> Arc<TagClassifier> {
    if let Some(cached) = CLASSIFIER.read().expect("classifier lock poisoned").as_ref() {
        return Arc::clone(cached);
    }
    let built = Arc::new(TagClassifier::with_defaults());
    let mut slot = CLASSIFIER.write().expect("classifier lock poisoned");
    Arc::clone(slot.get_or_insert_with(|| {
        debug!("tag classifier initialized from built-in defaults");
        built
    }))
}

/// Replaces the process-wide classifier with one built from `config`.
///
/// Idempotent for identical configuration. Reinitialization after a
/// configuration change is never automatic; call this again explicitly.
pub fn init_from(config: &dyn TagConfig) -> Arc<TagClassifier> {
    let built = Arc::new(TagClassifier::from_config(config));
    debug!(
        "tag classifier initialized: {} uninteresting, {} discardable, {} work-in-progress keys",
        built.uninteresting.len(),
        built.discardable.len(),
        built.work_in_progress.len()
    );
    *CLASSIFIER.write().expect("classifier lock poisoned") = Some(Arc::clone(&built));
    built
}

/// Drops the cached classifier; the next [`classifier`] call rebuilds from
/// defaults.
pub fn reset() {
    *CLASSIFIER.write().expect("classifier lock poisoned") = None;
}

/// Whether `key` is uninteresting under the process-wide classifier.
pub fn is_uninteresting_key(key: &str) -> bool {
    classifier().is_uninteresting_key(key)
}
