//! Prototype-chain-aware variants of the `Object` introspection statics.
//!
//! Each operation walks the receiver's prototype chain, most-derived link
//! first, and merges per-link own entries into an ordered result where the
//! first link defining a key wins:
//!
//! - `known_keys` / `known_values` / `known_entries` — enumerable own string
//!   keys of every link (cf. `Object.keys` / `values` / `entries`)
//! - `get_known_property_names` — all own string keys, enumerable or not
//! - `get_known_property_symbols` — all own symbol keys
//! - `get_known_property_descriptors` — every own descriptor
//! - `get_known_property_descriptor` — the most-derived descriptor for one key
//! - `assign_known` — `Object.assign` applied link by link, least-derived
//!   first, so the most-derived value lands last
//!
//! Only entries that pass a link's filter mark a key as seen: a
//! non-enumerable own `x` does not hide an enumerable inherited `x` from
//! `known_keys`.
//!
//! Every call appends a [`KnownPropertyEvent`] to the aggregator; callers
//! drain them with [`KnownProperties::drain_events`].

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::object_model::{
    DEFAULT_MAX_CHAIN_DEPTH, JsValue, ObjectError, ObjectHandle, ObjectHeap, PropertyDescriptor,
    PropertyKey, PrototypeChain, SymbolId,
};

pub const COMPONENT: &str = "known_properties";

const KNOWN_KEYS: &str = "known_keys";
const KNOWN_VALUES: &str = "known_values";
const KNOWN_ENTRIES: &str = "known_entries";
const GET_DESCRIPTOR: &str = "get_known_property_descriptor";
const GET_DESCRIPTORS: &str = "get_known_property_descriptors";
const GET_NAMES: &str = "get_known_property_names";
const GET_SYMBOLS: &str = "get_known_property_symbols";
const HAS_KNOWN: &str = "has_known_property";
const ASSIGN_KNOWN: &str = "assign_known";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Realm prototypes used when a primitive receiver is wrapped by `ToObject`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimitivePrototypes {
    pub boolean: Option<ObjectHandle>,
    pub number: Option<ObjectHandle>,
    pub string: Option<ObjectHandle>,
    pub symbol: Option<ObjectHandle>,
    pub function: Option<ObjectHandle>,
}

impl PrimitivePrototypes {
    /// Prototype of the wrapper `ToObject(value)` would create.
    pub fn for_value(&self, value: &JsValue) -> Option<ObjectHandle> {
        match value {
            JsValue::Bool(_) => self.boolean,
            JsValue::Int(_) => self.number,
            JsValue::Str(_) => self.string,
            JsValue::Symbol(_) => self.symbol,
            JsValue::Function(_) => self.function,
            JsValue::Undefined | JsValue::Null | JsValue::Object(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnownPropertyConfig {
    /// Upper bound on links visited per walk.
    pub max_chain_depth: u32,
    pub emit_events: bool,
    pub trace_id: String,
    pub primitive_prototypes: PrimitivePrototypes,
}

impl Default for KnownPropertyConfig {
    fn default() -> Self {
        Self {
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
            emit_events: true,
            trace_id: COMPONENT.to_string(),
            primitive_prototypes: PrimitivePrototypes::default(),
        }
    }
}

impl KnownPropertyConfig {
    /// Parse a (possibly partial) JSON document; missing fields default.
    pub fn from_json(json: &str) -> Result<Self, KnownPropertyError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| KnownPropertyError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), KnownPropertyError> {
        if self.max_chain_depth == 0 {
            return Err(KnownPropertyError::Config(
                "max_chain_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// KnownPropertyError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum KnownPropertyError {
    /// `ToObject` rejected an argument (`undefined` or `null`).
    #[error("TypeError: {operation}: cannot convert argument {argument} ({type_name}) to object")]
    InvalidReceiver {
        operation: String,
        argument: usize,
        type_name: String,
    },
    #[error(transparent)]
    Object(#[from] ObjectError),
    /// The assignment target refused a write.
    #[error("TypeError: cannot assign to property '{key}' of target")]
    AssignRejected { key: PropertyKey },
    #[error("invalid known-property config: {0}")]
    Config(String),
}

impl KnownPropertyError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidReceiver { .. } => "FE-KNOWN-0001",
            Self::Object(_) => "FE-KNOWN-0002",
            Self::AssignRejected { .. } => "FE-KNOWN-0003",
            Self::Config(_) => "FE-KNOWN-0004",
        }
    }

    /// Would a script observe this as a `TypeError`?
    pub fn is_type_error(&self) -> bool {
        match self {
            Self::InvalidReceiver { .. } | Self::AssignRejected { .. } => true,
            Self::Object(ObjectError::ObjectNotFound(_)) | Self::Config(_) => false,
            Self::Object(_) => true,
        }
    }
}

// ---------------------------------------------------------------------------
// KnownPropertyEvent — structured audit event
// ---------------------------------------------------------------------------

/// Structured event emitted once per aggregator call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownPropertyEvent {
    pub trace_id: String,
    pub component: String,
    /// Operation name, e.g. `known_keys`.
    pub event: String,
    /// `ok` or `error`.
    pub outcome: String,
    pub error_code: Option<String>,
    /// Chain links visited (wrapper included).
    pub links_walked: u32,
    /// Items returned, or properties written for `assign_known`.
    pub result_len: usize,
}

// ---------------------------------------------------------------------------
// Receiver coercion and chain links
// ---------------------------------------------------------------------------

type OwnEntries = Vec<(PropertyKey, PropertyDescriptor)>;

/// Result of `ToObject`: an optional primitive wrapper link, followed by the
/// heap chain starting at `start`.
#[derive(Debug)]
struct Receiver {
    wrapper: Option<OwnEntries>,
    start: Option<ObjectHandle>,
}

impl Receiver {
    fn chain<'h, 'r>(&'r self, heap: &'h ObjectHeap, max_depth: u32) -> KnownChain<'h, 'r> {
        KnownChain {
            wrapper: self.wrapper.as_deref(),
            links: PrototypeChain::new(heap, self.start, max_depth),
        }
    }
}

/// String wrappers own one read-only index property per character and a
/// hidden `length`.
fn string_wrapper_entries(s: &str) -> OwnEntries {
    let mut entries: OwnEntries = s
        .chars()
        .enumerate()
        .map(|(i, c)| {
            (
                PropertyKey::String(i.to_string()),
                PropertyDescriptor::read_only(JsValue::Str(c.to_string()), true),
            )
        })
        .collect();
    entries.push((
        PropertyKey::from("length"),
        PropertyDescriptor::read_only(JsValue::Int(s.chars().count() as i64), false),
    ));
    entries
}

#[derive(Debug, Clone, Copy)]
enum Link<'r> {
    Wrapper(&'r [(PropertyKey, PropertyDescriptor)]),
    Object(ObjectHandle),
}

impl Link<'_> {
    fn own_entries(&self, heap: &ObjectHeap) -> Result<OwnEntries, ObjectError> {
        match self {
            Self::Wrapper(entries) => Ok(entries.to_vec()),
            Self::Object(handle) => heap.get_own_property_descriptors(*handle),
        }
    }

    fn own_descriptor(
        &self,
        heap: &ObjectHeap,
        key: &PropertyKey,
    ) -> Result<Option<PropertyDescriptor>, ObjectError> {
        match self {
            Self::Wrapper(entries) => Ok(entries
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, d)| d.clone())),
            Self::Object(handle) => heap.get_own_property_descriptor(*handle, key),
        }
    }
}

struct KnownChain<'h, 'r> {
    wrapper: Option<&'r [(PropertyKey, PropertyDescriptor)]>,
    links: PrototypeChain<'h>,
}

impl<'r> Iterator for KnownChain<'_, 'r> {
    type Item = Result<Link<'r>, ObjectError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(entries) = self.wrapper.take() {
            return Some(Ok(Link::Wrapper(entries)));
        }
        self.links.next().map(|step| step.map(Link::Object))
    }
}

/// A finished walk: the value returned to the caller plus event metrics.
struct Walk<T> {
    value: T,
    links: u32,
    len: usize,
}

// ---------------------------------------------------------------------------
// KnownProperties — the aggregator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct KnownProperties {
    config: KnownPropertyConfig,
    events: Vec<KnownPropertyEvent>,
    event_counts: BTreeMap<String, u64>,
}

impl KnownProperties {
    pub fn new(config: KnownPropertyConfig) -> Self {
        Self {
            config,
            events: Vec::new(),
            event_counts: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &KnownPropertyConfig {
        &self.config
    }

    /// Enumerable own string keys of every link, first occurrence wins.
    pub fn known_keys(
        &mut self,
        heap: &ObjectHeap,
        obj: &JsValue,
    ) -> Result<Vec<String>, KnownPropertyError> {
        self.read_known(KNOWN_KEYS, heap, obj, |key, desc| {
            desc.is_enumerable()
                .then(|| key.as_str().map(str::to_string))
                .flatten()
        })
    }

    /// Values paired with [`Self::known_keys`], taken from the most-derived
    /// link defining each key.
    pub fn known_values(
        &mut self,
        heap: &ObjectHeap,
        obj: &JsValue,
    ) -> Result<Vec<JsValue>, KnownPropertyError> {
        self.read_known(KNOWN_VALUES, heap, obj, |key, desc| {
            (desc.is_enumerable() && key.as_str().is_some()).then(|| desc.read_marker())
        })
    }

    pub fn known_entries(
        &mut self,
        heap: &ObjectHeap,
        obj: &JsValue,
    ) -> Result<Vec<(String, JsValue)>, KnownPropertyError> {
        self.read_known(KNOWN_ENTRIES, heap, obj, |key, desc| match key {
            PropertyKey::String(name) if desc.is_enumerable() => {
                Some((name.clone(), desc.read_marker()))
            }
            _ => None,
        })
    }

    /// Every own descriptor of every link, enumerable or not.
    pub fn get_known_property_descriptors(
        &mut self,
        heap: &ObjectHeap,
        obj: &JsValue,
    ) -> Result<Vec<(PropertyKey, PropertyDescriptor)>, KnownPropertyError> {
        self.read_known(GET_DESCRIPTORS, heap, obj, |key, desc| {
            Some((key.clone(), desc.clone()))
        })
    }

    pub fn get_known_property_names(
        &mut self,
        heap: &ObjectHeap,
        obj: &JsValue,
    ) -> Result<Vec<String>, KnownPropertyError> {
        self.read_known(GET_NAMES, heap, obj, |key, _| {
            key.as_str().map(str::to_string)
        })
    }

    pub fn get_known_property_symbols(
        &mut self,
        heap: &ObjectHeap,
        obj: &JsValue,
    ) -> Result<Vec<SymbolId>, KnownPropertyError> {
        self.read_known(GET_SYMBOLS, heap, obj, |key, _| key.as_symbol())
    }

    /// Descriptor of `key` on the most-derived link that owns it, or `None`
    /// when no link does.  One walk, stopping at the first hit.
    pub fn get_known_property_descriptor(
        &mut self,
        heap: &ObjectHeap,
        obj: &JsValue,
        key: &PropertyKey,
    ) -> Result<Option<PropertyDescriptor>, KnownPropertyError> {
        let outcome = self
            .coerce(GET_DESCRIPTOR, 0, obj)
            .and_then(|receiver| Ok(self.find_known(heap, &receiver, key)?));
        self.observe(GET_DESCRIPTOR, outcome)
    }

    /// Is `key` owned by any link of `obj`'s chain?
    pub fn has_known_property(
        &mut self,
        heap: &ObjectHeap,
        obj: &JsValue,
        key: &PropertyKey,
    ) -> Result<bool, KnownPropertyError> {
        let outcome = self
            .coerce(HAS_KNOWN, 0, obj)
            .and_then(|receiver| Ok(self.find_known(heap, &receiver, key)?))
            .map(|walk| Walk {
                value: walk.value.is_some(),
                links: walk.links,
                len: walk.len,
            });
        self.observe(HAS_KNOWN, outcome)
    }

    /// Copy the enumerable own properties of each source's chain onto
    /// `target`, least-derived link first, sources in order.
    ///
    /// Every argument is coerced before anything is written, so an invalid
    /// source leaves the target untouched.  A primitive target is wrapped
    /// into a fresh heap object, which is returned.
    pub fn assign_known(
        &mut self,
        heap: &mut ObjectHeap,
        target: &JsValue,
        sources: &[JsValue],
    ) -> Result<JsValue, KnownPropertyError> {
        let outcome = self.assign_into(heap, target, sources);
        self.observe(ASSIGN_KNOWN, outcome)
    }

    /// Drain accumulated events.
    pub fn drain_events(&mut self) -> Vec<KnownPropertyEvent> {
        std::mem::take(&mut self.events)
    }

    /// Calls per operation, counted even when event emission is off.
    pub fn event_counts(&self) -> &BTreeMap<String, u64> {
        &self.event_counts
    }

    // -- Internal --

    fn coerce(
        &self,
        operation: &str,
        argument: usize,
        value: &JsValue,
    ) -> Result<Receiver, KnownPropertyError> {
        if value.is_nullish() {
            return Err(KnownPropertyError::InvalidReceiver {
                operation: operation.to_string(),
                argument,
                type_name: value.type_name().to_string(),
            });
        }
        let prototypes = &self.config.primitive_prototypes;
        match value {
            JsValue::Object(handle) => Ok(Receiver {
                wrapper: None,
                start: Some(*handle),
            }),
            JsValue::Str(s) => Ok(Receiver {
                wrapper: Some(string_wrapper_entries(s)),
                start: prototypes.for_value(value),
            }),
            _ => Ok(Receiver {
                wrapper: Some(Vec::new()),
                start: prototypes.for_value(value),
            }),
        }
    }

    fn read_known<T>(
        &mut self,
        operation: &str,
        heap: &ObjectHeap,
        obj: &JsValue,
        select: impl FnMut(&PropertyKey, &PropertyDescriptor) -> Option<T>,
    ) -> Result<Vec<T>, KnownPropertyError> {
        let outcome = self
            .coerce(operation, 0, obj)
            .and_then(|receiver| Ok(self.collect_known(heap, &receiver, select)?));
        self.observe(operation, outcome)
    }

    fn collect_known<T>(
        &self,
        heap: &ObjectHeap,
        receiver: &Receiver,
        mut select: impl FnMut(&PropertyKey, &PropertyDescriptor) -> Option<T>,
    ) -> Result<Walk<Vec<T>>, ObjectError> {
        let mut seen = BTreeSet::<PropertyKey>::new();
        let mut items = Vec::new();
        let mut links: u32 = 0;

        for link in receiver.chain(heap, self.config.max_chain_depth) {
            let link = link?;
            links += 1;
            for (key, desc) in link.own_entries(heap)? {
                if seen.contains(&key) {
                    continue;
                }
                if let Some(item) = select(&key, &desc) {
                    seen.insert(key);
                    items.push(item);
                }
            }
        }
        Ok(Walk {
            len: items.len(),
            value: items,
            links,
        })
    }

    fn find_known(
        &self,
        heap: &ObjectHeap,
        receiver: &Receiver,
        key: &PropertyKey,
    ) -> Result<Walk<Option<PropertyDescriptor>>, ObjectError> {
        let mut links: u32 = 0;
        for link in receiver.chain(heap, self.config.max_chain_depth) {
            let link = link?;
            links += 1;
            if let Some(desc) = link.own_descriptor(heap, key)? {
                return Ok(Walk {
                    value: Some(desc),
                    links,
                    len: 1,
                });
            }
        }
        Ok(Walk {
            value: None,
            links,
            len: 0,
        })
    }

    fn assign_into(
        &self,
        heap: &mut ObjectHeap,
        target: &JsValue,
        sources: &[JsValue],
    ) -> Result<Walk<JsValue>, KnownPropertyError> {
        let target_receiver = self.coerce(ASSIGN_KNOWN, 0, target)?;
        let receivers = sources
            .iter()
            .enumerate()
            .map(|(i, source)| self.coerce(ASSIGN_KNOWN, i + 1, source))
            .collect::<Result<Vec<_>, _>>()?;

        let target = match target {
            JsValue::Object(handle) => *handle,
            _ => materialize(heap, target_receiver)?,
        };

        let mut links: u32 = 0;
        let mut written = 0;
        for receiver in &receivers {
            let mut chain = receiver
                .chain(heap, self.config.max_chain_depth)
                .collect::<Result<Vec<_>, _>>()?;
            chain.reverse();
            links += chain.len() as u32;

            for link in chain {
                // Snapshot the link before writing: the target may sit on
                // the source's own chain.
                let pending: Vec<(PropertyKey, JsValue)> = link
                    .own_entries(heap)?
                    .into_iter()
                    .filter(|(_, desc)| desc.is_enumerable())
                    .map(|(key, desc)| {
                        let value = desc.read_marker();
                        (key, value)
                    })
                    .collect();
                for (key, value) in pending {
                    if !heap.set_property(target, key.clone(), value)? {
                        return Err(KnownPropertyError::AssignRejected { key });
                    }
                    written += 1;
                }
            }
        }

        Ok(Walk {
            value: JsValue::Object(target),
            links,
            len: written,
        })
    }

    fn observe<T>(
        &mut self,
        operation: &str,
        outcome: Result<Walk<T>, KnownPropertyError>,
    ) -> Result<T, KnownPropertyError> {
        match outcome {
            Ok(walk) => {
                self.record(operation, walk.links, walk.len, None);
                Ok(walk.value)
            }
            Err(err) => {
                self.record(operation, 0, 0, Some(&err));
                Err(err)
            }
        }
    }

    fn record(
        &mut self,
        operation: &str,
        links_walked: u32,
        result_len: usize,
        error: Option<&KnownPropertyError>,
    ) {
        *self.event_counts.entry(operation.to_string()).or_insert(0) += 1;
        if !self.config.emit_events {
            return;
        }
        self.events.push(KnownPropertyEvent {
            trace_id: self.config.trace_id.clone(),
            component: COMPONENT.to_string(),
            event: operation.to_string(),
            outcome: if error.is_some() { "error" } else { "ok" }.to_string(),
            error_code: error.map(|e| e.error_code().to_string()),
            links_walked,
            result_len,
        });
    }
}

/// Allocate the heap object `ToObject` would produce for a primitive target.
fn materialize(heap: &mut ObjectHeap, receiver: Receiver) -> Result<ObjectHandle, ObjectError> {
    let handle = heap.alloc(receiver.start);
    for (key, desc) in receiver.wrapper.unwrap_or_default() {
        heap.define_property(handle, key, desc)?;
    }
    Ok(handle)
}

// ---------------------------------------------------------------------------
// Free functions with the default configuration
// ---------------------------------------------------------------------------

pub fn known_keys(heap: &ObjectHeap, obj: &JsValue) -> Result<Vec<String>, KnownPropertyError> {
    KnownProperties::default().known_keys(heap, obj)
}

pub fn known_values(heap: &ObjectHeap, obj: &JsValue) -> Result<Vec<JsValue>, KnownPropertyError> {
    KnownProperties::default().known_values(heap, obj)
}

pub fn known_entries(
    heap: &ObjectHeap,
    obj: &JsValue,
) -> Result<Vec<(String, JsValue)>, KnownPropertyError> {
    KnownProperties::default().known_entries(heap, obj)
}

pub fn get_known_property_descriptor(
    heap: &ObjectHeap,
    obj: &JsValue,
    key: &PropertyKey,
) -> Result<Option<PropertyDescriptor>, KnownPropertyError> {
    KnownProperties::default().get_known_property_descriptor(heap, obj, key)
}

pub fn get_known_property_descriptors(
    heap: &ObjectHeap,
    obj: &JsValue,
) -> Result<Vec<(PropertyKey, PropertyDescriptor)>, KnownPropertyError> {
    KnownProperties::default().get_known_property_descriptors(heap, obj)
}

pub fn get_known_property_names(
    heap: &ObjectHeap,
    obj: &JsValue,
) -> Result<Vec<String>, KnownPropertyError> {
    KnownProperties::default().get_known_property_names(heap, obj)
}

pub fn get_known_property_symbols(
    heap: &ObjectHeap,
    obj: &JsValue,
) -> Result<Vec<SymbolId>, KnownPropertyError> {
    KnownProperties::default().get_known_property_symbols(heap, obj)
}

pub fn assign_known(
    heap: &mut ObjectHeap,
    target: &JsValue,
    sources: &[JsValue],
) -> Result<JsValue, KnownPropertyError> {
    KnownProperties::default().assign_known(heap, target, sources)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
