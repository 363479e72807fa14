//! Host object primitives composed by the known-property aggregator.
//!
//! A handle-addressed heap of ordinary objects with ES2020 property
//! descriptors and a `[[Prototype]]` slot.  The heap exposes the native
//! introspection primitives (own keys, own descriptors, get/set/define,
//! get-prototype) and an explicit [`PrototypeChain`] walker over the
//! "next ownership link" capability.
//!
//! Proxies are representable so that chains containing them can be built,
//! but every heap-level primitive rejects them with a TypeError: trap
//! dispatch belongs to the interpreter.
//!
//! `BTreeMap`/`BTreeSet` for deterministic ordering.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Serialize/deserialize `BTreeMap<PropertyKey, PropertyDescriptor>` as a
/// sorted sequence of `[key, descriptor]` pairs.  JSON maps need string keys
/// and `PropertyKey` is an enum.
mod properties_as_seq {
    use super::{BTreeMap, PropertyDescriptor, PropertyKey};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<PropertyKey, PropertyDescriptor>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let pairs: Vec<(&PropertyKey, &PropertyDescriptor)> = map.iter().collect();
        pairs.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<PropertyKey, PropertyDescriptor>, D::Error> {
        let pairs: Vec<(PropertyKey, PropertyDescriptor)> = Vec::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}

/// Default bound on prototype chain walks.
pub const DEFAULT_MAX_CHAIN_DEPTH: u32 = 1024;

// ---------------------------------------------------------------------------
// PropertyKey — string or symbol
// ---------------------------------------------------------------------------

/// Unique symbol identifier.  Symbols compare by identity, i.e. by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SymbolId(pub u32);

/// A property key: either a string or a symbol.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PropertyKey {
    /// String key.
    String(String),
    /// Symbol key.
    Symbol(SymbolId),
}

impl PropertyKey {
    /// The string name, if this is a string key.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_str()),
            Self::Symbol(_) => None,
        }
    }

    /// The symbol id, if this is a symbol key.
    pub fn as_symbol(&self) -> Option<SymbolId> {
        match self {
            Self::Symbol(id) => Some(*id),
            Self::String(_) => None,
        }
    }

    /// Array-index keys enumerate before other strings (§9.1.11).
    fn array_index(&self) -> Option<u64> {
        match self {
            Self::String(s) if s == "0" => Some(0),
            Self::String(s) if !s.starts_with('0') => s.parse::<u64>().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Symbol(id) => write!(f, "Symbol({})", id.0),
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for PropertyKey {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<SymbolId> for PropertyKey {
    fn from(id: SymbolId) -> Self {
        Self::Symbol(id)
    }
}

// ---------------------------------------------------------------------------
// ObjectHandle / JsValue
// ---------------------------------------------------------------------------

/// Opaque handle referencing an object on the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectHandle(pub u32);

/// Runtime value seen by the object model.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JsValue {
    Undefined,
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Symbol(SymbolId),
    Object(ObjectHandle),
    Function(u32),
}

impl JsValue {
    /// `undefined` and `null` are the only values `ToObject` rejects.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "number",
            Self::Str(_) => "string",
            Self::Symbol(_) => "symbol",
            Self::Object(_) => "object",
            Self::Function(_) => "function",
        }
    }
}

impl fmt::Display for JsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s}"),
            Self::Symbol(id) => write!(f, "Symbol({})", id.0),
            Self::Object(h) => write!(f, "[object#{}]", h.0),
            Self::Function(idx) => write!(f, "[function#{idx}]"),
        }
    }
}

// ---------------------------------------------------------------------------
// PropertyDescriptor
// ---------------------------------------------------------------------------

/// ES2020 property descriptor (§6.2.5).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyDescriptor {
    /// Data descriptor: has `value` and `writable`.
    Data {
        value: JsValue,
        writable: bool,
        enumerable: bool,
        configurable: bool,
    },
    /// Accessor descriptor: has `get` and/or `set`.
    Accessor {
        get: Option<ObjectHandle>,
        set: Option<ObjectHandle>,
        enumerable: bool,
        configurable: bool,
    },
}

impl PropertyDescriptor {
    /// Default data descriptor (writable, enumerable, configurable).
    pub fn data(value: JsValue) -> Self {
        Self::Data {
            value,
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    /// Writable, configurable, but hidden from enumeration.
    pub fn hidden(value: JsValue) -> Self {
        Self::Data {
            value,
            writable: true,
            enumerable: false,
            configurable: true,
        }
    }

    /// Non-writable, non-configurable data descriptor.
    pub fn read_only(value: JsValue, enumerable: bool) -> Self {
        Self::Data {
            value,
            writable: false,
            enumerable,
            configurable: false,
        }
    }

    pub fn is_configurable(&self) -> bool {
        match self {
            Self::Data { configurable, .. } | Self::Accessor { configurable, .. } => *configurable,
        }
    }

    pub fn is_enumerable(&self) -> bool {
        match self {
            Self::Data { enumerable, .. } | Self::Accessor { enumerable, .. } => *enumerable,
        }
    }

    pub fn is_data(&self) -> bool {
        matches!(self, Self::Data { .. })
    }

    pub fn is_accessor(&self) -> bool {
        matches!(self, Self::Accessor { .. })
    }

    /// The stored value if this is a data descriptor.
    pub fn value(&self) -> Option<&JsValue> {
        match self {
            Self::Data { value, .. } => Some(value),
            Self::Accessor { .. } => None,
        }
    }

    pub fn is_writable(&self) -> bool {
        match self {
            Self::Data { writable, .. } => *writable,
            Self::Accessor { .. } => false,
        }
    }

    /// Value observed by a `[[Get]]` through this descriptor.
    ///
    /// Accessors yield the getter handle as a marker (`undefined` without a
    /// getter); invoking it is the interpreter's job.
    pub fn read_marker(&self) -> JsValue {
        match self {
            Self::Data { value, .. } => value.clone(),
            Self::Accessor { get: Some(getter), .. } => JsValue::Object(*getter),
            Self::Accessor { get: None, .. } => JsValue::Undefined,
        }
    }
}

// ---------------------------------------------------------------------------
// ObjectError
// ---------------------------------------------------------------------------

/// Errors from object model operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectError {
    /// TypeError per ES2020.
    TypeError(String),
    /// Object not found in the heap.
    ObjectNotFound(ObjectHandle),
    /// Prototype chain revisits a link.
    PrototypeCycleDetected,
    /// Prototype chain longer than the walk bound.
    PrototypeChainTooDeep { depth: u32, max: u32 },
}

impl fmt::Display for ObjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeError(msg) => write!(f, "TypeError: {msg}"),
            Self::ObjectNotFound(h) => write!(f, "object#{} not found", h.0),
            Self::PrototypeCycleDetected => write!(f, "TypeError: prototype chain cycle detected"),
            Self::PrototypeChainTooDeep { depth, max } => {
                write!(
                    f,
                    "TypeError: prototype chain depth {depth} exceeds max {max}"
                )
            }
        }
    }
}

impl std::error::Error for ObjectError {}

fn proxy_trap(trap: &str) -> ObjectError {
    ObjectError::TypeError(format!("proxy {trap} trap must be handled by interpreter"))
}

// ---------------------------------------------------------------------------
// OrdinaryObject
// ---------------------------------------------------------------------------

/// An ordinary object with its internal slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrdinaryObject {
    /// `[[Prototype]]` (None is the end of the chain).
    pub prototype: Option<ObjectHandle>,
    /// `[[Extensible]]`.
    pub extensible: bool,
    #[serde(with = "properties_as_seq")]
    pub properties: BTreeMap<PropertyKey, PropertyDescriptor>,
}

impl Default for OrdinaryObject {
    fn default() -> Self {
        Self {
            prototype: None,
            extensible: true,
            properties: BTreeMap::new(),
        }
    }
}

impl OrdinaryObject {
    pub fn with_prototype(proto: Option<ObjectHandle>) -> Self {
        Self {
            prototype: proto,
            ..Self::default()
        }
    }

    /// `[[GetOwnProperty]](P)`.
    pub fn get_own_property(&self, key: &PropertyKey) -> Option<&PropertyDescriptor> {
        self.properties.get(key)
    }

    pub fn has_own_property(&self, key: &PropertyKey) -> bool {
        self.properties.contains_key(key)
    }

    /// `[[DefineOwnProperty]](P, Desc)`.
    ///
    /// `Ok(false)` when the definition is rejected: a new key on a
    /// non-extensible object, or an incompatible change to a
    /// non-configurable property.
    pub fn define_own_property(
        &mut self,
        key: PropertyKey,
        desc: PropertyDescriptor,
    ) -> Result<bool, ObjectError> {
        let Some(current) = self.properties.get(&key) else {
            if !self.extensible {
                return Ok(false);
            }
            self.properties.insert(key, desc);
            return Ok(true);
        };

        if !current.is_configurable() {
            if desc.is_configurable()
                || desc.is_enumerable() != current.is_enumerable()
                || current.is_data() != desc.is_data()
            {
                return Ok(false);
            }
            match (current, &desc) {
                (
                    PropertyDescriptor::Data {
                        writable: false,
                        value: current_v,
                        ..
                    },
                    PropertyDescriptor::Data {
                        writable: new_w,
                        value: new_v,
                        ..
                    },
                ) if *new_w || current_v != new_v => return Ok(false),
                (
                    PropertyDescriptor::Accessor {
                        get: cur_get,
                        set: cur_set,
                        ..
                    },
                    PropertyDescriptor::Accessor {
                        get: new_get,
                        set: new_set,
                        ..
                    },
                ) if cur_get != new_get || cur_set != new_set => return Ok(false),
                _ => {}
            }
        }
        self.properties.insert(key, desc);
        Ok(true)
    }

    /// `[[OwnPropertyKeys]]()` — array indices ascending, then other strings,
    /// then symbols.  Non-index keys follow `BTreeMap` order.
    pub fn own_property_keys(&self) -> Vec<PropertyKey> {
        let mut index_keys: Vec<(u64, &PropertyKey)> = Vec::new();
        let mut str_keys: Vec<&PropertyKey> = Vec::new();
        let mut sym_keys: Vec<&PropertyKey> = Vec::new();

        for key in self.properties.keys() {
            match (key, key.array_index()) {
                (_, Some(n)) => index_keys.push((n, key)),
                (PropertyKey::String(_), None) => str_keys.push(key),
                (PropertyKey::Symbol(_), None) => sym_keys.push(key),
            }
        }

        index_keys.sort_by_key(|(n, _)| *n);
        index_keys
            .into_iter()
            .map(|(_, k)| k)
            .chain(str_keys)
            .chain(sym_keys)
            .cloned()
            .collect()
    }

    /// Own `(key, descriptor)` pairs in `[[OwnPropertyKeys]]` order.
    pub fn own_entries(&self) -> Vec<(PropertyKey, PropertyDescriptor)> {
        self.own_property_keys()
            .into_iter()
            .filter_map(|k| self.properties.get(&k).map(|d| (k.clone(), d.clone())))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// ProxyObject / ManagedObject
// ---------------------------------------------------------------------------

/// Proxy internal slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyObject {
    pub target: ObjectHandle,
    pub handler: ObjectHandle,
}

/// A heap cell: either ordinary or a Proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ManagedObject {
    Ordinary(OrdinaryObject),
    Proxy(ProxyObject),
}

impl ManagedObject {
    pub fn as_ordinary(&self) -> Option<&OrdinaryObject> {
        match self {
            Self::Ordinary(o) => Some(o),
            Self::Proxy(_) => None,
        }
    }

    pub fn as_ordinary_mut(&mut self) -> Option<&mut OrdinaryObject> {
        match self {
            Self::Ordinary(o) => Some(o),
            Self::Proxy(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ObjectHeap
// ---------------------------------------------------------------------------

/// Arena of managed objects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectHeap {
    objects: Vec<ManagedObject>,
    next_symbol: u32,
}

impl ObjectHeap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an ordinary object with the given prototype.
    pub fn alloc(&mut self, proto: Option<ObjectHandle>) -> ObjectHandle {
        let handle = ObjectHandle(self.objects.len() as u32);
        self.objects
            .push(ManagedObject::Ordinary(OrdinaryObject::with_prototype(
                proto,
            )));
        handle
    }

    /// Allocate a Proxy object.
    pub fn alloc_proxy(&mut self, target: ObjectHandle, handler: ObjectHandle) -> ObjectHandle {
        let handle = ObjectHandle(self.objects.len() as u32);
        self.objects
            .push(ManagedObject::Proxy(ProxyObject { target, handler }));
        handle
    }

    /// Allocate a fresh symbol.
    pub fn alloc_symbol(&mut self) -> SymbolId {
        self.next_symbol += 1;
        SymbolId(self.next_symbol)
    }

    pub fn get(&self, handle: ObjectHandle) -> Result<&ManagedObject, ObjectError> {
        self.objects
            .get(handle.0 as usize)
            .ok_or(ObjectError::ObjectNotFound(handle))
    }

    pub fn get_mut(&mut self, handle: ObjectHandle) -> Result<&mut ManagedObject, ObjectError> {
        self.objects
            .get_mut(handle.0 as usize)
            .ok_or(ObjectError::ObjectNotFound(handle))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn ordinary(&self, handle: ObjectHandle, trap: &str) -> Result<&OrdinaryObject, ObjectError> {
        self.get(handle)?.as_ordinary().ok_or_else(|| proxy_trap(trap))
    }

    fn ordinary_mut(
        &mut self,
        handle: ObjectHandle,
        trap: &str,
    ) -> Result<&mut OrdinaryObject, ObjectError> {
        self.get_mut(handle)?
            .as_ordinary_mut()
            .ok_or_else(|| proxy_trap(trap))
    }

    /// `Object.getPrototypeOf(O)` — the "next ownership link".
    pub fn get_prototype_of(
        &self,
        handle: ObjectHandle,
    ) -> Result<Option<ObjectHandle>, ObjectError> {
        Ok(self.ordinary(handle, "getPrototypeOf")?.prototype)
    }

    /// Walk `handle`'s prototype chain with the default depth bound.
    pub fn prototype_chain(&self, handle: ObjectHandle) -> PrototypeChain<'_> {
        PrototypeChain::new(self, Some(handle), DEFAULT_MAX_CHAIN_DEPTH)
    }

    /// `Object.preventExtensions(O)`.
    pub fn prevent_extensions(&mut self, handle: ObjectHandle) -> Result<(), ObjectError> {
        self.ordinary_mut(handle, "preventExtensions")?.extensible = false;
        Ok(())
    }

    /// `Object.defineProperty(O, P, Desc)`.
    pub fn define_property(
        &mut self,
        handle: ObjectHandle,
        key: impl Into<PropertyKey>,
        desc: PropertyDescriptor,
    ) -> Result<bool, ObjectError> {
        self.ordinary_mut(handle, "defineProperty")?
            .define_own_property(key.into(), desc)
    }

    /// `[[Set]](O, P, V)` with `O` as the receiver.
    ///
    /// `Ok(false)` when the write is refused: a non-writable data property,
    /// an accessor (setter invocation is the interpreter's job), or a new key
    /// on a non-extensible object.  A key `O` does not own is refused when the
    /// first prototype owning it holds a non-writable or accessor property.
    pub fn set_property(
        &mut self,
        handle: ObjectHandle,
        key: PropertyKey,
        value: JsValue,
    ) -> Result<bool, ObjectError> {
        let own = self.ordinary(handle, "set")?;
        if !own.has_own_property(&key)
            && let Some(inherited) = self.inherited_property(own.prototype, &key)?
            && (inherited.is_accessor() || !inherited.is_writable())
        {
            return Ok(false);
        }

        let obj = self.ordinary_mut(handle, "set")?;
        match obj.properties.get_mut(&key) {
            Some(PropertyDescriptor::Data {
                value: slot,
                writable: true,
                ..
            }) => {
                *slot = value;
                Ok(true)
            }
            Some(_) => Ok(false),
            None if obj.extensible => {
                obj.properties.insert(key, PropertyDescriptor::data(value));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Descriptor of `key` on the first link of the chain starting at `proto`.
    fn inherited_property(
        &self,
        proto: Option<ObjectHandle>,
        key: &PropertyKey,
    ) -> Result<Option<&PropertyDescriptor>, ObjectError> {
        for link in PrototypeChain::new(self, proto, DEFAULT_MAX_CHAIN_DEPTH) {
            if let Some(desc) = self.ordinary(link?, "set")?.get_own_property(key) {
                return Ok(Some(desc));
            }
        }
        Ok(None)
    }

    /// `[[Get]](O, P)` walking the prototype chain.
    pub fn get_property(
        &self,
        handle: ObjectHandle,
        key: &PropertyKey,
    ) -> Result<JsValue, ObjectError> {
        for link in self.prototype_chain(handle) {
            if let Some(desc) = self.ordinary(link?, "get")?.get_own_property(key) {
                return Ok(desc.read_marker());
            }
        }
        Ok(JsValue::Undefined)
    }

    /// `Object.getOwnPropertyDescriptor(O, P)`.
    pub fn get_own_property_descriptor(
        &self,
        handle: ObjectHandle,
        key: &PropertyKey,
    ) -> Result<Option<PropertyDescriptor>, ObjectError> {
        Ok(self
            .ordinary(handle, "getOwnPropertyDescriptor")?
            .get_own_property(key)
            .cloned())
    }

    /// `Object.getOwnPropertyDescriptors(O)` in own-key order.
    pub fn get_own_property_descriptors(
        &self,
        handle: ObjectHandle,
    ) -> Result<Vec<(PropertyKey, PropertyDescriptor)>, ObjectError> {
        Ok(self.ordinary(handle, "ownKeys")?.own_entries())
    }

    /// `Object.keys(O)` — enumerable own string keys.
    pub fn keys(&self, handle: ObjectHandle) -> Result<Vec<String>, ObjectError> {
        let obj = self.ordinary(handle, "ownKeys")?;
        Ok(obj
            .own_entries()
            .into_iter()
            .filter(|(_, d)| d.is_enumerable())
            .filter_map(|(k, _)| match k {
                PropertyKey::String(s) => Some(s),
                PropertyKey::Symbol(_) => None,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// PrototypeChain — explicit walk over ownership links
// ---------------------------------------------------------------------------

/// Iterator over a prototype chain, most-derived link first.
///
/// Yields each link's handle, then stops at the null prototype.  A revisited
/// link or more than `max_depth` links yields one error and ends the walk.
#[derive(Debug)]
pub struct PrototypeChain<'h> {
    heap: &'h ObjectHeap,
    next: Option<ObjectHandle>,
    visited: BTreeSet<ObjectHandle>,
    depth: u32,
    max_depth: u32,
    failed: bool,
}

impl<'h> PrototypeChain<'h> {
    /// Start a walk at `start`; `None` is an empty chain.
    pub fn new(heap: &'h ObjectHeap, start: Option<ObjectHandle>, max_depth: u32) -> Self {
        Self {
            heap,
            next: start,
            visited: BTreeSet::new(),
            depth: 0,
            max_depth,
            failed: false,
        }
    }

    /// Number of links yielded so far.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    fn step(&mut self, handle: ObjectHandle) -> Result<ObjectHandle, ObjectError> {
        if self.depth >= self.max_depth {
            return Err(ObjectError::PrototypeChainTooDeep {
                depth: self.depth + 1,
                max: self.max_depth,
            });
        }
        if !self.visited.insert(handle) {
            return Err(ObjectError::PrototypeCycleDetected);
        }
        self.next = self.heap.get_prototype_of(handle)?;
        self.depth += 1;
        Ok(handle)
    }
}

impl Iterator for PrototypeChain<'_> {
    type Item = Result<ObjectHandle, ObjectError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let handle = self.next?;
        let step = self.step(handle);
        if step.is_err() {
            self.failed = true;
        }
        Some(step)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn str_key(s: &str) -> PropertyKey {
        PropertyKey::String(s.to_string())
    }

    fn int_val(n: i64) -> JsValue {
        JsValue::Int(n)
    }

    #[test]
    fn property_key_display() {
        assert_eq!(str_key("foo").to_string(), "foo");
        assert_eq!(PropertyKey::Symbol(SymbolId(42)).to_string(), "Symbol(42)");
    }

    #[test]
    fn array_index_detection() {
        assert_eq!(str_key("0").array_index(), Some(0));
        assert_eq!(str_key("17").array_index(), Some(17));
        assert_eq!(str_key("07").array_index(), None);
        assert_eq!(str_key("x").array_index(), None);
        assert_eq!(PropertyKey::Symbol(SymbolId(3)).array_index(), None);
    }

    #[test]
    fn read_marker_for_accessors() {
        let with_getter = PropertyDescriptor::Accessor {
            get: Some(ObjectHandle(9)),
            set: None,
            enumerable: true,
            configurable: true,
        };
        let setter_only = PropertyDescriptor::Accessor {
            get: None,
            set: Some(ObjectHandle(4)),
            enumerable: true,
            configurable: true,
        };
        assert_eq!(with_getter.read_marker(), JsValue::Object(ObjectHandle(9)));
        assert_eq!(setter_only.read_marker(), JsValue::Undefined);
        assert_eq!(PropertyDescriptor::data(int_val(3)).read_marker(), int_val(3));
    }

    #[test]
    fn own_property_keys_order() {
        let mut obj = OrdinaryObject::default();
        for key in ["b", "10", "a", "2"] {
            obj.define_own_property(str_key(key), PropertyDescriptor::data(int_val(0)))
                .unwrap();
        }
        obj.define_own_property(
            PropertyKey::Symbol(SymbolId(1)),
            PropertyDescriptor::data(int_val(0)),
        )
        .unwrap();
        assert_eq!(
            obj.own_property_keys(),
            vec![
                str_key("2"),
                str_key("10"),
                str_key("a"),
                str_key("b"),
                PropertyKey::Symbol(SymbolId(1)),
            ]
        );
    }

    #[test]
    fn define_rejects_new_key_when_non_extensible() {
        let mut obj = OrdinaryObject {
            extensible: false,
            ..Default::default()
        };
        assert!(
            !obj.define_own_property(str_key("x"), PropertyDescriptor::data(int_val(1)))
                .unwrap()
        );
    }

    #[test]
    fn define_rejects_value_change_on_frozen_property() {
        let mut obj = OrdinaryObject::default();
        obj.define_own_property(str_key("x"), PropertyDescriptor::read_only(int_val(1), true))
            .unwrap();
        assert!(
            !obj.define_own_property(str_key("x"), PropertyDescriptor::read_only(int_val(2), true))
                .unwrap()
        );
        assert!(
            obj.define_own_property(str_key("x"), PropertyDescriptor::read_only(int_val(1), true))
                .unwrap()
        );
    }

    #[test]
    fn set_property_refuses_non_writable_even_if_configurable() {
        let mut heap = ObjectHeap::new();
        let h = heap.alloc(None);
        heap.define_property(
            h,
            "x",
            PropertyDescriptor::Data {
                value: int_val(1),
                writable: false,
                enumerable: true,
                configurable: true,
            },
        )
        .unwrap();
        assert!(!heap.set_property(h, str_key("x"), int_val(2)).unwrap());
        assert_eq!(heap.get_property(h, &str_key("x")).unwrap(), int_val(1));
    }

    #[test]
    fn set_property_respects_inherited_read_only_and_accessor() {
        let mut heap = ObjectHeap::new();
        let proto = heap.alloc(None);
        let obj = heap.alloc(Some(proto));
        heap.define_property(proto, "frozen", PropertyDescriptor::read_only(int_val(0), true))
            .unwrap();
        heap.define_property(
            proto,
            "computed",
            PropertyDescriptor::Accessor {
                get: None,
                set: Some(ObjectHandle(7)),
                enumerable: true,
                configurable: true,
            },
        )
        .unwrap();
        heap.define_property(proto, "open", PropertyDescriptor::data(int_val(0)))
            .unwrap();

        assert!(!heap.set_property(obj, str_key("frozen"), int_val(1)).unwrap());
        assert!(!heap.set_property(obj, str_key("computed"), int_val(1)).unwrap());
        assert!(heap.set_property(obj, str_key("open"), int_val(1)).unwrap());

        let own = heap.get(obj).unwrap().as_ordinary().unwrap();
        assert!(!own.has_own_property(&str_key("frozen")));
        assert!(!own.has_own_property(&str_key("computed")));
        assert_eq!(
            own.get_own_property(&str_key("open")),
            Some(&PropertyDescriptor::data(int_val(1)))
        );
    }

    #[test]
    fn get_property_walks_chain() {
        let mut heap = ObjectHeap::new();
        let proto = heap.alloc(None);
        let obj = heap.alloc(Some(proto));
        heap.define_property(proto, "x", PropertyDescriptor::data(int_val(7)))
            .unwrap();
        assert_eq!(heap.get_property(obj, &str_key("x")).unwrap(), int_val(7));
        assert_eq!(
            heap.get_property(obj, &str_key("missing")).unwrap(),
            JsValue::Undefined
        );
    }

    #[test]
    fn prototype_chain_yields_most_derived_first() {
        let mut heap = ObjectHeap::new();
        let a = heap.alloc(None);
        let b = heap.alloc(Some(a));
        let c = heap.alloc(Some(b));
        let links: Vec<_> = heap
            .prototype_chain(c)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(links, vec![c, b, a]);
    }

    #[test]
    fn prototype_chain_detects_cycle() {
        let mut heap = ObjectHeap::new();
        let a = heap.alloc(None);
        let b = heap.alloc(Some(a));
        if let ManagedObject::Ordinary(o) = heap.get_mut(a).unwrap() {
            o.prototype = Some(b);
        }
        let results: Vec<_> = heap.prototype_chain(b).collect();
        assert_eq!(results.len(), 3);
        assert_eq!(results[2], Err(ObjectError::PrototypeCycleDetected));
    }

    #[test]
    fn prototype_chain_depth_bound() {
        let mut heap = ObjectHeap::new();
        let mut cursor = heap.alloc(None);
        for _ in 0..4 {
            cursor = heap.alloc(Some(cursor));
        }
        let mut chain = PrototypeChain::new(&heap, Some(cursor), 3);
        assert!(chain.next().unwrap().is_ok());
        assert!(chain.next().unwrap().is_ok());
        assert!(chain.next().unwrap().is_ok());
        assert_eq!(chain.depth(), 3);
        assert_eq!(
            chain.next(),
            Some(Err(ObjectError::PrototypeChainTooDeep { depth: 4, max: 3 }))
        );
        assert_eq!(chain.next(), None);
    }

    #[test]
    fn proxy_rejects_heap_primitives() {
        let mut heap = ObjectHeap::new();
        let target = heap.alloc(None);
        let handler = heap.alloc(None);
        let proxy = heap.alloc_proxy(target, handler);
        assert!(matches!(
            heap.get_prototype_of(proxy),
            Err(ObjectError::TypeError(_))
        ));
        assert!(matches!(
            heap.get_own_property_descriptors(proxy),
            Err(ObjectError::TypeError(_))
        ));
    }

    #[test]
    fn missing_handle_is_reported() {
        let heap = ObjectHeap::new();
        assert_eq!(
            heap.get_prototype_of(ObjectHandle(5)),
            Err(ObjectError::ObjectNotFound(ObjectHandle(5)))
        );
    }

    #[test]
    fn heap_serde_roundtrip() {
        let mut heap = ObjectHeap::new();
        let proto = heap.alloc(None);
        let obj = heap.alloc(Some(proto));
        let sym = heap.alloc_symbol();
        heap.define_property(obj, sym, PropertyDescriptor::hidden(int_val(1)))
            .unwrap();
        let json = serde_json::to_string(&heap).expect("serialize");
        let restored: ObjectHeap = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored.len(), 2);
        assert_eq!(
            restored
                .get_own_property_descriptor(obj, &PropertyKey::Symbol(sym))
                .unwrap(),
            Some(PropertyDescriptor::hidden(int_val(1)))
        );
    }
}
