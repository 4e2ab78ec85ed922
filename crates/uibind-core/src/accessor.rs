#![forbid(unsafe_code)]

//! Reflection-free forwarded-property access.
//!
//! Target types declare named getter/setter closures at compile time by
//! implementing [`Bindable`]; the resulting table is resolved once per type,
//! memoized for the life of the process, and looked up by `(type, name)`.
//! A declared chain ([`PropertyRegistry::inherit`]) stands in for an
//! inheritance walk: a type's own entries are searched first and shadow any
//! base entries with the same name.
//!
//! # Invariants
//!
//! 1. Two lookups of the same `(type, name)` return the identical
//!    `Arc<AccessorPair>` (pointer equality holds).
//! 2. A property that exists but lacks a read or write half yields a pair
//!    with the missing half absent, not a lookup error.
//! 3. A missing property raises [`BindError::MemberNotFound`] on every
//!    lookup; the miss is never cached as a permanent failure.
//! 4. Concurrent first use from multiple threads may resolve redundantly,
//!    but exactly one table per type is visible afterward.

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, OnceLock};

use ahash::AHashMap;
use tracing::debug;

use crate::error::{AccessorSide, BindError, BindResult};
use crate::lock;

type ErasedGet = Arc<dyn Fn(&dyn Any) -> Box<dyn Any> + Send + Sync>;
type ErasedSet = Arc<dyn Fn(&mut dyn Any, Box<dyn Any>) -> bool + Send + Sync>;

// The cache key guarantees the erased closures only ever see the target type
// they were registered for.
const TARGET_INVARIANT: &str = "accessor invoked with a mismatched target type";

/// A type whose named properties can be read and written through the
/// accessor cache.
pub trait Bindable: Any {
    /// Declare the type's named properties (and any inherited chain).
    fn register_properties(reg: &mut PropertyRegistry<Self>)
    where
        Self: Sized;
}

struct Entry {
    name: &'static str,
    get: Option<ErasedGet>,
    set: Option<ErasedSet>,
}

/// Collects the property declarations of one [`Bindable`] type.
pub struct PropertyRegistry<T> {
    entries: Vec<Entry>,
    _marker: PhantomData<fn(T)>,
}

impl<T: Bindable> PropertyRegistry<T> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Declare a readable and writable property.
    pub fn read_write<V: 'static>(
        &mut self,
        name: &'static str,
        get: impl Fn(&T) -> V + Send + Sync + 'static,
        set: impl Fn(&mut T, V) + Send + Sync + 'static,
    ) {
        self.entries.push(Entry {
            name,
            get: Some(erase_get(get)),
            set: Some(erase_set(set)),
        });
    }

    /// Declare a property with a read accessor only.
    pub fn read_only<V: 'static>(
        &mut self,
        name: &'static str,
        get: impl Fn(&T) -> V + Send + Sync + 'static,
    ) {
        self.entries.push(Entry {
            name,
            get: Some(erase_get(get)),
            set: None,
        });
    }

    /// Declare a property with a write accessor only.
    pub fn write_only<V: 'static>(
        &mut self,
        name: &'static str,
        set: impl Fn(&mut T, V) + Send + Sync + 'static,
    ) {
        self.entries.push(Entry {
            name,
            get: None,
            set: Some(erase_set(set)),
        });
    }

    /// Splice a base type's property table after this type's own entries.
    ///
    /// `project`/`project_mut` map the outer type onto its embedded base.
    /// Own declarations shadow base declarations with the same name; chains
    /// nest (the base may itself inherit).
    pub fn inherit<B: Bindable>(&mut self, project: fn(&T) -> &B, project_mut: fn(&mut T) -> &mut B) {
        let mut base = PropertyRegistry::<B>::new();
        B::register_properties(&mut base);
        for entry in base.entries {
            let get = entry.get.map(|get| -> ErasedGet {
                Arc::new(move |target: &dyn Any| {
                    let outer = target.downcast_ref::<T>().expect(TARGET_INVARIANT);
                    get(project(outer) as &dyn Any)
                })
            });
            let set = entry.set.map(|set| -> ErasedSet {
                Arc::new(move |target: &mut dyn Any, value: Box<dyn Any>| {
                    let outer = target.downcast_mut::<T>().expect(TARGET_INVARIANT);
                    set(project_mut(outer) as &mut dyn Any, value)
                })
            });
            self.entries.push(Entry {
                name: entry.name,
                get,
                set,
            });
        }
    }
}

fn erase_get<T: Bindable, V: 'static>(get: impl Fn(&T) -> V + Send + Sync + 'static) -> ErasedGet {
    Arc::new(move |target: &dyn Any| {
        let target = target.downcast_ref::<T>().expect(TARGET_INVARIANT);
        Box::new(get(target)) as Box<dyn Any>
    })
}

fn erase_set<T: Bindable, V: 'static>(set: impl Fn(&mut T, V) + Send + Sync + 'static) -> ErasedSet {
    Arc::new(move |target: &mut dyn Any, value: Box<dyn Any>| {
        let target = target.downcast_mut::<T>().expect(TARGET_INVARIANT);
        match value.downcast::<V>() {
            Ok(value) => {
                set(target, *value);
                true
            }
            Err(_) => false,
        }
    })
}

/// A cached (getter, setter) pair for one `(type, property-name)` key.
///
/// Either half may be absent; operations requiring the missing half raise
/// [`BindError::AccessorUnavailable`].
pub struct AccessorPair {
    type_id: TypeId,
    type_name: &'static str,
    name: &'static str,
    get: Option<ErasedGet>,
    set: Option<ErasedSet>,
}

impl AccessorPair {
    /// The property name this pair was resolved for.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the property has a read accessor.
    #[must_use]
    pub fn readable(&self) -> bool {
        self.get.is_some()
    }

    /// Whether the property has a write accessor.
    #[must_use]
    pub fn writable(&self) -> bool {
        self.set.is_some()
    }

    /// Read the property from `target` as `V`.
    pub fn get_as<T: Bindable, V: 'static>(&self, target: &T) -> BindResult<V> {
        self.check_target::<T>()?;
        let get = self
            .get
            .as_ref()
            .ok_or_else(|| self.unavailable(AccessorSide::Get))?;
        match get(target as &dyn Any).downcast::<V>() {
            Ok(value) => Ok(*value),
            Err(_) => Err(self.unavailable(AccessorSide::Get)),
        }
    }

    /// Write `value` to the property on `target`.
    pub fn set_to<T: Bindable, V: 'static>(&self, target: &mut T, value: V) -> BindResult<()> {
        self.check_target::<T>()?;
        let set = self
            .set
            .as_ref()
            .ok_or_else(|| self.unavailable(AccessorSide::Set))?;
        if set(target as &mut dyn Any, Box::new(value)) {
            Ok(())
        } else {
            Err(self.unavailable(AccessorSide::Set))
        }
    }

    fn check_target<T: Bindable>(&self) -> BindResult<()> {
        if TypeId::of::<T>() == self.type_id {
            Ok(())
        } else {
            Err(BindError::InvalidArgument(
                "target type does not match the resolved accessor pair",
            ))
        }
    }

    fn unavailable(&self, side: AccessorSide) -> BindError {
        BindError::AccessorUnavailable {
            type_name: self.type_name,
            property: self.name.to_owned(),
            side,
        }
    }
}

impl fmt::Debug for AccessorPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessorPair")
            .field("type", &self.type_name)
            .field("name", &self.name)
            .field("readable", &self.readable())
            .field("writable", &self.writable())
            .finish()
    }
}

type TypeTable = AHashMap<&'static str, Arc<AccessorPair>>;

fn tables() -> &'static Mutex<AHashMap<TypeId, Arc<TypeTable>>> {
    static TABLES: OnceLock<Mutex<AHashMap<TypeId, Arc<TypeTable>>>> = OnceLock::new();
    TABLES.get_or_init(|| Mutex::new(AHashMap::new()))
}

fn build_table<T: Bindable>() -> TypeTable {
    let mut reg = PropertyRegistry::<T>::new();
    T::register_properties(&mut reg);
    let mut table = TypeTable::new();
    for entry in reg.entries {
        // Entries run own-first; the first declaration of a name wins.
        if !table.contains_key(entry.name) {
            table.insert(
                entry.name,
                Arc::new(AccessorPair {
                    type_id: TypeId::of::<T>(),
                    type_name: type_name::<T>(),
                    name: entry.name,
                    get: entry.get,
                    set: entry.set,
                }),
            );
        }
    }
    debug!(
        bindable = type_name::<T>(),
        properties = table.len(),
        "accessor table built"
    );
    table
}

/// Resolve the cached accessor pair for `property` on `T`.
///
/// The first lookup for a type compiles its whole table; later lookups
/// return the memoized pair by reference. A name that resolves nowhere in
/// the declared chain raises [`BindError::MemberNotFound`] each time.
pub fn accessors_of<T: Bindable>(property: &str) -> BindResult<Arc<AccessorPair>> {
    if property.is_empty() {
        return Err(BindError::InvalidArgument("property name must be non-empty"));
    }
    let type_id = TypeId::of::<T>();
    let table = {
        let existing = lock(tables()).get(&type_id).cloned();
        match existing {
            Some(table) => table,
            None => {
                // Built outside the registry lock so user registration code
                // may itself consult the cache. A racing thread may build
                // redundantly; the first insert wins for everyone.
                let built = Arc::new(build_table::<T>());
                Arc::clone(lock(tables()).entry(type_id).or_insert(built))
            }
        }
    };
    table
        .get(property)
        .cloned()
        .ok_or_else(|| BindError::MemberNotFound {
            type_name: type_name::<T>(),
            property: property.to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    struct Base {
        id: u32,
    }

    impl Bindable for Base {
        fn register_properties(reg: &mut PropertyRegistry<Self>) {
            reg.read_write("id", |b| b.id, |b, v| b.id = v);
            reg.read_only("kind", |_| "base".to_owned());
        }
    }

    struct Widget {
        base: Base,
        title: String,
        frames: u64,
    }

    impl Widget {
        fn new() -> Self {
            Self {
                base: Base { id: 1 },
                title: "untitled".to_owned(),
                frames: 0,
            }
        }
    }

    impl Bindable for Widget {
        fn register_properties(reg: &mut PropertyRegistry<Self>) {
            reg.read_write("title", |w| w.title.clone(), |w, v| w.title = v);
            reg.read_only("kind", |_| "widget".to_owned());
            reg.write_only::<u64>("frames", |w, v| w.frames = v);
            reg.inherit::<Base>(|w| &w.base, |w| &mut w.base);
        }
    }

    #[test]
    fn round_trips_a_read_write_property() {
        let mut widget = Widget::new();
        let pair = accessors_of::<Widget>("title").expect("resolves");
        assert!(pair.readable());
        assert!(pair.writable());

        pair.set_to(&mut widget, "renamed".to_owned()).expect("set");
        let title: String = pair.get_as(&widget).expect("get");
        assert_eq!(title, "renamed");
    }

    #[test]
    fn repeated_lookup_returns_the_identical_pair() {
        let first = accessors_of::<Widget>("title").expect("resolves");
        let second = accessors_of::<Widget>("title").expect("resolves");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn missing_property_errors_every_time() {
        for _ in 0..2 {
            let err = accessors_of::<Widget>("nope").expect_err("missing");
            assert!(matches!(err, BindError::MemberNotFound { .. }));
        }
    }

    #[test]
    fn empty_name_is_an_argument_error() {
        let err = accessors_of::<Widget>("").expect_err("empty");
        assert!(matches!(err, BindError::InvalidArgument(_)));
    }

    #[test]
    fn missing_half_is_reported_per_side() {
        let mut widget = Widget::new();

        let frames = accessors_of::<Widget>("frames").expect("resolves");
        assert!(!frames.readable());
        frames.set_to(&mut widget, 3u64).expect("set");
        assert_eq!(widget.frames, 3);
        let err = frames.get_as::<Widget, u64>(&widget).expect_err("no getter");
        assert!(matches!(
            err,
            BindError::AccessorUnavailable {
                side: AccessorSide::Get,
                ..
            }
        ));

        let kind = accessors_of::<Widget>("kind").expect("resolves");
        let err = kind
            .set_to(&mut widget, "other".to_owned())
            .expect_err("no setter");
        assert!(matches!(
            err,
            BindError::AccessorUnavailable {
                side: AccessorSide::Set,
                ..
            }
        ));
    }

    #[test]
    fn value_type_mismatch_is_unavailable() {
        let widget = Widget::new();
        let pair = accessors_of::<Widget>("title").expect("resolves");
        let err = pair.get_as::<Widget, u32>(&widget).expect_err("wrong type");
        assert!(matches!(err, BindError::AccessorUnavailable { .. }));
    }

    #[test]
    fn inherited_property_resolves_through_the_chain() {
        let mut widget = Widget::new();
        let pair = accessors_of::<Widget>("id").expect("resolves via base");
        pair.set_to(&mut widget, 42u32).expect("set");
        assert_eq!(widget.base.id, 42);
        let id: u32 = pair.get_as(&widget).expect("get");
        assert_eq!(id, 42);
    }

    #[test]
    fn own_declaration_shadows_base() {
        let widget = Widget::new();
        let pair = accessors_of::<Widget>("kind").expect("resolves");
        let kind: String = pair.get_as(&widget).expect("get");
        assert_eq!(kind, "widget", "own `kind` shadows the base's");
    }

    #[test]
    fn mismatched_target_type_is_rejected() {
        let mut base = Base { id: 0 };
        let pair = accessors_of::<Widget>("title").expect("resolves");
        let err = pair
            .set_to(&mut base, "x".to_owned())
            .expect_err("wrong target");
        assert!(matches!(err, BindError::InvalidArgument(_)));
    }

    #[test]
    fn concurrent_first_use_yields_one_visible_table() {
        struct Fresh {
            n: i64,
        }
        impl Bindable for Fresh {
            fn register_properties(reg: &mut PropertyRegistry<Self>) {
                reg.read_write("n", |t| t.n, |t, v| t.n = v);
            }
        }

        let handles: Vec<_> = (0..8)
            .map(|_| thread::spawn(|| accessors_of::<Fresh>("n").expect("resolves")))
            .collect();
        let pairs: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().expect("resolver thread panicked"))
            .collect();
        for pair in &pairs[1..] {
            assert!(Arc::ptr_eq(&pairs[0], pair));
        }
    }
}
