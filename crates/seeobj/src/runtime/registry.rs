//! Class registry and runtime lifecycle.
//!
//! A [`Runtime`] owns the metaclass and every class derived through it.
//! Client modules describe each class once as a `static` [`ClassDef`]; the
//! first call to [`Runtime::class`] derives it, concurrent first callers
//! block until that single build finishes, and every later call returns the
//! same class. A failed build is final for the lifetime of the runtime and
//! is reported to every caller.
//!
//! Teardown releases classes in reverse registration order (a class is
//! always registered after its parent), then the metaclass.
//!
//! The process-wide runtime behind [`init`] / [`deinit`] is counted: the
//! first `init` creates it, the matching last `deinit` tears it down.

use crate::error::{Error, Result};
use crate::runtime::class::{Class, Inherit, ParentClass, object_class};
use crate::runtime::config::RuntimeConfig;
use crate::runtime::construct::Constructible;
use crate::runtime::metaclass::MetaClass;
use crate::runtime::object::ObjectLayout;
use fxhash::FxHashMap;
use parking_lot::Mutex;
use std::any::TypeId;
use std::fmt;
use std::mem;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// Resolves the parent class of a definition.
pub type ParentFn<T> = fn(&Runtime) -> Result<Class<ParentClass<T>>>;

/// Class initializer: overrides behaviour slots of the fresh table.
pub type InitFn<T> = fn(&mut <T as ObjectLayout>::Class) -> Result<()>;

/// Static description of a class.
///
/// A runtime identifies a definition by its instance type and name, so a
/// definition reached through several `const` promotions is still derived
/// once.
///
/// # Example
///
/// ```rust
/// use seeobj::{ClassDef, RawObject, Runtime, no_init, root_parent};
///
/// static PLAIN: ClassDef<RawObject> = ClassDef::new("Plain", root_parent, no_init);
///
/// let runtime = Runtime::new().unwrap();
/// let first = runtime.class(&PLAIN).unwrap();
/// let second = runtime.class(&PLAIN).unwrap();
///
/// assert!(first.ptr_eq(&second));
/// assert_eq!(runtime.registered(), ["Plain"]);
/// ```
pub struct ClassDef<T: Constructible> {
    name: &'static str,
    parent: ParentFn<T>,
    init: InitFn<T>,
}

impl<T: Constructible> ClassDef<T> {
    /// Describes a class named `name` deriving from the class `parent`
    /// resolves, initialized by `init`.
    pub const fn new(name: &'static str, parent: ParentFn<T>, init: InitFn<T>) -> Self {
        ClassDef { name, parent, init }
    }

    /// Returns the class name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T: Constructible> fmt::Debug for ClassDef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDef").field("name", &self.name).finish()
    }
}

/// Parent resolver for classes deriving directly from the root class.
///
/// # Errors
///
/// Never fails.
pub fn root_parent(_runtime: &Runtime) -> Result<Class> {
    Ok(object_class())
}

/// Initializer that keeps every inherited slot.
///
/// # Errors
///
/// Never fails.
pub fn no_init<C>(_class: &mut C) -> Result<()> {
    Ok(())
}

type Cell = Arc<OnceLock<Result<Class>>>;

/// Owner of the metaclass and of every registered class.
///
/// # Thread Safety
///
/// `Runtime` is `Send + Sync`. Lookups take a short registry lock; the lock
/// is not held while a class is being built, so parents can be resolved
/// recursively and unrelated classes build in parallel.
pub struct Runtime {
    config: RuntimeConfig,
    meta: Class<MetaClass>,
    cells: Mutex<FxHashMap<(TypeId, &'static str), Cell>>,
    order: Mutex<Vec<Class>>,
}

impl Runtime {
    /// Creates a runtime with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns `AllocationFailure` if the metaclass cannot be allocated.
    pub fn new() -> Result<Self> {
        Self::with_config(RuntimeConfig::default())
    }

    /// Creates a runtime with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns `AllocationFailure` if the metaclass cannot be allocated.
    pub fn with_config(config: RuntimeConfig) -> Result<Self> {
        let meta = MetaClass::bootstrap()?;
        debug!(
            registry_capacity = config.registry_capacity,
            leak_check = config.leak_check,
            "runtime initialized"
        );

        Ok(Runtime {
            cells: Mutex::new(FxHashMap::with_capacity_and_hasher(
                config.registry_capacity,
                Default::default(),
            )),
            order: Mutex::new(Vec::with_capacity(config.registry_capacity)),
            meta,
            config,
        })
    }

    /// Returns the runtime's configuration.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Returns the metaclass.
    #[must_use]
    pub fn metaclass(&self) -> &Class<MetaClass> {
        &self.meta
    }

    /// Returns the class described by `def`, deriving it on first use.
    ///
    /// Exactly one caller builds the class; concurrent callers block until
    /// it is published and then share it. Definitions are keyed by instance
    /// type and name, not by address: two definitions sharing both resolve
    /// to the class built from whichever was looked up first.
    ///
    /// # Errors
    ///
    /// The error of the (single) failed build, for every caller. A parent
    /// resolver that cycles back to `def` deadlocks.
    pub fn class<T>(&self, def: &'static ClassDef<T>) -> Result<Class<T::Class>>
    where
        T: Constructible,
        T::Class: Inherit<ParentClass<T>>,
    {
        let key = (TypeId::of::<T>(), def.name);
        let cell = Arc::clone(self.cells.lock().entry(key).or_default());

        let class = cell.get_or_init(|| self.build(def)).clone()?;
        // SAFETY: the cell keyed by `T` only ever holds a class derived for
        // instances of `T`, whose class struct is `T::Class`.
        Ok(unsafe { class.cast_unchecked() })
    }

    fn build<T>(&self, def: &'static ClassDef<T>) -> Result<Class>
    where
        T: Constructible,
        T::Class: Inherit<ParentClass<T>>,
    {
        let parent = (def.parent)(self)?;

        let mut slot = None;
        self.meta.derive::<T>(&mut slot, def.name, &parent, def.init)?;
        let class = slot
            .ok_or(Error::InvalidArgument("derivation published no class"))?
            .into_root_class();

        self.order.lock().push(class.clone());
        Ok(class)
    }

    /// Names of the registered classes, in registration order.
    #[must_use]
    pub fn registered(&self) -> Vec<&'static str> {
        self.order.lock().iter().map(|class| class.name()).collect()
    }

    /// Tears the runtime down. Equivalent to dropping it.
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.cells.get_mut().clear();

        let order = mem::take(self.order.get_mut());
        for class in order.into_iter().rev() {
            if self.config.leak_check && class.refcount() > 1 {
                warn!(
                    class = class.name(),
                    outstanding = class.refcount() - 1,
                    "class still referenced at teardown"
                );
            }
            debug!(class = class.name(), "releasing class");
            drop(class);
        }

        if self.config.leak_check && self.meta.refcount() > 1 {
            warn!(
                outstanding = self.meta.refcount() - 1,
                "metaclass still referenced at teardown"
            );
        }
        debug!("runtime torn down");
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("registered", &self.registered())
            .finish()
    }
}

struct Global {
    count: usize,
    runtime: Option<Arc<Runtime>>,
}

static GLOBAL: Mutex<Global> = parking_lot::const_mutex(Global {
    count: 0,
    runtime: None,
});

/// Initializes the process-wide runtime with the default configuration.
///
/// Calls are counted: only the first creates the runtime, and it lives
/// until the matching number of [`deinit`] calls. Concurrent first callers
/// wait for the one doing the work.
///
/// # Errors
///
/// Returns `AllocationFailure` if the metaclass cannot be allocated.
pub fn init() -> Result<Arc<Runtime>> {
    init_with(RuntimeConfig::default())
}

/// Like [`init`], with an explicit configuration.
///
/// The configuration only applies when this call creates the runtime.
///
/// # Errors
///
/// Returns `AllocationFailure` if the metaclass cannot be allocated.
pub fn init_with(config: RuntimeConfig) -> Result<Arc<Runtime>> {
    let mut global = GLOBAL.lock();

    if let Some(runtime) = &global.runtime {
        let runtime = Arc::clone(runtime);
        global.count += 1;
        return Ok(runtime);
    }

    let runtime = Arc::new(Runtime::with_config(config)?);
    global.count = 1;
    global.runtime = Some(Arc::clone(&runtime));
    Ok(runtime)
}

/// Releases one [`init`]; the last one tears the process-wide runtime down.
///
/// Handles returned by earlier `init` calls keep the runtime itself alive
/// until they are dropped.
pub fn deinit() {
    let mut global = GLOBAL.lock();

    if global.count == 0 {
        warn!("deinit called without a matching init");
        return;
    }

    global.count -= 1;
    if global.count == 0 {
        let runtime = global.runtime.take();
        drop(global);
        drop(runtime);
    }
}

/// Returns the process-wide runtime.
///
/// # Errors
///
/// Returns `NotInitialized` outside an [`init`] / [`deinit`] pair.
pub fn runtime() -> Result<Arc<Runtime>> {
    GLOBAL.lock().runtime.clone().ok_or(Error::NotInitialized)
}
