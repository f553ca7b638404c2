//! Stub registry
//!
//! Named stub definitions, compiled on first resolution and cached for the
//! lifetime of the registry.
//!
//! ```text
//! resolve(name)
//!   ├─ cached?  ──────────────────────────────▶ handle
//!   └─ compile lock (reentrant)
//!        ├─ cached now? ──────────────────────▶ handle
//!        ├─ name on in-progress stack? ───────▶ CyclicDependency
//!        └─ pin heap ▸ build ▸ resolve deps ▸ compile ▸ cache
//! ```
//!
//! The compile lock is reentrant so a stub's dependencies resolve on the same
//! thread; the in-progress stack it guards is the cycle detector.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::{ReentrantMutex, RwLock};
use rustc_hash::FxHashMap;

use otter_stub_cfg::{
    CfgCompiler, CompileCfg, EntryPoint, Machine, Runtime, StubConfig, StubHandle, StubTemplate,
};
use otter_stub_heap::{HeapPin, Value};

use crate::catalogue;
use crate::error::{StubError, StubResult};

/// A named stub definition and its compiled form, once resolved.
pub struct Stub {
    name: String,
    template: Arc<dyn StubTemplate>,
    config: StubConfig,
    compiled: OnceLock<StubHandle>,
}

impl Stub {
    /// Uncompiled stub.
    pub fn new(
        name: impl Into<String>,
        template: impl StubTemplate + 'static,
        config: StubConfig,
    ) -> Self {
        Self {
            name: name.into(),
            template: Arc::new(template),
            config,
            compiled: OnceLock::new(),
        }
    }

    /// Stub that is already compiled.
    pub fn precompiled(
        name: impl Into<String>,
        template: impl StubTemplate + 'static,
        config: StubConfig,
        handle: StubHandle,
    ) -> Self {
        let stub = Self::new(name, template, config);
        let _ = stub.compiled.set(handle);
        stub
    }

    /// Stub name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Compile-time parameters.
    pub fn config(&self) -> &StubConfig {
        &self.config
    }

    /// Compiled form, if resolved.
    pub fn handle(&self) -> Option<&StubHandle> {
        self.compiled.get()
    }

    /// Entry point of the compiled form, if resolved.
    pub fn entry_point(&self) -> Option<EntryPoint> {
        self.compiled.get().map(|handle| handle.entry_point())
    }
}

impl std::fmt::Debug for Stub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stub")
            .field("name", &self.name)
            .field("compiled", &self.entry_point())
            .finish()
    }
}

/// Snapshot of registry counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Declarations and registrations
    pub declared: u64,
    /// Calls to `resolve`, including nested dependency resolution
    pub resolutions: u64,
    /// Resolutions served from the cache
    pub cache_hits: u64,
    /// Successful compilations
    pub compilations: u64,
    /// Failed compilations
    pub compile_failures: u64,
}

#[derive(Default)]
struct StatsCounters {
    declared: AtomicU64,
    resolutions: AtomicU64,
    cache_hits: AtomicU64,
    compilations: AtomicU64,
    compile_failures: AtomicU64,
}

impl StatsCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> RegistryStats {
        RegistryStats {
            declared: self.declared.load(Ordering::Relaxed),
            resolutions: self.resolutions.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            compilations: self.compilations.load(Ordering::Relaxed),
            compile_failures: self.compile_failures.load(Ordering::Relaxed),
        }
    }
}

/// Owns stub definitions and their compiled handles.
pub struct StubRegistry {
    stubs: RwLock<FxHashMap<String, Arc<Stub>>>,
    compiler: Box<dyn CompileCfg>,
    pin: HeapPin,
    in_progress: ReentrantMutex<RefCell<Vec<String>>>,
    stats: StatsCounters,
}

impl StubRegistry {
    /// Empty registry using the default compiler. `pin` is held for the
    /// duration of every compilation.
    pub fn new(pin: HeapPin) -> Self {
        Self::with_compiler(pin, CfgCompiler::new())
    }

    /// Empty registry using a custom compiler.
    pub fn with_compiler(pin: HeapPin, compiler: impl CompileCfg + 'static) -> Self {
        Self {
            stubs: RwLock::new(FxHashMap::default()),
            compiler: Box::new(compiler),
            pin,
            in_progress: ReentrantMutex::new(RefCell::new(Vec::new())),
            stats: StatsCounters::default(),
        }
    }

    /// Registry with the complete stub catalogue declared.
    pub fn with_catalogue(pin: HeapPin) -> Self {
        let registry = Self::new(pin);
        catalogue::declare_all(&registry);
        registry
    }

    /// Declare an uncompiled stub, replacing any previous one of that name.
    pub fn declare(
        &self,
        name: impl Into<String>,
        template: impl StubTemplate + 'static,
        config: StubConfig,
    ) {
        self.register(Stub::new(name, template, config));
    }

    /// Install a stub object under its name, replacing any previous one.
    pub fn register(&self, stub: Stub) {
        tracing::debug!(stub = %stub.name, compiled = stub.handle().is_some(), "declared stub");
        StatsCounters::bump(&self.stats.declared);
        self.stubs.write().insert(stub.name.clone(), Arc::new(stub));
    }

    /// Whether `name` is declared.
    pub fn contains(&self, name: &str) -> bool {
        self.stubs.read().contains_key(name)
    }

    /// Declared stub names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stubs.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// The stub object for `name`.
    pub fn get(&self, name: &str) -> StubResult<Arc<Stub>> {
        self.stubs
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StubError::NotFound(name.to_string()))
    }

    /// Compiled handle for `name`, compiling on first use.
    pub fn resolve(&self, name: &str) -> StubResult<StubHandle> {
        StatsCounters::bump(&self.stats.resolutions);
        let stub = self.get(name)?;
        if let Some(handle) = stub.compiled.get() {
            return Ok(self.hit(name, handle));
        }

        let guard = self.in_progress.lock();
        if let Some(handle) = stub.compiled.get() {
            return Ok(self.hit(name, handle));
        }
        {
            let mut stack = guard.borrow_mut();
            if let Some(start) = stack.iter().position(|entry| entry == name) {
                let mut cycle = stack[start..].to_vec();
                cycle.push(name.to_string());
                tracing::debug!(cycle = ?cycle, "cyclic stub dependency");
                return Err(StubError::CyclicDependency(cycle));
            }
            stack.push(name.to_string());
        }

        let result = self.compile(&stub);
        guard.borrow_mut().pop();

        match result {
            Ok(handle) => {
                StatsCounters::bump(&self.stats.compilations);
                Ok(stub.compiled.get_or_init(|| handle).clone())
            }
            Err(err) => {
                StatsCounters::bump(&self.stats.compile_failures);
                tracing::debug!(stub = %name, error = %err, "stub compilation failed");
                Err(err)
            }
        }
    }

    fn hit(&self, name: &str, handle: &StubHandle) -> StubHandle {
        StatsCounters::bump(&self.stats.cache_hits);
        tracing::trace!(stub = %name, entry = %handle.entry_point(), "stub cache hit");
        handle.clone()
    }

    fn compile(&self, stub: &Stub) -> StubResult<StubHandle> {
        let _pin = self.pin.enter();
        let cfg = stub.template.build(&stub.name, &stub.config)?;

        let mut deps = Vec::new();
        for dep in cfg.dependencies() {
            deps.push((dep.to_string(), self.resolve(dep)?));
        }

        Ok(self.compiler.compile(&cfg, &stub.config, deps)?)
    }

    /// Callable Code value for `name`, as stored in a function's `code` field.
    pub fn code_ref(&self, name: &str, vm: &mut Machine) -> StubResult<Value> {
        let handle = self.resolve(name)?;
        Ok(vm.code_value(&handle)?)
    }

    /// Resolve `name` and invoke it with the stub calling convention.
    pub fn call(
        &self,
        name: &str,
        vm: &mut Machine,
        rt: &mut dyn Runtime,
        args: &[Value],
    ) -> StubResult<Value> {
        let handle = self.resolve(name)?;
        Ok(handle.call(vm, rt, args)?)
    }

    /// Counter snapshot.
    pub fn stats(&self) -> RegistryStats {
        self.stats.snapshot()
    }

    /// The pin held during compilation.
    pub fn pin(&self) -> &HeapPin {
        &self.pin
    }
}

impl std::fmt::Debug for StubRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StubRegistry")
            .field("stubs", &self.stubs.read().len())
            .field("stats", &self.stats())
            .finish()
    }
}
