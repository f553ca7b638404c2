//! CFG compiler
//!
//! Lowers a verified [`Cfg`] into a [`CompiledStub`]: stub names become
//! indices into the stub's dependency handles, the inline-cache handle is
//! bound, and the stub receives a unique entry point.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use otter_stub_heap::Value;

use crate::error::{CfgError, CfgResult};
use crate::exec::{self, Machine};
use crate::ir::{Block, Cfg, Inst};
use crate::runtime::Runtime;
use crate::template::{IcHandle, StubConfig};
use crate::trap::Trap;

/// Shared handle to a compiled stub.
pub type StubHandle = Arc<CompiledStub>;

/// Unique address of a compiled stub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryPoint(pub u64);

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Turns stub bodies into callable units.
pub trait CompileCfg: Send + Sync {
    /// Compile `cfg`. `deps` holds a handle for every name in
    /// [`Cfg::dependencies`].
    fn compile(
        &self,
        cfg: &Cfg,
        config: &StubConfig,
        deps: Vec<(String, StubHandle)>,
    ) -> CfgResult<StubHandle>;
}

/// First entry point handed out. Keeps entry points away from zero.
const ENTRY_BASE: u64 = 0x1000;

/// Entry point spacing.
const ENTRY_STRIDE: u64 = 0x10;

/// Default compiler producing interpreted stubs.
pub struct CfgCompiler {
    next_entry: AtomicU64,
}

impl CfgCompiler {
    /// Create a compiler.
    pub fn new() -> Self {
        Self {
            next_entry: AtomicU64::new(ENTRY_BASE),
        }
    }

    /// Number of stubs compiled so far.
    pub fn compiled_count(&self) -> u64 {
        (self.next_entry.load(Ordering::Relaxed) - ENTRY_BASE) / ENTRY_STRIDE
    }
}

impl Default for CfgCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl CompileCfg for CfgCompiler {
    fn compile(
        &self,
        cfg: &Cfg,
        config: &StubConfig,
        deps: Vec<(String, StubHandle)>,
    ) -> CfgResult<StubHandle> {
        let mut blocks = Vec::with_capacity(cfg.blocks.len());
        for block in &cfg.blocks {
            let mut insts = Vec::with_capacity(block.insts.len());
            for inst in &block.insts {
                if matches!(inst, Inst::InlineCache { .. }) && config.ic.is_none() {
                    return Err(CfgError::MissingInlineCache(cfg.name.clone()));
                }
                insts.push(inst.clone().map_stub(|name| {
                    deps.iter()
                        .position(|(dep, _)| *dep == name)
                        .ok_or_else(|| CfgError::UnresolvedDependency {
                            stub: cfg.name.clone(),
                            dependency: name,
                        })
                })?);
            }
            blocks.push(Block {
                params: block.params.clone(),
                insts,
                terminator: block.terminator.clone(),
            });
        }

        let entry = EntryPoint(self.next_entry.fetch_add(ENTRY_STRIDE, Ordering::Relaxed));
        tracing::debug!(
            stub = %cfg.name,
            entry = %entry,
            blocks = blocks.len(),
            deps = deps.len(),
            "compiled stub"
        );

        Ok(Arc::new(CompiledStub {
            name: cfg.name.clone(),
            entry,
            blocks,
            var_count: cfg.var_count,
            deps: deps.into_iter().map(|(_, handle)| handle).collect(),
            ic: config.ic,
        }))
    }
}

/// A compiled, callable stub.
pub struct CompiledStub {
    pub(crate) name: String,
    pub(crate) entry: EntryPoint,
    pub(crate) blocks: Vec<Block<usize>>,
    pub(crate) var_count: usize,
    pub(crate) deps: Vec<StubHandle>,
    pub(crate) ic: Option<IcHandle>,
}

impl CompiledStub {
    /// Stub name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entry point address.
    pub fn entry_point(&self) -> EntryPoint {
        self.entry
    }

    /// Inline cache bound at compile time.
    pub fn inline_cache(&self) -> Option<IcHandle> {
        self.ic
    }

    /// Directly referenced stubs.
    pub fn dependencies(&self) -> impl Iterator<Item = &StubHandle> {
        self.deps.iter()
    }

    /// Invoke with the stub calling convention (receiver is `undefined`).
    pub fn call(
        &self,
        vm: &mut Machine,
        rt: &mut dyn Runtime,
        args: &[Value],
    ) -> Result<Value, Trap> {
        let this = vm.heap().undefined();
        self.call_with_receiver(vm, rt, this, args)
    }

    /// Invoke with an explicit receiver.
    pub fn call_with_receiver(
        &self,
        vm: &mut Machine,
        rt: &mut dyn Runtime,
        this: Value,
        args: &[Value],
    ) -> Result<Value, Trap> {
        vm.enter()?;
        let result = exec::run(self, vm, rt, this, args);
        vm.leave();
        result
    }
}

impl fmt::Debug for CompiledStub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledStub")
            .field("name", &self.name)
            .field("entry", &self.entry)
            .field("blocks", &self.blocks.len())
            .field("deps", &self.deps.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::CfgBuilder;
    use crate::template::IcHandle;

    fn leaf(name: &str) -> Cfg {
        let mut b = CfgBuilder::new(name);
        let x = b.load_stub_arg(0);
        b.ret(x);
        b.finish().unwrap()
    }

    #[test]
    fn entry_points_are_unique() {
        let compiler = CfgCompiler::new();
        let config = StubConfig::new();
        let a = compiler.compile(&leaf("a"), &config, Vec::new()).unwrap();
        let b = compiler.compile(&leaf("a"), &config, Vec::new()).unwrap();
        assert_ne!(a.entry_point(), b.entry_point());
        assert_eq!(compiler.compiled_count(), 2);
    }

    #[test]
    fn dependency_names_must_be_supplied() {
        let compiler = CfgCompiler::new();
        let mut b = CfgBuilder::new("caller");
        let r = b.call_stub("callee", &[]);
        b.ret(r);
        let cfg = b.finish().unwrap();

        let err = compiler
            .compile(&cfg, &StubConfig::new(), Vec::new())
            .unwrap_err();
        assert!(matches!(err, CfgError::UnresolvedDependency { .. }));

        let callee = compiler
            .compile(&leaf("callee"), &StubConfig::new(), Vec::new())
            .unwrap();
        let caller = compiler
            .compile(&cfg, &StubConfig::new(), vec![("callee".to_string(), callee)])
            .unwrap();
        assert_eq!(caller.dependencies().count(), 1);
    }

    #[test]
    fn inline_cache_requires_handle() {
        let compiler = CfgCompiler::new();
        let mut b = CfgBuilder::new("ic");
        let ic = b.inline_cache();
        b.ret(ic);
        let cfg = b.finish().unwrap();

        assert_eq!(
            compiler.compile(&cfg, &StubConfig::new(), Vec::new()).unwrap_err(),
            CfgError::MissingInlineCache("ic".to_string())
        );
        let stub = compiler
            .compile(&cfg, &StubConfig::new().with_ic(IcHandle(3)), Vec::new())
            .unwrap();
        assert_eq!(stub.inline_cache(), Some(IcHandle(3)));
    }
}
