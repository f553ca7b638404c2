//! Stub templates and their compile-time parameters

use rustc_hash::FxHashMap;

use crate::error::{CfgError, CfgResult};
use crate::ir::Cfg;

/// Template parameters substituted at compile time.
pub type Locals = FxHashMap<&'static str, i64>;

/// Opaque inline-cache handle passed through to the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IcHandle(pub u32);

/// Per-stub compile configuration.
#[derive(Debug, Clone, Default)]
pub struct StubConfig {
    /// Named constants the template reads
    pub locals: Locals,
    /// Inline cache the stub threads into the runtime
    pub ic: Option<IcHandle>,
}

impl StubConfig {
    /// Empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a local.
    pub fn with_local(mut self, name: &'static str, value: i64) -> Self {
        self.locals.insert(name, value);
        self
    }

    /// Attach an inline-cache handle.
    pub fn with_ic(mut self, ic: IcHandle) -> Self {
        self.ic = Some(ic);
        self
    }

    /// Read a local.
    pub fn local(&self, name: &str) -> CfgResult<i64> {
        self.locals
            .get(name)
            .copied()
            .ok_or_else(|| CfgError::MissingLocal(name.to_string()))
    }

    /// Read a local holding a byte offset.
    pub fn offset(&self, name: &str) -> CfgResult<usize> {
        let value = self.local(name)?;
        usize::try_from(value).map_err(|_| CfgError::MissingLocal(name.to_string()))
    }
}

/// A parameterized stub body.
///
/// Building is deferred to first resolution so the registry can declare the
/// whole catalogue up front.
pub trait StubTemplate: Send + Sync {
    /// Emit the body of `name` under `config`.
    fn build(&self, name: &str, config: &StubConfig) -> CfgResult<Cfg>;
}

impl<F> StubTemplate for F
where
    F: Fn(&str, &StubConfig) -> CfgResult<Cfg> + Send + Sync,
{
    fn build(&self, name: &str, config: &StubConfig) -> CfgResult<Cfg> {
        self(name, config)
    }
}
