//! General runtime interface
//!
//! Stubs fall back to the runtime by id. The runtime receives the executing
//! [`Machine`] so it can read the heap and invoke getters and setters.

use otter_stub_heap::{EntityKind, Value};

use crate::exec::Machine;
use crate::trap::{FatalReason, Trap};

/// General runtime entry points reachable from stubs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeId {
    /// `getProperty(obj, key)`
    GetProperty,
    /// `setProperty(obj, key, value)`
    SetProperty,
    /// `deleteProperty(obj, key)`
    DeleteProperty,
    /// `getPropertySlot(ic, obj, key, update)`
    GetPropertySlot,
    /// `coerce/<kind>(value)`
    Coerce(EntityKind),
}

impl RuntimeId {
    /// Name of the entry point.
    pub fn name(self) -> String {
        match self {
            RuntimeId::GetProperty => "getProperty".to_string(),
            RuntimeId::SetProperty => "setProperty".to_string(),
            RuntimeId::DeleteProperty => "deleteProperty".to_string(),
            RuntimeId::GetPropertySlot => "getPropertySlot".to_string(),
            RuntimeId::Coerce(kind) => format!("coerce/{}", kind.name()),
        }
    }
}

/// Slow paths stubs delegate to.
pub trait Runtime {
    /// Run the entry point `id` with `args` in push order reversed
    /// (`args[0]` is the first operand).
    fn call(&mut self, vm: &mut Machine, id: RuntimeId, args: &[Value]) -> Result<Value, Trap>;
}

/// Runtime with no entry points. Every call traps.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRuntime;

impl Runtime for NoRuntime {
    fn call(&mut self, _vm: &mut Machine, id: RuntimeId, _args: &[Value]) -> Result<Value, Trap> {
        Err(Trap::Fatal(FatalReason::RuntimeUnavailable(id.name())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerce_ids_are_named_by_kind() {
        assert_eq!(RuntimeId::Coerce(EntityKind::Boolean).name(), "coerce/boolean");
        assert_eq!(RuntimeId::GetPropertySlot.name(), "getPropertySlot");
    }
}
