//! # Otter Stubs
//!
//! Named fast-path stubs for the VM: a registry that compiles each stub on
//! first use, and the catalogue of property, allocation, construction, type
//! and operator stubs.
//!
//! ## Example
//!
//! ```no_run
//! use otter_stub_cfg::Machine;
//! use otter_stub_heap::{Heap, Value};
//! use otter_stubs::{GeneralRuntime, StubRegistry};
//!
//! let heap = Heap::new().unwrap();
//! let registry = StubRegistry::with_catalogue(heap.pin_handle());
//! let mut vm = Machine::new(heap);
//! let mut rt = GeneralRuntime::new();
//!
//! let sum = registry
//!     .call("binary/+", &mut vm, &mut rt, &[Value::smi(40), Value::smi(2)])
//!     .unwrap();
//! assert_eq!(sum, Value::smi(42));
//! ```

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod catalogue;
pub mod error;
pub mod ic;
pub mod registry;
pub mod runtime;

pub use catalogue::{BinaryOp, PropertyOp, UnaryOp};
pub use error::{StubError, StubResult};
pub use ic::{InlineCacheState, InlineCacheTable};
pub use registry::{RegistryStats, Stub, StubRegistry};
pub use runtime::GeneralRuntime;
