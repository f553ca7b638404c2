//! # Otter Stub Heap
//!
//! Object model shared by the stub library and its executor.
//!
//! ## Design
//!
//! - **Tagged values**: one tag bit separates small integers from pointers
//! - **Maps**: every entity starts with a map reference describing its shape
//! - **Bump region**: a single `current`/`limit` cursor, reclamation is external

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod allocator;
pub mod config;
pub mod error;
pub mod heap;
pub mod layout;
pub mod pin;
pub mod value;

pub use allocator::BumpAllocator;
pub use config::HeapConfig;
pub use error::{HeapError, HeapResult};
pub use heap::{Heap, Roots};
pub use layout::EntityKind;
pub use pin::{HeapPin, PinGuard};
pub use value::Value;
