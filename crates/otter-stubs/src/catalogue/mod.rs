//! Stub catalogue
//!
//! Each family is one builder function taking its variant as an enum and
//! emitting the control-flow graph for that variant. Layout constants reach
//! the builders through the stub config's locals.
//!
//! | family    | stubs |
//! |-----------|-------|
//! | property  | `getPropertySlot_Miss`, `{load,store,delete}PropertySlot` |
//! | alloc     | `allocTagged/<kind>`, `allocField`, `allocObject`, `allocFn`, `allocAccessPair`, `new` |
//! | construct | `Object`, `Function`, `FunctionProtoGetter`, `FunctionProtoSetter` |
//! | types     | `checkFunction`, `coerce/boolean` |
//! | unary     | `unary/-` |
//! | binary    | `binary/{+,-,*,<,<=,>,>=,==,!=,instanceof}` |

pub mod alloc;
pub mod binary;
pub mod construct;
pub mod property;
pub mod types;
pub mod unary;

use crate::registry::StubRegistry;

pub use alloc::ALLOC_TAGGED_KINDS;
pub use binary::BinaryOp;
pub use property::PropertyOp;
pub use unary::UnaryOp;

/// Declare every catalogue stub.
pub fn declare_all(registry: &StubRegistry) {
    property::declare(registry);
    alloc::declare(registry);
    construct::declare(registry);
    types::declare(registry);
    unary::declare(registry);
    binary::declare(registry);
}

/// Names of every catalogue stub.
pub fn stub_names() -> Vec<String> {
    let mut names = vec![property::MISS.to_string()];
    names.extend(PropertyOp::ALL.iter().map(|op| op.stub_name().to_string()));
    names.extend(ALLOC_TAGGED_KINDS.iter().map(|kind| alloc::tagged_name(*kind)));
    names.extend(
        [
            alloc::ALLOC_FIELD,
            alloc::ALLOC_OBJECT,
            alloc::ALLOC_FN,
            alloc::ALLOC_ACCESS_PAIR,
            alloc::NEW,
            construct::OBJECT,
            construct::FUNCTION,
            construct::PROTO_GETTER,
            construct::PROTO_SETTER,
            types::CHECK_FUNCTION,
        ]
        .iter()
        .map(|name| name.to_string()),
    );
    names.extend(types::COERCE_KINDS.iter().map(|kind| types::coerce_name(*kind)));
    names.extend(UnaryOp::ALL.iter().map(|op| op.stub_name()));
    names.extend(BinaryOp::ALL.iter().map(|op| op.stub_name()));
    names
}
