//! Cross-module scenario tests exercising the public API together, rather
//! than one module's internals in isolation.

mod end_to_end;
