//! Shared helpers: the native library linked statically, bound by name

#![allow(dead_code)]

use snopher_ffi::{Bindings, StaticSymbols};
use std::sync::OnceLock;

pub use pretty_assertions::assert_eq;

pub fn symbols() -> &'static StaticSymbols {
    static SYMBOLS: OnceLock<StaticSymbols> = OnceLock::new();
    SYMBOLS.get_or_init(|| {
        use snopher_native as n;
        StaticSymbols::new("snopher_native (static)")
            .with("add", n::add as *const ())
            .with("squares", n::squares as *const ())
            .with("normalize", n::normalize as *const ())
            .with("dot", n::dot as *const ())
            .with("shuffle", n::shuffle as *const ())
            .with("increase", n::increase as *const ())
            .with("repeat", n::repeat as *const ())
            .with("join", n::join as *const ())
            .with("fill", n::fill as *const ())
            .with("even", n::even as *const ())
            .with("evenNonNegative", n::evenNonNegative as *const ())
            .with("delError", n::delError as *const ())
            .with("getUserInfo", n::getUserInfo as *const ())
            .with("delUserInfo", n::delUserInfo as *const ())
            .with("sqrts", n::sqrts as *const ())
            .with("iota", n::iota as *const ())
            .with("delInts", n::delInts as *const ())
            .with("liveAllocations", n::liveAllocations as *const ())
    })
}

/// Bindings over the statically linked library
pub fn native() -> Bindings {
    Bindings::resolve(symbols()).expect("every catalog symbol is registered")
}

/// Native allocations outstanding on this thread
pub fn live() -> i64 {
    snopher_native::liveAllocations()
}
