//! snopher-ffi - safe marshaling across a C ABI
//!
//! Calls functions of a precompiled native library with declared
//! signatures, and moves scalars, buffers, strings, string arrays, structs
//! and allocator-callback results across the boundary with explicit
//! ownership:
//!
//! - `loader`: library handles (`NativeLibrary`, `StaticSymbols`)
//! - `types` / `signature`: parameter and return kinds, validation
//! - `buffer` / `callbacks`: host-owned views, native-owned buffers, allocator arena
//! - `structs`: `#[repr(C)]` mirrors, release policies, lifecycle guards
//! - `bindings`: typed wrappers over the snopher native library
//!
//! # Example
//!
//! ```no_run
//! use snopher_ffi::{Bindings, NativeLibrary};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let library = NativeLibrary::open("target/debug/libsnopher_native.so")?.install()?;
//! let native = Bindings::resolve(library)?;
//! assert_eq!(native.add(10, 15)?, 25);
//! assert_eq!(native.squares(&[1.0, 2.0, 3.0])?, vec![1.0, 4.0, 9.0]);
//! # Ok(())
//! # }
//! ```

pub mod bindings;
pub mod buffer;
pub mod callbacks;
pub mod caller;
pub mod error;
pub mod loader;
pub mod marshal;
pub mod ownership;
pub mod signature;
pub mod structs;
pub mod types;

pub use bindings::{catalog, Bindings, SquareRoots, DEFAULT_STRING_CAPACITY};
pub use buffer::{BufferView, BufferViewMut, Column, Element, NativeBuffer};
pub use callbacks::{AllocArena, AllocFn, ArenaBuffer, ArenaData};
pub use caller::{Arg, NativeFunction};
pub use error::{FfiError, FfiResult, LoadError, MarshalError};
pub use loader::{NativeLibrary, StaticSymbols, SymbolSource};
pub use marshal::MarshalContext;
pub use ownership::{LedgerSnapshot, ResourceKind};
pub use signature::Signature;
pub use structs::{
    EvenResult, NativeError, NativeOwned, NativeStruct, Person, PersonMarshal, PersonRecord,
    ReleasePolicy, StructLifecycle, StructState, UserInfo, UserInfoRecord,
};
pub use types::{CType, ElemType, ParamKind, ReturnKind};
