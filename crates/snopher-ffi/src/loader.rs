//! Library handles - where native code pointers come from
//!
//! `NativeLibrary` opens one shared object by explicit path using
//! `libloading`; there are no search paths and no retries. Once installed it
//! stays mapped for the rest of the process, which is what makes the code
//! pointers handed out by `bind` valid for `'static`.
//!
//! `StaticSymbols` serves code that is linked into the binary instead.

use crate::caller::NativeFunction;
use crate::error::LoadError;
use crate::signature::Signature;
use libloading::{Library, Symbol};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Anything that can turn a symbol name into a code pointer
pub trait SymbolSource: Send + Sync + 'static {
    /// Human-readable origin, used in errors and logs
    fn describe(&self) -> String;

    fn resolve(&self, symbol: &str) -> Result<*const (), LoadError>;

    /// Resolve `name` and pair it with its declared signature
    ///
    /// # Safety
    ///
    /// The exported function must have exactly the C signature `signature`
    /// describes.
    unsafe fn bind(&'static self, name: &str, signature: Signature) -> Result<NativeFunction, LoadError> {
        let fn_ptr = self.resolve(name)?;
        tracing::debug!(library = %self.describe(), symbol = name, %signature, "bound native function");
        Ok(NativeFunction::new(name, fn_ptr, signature))
    }
}

static INSTALLED: OnceLock<NativeLibrary> = OnceLock::new();

/// A shared library opened from an explicit path
#[derive(Debug)]
pub struct NativeLibrary {
    path: PathBuf,
    library: Library,
}

impl NativeLibrary {
    /// Open the shared object at `path`
    ///
    /// Loading runs the library's initialisers; only open trusted files.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(LoadError::LibraryNotFound(path.display().to_string()));
        }
        let library = unsafe { Library::new(path) }.map_err(|e| LoadError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        tracing::debug!(path = %path.display(), "loaded native library");
        Ok(Self {
            path: path.to_path_buf(),
            library,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the library mapped for the rest of the process
    ///
    /// Only one library can be installed; a second install is rejected.
    pub fn install(self) -> Result<&'static NativeLibrary, LoadError> {
        let path = self.path.display().to_string();
        INSTALLED
            .set(self)
            .map_err(|_| LoadError::AlreadyInstalled(path.clone()))?;
        INSTALLED.get().ok_or(LoadError::LibraryNotFound(path))
    }

    /// The process-wide library, if one was installed
    pub fn installed() -> Option<&'static NativeLibrary> {
        INSTALLED.get()
    }
}

impl SymbolSource for NativeLibrary {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn resolve(&self, symbol: &str) -> Result<*const (), LoadError> {
        // Safety: the pointer is only called through a NativeFunction whose
        // signature the caller vouched for in `bind`.
        let found: Symbol<'_, unsafe extern "C" fn()> = unsafe { self.library.get(symbol.as_bytes()) }
            .map_err(|_| LoadError::SymbolNotFound {
                library: self.describe(),
                symbol: symbol.to_string(),
            })?;
        Ok(*found as *const ())
    }
}

/// Symbol table for native code linked into the current binary
#[derive(Debug, Default)]
pub struct StaticSymbols {
    name: String,
    table: HashMap<String, usize>,
}

impl StaticSymbols {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: HashMap::new(),
        }
    }

    /// Register `symbol` at `fn_ptr`
    pub fn with(mut self, symbol: &str, fn_ptr: *const ()) -> Self {
        self.table.insert(symbol.to_string(), fn_ptr as usize);
        self
    }

    pub fn leak(self) -> &'static StaticSymbols {
        Box::leak(Box::new(self))
    }
}

impl SymbolSource for StaticSymbols {
    fn describe(&self) -> String {
        self.name.clone()
    }

    fn resolve(&self, symbol: &str) -> Result<*const (), LoadError> {
        self.table
            .get(symbol)
            .map(|&addr| addr as *const ())
            .ok_or_else(|| LoadError::SymbolNotFound {
                library: self.name.clone(),
                symbol: symbol.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caller::Arg;
    use crate::types::{CType, ParamKind, ReturnKind};

    extern "C" fn triple(x: i64) -> i64 {
        x * 3
    }

    #[test]
    fn test_library_not_found() {
        let result = NativeLibrary::open("./definitely/missing/libnothing.so");
        assert_eq!(
            result.map(|_| ()),
            Err(LoadError::LibraryNotFound(
                "./definitely/missing/libnothing.so".to_string()
            ))
        );
    }

    #[test]
    fn test_not_a_library() {
        let manifest = Path::new(env!("CARGO_MANIFEST_DIR")).join("Cargo.toml");
        let result = NativeLibrary::open(&manifest);
        assert!(matches!(result, Err(LoadError::LoadFailed { .. })));
    }

    #[test]
    fn test_static_symbols_bind_and_call() {
        let source = StaticSymbols::new("test")
            .with("triple", triple as *const ())
            .leak();
        let sig = Signature::new([ParamKind::Int64], ReturnKind::Int64);
        let f = unsafe { source.bind("triple", sig) }.unwrap();
        assert_eq!(f.name(), "triple");
        assert_eq!(unsafe { f.call(&[Arg::Int64(14)]) }, Ok(CType::Long(42)));
    }

    #[test]
    fn test_static_symbol_missing() {
        let source = StaticSymbols::new("test").leak();
        let sig = Signature::new([ParamKind::Int64], ReturnKind::Int64);
        let result = unsafe { source.bind("sqrts", sig) };
        assert!(matches!(
            result,
            Err(LoadError::SymbolNotFound { ref symbol, .. }) if symbol == "sqrts"
        ));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_install_system_library() {
        let candidates = [
            "/lib/x86_64-linux-gnu/libc.so.6",
            "/lib/aarch64-linux-gnu/libc.so.6",
            "/lib64/libc.so.6",
            "/usr/lib/libc.so.6",
        ];
        let Some(library) = candidates
            .iter()
            .find_map(|path| NativeLibrary::open(path).ok())
        else {
            return;
        };
        let library = library.install().unwrap();
        assert!(NativeLibrary::installed().is_some());

        let labs = unsafe {
            library.bind(
                "labs",
                Signature::new([ParamKind::Int64], ReturnKind::Int64),
            )
        }
        .unwrap();
        assert_eq!(unsafe { labs.call(&[Arg::Int64(-7)]) }, Ok(CType::Long(7)));

        let again = candidates
            .iter()
            .find_map(|path| NativeLibrary::open(path).ok())
            .map(NativeLibrary::install);
        assert!(matches!(again, Some(Err(LoadError::AlreadyInstalled(_)))));
    }
}
