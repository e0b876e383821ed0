pub mod alloc;
pub mod describe;
pub mod elementwise;
pub mod inplace;
pub mod scalar;
pub mod strings;
pub mod structs;

use anyhow::{Context, Result};
use snopher_config::Config;
use snopher_ffi::{Bindings, NativeLibrary};
use std::fmt::Display;

/// Open the configured library, install it for the process and bind the catalog
pub fn connect(config: &Config) -> Result<Bindings> {
    let path = config.require_library()?;
    let library = NativeLibrary::open(path)
        .with_context(|| format!("Failed to load native library: {}", path.display()))?
        .install()?;
    let native = Bindings::resolve(library)
        .with_context(|| format!("Failed to bind functions of {}", path.display()))?;
    Ok(native.with_string_capacity(config.string_capacity()))
}

/// Space-separated values on one line
pub(crate) fn print_values<T: Display>(values: &[T]) {
    let line: Vec<String> = values.iter().map(ToString::to_string).collect();
    println!("{}", line.join(" "));
}
