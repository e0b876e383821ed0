//! Scalar command - integers in, integer out

use anyhow::Result;
use snopher_ffi::Bindings;

pub fn add(native: &Bindings, a: i64, b: i64) -> Result<()> {
    println!("{}", native.add(a, b)?);
    Ok(())
}
