//! Elementwise and reduction commands over float buffers

use super::print_values;
use anyhow::Result;
use snopher_ffi::Bindings;

pub fn squares(native: &Bindings, values: &[f64]) -> Result<()> {
    print_values(&native.squares(values)?);
    Ok(())
}

pub fn normalize(native: &Bindings, values: &[f64]) -> Result<()> {
    print_values(&native.normalize(values)?);
    Ok(())
}

pub fn dot(native: &Bindings, a: &[f64], b: &[f64]) -> Result<()> {
    if a.len() != b.len() {
        tracing::info!(
            left = a.len(),
            right = b.len(),
            "vector lengths differ, using the shorter"
        );
    }
    println!("{}", native.dot(a, b)?);
    Ok(())
}
