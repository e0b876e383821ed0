//! Commands whose results are allocated during the call

use super::print_values;
use anyhow::Result;
use snopher_ffi::Bindings;

pub fn sqrts(native: &Bindings, count: i64, json: bool) -> Result<()> {
    let result = native.sqrts(count)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", result.header);
        print_values(&result.roots);
    }
    Ok(())
}

pub fn iota(native: &Bindings, count: i64) -> Result<()> {
    let values = native.iota(count)?.into_vec()?;
    print_values(&values);
    Ok(())
}
