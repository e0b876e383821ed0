//! String commands

use anyhow::Result;
use snopher_ffi::Bindings;

pub fn repeat(native: &Bindings, text: &str, count: i64) -> Result<()> {
    println!("{}", native.repeat(text, count)?);
    Ok(())
}

pub fn join(native: &Bindings, words: &[String], sep: &str) -> Result<()> {
    let words: Vec<&str> = words.iter().map(String::as_str).collect();
    println!("{}", native.join(&words, sep)?);
    Ok(())
}
