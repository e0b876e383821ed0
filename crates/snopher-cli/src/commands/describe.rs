//! Describe command - list bound functions and their C signatures

use anyhow::Result;
use serde::Serialize;
use snopher_ffi::{Bindings, Signature};

#[derive(Serialize)]
struct FunctionEntry<'a> {
    name: &'a str,
    signature: &'a Signature,
    display: String,
}

pub fn run(native: &Bindings, json: bool) -> Result<()> {
    let functions = native.functions();
    let entries: Vec<FunctionEntry<'_>> = functions
        .iter()
        .map(|f| FunctionEntry {
            name: f.name(),
            signature: f.signature(),
            display: f.signature().to_string(),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("{} ({} functions)", native.library(), entries.len());
    for entry in &entries {
        println!("  {:<16} {}", entry.name, entry.display);
    }
    Ok(())
}
