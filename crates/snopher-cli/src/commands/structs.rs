//! Struct commands - by pointer, by value with status, native-owned strings

use anyhow::{Context, Result};
use snopher_ffi::{Bindings, PersonRecord, UserInfoRecord};

pub fn fill(native: &Bindings, first: &str, last: &str) -> Result<()> {
    let person = PersonRecord::new(first, last);
    println!("{}", native.fill(&person)?);
    Ok(())
}

pub fn even(native: &Bindings, value: i64, non_negative: bool) -> Result<()> {
    let even = if non_negative {
        native.even_non_negative(value)?
    } else {
        native.even(value)?
    };
    println!("{}", even);
    Ok(())
}

/// Every record is read and released before the next name is requested
pub fn user_info(native: &Bindings, names: &[String], json: bool) -> Result<()> {
    let mut records: Vec<UserInfoRecord> = Vec::with_capacity(names.len());
    for name in names {
        let record = native
            .user_info_record(name)
            .with_context(|| format!("Failed to fetch user info for '{}'", name))?;
        records.push(record);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        for record in &records {
            println!("{}", record.description);
        }
    }
    Ok(())
}
