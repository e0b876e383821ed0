//! In-place mutation commands

use super::print_values;
use crate::Dtype;
use anyhow::{Context, Result};
use snopher_ffi::{Bindings, Column, ElemType};

pub fn shuffle(native: &Bindings, mut values: Vec<f64>) -> Result<()> {
    native.shuffle(&mut values)?;
    print_values(&values);
    Ok(())
}

/// Builds a column of the requested dtype; int32 columns only reach the
/// native call when `convert` is set.
pub fn increase(
    native: &Bindings,
    values: Vec<i64>,
    by: i64,
    dtype: Dtype,
    convert: bool,
) -> Result<()> {
    let column = match dtype {
        Dtype::Int64 => Column::Int64(values),
        Dtype::Int32 => Column::Int32(
            values
                .into_iter()
                .map(i32::try_from)
                .collect::<Result<Vec<i32>, _>>()
                .context("value out of range for int32")?,
        ),
    };

    let mut column = if convert {
        column.converted_to(ElemType::Int64)?
    } else {
        column
    };

    native
        .increase(&mut column, by)
        .context("increase needs an int64 column (pass --convert to convert it)")?;

    match column.as_i64() {
        Some(values) => print_values(values),
        None => anyhow::bail!("column is not int64 after increase"),
    }
    Ok(())
}
