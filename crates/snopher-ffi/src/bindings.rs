//! Typed bindings for the snopher native library
//!
//! `Bindings::resolve` binds every exported function up front, so a missing
//! symbol is a `LoadError` before anything runs. Each method validates its
//! host arguments, makes one native call, and hands back owned host values;
//! native allocations never outlive the method unless returned in a guard.

use crate::buffer::{c_len, Column, NativeBuffer};
use crate::callbacks::{AllocArena, ArenaBuffer};
use crate::caller::{Arg, NativeFunction};
use crate::error::{FfiError, FfiResult, LoadError, MarshalError};
use crate::loader::SymbolSource;
use crate::marshal::decode_c_buffer;
use crate::signature::Signature;
use crate::structs::{
    EvenResult, NativeOwned, PersonMarshal, PersonRecord, UserInfo, UserInfoRecord,
};
use crate::types::{ElemType, ParamKind, ReturnKind};
use serde::Serialize;
use std::ffi::c_void;

/// Output buffer size for string functions, in bytes
pub const DEFAULT_STRING_CAPACITY: usize = 1000;

const F64_IN: ParamKind = ParamKind::Buffer(ElemType::Float64);
const F64_OUT: ParamKind = ParamKind::BufferMut(ElemType::Float64);
const I64_OUT: ParamKind = ParamKind::BufferMut(ElemType::Int64);
const BYTES_OUT: ParamKind = ParamKind::BufferMut(ElemType::Byte);

/// Every exported function with its C signature, in header order
pub fn catalog() -> Vec<(&'static str, Signature)> {
    use ParamKind::{AllocCallback, CStr, CStrArray, Int64, StructByPointer, StructByValue};
    vec![
        ("add", Signature::new([Int64, Int64], ReturnKind::Int64)),
        ("squares", Signature::new([F64_IN, F64_OUT, Int64], ReturnKind::Void)),
        ("normalize", Signature::new([F64_IN, F64_OUT, Int64], ReturnKind::Void)),
        ("dot", Signature::new([F64_IN, Int64, F64_IN, Int64], ReturnKind::Float64)),
        ("shuffle", Signature::new([F64_OUT, Int64], ReturnKind::Void)),
        ("increase", Signature::new([I64_OUT, Int64, Int64], ReturnKind::Void)),
        ("repeat", Signature::new([CStr, Int64, BYTES_OUT, Int64], ReturnKind::CStr)),
        ("join", Signature::new([CStrArray, CStr, BYTES_OUT, Int64], ReturnKind::Int64)),
        ("fill", Signature::new([StructByPointer("person")], ReturnKind::Void)),
        ("even", Signature::new([Int64], ReturnKind::Struct("even_result"))),
        ("evenNonNegative", Signature::new([Int64], ReturnKind::Struct("even_result"))),
        ("delError", Signature::new([StructByValue("error")], ReturnKind::Void)),
        ("getUserInfo", Signature::new([CStr], ReturnKind::Struct("user_info"))),
        ("delUserInfo", Signature::new([StructByValue("user_info")], ReturnKind::Void)),
        ("sqrts", Signature::new([AllocCallback, Int64], ReturnKind::Void)),
        ("iota", Signature::new([Int64], ReturnKind::Buffer(ElemType::Int64))),
        ("delInts", Signature::new([I64_OUT, Int64], ReturnKind::Void)),
        ("liveAllocations", Signature::new(Vec::new(), ReturnKind::Int64)),
    ]
}

/// Result of `sqrts`: the header string and the roots, in allocation order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SquareRoots {
    pub header: String,
    pub roots: Vec<f64>,
}

/// Handles to every function of the native library
#[derive(Debug, Clone)]
pub struct Bindings {
    library: String,
    string_capacity: usize,
    add: NativeFunction,
    squares: NativeFunction,
    normalize: NativeFunction,
    dot: NativeFunction,
    shuffle: NativeFunction,
    increase: NativeFunction,
    repeat: NativeFunction,
    join: NativeFunction,
    fill: NativeFunction,
    even: NativeFunction,
    even_non_negative: NativeFunction,
    del_error: NativeFunction,
    get_user_info: NativeFunction,
    del_user_info: NativeFunction,
    sqrts: NativeFunction,
    iota: NativeFunction,
    del_ints: NativeFunction,
    live_allocations: NativeFunction,
}

impl Bindings {
    /// Bind the whole catalog against `source`
    pub fn resolve(source: &'static dyn SymbolSource) -> Result<Self, LoadError> {
        let mut bound = Vec::new();
        for (name, signature) in catalog() {
            // Safety: `catalog` mirrors the C declarations of the library.
            bound.push(unsafe { source.bind(name, signature) }?);
        }
        let mut functions = bound.into_iter();
        let mut next = || {
            functions.next().ok_or_else(|| LoadError::SymbolNotFound {
                library: source.describe(),
                symbol: "<catalog>".to_string(),
            })
        };
        let bindings = Self {
            library: source.describe(),
            string_capacity: DEFAULT_STRING_CAPACITY,
            add: next()?,
            squares: next()?,
            normalize: next()?,
            dot: next()?,
            shuffle: next()?,
            increase: next()?,
            repeat: next()?,
            join: next()?,
            fill: next()?,
            even: next()?,
            even_non_negative: next()?,
            del_error: next()?,
            get_user_info: next()?,
            del_user_info: next()?,
            sqrts: next()?,
            iota: next()?,
            del_ints: next()?,
            live_allocations: next()?,
        };
        tracing::debug!(library = %bindings.library, "native bindings resolved");
        Ok(bindings)
    }

    /// Output buffer size used by `repeat`, `join` and `fill`
    pub fn with_string_capacity(mut self, capacity: usize) -> Self {
        self.string_capacity = capacity;
        self
    }

    pub fn string_capacity(&self) -> usize {
        self.string_capacity
    }

    pub fn library(&self) -> &str {
        &self.library
    }

    /// Every bound function, in catalog order
    pub fn functions(&self) -> [&NativeFunction; 18] {
        [
            &self.add,
            &self.squares,
            &self.normalize,
            &self.dot,
            &self.shuffle,
            &self.increase,
            &self.repeat,
            &self.join,
            &self.fill,
            &self.even,
            &self.even_non_negative,
            &self.del_error,
            &self.get_user_info,
            &self.del_user_info,
            &self.sqrts,
            &self.iota,
            &self.del_ints,
            &self.live_allocations,
        ]
    }

    pub fn add(&self, a: i64, b: i64) -> FfiResult<i64> {
        unsafe { self.add.call(&[Arg::Int64(a), Arg::Int64(b)]) }?.as_i64()
    }

    pub fn squares(&self, input: &[f64]) -> FfiResult<Vec<f64>> {
        let mut output = vec![0.0; input.len()];
        self.squares_into(input, &mut output)?;
        Ok(output)
    }

    /// Squares of `input` written to the front of `output`
    pub fn squares_into(&self, input: &[f64], output: &mut [f64]) -> FfiResult<()> {
        elementwise(&self.squares, input, output)
    }

    /// `input` divided by its Euclidean norm
    pub fn normalize(&self, input: &[f64]) -> FfiResult<Vec<f64>> {
        let mut output = vec![0.0; input.len()];
        elementwise(&self.normalize, input, &mut output)?;
        Ok(output)
    }

    /// Dot product over the common prefix of `a` and `b`
    pub fn dot(&self, a: &[f64], b: &[f64]) -> FfiResult<f64> {
        let args = [
            Arg::buffer(a),
            Arg::Int64(c_len(a.len())?),
            Arg::buffer(b),
            Arg::Int64(c_len(b.len())?),
        ];
        unsafe { self.dot.call(&args) }?.as_f64()
    }

    /// Deterministic permutation in place
    pub fn shuffle(&self, values: &mut [f64]) -> FfiResult<()> {
        let len = c_len(values.len())?;
        unsafe { self.shuffle.call(&[Arg::buffer_mut(values), Arg::Int64(len)]) }?;
        Ok(())
    }

    /// Add `delta` to every value of an `i64` column in place
    ///
    /// Any other dtype is refused; convert it explicitly first.
    pub fn increase(&self, column: &mut Column, delta: i64) -> FfiResult<()> {
        column.expect_dtype(ElemType::Int64)?;
        let len = c_len(column.len())?;
        let args = [Arg::BufferMut(column.view_mut()), Arg::Int64(len), Arg::Int64(delta)];
        unsafe { self.increase.call(&args) }?;
        Ok(())
    }

    pub fn increase_values(&self, values: &mut [i64], delta: i64) -> FfiResult<()> {
        let len = c_len(values.len())?;
        let args = [Arg::buffer_mut(values), Arg::Int64(len), Arg::Int64(delta)];
        unsafe { self.increase.call(&args) }?;
        Ok(())
    }

    /// `text` repeated `count` times
    pub fn repeat(&self, text: &str, count: i64) -> FfiResult<String> {
        let mut out = vec![0_u8; self.string_capacity];
        self.repeat_into(text, count, &mut out)
    }

    /// Repeat into a caller-supplied buffer and decode the result
    ///
    /// Output that would not fit, terminator included, is refused before the call.
    pub fn repeat_into(&self, text: &str, count: i64, out: &mut [u8]) -> FfiResult<String> {
        let needed = text
            .len()
            .checked_mul(usize::try_from(count).unwrap_or(0))
            .and_then(|n| n.checked_add(1))
            .ok_or(MarshalError::LengthOverflow(usize::MAX))?;
        if needed > out.len() {
            return Err(MarshalError::CapacityExceeded {
                needed,
                capacity: out.len(),
            }
            .into());
        }
        let start = out.as_mut_ptr() as *mut c_void;
        let capacity = c_len(out.len())?;
        let returned = unsafe {
            self.repeat.call(&[
                Arg::Str(text),
                Arg::Int64(count),
                Arg::buffer_mut(&mut *out),
                Arg::Int64(capacity),
            ])
        }?
        .as_ptr()?;
        if returned != start {
            return Err(FfiError::mismatch("pointer to the output buffer", "foreign pointer"));
        }
        Ok(decode_c_buffer(out)?)
    }

    /// `words` joined with `separator`
    pub fn join(&self, words: &[&str], separator: &str) -> FfiResult<String> {
        let mut out = vec![0_u8; self.string_capacity];
        let capacity = c_len(out.len())?;
        let written = unsafe {
            self.join.call(&[
                Arg::StrArray(words),
                Arg::Str(separator),
                Arg::buffer_mut(&mut out),
                Arg::Int64(capacity),
            ])
        }?
        .as_i64()?;
        if written < 0 {
            let text: usize = words.iter().map(|w| w.len()).sum();
            let separators = separator.len() * words.len().saturating_sub(1);
            return Err(MarshalError::CapacityExceeded {
                needed: text + separators + 1,
                capacity: out.len(),
            }
            .into());
        }
        Ok(decode_c_buffer(&out)?)
    }

    /// Full name built natively from a host person record
    pub fn fill(&self, person: &PersonRecord) -> FfiResult<String> {
        let mut marshal = PersonMarshal::new(person, self.string_capacity)?;
        marshal.pass(|raw| unsafe { self.fill.call_struct_arg(raw) })?;
        let full_name = marshal.full_name()?;
        marshal.finish()?;
        Ok(full_name)
    }

    /// Whether `value` is even; never a native fault
    pub fn even(&self, value: i64) -> FfiResult<bool> {
        self.checked_even(&self.even, value)
    }

    /// Like `even`, but negative input is a `NativeFault`
    pub fn even_non_negative(&self, value: i64) -> FfiResult<bool> {
        self.checked_even(&self.even_non_negative, value)
    }

    fn checked_even(&self, function: &NativeFunction, value: i64) -> FfiResult<bool> {
        let raw = unsafe { function.call_returning::<EvenResult>(&[Arg::Int64(value)]) }?;
        let owned = unsafe { NativeOwned::new(function.name(), raw, self.del_error.clone()) }?;
        owned.into_record()
    }

    /// Native user record, released when the guard goes
    pub fn user_info(&self, name: &str) -> FfiResult<NativeOwned<UserInfo>> {
        let raw = unsafe { self.get_user_info.call_returning::<UserInfo>(&[Arg::Str(name)]) }?;
        unsafe { NativeOwned::new(self.get_user_info.name(), raw, self.del_user_info.clone()) }
    }

    /// Copy of the user record, already released
    pub fn user_info_record(&self, name: &str) -> FfiResult<UserInfoRecord> {
        self.user_info(name)?.into_record()
    }

    /// Header and `count` square roots, produced through the allocator callback
    pub fn sqrts(&self, count: i64) -> FfiResult<SquareRoots> {
        let buffers = self.sqrts_buffers(count)?;
        match buffers.as_slice() {
            [header, roots] => Ok(SquareRoots {
                header: header.to_text()?,
                roots: roots
                    .as_f64()
                    .ok_or_else(|| FfiError::mismatch("f64 buffer", roots.elem().display_name()))?
                    .to_vec(),
            }),
            other => Err(FfiError::mismatch(
                "2 callback buffers",
                format!("{} callback buffers", other.len()),
            )),
        }
    }

    /// Every buffer `sqrts` asked the host for, in invocation order
    pub fn sqrts_buffers(&self, count: i64) -> FfiResult<Vec<ArenaBuffer>> {
        let (result, buffers) = AllocArena::scope(|alloc| unsafe {
            self.sqrts.call(&[Arg::Callback(alloc), Arg::Int64(count)])
        })?;
        result?;
        Ok(buffers)
    }

    /// Natively allocated `[0, 1, ..., count-1]`
    pub fn iota(&self, count: i64) -> FfiResult<NativeBuffer<i64>> {
        let ptr = unsafe { self.iota.call(&[Arg::Int64(count)]) }?.as_ptr()?;
        let len = usize::try_from(count).unwrap_or(0);
        if ptr.is_null() && len > 0 {
            return Err(FfiError::NativeFault {
                function: "iota".to_string(),
                message: format!("could not allocate {} values", count),
            });
        }
        // Safety: iota returns `count` initialised values (or null) freed by delInts.
        Ok(unsafe { NativeBuffer::from_raw(ptr as *mut i64, len, self.del_ints.clone()) })
    }

    /// Outstanding native allocations on the calling thread
    pub fn live_allocations(&self) -> FfiResult<i64> {
        unsafe { self.live_allocations.call(&[]) }?.as_i64()
    }
}

fn elementwise(function: &NativeFunction, input: &[f64], output: &mut [f64]) -> FfiResult<()> {
    if output.len() < input.len() {
        return Err(MarshalError::CapacityExceeded {
            needed: input.len() * ElemType::Float64.size(),
            capacity: output.len() * ElemType::Float64.size(),
        }
        .into());
    }
    let len = c_len(input.len())?;
    let args = [Arg::buffer(input), Arg::buffer_mut(output), Arg::Int64(len)];
    unsafe { function.call(&args) }?;
    Ok(())
}
