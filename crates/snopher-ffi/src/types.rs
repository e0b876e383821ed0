//! FFI type system - parameter and return kinds for the C boundary
//!
//! Defines:
//! - `ElemType`: element type of a contiguous buffer
//! - `ParamKind` / `ReturnKind`: how one argument or result crosses the boundary
//! - `CType`: lowered runtime value actually passed to or returned from native code
//!
//! Kind mapping after lowering:
//! - ParamKind::Int64 → CType::Long(i64)
//! - ParamKind::Float64 → CType::Double(f64)
//! - ParamKind::CStr, Buffer, BufferMut, CStrArray, StructByPointer → CType::Ptr
//! - ParamKind::AllocCallback → CType::Callback
//! - ParamKind::StructByValue → passed as the `#[repr(C)]` value itself

use crate::callbacks::AllocFn;
use crate::error::{FfiError, FfiResult};
use serde::Serialize;
use std::ffi::c_void;

/// Element type of a typed buffer
///
/// The type codes follow the Python `array` module, which is what the
/// allocator callback receives from native code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ElemType {
    Int64,
    Int32,
    Float64,
    Float32,
    Byte,
}

impl ElemType {
    /// Array type code (`q`, `i`, `d`, `f`, `B`)
    pub fn type_code(self) -> char {
        match self {
            ElemType::Int64 => 'q',
            ElemType::Int32 => 'i',
            ElemType::Float64 => 'd',
            ElemType::Float32 => 'f',
            ElemType::Byte => 'B',
        }
    }

    pub fn from_type_code(code: &str) -> Option<Self> {
        match code {
            "q" => Some(ElemType::Int64),
            "i" => Some(ElemType::Int32),
            "d" => Some(ElemType::Float64),
            "f" => Some(ElemType::Float32),
            "B" => Some(ElemType::Byte),
            _ => None,
        }
    }

    /// Size of one element in bytes
    pub fn size(self) -> usize {
        match self {
            ElemType::Int64 | ElemType::Float64 => 8,
            ElemType::Int32 | ElemType::Float32 => 4,
            ElemType::Byte => 1,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ElemType::Int64 => "i64",
            ElemType::Int32 => "i32",
            ElemType::Float64 => "f64",
            ElemType::Float32 => "f32",
            ElemType::Byte => "u8",
        }
    }
}

/// How one parameter crosses the boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    /// `int64_t`
    Int64,
    /// `double`
    Float64,
    /// `const char*`, NUL-terminated, valid for the call
    CStr,
    /// `const T*` over a host-owned buffer
    Buffer(ElemType),
    /// `T*` over a host-owned buffer the callee writes in place
    BufferMut(ElemType),
    /// `const char**` terminated by a null pointer
    CStrArray,
    /// Struct copied into the call
    StructByValue(&'static str),
    /// Pointer to a host-owned struct the callee may write
    StructByPointer(&'static str),
    /// `void* (*)(char* type_code, int64_t n)`
    AllocCallback,
}

impl ParamKind {
    pub fn display_name(&self) -> String {
        match self {
            ParamKind::Int64 => "i64".to_string(),
            ParamKind::Float64 => "f64".to_string(),
            ParamKind::CStr => "char*".to_string(),
            ParamKind::Buffer(elem) => format!("*const {}", elem.display_name()),
            ParamKind::BufferMut(elem) => format!("*mut {}", elem.display_name()),
            ParamKind::CStrArray => "char**".to_string(),
            ParamKind::StructByValue(name) => format!("struct {}", name),
            ParamKind::StructByPointer(name) => format!("*mut struct {}", name),
            ParamKind::AllocCallback => "alloc_f".to_string(),
        }
    }
}

/// How the result crosses back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnKind {
    Void,
    Int64,
    Float64,
    /// `char*` pointing into memory the host already owns
    CStr,
    /// `T*` to a buffer allocated by the callee
    Buffer(ElemType),
    /// Struct returned by value
    Struct(&'static str),
}

impl ReturnKind {
    pub fn display_name(&self) -> String {
        match self {
            ReturnKind::Void => "void".to_string(),
            ReturnKind::Int64 => "i64".to_string(),
            ReturnKind::Float64 => "f64".to_string(),
            ReturnKind::CStr => "char*".to_string(),
            ReturnKind::Buffer(elem) => format!("*mut {}", elem.display_name()),
            ReturnKind::Struct(name) => format!("struct {}", name),
        }
    }
}

/// Lowered value at the FFI boundary
#[derive(Debug, Clone, Copy)]
pub enum CType {
    Long(i64),
    Double(f64),
    /// Any data pointer (buffers, strings, string arrays, structs by pointer)
    Ptr(*mut c_void),
    Callback(AllocFn),
    Void,
}

impl CType {
    pub fn as_i64(&self) -> FfiResult<i64> {
        match self {
            CType::Long(v) => Ok(*v),
            other => Err(FfiError::mismatch("i64", other.type_name())),
        }
    }

    pub fn as_f64(&self) -> FfiResult<f64> {
        match self {
            CType::Double(v) => Ok(*v),
            other => Err(FfiError::mismatch("f64", other.type_name())),
        }
    }

    pub fn as_ptr(&self) -> FfiResult<*mut c_void> {
        match self {
            CType::Ptr(p) => Ok(*p),
            other => Err(FfiError::mismatch("pointer", other.type_name())),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            CType::Long(_) => "i64",
            CType::Double(_) => "f64",
            CType::Ptr(_) => "pointer",
            CType::Callback(_) => "alloc_f",
            CType::Void => "void",
        }
    }
}

// Manual PartialEq because we can't derive it for function pointers
impl PartialEq for CType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CType::Long(a), CType::Long(b)) => a == b,
            (CType::Double(a), CType::Double(b)) => a == b,
            (CType::Ptr(a), CType::Ptr(b)) => a == b,
            (CType::Callback(a), CType::Callback(b)) => *a as usize == *b as usize,
            (CType::Void, CType::Void) => true,
            _ => false,
        }
    }
}
