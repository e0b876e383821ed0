//! Argument lowering - host values → C representations for one call
//!
//! `MarshalContext` owns every temporary the lowered arguments point into
//! (C strings, null-terminated string arrays) and keeps it alive until the
//! context is dropped after the call returns.
//!
//! Coming back, C strings are copied out immediately so no host value ever
//! aliases native memory.

use crate::caller::Arg;
use crate::error::{FfiError, FfiResult, MarshalError};
use crate::types::{CType, ParamKind};
use std::ffi::{c_char, c_void, CStr, CString};

/// Temporaries backing the lowered arguments of one call
#[derive(Debug, Default)]
pub struct MarshalContext {
    allocated_strings: Vec<CString>,
    string_arrays: Vec<Vec<*const c_char>>,
}

impl MarshalContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// NUL-terminated copy of `s`, valid until the context drops
    pub fn c_string(&mut self, s: &str) -> Result<*const c_char, MarshalError> {
        let c_string = CString::new(s).map_err(|e| {
            MarshalError::InvalidString(format!("String contains null byte: {}", e))
        })?;
        // The heap buffer does not move when the CString moves into the Vec.
        let ptr = c_string.as_ptr();
        self.allocated_strings.push(c_string);
        Ok(ptr)
    }

    /// `const char**` terminated by a null pointer
    pub fn c_string_array(&mut self, items: &[&str]) -> Result<*const *const c_char, MarshalError> {
        let mut pointers = Vec::with_capacity(items.len() + 1);
        for item in items {
            pointers.push(self.c_string(item)?);
        }
        pointers.push(std::ptr::null());
        let ptr = pointers.as_ptr();
        self.string_arrays.push(pointers);
        Ok(ptr)
    }

    /// Lower one argument for its declared kind
    pub fn lower(&mut self, arg: &Arg<'_>, kind: &ParamKind) -> FfiResult<CType> {
        match (arg, kind) {
            (Arg::Int64(v), ParamKind::Int64) => Ok(CType::Long(*v)),
            (Arg::Float64(v), ParamKind::Float64) => Ok(CType::Double(*v)),
            (Arg::Str(s), ParamKind::CStr) => Ok(CType::Ptr(self.c_string(s)? as *mut c_void)),
            (Arg::Buffer(view), ParamKind::Buffer(elem)) if view.elem() == *elem => {
                Ok(CType::Ptr(view.as_ptr() as *mut c_void))
            }
            (Arg::BufferMut(view), ParamKind::BufferMut(elem)) if view.elem() == *elem => {
                Ok(CType::Ptr(view.as_mut_ptr()))
            }
            (Arg::StrArray(items), ParamKind::CStrArray) => {
                Ok(CType::Ptr(self.c_string_array(items)? as *mut c_void))
            }
            (Arg::Callback(f), ParamKind::AllocCallback) => Ok(CType::Callback(*f)),
            _ => Err(FfiError::mismatch(kind.display_name(), arg.describe())),
        }
    }

    #[cfg(test)]
    fn temporaries(&self) -> usize {
        self.allocated_strings.len() + self.string_arrays.len()
    }
}

/// Check a pointer returned from native code before reading through it
pub fn check_null<T>(ptr: *const T, what: &str) -> Result<*const T, MarshalError> {
    if ptr.is_null() {
        Err(MarshalError::NullPointer(what.to_string()))
    } else {
        Ok(ptr)
    }
}

/// Copy a NUL-terminated native string into a host `String`
///
/// # Safety
///
/// A non-null `ptr` must point to a NUL-terminated string that stays valid
/// for the duration of this call.
pub unsafe fn copy_c_str(ptr: *const c_char, what: &str) -> Result<String, MarshalError> {
    let ptr = check_null(ptr, what)?;
    CStr::from_ptr(ptr)
        .to_str()
        .map(str::to_owned)
        .map_err(|e| MarshalError::InvalidString(format!("Invalid UTF-8: {}", e)))
}

/// Text written by native code into a host byte buffer, up to the first NUL
pub fn decode_c_buffer(buffer: &[u8]) -> Result<String, MarshalError> {
    let text = CStr::from_bytes_until_nul(buffer).map_err(|_| {
        MarshalError::InvalidString("output buffer is not NUL-terminated".to_string())
    })?;
    text.to_str()
        .map(str::to_owned)
        .map_err(|e| MarshalError::InvalidString(format!("Invalid UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ElemType;

    #[test]
    fn test_lower_scalars() {
        let mut ctx = MarshalContext::new();
        assert_eq!(ctx.lower(&Arg::Int64(42), &ParamKind::Int64), Ok(CType::Long(42)));
        assert_eq!(
            ctx.lower(&Arg::Float64(2.5), &ParamKind::Float64),
            Ok(CType::Double(2.5))
        );
        assert_eq!(ctx.temporaries(), 0);
    }

    #[test]
    fn test_lower_string_keeps_it_alive() {
        let mut ctx = MarshalContext::new();
        let lowered = ctx.lower(&Arg::Str("Badger"), &ParamKind::CStr).unwrap();
        let ptr = lowered.as_ptr().unwrap() as *const c_char;
        let copied = unsafe { copy_c_str(ptr, "test") }.unwrap();
        assert_eq!(copied, "Badger");
        assert_eq!(ctx.temporaries(), 1);
    }

    #[test]
    fn test_string_with_null_byte() {
        let mut ctx = MarshalContext::new();
        let result = ctx.lower(&Arg::Str("bad\0string"), &ParamKind::CStr);
        assert!(matches!(
            result,
            Err(FfiError::Marshal(MarshalError::InvalidString(_)))
        ));
    }

    #[test]
    fn test_string_array_is_null_terminated() {
        let mut ctx = MarshalContext::new();
        let items = ["yab", "dab"];
        let array = ctx.c_string_array(&items).unwrap();
        unsafe {
            assert_eq!(copy_c_str(*array, "item").unwrap(), "yab");
            assert_eq!(copy_c_str(*array.add(1), "item").unwrap(), "dab");
            assert!((*array.add(2)).is_null());
        }
    }

    #[test]
    fn test_lower_buffer_passes_host_pointer() {
        let data = [1.0_f64, 2.0];
        let mut ctx = MarshalContext::new();
        let lowered = ctx
            .lower(&Arg::buffer(&data), &ParamKind::Buffer(ElemType::Float64))
            .unwrap();
        assert_eq!(lowered, CType::Ptr(data.as_ptr() as *mut c_void));
    }

    #[test]
    fn test_lower_rejects_wrong_kind() {
        let mut ctx = MarshalContext::new();
        let result = ctx.lower(&Arg::Int64(1), &ParamKind::CStr);
        assert!(matches!(result, Err(FfiError::TypeMismatch { .. })));
    }

    #[test]
    fn test_copy_null_pointer() {
        let result = unsafe { copy_c_str(std::ptr::null(), "description") };
        assert_eq!(result, Err(MarshalError::NullPointer("description".to_string())));
    }

    #[test]
    fn test_decode_c_buffer() {
        assert_eq!(decode_c_buffer(b"John Galt\0\0\0").unwrap(), "John Galt");
        assert!(decode_c_buffer(b"no terminator").is_err());
    }
}
