//! Host allocator callback - lets native code return several buffers at once
//!
//! Native code receives `host_alloc` as a plain C function pointer and calls
//! it once per result buffer with an array type code and an element count.
//! Each call allocates a zeroed host buffer, records it in the arena that is
//! active on the calling thread, and returns its address. After the outer call
//! returns, `AllocArena::scope` hands back every buffer in invocation order.
//!
//! The callback has no user-data argument, so the active arena lives in a
//! thread-local slot for the dynamic extent of the outer call.

use crate::error::{FfiError, FfiResult, MarshalError};
use crate::ownership::{self, ResourceKind};
use crate::types::ElemType;
use std::cell::RefCell;
use std::ffi::{c_char, c_void, CStr};

/// C signature of the allocator: `void* (*)(char* type_code, int64_t n)`
pub type AllocFn = unsafe extern "C" fn(type_code: *const c_char, n: i64) -> *mut c_void;

/// Storage behind one callback allocation
#[derive(Debug, Clone, PartialEq)]
pub enum ArenaData {
    Int64(Vec<i64>),
    Float64(Vec<f64>),
    Bytes(Vec<u8>),
}

impl ArenaData {
    /// `None` when the request is too large to allocate
    fn zeroed(elem: ElemType, n: usize) -> Option<Self> {
        let bytes = n.checked_mul(elem.size())?;
        if bytes > isize::MAX as usize {
            return None;
        }
        match elem {
            ElemType::Int64 => zeroed_vec(n).map(ArenaData::Int64),
            ElemType::Float64 => zeroed_vec(n).map(ArenaData::Float64),
            ElemType::Byte => zeroed_vec(n).map(ArenaData::Bytes),
            ElemType::Int32 | ElemType::Float32 => None,
        }
    }

    fn as_mut_ptr(&mut self) -> *mut c_void {
        match self {
            ArenaData::Int64(v) => v.as_mut_ptr() as *mut c_void,
            ArenaData::Float64(v) => v.as_mut_ptr() as *mut c_void,
            ArenaData::Bytes(v) => v.as_mut_ptr() as *mut c_void,
        }
    }
}

fn zeroed_vec<T: Copy + Default>(n: usize) -> Option<Vec<T>> {
    let mut values = Vec::new();
    values.try_reserve_exact(n).ok()?;
    values.resize(n, T::default());
    Some(values)
}

/// A buffer produced through the allocator callback, owned by the host
#[derive(Debug, PartialEq)]
pub struct ArenaBuffer {
    data: ArenaData,
}

impl ArenaBuffer {
    fn new(data: ArenaData) -> Self {
        ownership::note_acquired(ResourceKind::CallbackBuffer);
        Self { data }
    }

    pub fn data(&self) -> &ArenaData {
        &self.data
    }

    pub fn elem(&self) -> ElemType {
        match self.data {
            ArenaData::Int64(_) => ElemType::Int64,
            ArenaData::Float64(_) => ElemType::Float64,
            ArenaData::Bytes(_) => ElemType::Byte,
        }
    }

    pub fn len(&self) -> usize {
        match &self.data {
            ArenaData::Int64(v) => v.len(),
            ArenaData::Float64(v) => v.len(),
            ArenaData::Bytes(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_i64(&self) -> Option<&[i64]> {
        match &self.data {
            ArenaData::Int64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<&[f64]> {
        match &self.data {
            ArenaData::Float64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.data {
            ArenaData::Bytes(v) => Some(v),
            _ => None,
        }
    }

    /// Decode a byte buffer as UTF-8 text
    pub fn to_text(&self) -> FfiResult<String> {
        let bytes = self
            .as_bytes()
            .ok_or_else(|| FfiError::mismatch("u8 buffer", self.elem().display_name()))?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| MarshalError::InvalidString(format!("Invalid UTF-8: {}", e)).into())
    }
}

impl Drop for ArenaBuffer {
    fn drop(&mut self) {
        ownership::note_released(ResourceKind::CallbackBuffer);
    }
}

/// Buffers allocated on behalf of native code during one outer call
#[derive(Debug, Default)]
pub struct AllocArena {
    buffers: Vec<ArenaBuffer>,
    fault: Option<FfiError>,
}

thread_local! {
    static ACTIVE: RefCell<Option<AllocArena>> = const { RefCell::new(None) };
}

/// Clears the active slot even if the body unwinds.
struct ActiveSlot;

impl ActiveSlot {
    fn take(self) -> AllocArena {
        ACTIVE.with(|slot| slot.borrow_mut().take()).unwrap_or_default()
    }
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        let _ = ACTIVE.try_with(|slot| slot.borrow_mut().take());
    }
}

impl AllocArena {
    /// Run `body` with the host allocator installed for this thread
    ///
    /// `body` receives the callback to pass to native code. Returns the body's
    /// result and every buffer allocated during it, in invocation order.
    pub fn scope<R>(body: impl FnOnce(AllocFn) -> R) -> FfiResult<(R, Vec<ArenaBuffer>)> {
        ACTIVE.with(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.is_some() {
                return Err(FfiError::OwnershipFault(
                    "allocator arena already active on this thread".to_string(),
                ));
            }
            *slot = Some(AllocArena::default());
            Ok(())
        })?;

        let active = ActiveSlot;
        let result = body(host_alloc as AllocFn);
        let arena = active.take();

        tracing::trace!(buffers = arena.buffers.len(), "allocator scope closed");
        match arena.fault {
            Some(fault) => Err(fault),
            None => Ok((result, arena.buffers)),
        }
    }

    fn allocate(&mut self, type_code: *const c_char, n: i64) -> *mut c_void {
        let code = if type_code.is_null() {
            None
        } else {
            // Safety: native code passes a NUL-terminated type code.
            unsafe { CStr::from_ptr(type_code) }.to_str().ok()
        };
        let elem = code
            .and_then(ElemType::from_type_code)
            .filter(|e| matches!(e, ElemType::Int64 | ElemType::Float64 | ElemType::Byte));
        let (Some(elem), Ok(len)) = (elem, usize::try_from(n)) else {
            let code = code.unwrap_or("<null>");
            self.fault.get_or_insert(FfiError::mismatch(
                "allocation of type q, d or B with a non-negative size",
                format!("type code {:?} with size {}", code, n),
            ));
            return std::ptr::null_mut();
        };
        let Some(data) = ArenaData::zeroed(elem, len) else {
            tracing::warn!(elem = elem.display_name(), len, "allocator request refused");
            self.fault.get_or_insert(FfiError::OwnershipFault(format!(
                "allocator cannot provide {} elements of type {}",
                len,
                elem.display_name()
            )));
            return std::ptr::null_mut();
        };

        self.buffers.push(ArenaBuffer::new(data));
        let buffer = self.buffers.last_mut().map(|b| b.data.as_mut_ptr());
        buffer.unwrap_or(std::ptr::null_mut())
    }
}

/// The allocator handed to native code
///
/// Returns null (and records a fault) when no arena is active or the request
/// is invalid; never unwinds into native code.
unsafe extern "C" fn host_alloc(type_code: *const c_char, n: i64) -> *mut c_void {
    ACTIVE
        .try_with(|slot| match slot.try_borrow_mut() {
            Ok(mut slot) => match slot.as_mut() {
                Some(arena) => arena.allocate(type_code, n),
                None => std::ptr::null_mut(),
            },
            Err(_) => std::ptr::null_mut(),
        })
        .unwrap_or(std::ptr::null_mut())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_collects_in_invocation_order() {
        let ((), buffers) = AllocArena::scope(|alloc| unsafe {
            let bytes = alloc(c"B".as_ptr(), 3) as *mut u8;
            std::ptr::copy_nonoverlapping(b"abc".as_ptr(), bytes, 3);
            let floats = alloc(c"d".as_ptr(), 2) as *mut f64;
            *floats = 1.5;
            *floats.add(1) = 2.5;
        })
        .unwrap();

        assert_eq!(buffers.len(), 2);
        assert_eq!(buffers[0].to_text().unwrap(), "abc");
        assert_eq!(buffers[1].as_f64(), Some(&[1.5, 2.5][..]));
    }

    #[test]
    fn test_scope_with_no_allocations() {
        let (value, buffers) = AllocArena::scope(|_| 7).unwrap();
        assert_eq!(value, 7);
        assert!(buffers.is_empty());
    }

    #[test]
    fn test_unknown_type_code_faults() {
        let result = AllocArena::scope(|alloc| unsafe { alloc(c"z".as_ptr(), 4) });
        assert!(matches!(result, Err(FfiError::TypeMismatch { .. })));
    }

    #[test]
    fn test_negative_size_faults() {
        let result = AllocArena::scope(|alloc| unsafe { alloc(c"q".as_ptr(), -1).is_null() });
        assert!(matches!(result, Err(FfiError::TypeMismatch { .. })));
    }

    #[test]
    fn test_oversized_request_faults_without_panicking() {
        let result = AllocArena::scope(|alloc| unsafe { alloc(c"d".as_ptr(), i64::MAX).is_null() });
        assert!(matches!(result, Err(FfiError::OwnershipFault(_))));

        let result = AllocArena::scope(|alloc| unsafe { alloc(c"B".as_ptr(), i64::MAX).is_null() });
        assert!(matches!(result, Err(FfiError::OwnershipFault(_))));
    }

    #[test]
    fn test_refused_request_keeps_earlier_buffers_out() {
        let before = ownership::snapshot();
        let result = AllocArena::scope(|alloc| unsafe {
            alloc(c"B".as_ptr(), 4);
            alloc(c"q".as_ptr(), i64::MAX / 2);
        });
        assert!(result.is_err());
        assert!(ownership::snapshot().since(&before).is_balanced());
    }

    #[test]
    fn test_nested_scope_rejected() {
        let outer = AllocArena::scope(|_| AllocArena::scope(|_| ()).map(|_| ()));
        let (inner, _) = outer.unwrap();
        assert!(matches!(inner, Err(FfiError::OwnershipFault(_))));
    }

    #[test]
    fn test_alloc_outside_scope_returns_null() {
        let ptr = unsafe { host_alloc(c"q".as_ptr(), 1) };
        assert!(ptr.is_null());
    }

    #[test]
    fn test_buffers_balance_the_ledger() {
        let before = ownership::snapshot();
        {
            let (_, buffers) = AllocArena::scope(|alloc| unsafe {
                alloc(c"q".as_ptr(), 2);
                alloc(c"q".as_ptr(), 3);
            })
            .unwrap();
            assert_eq!(ownership::snapshot().since(&before).acquired, 2);
            drop(buffers);
        }
        assert!(ownership::snapshot().since(&before).is_balanced());
    }
}
