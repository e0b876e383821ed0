//! Buffer bridge - host sequences ↔ contiguous native memory
//!
//! Two ownership modes:
//! - Host-owned: `BufferView` / `BufferViewMut` borrow a host slice for the
//!   duration of one call. The borrow pins the storage, so it cannot be moved
//!   or reallocated while native code holds the pointer.
//! - Native-owned: `NativeBuffer` wraps memory the callee allocated and
//!   calls the paired deallocator exactly once.
//!
//! Element order is always native memory order; nothing here reorders.

use crate::caller::{Arg, NativeFunction};
use crate::error::{FfiError, FfiResult, MarshalError};
use crate::ownership::{self, ResourceKind};
use crate::types::ElemType;
use std::ffi::c_void;
use std::marker::PhantomData;

/// Primitive element that can cross the boundary without conversion
///
/// # Safety
///
/// `ELEM` must describe the in-memory representation of `Self` exactly.
pub unsafe trait Element: Copy + Default + 'static {
    const ELEM: ElemType;
}

unsafe impl Element for i64 {
    const ELEM: ElemType = ElemType::Int64;
}
unsafe impl Element for i32 {
    const ELEM: ElemType = ElemType::Int32;
}
unsafe impl Element for f64 {
    const ELEM: ElemType = ElemType::Float64;
}
unsafe impl Element for f32 {
    const ELEM: ElemType = ElemType::Float32;
}
unsafe impl Element for u8 {
    const ELEM: ElemType = ElemType::Byte;
}

/// Read-only pointer-and-length view over host memory
#[derive(Debug, Clone, Copy)]
pub struct BufferView<'a> {
    ptr: *const c_void,
    len: usize,
    elem: ElemType,
    _borrow: PhantomData<&'a [u8]>,
}

impl<'a> BufferView<'a> {
    /// Zero-copy view over a slice whose layout already matches `T`
    pub fn new<T: Element>(data: &'a [T]) -> Self {
        Self {
            ptr: data.as_ptr() as *const c_void,
            len: data.len(),
            elem: T::ELEM,
            _borrow: PhantomData,
        }
    }

    pub fn as_ptr(&self) -> *const c_void {
        self.ptr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn elem(&self) -> ElemType {
        self.elem
    }
}

/// Writable pointer-and-length view over host memory
#[derive(Debug)]
pub struct BufferViewMut<'a> {
    ptr: *mut c_void,
    len: usize,
    elem: ElemType,
    _borrow: PhantomData<&'a mut [u8]>,
}

impl<'a> BufferViewMut<'a> {
    pub fn new<T: Element>(data: &'a mut [T]) -> Self {
        Self {
            ptr: data.as_mut_ptr() as *mut c_void,
            len: data.len(),
            elem: T::ELEM,
            _borrow: PhantomData,
        }
    }

    /// View over memory the host does not own as a slice (e.g. a native allocation)
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for `len` elements of `elem` for the lifetime `'a`.
    pub unsafe fn from_raw(ptr: *mut c_void, len: usize, elem: ElemType) -> Self {
        Self {
            ptr,
            len,
            elem,
            _borrow: PhantomData,
        }
    }

    pub fn as_mut_ptr(&self) -> *mut c_void {
        self.ptr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn elem(&self) -> ElemType {
        self.elem
    }
}

/// Convert a host length to the C `int64_t` length argument
pub fn c_len(len: usize) -> Result<i64, MarshalError> {
    i64::try_from(len).map_err(|_| MarshalError::LengthOverflow(len))
}

/// A typed tabular column, as a dataframe would hand it over
///
/// The dtype is checked against the declared element type before any call;
/// a mismatch needs an explicit `converted_to` copy.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Int64(Vec<i64>),
    Int32(Vec<i32>),
    Float64(Vec<f64>),
    Float32(Vec<f32>),
}

impl Column {
    pub fn dtype(&self) -> ElemType {
        match self {
            Column::Int64(_) => ElemType::Int64,
            Column::Int32(_) => ElemType::Int32,
            Column::Float64(_) => ElemType::Float64,
            Column::Float32(_) => ElemType::Float32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Int64(v) => v.len(),
            Column::Int32(v) => v.len(),
            Column::Float64(v) => v.len(),
            Column::Float32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn view_mut(&mut self) -> BufferViewMut<'_> {
        match self {
            Column::Int64(v) => BufferViewMut::new(v),
            Column::Int32(v) => BufferViewMut::new(v),
            Column::Float64(v) => BufferViewMut::new(v),
            Column::Float32(v) => BufferViewMut::new(v),
        }
    }

    /// Fail with `TypeMismatch` unless the dtype is exactly `expected`
    pub fn expect_dtype(&self, expected: ElemType) -> FfiResult<()> {
        if self.dtype() == expected {
            Ok(())
        } else {
            Err(FfiError::mismatch(
                expected.display_name(),
                self.dtype().display_name(),
            ))
        }
    }

    /// Explicit copy into a column of another dtype
    ///
    /// Only lossless conversions are allowed: widening integers and floats,
    /// and integers to `f64` when every value is exactly representable.
    pub fn converted_to(&self, target: ElemType) -> FfiResult<Column> {
        let refuse = || {
            FfiError::mismatch(
                format!("a lossless conversion to {}", target.display_name()),
                self.dtype().display_name(),
            )
        };
        match (self, target) {
            (c, t) if c.dtype() == t => Ok(c.clone()),
            (Column::Int32(v), ElemType::Int64) => {
                Ok(Column::Int64(v.iter().map(|&x| i64::from(x)).collect()))
            }
            (Column::Int32(v), ElemType::Float64) => {
                Ok(Column::Float64(v.iter().map(|&x| f64::from(x)).collect()))
            }
            (Column::Float32(v), ElemType::Float64) => {
                Ok(Column::Float64(v.iter().map(|&x| f64::from(x)).collect()))
            }
            (Column::Int64(v), ElemType::Float64) => v
                .iter()
                .map(|&x| {
                    let f = x as f64;
                    (f as i128 == i128::from(x)).then_some(f)
                })
                .collect::<Option<Vec<_>>>()
                .map(Column::Float64)
                .ok_or_else(refuse),
            _ => Err(refuse()),
        }
    }

    pub fn as_i64(&self) -> Option<&[i64]> {
        match self {
            Column::Int64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<&[f64]> {
        match self {
            Column::Float64(v) => Some(v),
            _ => None,
        }
    }
}

/// Buffer allocated by native code, released through its paired deallocator
///
/// The deallocator must have the shape `(*mut T, i64) -> void`. It runs
/// exactly once: on `release()` or, failing that, on drop.
pub struct NativeBuffer<T: Element> {
    ptr: *mut T,
    len: usize,
    releaser: NativeFunction,
    /// False for a null pointer: nothing was allocated, nothing to release
    owns_allocation: bool,
    released: bool,
}

impl<T: Element> NativeBuffer<T> {
    /// Take ownership of a native allocation
    ///
    /// A null pointer is an empty buffer that needs no release.
    ///
    /// # Safety
    ///
    /// `ptr` must point to `len` initialized elements allocated by the library
    /// that exports `releaser`, and must not be owned by anything else.
    pub unsafe fn from_raw(ptr: *mut T, len: usize, releaser: NativeFunction) -> Self {
        let owns_allocation = !ptr.is_null();
        if owns_allocation {
            ownership::note_acquired(ResourceKind::NativeBuffer);
        }
        Self {
            ptr,
            len: if owns_allocation { len } else { 0 },
            releaser,
            owns_allocation,
            released: false,
        }
    }

    pub fn as_slice(&self) -> &[T] {
        if self.ptr.is_null() || self.len == 0 {
            return &[];
        }
        // Safety: from_raw's contract; the allocation lives until release.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.as_slice().to_vec()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy the contents out and release the native allocation
    pub fn into_vec(mut self) -> FfiResult<Vec<T>> {
        let values = self.to_vec();
        self.release_inner()?;
        Ok(values)
    }

    pub fn release(mut self) -> FfiResult<()> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> FfiResult<()> {
        if !self.owns_allocation {
            return Ok(());
        }
        if self.released {
            return Err(FfiError::OwnershipFault(format!(
                "buffer from '{}' released twice",
                self.releaser.name()
            )));
        }
        let len = c_len(self.len)?;
        // Safety: the allocation is still live and exclusively ours.
        let view = unsafe { BufferViewMut::from_raw(self.ptr as *mut c_void, self.len, T::ELEM) };
        unsafe { self.releaser.call(&[Arg::BufferMut(view), Arg::Int64(len)])? };
        self.released = true;
        ownership::note_released(ResourceKind::NativeBuffer);
        Ok(())
    }
}

impl<T: Element> Drop for NativeBuffer<T> {
    fn drop(&mut self) {
        if !self.owns_allocation || self.released {
            return;
        }
        tracing::debug!(releaser = self.releaser.name(), "releasing native buffer on drop");
        if let Err(e) = self.release_inner() {
            tracing::error!(error = %e, "failed to release native buffer");
        }
    }
}

impl<T: Element + std::fmt::Debug> std::fmt::Debug for NativeBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeBuffer")
            .field("elem", &T::ELEM)
            .field("values", &self.as_slice())
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_points_at_host_storage() {
        let data = vec![1.0_f64, 2.0, 3.0];
        let view = BufferView::new(&data);
        assert_eq!(view.as_ptr(), data.as_ptr() as *const c_void);
        assert_eq!(view.len(), 3);
        assert_eq!(view.elem(), ElemType::Float64);
    }

    #[test]
    fn test_empty_view() {
        let data: Vec<i64> = Vec::new();
        let view = BufferView::new(&data);
        assert!(view.is_empty());
        assert_eq!(view.elem(), ElemType::Int64);
    }

    #[test]
    fn test_column_dtype_check() {
        let ages = Column::Int32(vec![20, 30, 40]);
        assert!(matches!(
            ages.expect_dtype(ElemType::Int64),
            Err(FfiError::TypeMismatch { .. })
        ));
        assert!(ages.expect_dtype(ElemType::Int32).is_ok());
    }

    #[test]
    fn test_column_widening_conversion() {
        let ages = Column::Int32(vec![20, 30, 40]);
        let wide = ages.converted_to(ElemType::Int64).unwrap();
        assert_eq!(wide, Column::Int64(vec![20, 30, 40]));
    }

    #[test]
    fn test_column_narrowing_refused() {
        let values = Column::Float64(vec![1.5]);
        assert!(matches!(
            values.converted_to(ElemType::Float32),
            Err(FfiError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_column_int_to_float_must_be_exact() {
        let exact = Column::Int64(vec![1, 2, 3]);
        assert_eq!(
            exact.converted_to(ElemType::Float64).unwrap(),
            Column::Float64(vec![1.0, 2.0, 3.0])
        );
        let inexact = Column::Int64(vec![(1 << 53) + 1]);
        assert!(inexact.converted_to(ElemType::Float64).is_err());
    }

    thread_local! {
        static FREED: std::cell::Cell<i64> = const { std::cell::Cell::new(0) };
    }

    extern "C" fn count_free(_ptr: *mut i64, _n: i64) {
        FREED.with(|f| f.set(f.get() + 1));
    }

    fn counting_releaser() -> NativeFunction {
        use crate::signature::Signature;
        use crate::types::{ParamKind, ReturnKind};
        let sig = Signature::new(
            [ParamKind::BufferMut(ElemType::Int64), ParamKind::Int64],
            ReturnKind::Void,
        );
        unsafe { NativeFunction::new("count_free", count_free as *const (), sig) }
    }

    #[test]
    fn test_null_native_buffer_needs_no_release() {
        let before = FREED.with(|f| f.get());
        let empty =
            unsafe { NativeBuffer::<i64>::from_raw(std::ptr::null_mut(), 4, counting_releaser()) };
        assert!(empty.is_empty());
        assert_eq!(empty.into_vec(), Ok(Vec::new()));

        let empty =
            unsafe { NativeBuffer::<i64>::from_raw(std::ptr::null_mut(), 0, counting_releaser()) };
        assert_eq!(empty.release(), Ok(()));
        assert_eq!(FREED.with(|f| f.get()), before);
    }

    #[test]
    fn test_owned_native_buffer_released_once() {
        let before = FREED.with(|f| f.get());
        let mut storage = [7_i64, 8];
        let owned =
            unsafe { NativeBuffer::from_raw(storage.as_mut_ptr(), 2, counting_releaser()) };
        assert_eq!(owned.into_vec(), Ok(vec![7, 8]));
        assert_eq!(FREED.with(|f| f.get()), before + 1);

        {
            let _dropped =
                unsafe { NativeBuffer::from_raw(storage.as_mut_ptr(), 2, counting_releaser()) };
        }
        assert_eq!(FREED.with(|f| f.get()), before + 2);
    }

    #[test]
    fn test_c_len() {
        assert_eq!(c_len(3), Ok(3));
        assert_eq!(c_len(usize::MAX), Err(MarshalError::LengthOverflow(usize::MAX)));
    }
}
