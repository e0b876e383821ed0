//! Native function calls through direct function pointers
//!
//! Every bound function carries a `Signature`, so the call shape is known
//! before the call. Arguments are validated and lowered to `CType` lanes,
//! and the lane pattern selects the concrete `extern "C"` pointer type the
//! code pointer is cast to. No libffi: each shape the bindings need is
//! spelled out below, and anything else is `UnsupportedSignature`.
//!
//! Integer, float, data-pointer and function-pointer lanes stay distinct
//! because the C ABI passes them in different registers.

use crate::buffer::{BufferView, BufferViewMut, Element};
use crate::callbacks::AllocFn;
use crate::error::{FfiError, FfiResult};
use crate::marshal::MarshalContext;
use crate::signature::Signature;
use crate::structs::NativeStruct;
use crate::types::{CType, ParamKind, ReturnKind};
use std::ffi::c_void;
use std::mem::{transmute, transmute_copy};

/// One host-side argument, borrowed for the duration of a call
#[derive(Debug)]
pub enum Arg<'a> {
    Int64(i64),
    Float64(f64),
    Str(&'a str),
    Buffer(BufferView<'a>),
    BufferMut(BufferViewMut<'a>),
    StrArray(&'a [&'a str]),
    Callback(AllocFn),
}

impl<'a> Arg<'a> {
    pub fn buffer<T: Element>(data: &'a [T]) -> Self {
        Arg::Buffer(BufferView::new(data))
    }

    pub fn buffer_mut<T: Element>(data: &'a mut [T]) -> Self {
        Arg::BufferMut(BufferViewMut::new(data))
    }

    /// Whether this argument can be lowered for `kind` as-is
    pub fn matches(&self, kind: &ParamKind) -> bool {
        match (self, kind) {
            (Arg::Int64(_), ParamKind::Int64)
            | (Arg::Float64(_), ParamKind::Float64)
            | (Arg::Str(_), ParamKind::CStr)
            | (Arg::StrArray(_), ParamKind::CStrArray)
            | (Arg::Callback(_), ParamKind::AllocCallback) => true,
            (Arg::Buffer(view), ParamKind::Buffer(elem)) => view.elem() == *elem,
            (Arg::BufferMut(view), ParamKind::BufferMut(elem)) => view.elem() == *elem,
            _ => false,
        }
    }

    /// Rendered like the matching `ParamKind`
    pub fn describe(&self) -> String {
        match self {
            Arg::Int64(_) => "i64".to_string(),
            Arg::Float64(_) => "f64".to_string(),
            Arg::Str(_) => "char*".to_string(),
            Arg::Buffer(view) => format!("*const {}", view.elem().display_name()),
            Arg::BufferMut(view) => format!("*mut {}", view.elem().display_name()),
            Arg::StrArray(_) => "char**".to_string(),
            Arg::Callback(_) => "alloc_f".to_string(),
        }
    }
}

/// A resolved native symbol paired with its declared signature
#[derive(Debug, Clone)]
pub struct NativeFunction {
    name: String,
    fn_ptr: *const (),
    signature: Signature,
}

// Safety: only a code pointer and immutable metadata are stored.
unsafe impl Send for NativeFunction {}
unsafe impl Sync for NativeFunction {}

impl NativeFunction {
    /// # Safety
    ///
    /// `fn_ptr` must point to a function whose C signature is exactly
    /// `signature`, and must stay valid for the lifetime of this value.
    pub unsafe fn new(name: impl Into<String>, fn_ptr: *const (), signature: Signature) -> Self {
        Self {
            name: name.into(),
            fn_ptr,
            signature,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Validate, lower and call; scalar and pointer results come back as `CType`
    ///
    /// # Safety
    ///
    /// The native function may read and write through every pointer argument.
    pub unsafe fn call(&self, args: &[Arg<'_>]) -> FfiResult<CType> {
        let (_ctx, lowered) = self.prepare(args)?;
        if matches!(self.signature.returns(), ReturnKind::Struct(_)) {
            return Err(self.unsupported());
        }
        self.dispatch(&lowered)
    }

    /// Call a function that returns a struct by value
    ///
    /// # Safety
    ///
    /// As for `call`; the returned struct may hold native allocations.
    pub unsafe fn call_returning<S: NativeStruct>(&self, args: &[Arg<'_>]) -> FfiResult<S> {
        let (_ctx, lowered) = self.prepare(args)?;
        if self.signature.returns() != ReturnKind::Struct(S::NAME) {
            return Err(FfiError::mismatch(
                self.signature.returns().display_name(),
                ReturnKind::Struct(S::NAME).display_name(),
            ));
        }
        tracing::trace!(function = %self.name, signature = %self.signature, "calling native function");
        let f = self.fn_ptr;
        let value = match lowered.as_slice() {
            [] => transmute_copy::<*const (), unsafe extern "C" fn() -> S>(&f)(),
            [CType::Long(a)] => transmute_copy::<*const (), unsafe extern "C" fn(i64) -> S>(&f)(*a),
            [CType::Ptr(a)] => {
                transmute_copy::<*const (), unsafe extern "C" fn(*mut c_void) -> S>(&f)(*a)
            }
            _ => return Err(self.unsupported()),
        };
        Ok(value)
    }

    /// Call a `(struct) -> void` function with `value`
    ///
    /// Whether the struct is copied into the call or passed by pointer is
    /// decided by the declared parameter kind.
    ///
    /// # Safety
    ///
    /// As for `call`.
    pub unsafe fn call_struct_arg<S: NativeStruct>(&self, value: &mut S) -> FfiResult<()> {
        let by_value = match self.signature.params() {
            [ParamKind::StructByValue(name)] if *name == S::NAME => true,
            [ParamKind::StructByPointer(name)] if *name == S::NAME => false,
            [kind] => {
                return Err(FfiError::mismatch(
                    kind.display_name(),
                    format!("struct {}", S::NAME),
                ))
            }
            params => {
                return Err(FfiError::ArityMismatch {
                    expected: params.len(),
                    got: 1,
                })
            }
        };
        if self.signature.returns() != ReturnKind::Void {
            return Err(self.unsupported());
        }
        tracing::trace!(function = %self.name, signature = %self.signature, "calling native function");
        let f = self.fn_ptr;
        if by_value {
            transmute_copy::<*const (), unsafe extern "C" fn(S)>(&f)(*value);
        } else {
            transmute_copy::<*const (), unsafe extern "C" fn(*mut S)>(&f)(value as *mut S);
        }
        Ok(())
    }

    fn prepare(&self, args: &[Arg<'_>]) -> FfiResult<(MarshalContext, Vec<CType>)> {
        self.signature.validate(args)?;
        let mut ctx = MarshalContext::new();
        let lowered = args
            .iter()
            .zip(self.signature.params())
            .map(|(arg, kind)| ctx.lower(arg, kind))
            .collect::<FfiResult<Vec<_>>>()?;
        Ok((ctx, lowered))
    }

    fn unsupported(&self) -> FfiError {
        FfiError::UnsupportedSignature(format!("{} {}", self.name, self.signature))
    }

    unsafe fn dispatch(&self, args: &[CType]) -> FfiResult<CType> {
        use crate::types::CType::{Callback as C, Double as D, Long as L, Ptr as P};

        tracing::trace!(function = %self.name, signature = %self.signature, "calling native function");
        let f = self.fn_ptr;
        let result = match (args, self.signature.returns()) {
            ([], ReturnKind::Void) => {
                transmute::<*const (), unsafe extern "C" fn()>(f)();
                CType::Void
            }
            ([], ReturnKind::Int64) => L(transmute::<*const (), unsafe extern "C" fn() -> i64>(f)()),

            ([L(a)], ReturnKind::Int64) => {
                L(transmute::<*const (), unsafe extern "C" fn(i64) -> i64>(f)(*a))
            }
            ([L(a)], ReturnKind::Float64) => {
                D(transmute::<*const (), unsafe extern "C" fn(i64) -> f64>(f)(*a))
            }
            ([D(a)], ReturnKind::Float64) => {
                D(transmute::<*const (), unsafe extern "C" fn(f64) -> f64>(f)(*a))
            }
            ([L(n)], ReturnKind::Buffer(_)) => {
                P(transmute::<*const (), unsafe extern "C" fn(i64) -> *mut c_void>(f)(*n))
            }
            ([P(a)], ReturnKind::Void) => {
                transmute::<*const (), unsafe extern "C" fn(*mut c_void)>(f)(*a);
                CType::Void
            }
            ([P(a)], ReturnKind::Int64) => {
                L(transmute::<*const (), unsafe extern "C" fn(*mut c_void) -> i64>(f)(*a))
            }

            ([L(a), L(b)], ReturnKind::Int64) => {
                L(transmute::<*const (), unsafe extern "C" fn(i64, i64) -> i64>(f)(*a, *b))
            }
            ([D(a), D(b)], ReturnKind::Float64) => {
                D(transmute::<*const (), unsafe extern "C" fn(f64, f64) -> f64>(f)(*a, *b))
            }
            ([P(p), L(n)], ReturnKind::Void) => {
                transmute::<*const (), unsafe extern "C" fn(*mut c_void, i64)>(f)(*p, *n);
                CType::Void
            }
            ([C(alloc), L(n)], ReturnKind::Void) => {
                transmute::<*const (), unsafe extern "C" fn(AllocFn, i64)>(f)(*alloc, *n);
                CType::Void
            }

            ([P(a), P(b), L(n)], ReturnKind::Void) => {
                type Shape = unsafe extern "C" fn(*mut c_void, *mut c_void, i64);
                transmute::<*const (), Shape>(f)(*a, *b, *n);
                CType::Void
            }
            ([P(p), L(n), L(x)], ReturnKind::Void) => {
                type Shape = unsafe extern "C" fn(*mut c_void, i64, i64);
                transmute::<*const (), Shape>(f)(*p, *n, *x);
                CType::Void
            }

            ([P(a), L(na), P(b), L(nb)], ReturnKind::Float64) => {
                type Shape = unsafe extern "C" fn(*mut c_void, i64, *mut c_void, i64) -> f64;
                D(transmute::<*const (), Shape>(f)(*a, *na, *b, *nb))
            }
            ([P(a), L(na), P(b), L(nb)], ReturnKind::CStr) => {
                type Shape =
                    unsafe extern "C" fn(*mut c_void, i64, *mut c_void, i64) -> *mut c_void;
                P(transmute::<*const (), Shape>(f)(*a, *na, *b, *nb))
            }
            ([P(a), P(b), P(c), L(n)], ReturnKind::Int64) => {
                type Shape = unsafe extern "C" fn(*mut c_void, *mut c_void, *mut c_void, i64) -> i64;
                L(transmute::<*const (), Shape>(f)(*a, *b, *c, *n))
            }

            _ => return Err(self.unsupported()),
        };
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::AllocArena;
    use crate::types::ElemType;
    use std::ffi::c_char;

    extern "C" fn test_add(a: i64, b: i64) -> i64 {
        a + b
    }

    extern "C" fn test_half(x: f64) -> f64 {
        x / 2.0
    }

    unsafe extern "C" fn test_negate(input: *const f64, out: *mut f64, n: i64) {
        for i in 0..n as usize {
            *out.add(i) = -*input.add(i);
        }
    }

    unsafe extern "C" fn test_emit(alloc: AllocFn, n: i64) {
        let out = alloc(c"q".as_ptr() as *const c_char, n) as *mut i64;
        for i in 0..n as usize {
            *out.add(i) = i as i64 * 10;
        }
    }

    fn bind(name: &str, f: *const (), signature: Signature) -> NativeFunction {
        unsafe { NativeFunction::new(name, f, signature) }
    }

    #[test]
    fn test_call_add() {
        let add = bind(
            "add",
            test_add as *const (),
            Signature::new([ParamKind::Int64, ParamKind::Int64], ReturnKind::Int64),
        );
        let result = unsafe { add.call(&[Arg::Int64(10), Arg::Int64(15)]) };
        assert_eq!(result, Ok(CType::Long(25)));
    }

    #[test]
    fn test_call_double() {
        let half = bind(
            "half",
            test_half as *const (),
            Signature::new([ParamKind::Float64], ReturnKind::Float64),
        );
        assert_eq!(unsafe { half.call(&[Arg::Float64(3.0)]) }, Ok(CType::Double(1.5)));
    }

    #[test]
    fn test_call_buffers() {
        let negate = bind(
            "negate",
            test_negate as *const (),
            Signature::new(
                [
                    ParamKind::Buffer(ElemType::Float64),
                    ParamKind::BufferMut(ElemType::Float64),
                    ParamKind::Int64,
                ],
                ReturnKind::Void,
            ),
        );
        let input = [1.0, -2.0, 3.0];
        let mut output = [0.0; 3];
        let result = unsafe {
            negate.call(&[Arg::buffer(&input), Arg::buffer_mut(&mut output), Arg::Int64(3)])
        };
        assert_eq!(result, Ok(CType::Void));
        assert_eq!(output, [-1.0, 2.0, -3.0]);
    }

    #[test]
    fn test_call_with_allocator() {
        let emit = bind(
            "emit",
            test_emit as *const (),
            Signature::new([ParamKind::AllocCallback, ParamKind::Int64], ReturnKind::Void),
        );
        let (result, buffers) =
            AllocArena::scope(|alloc| unsafe { emit.call(&[Arg::Callback(alloc), Arg::Int64(3)]) })
                .unwrap();
        assert_eq!(result, Ok(CType::Void));
        assert_eq!(buffers[0].as_i64(), Some(&[0, 10, 20][..]));
    }

    #[test]
    fn test_arity_mismatch_before_call() {
        let add = bind(
            "add",
            test_add as *const (),
            Signature::new([ParamKind::Int64, ParamKind::Int64], ReturnKind::Int64),
        );
        let result = unsafe { add.call(&[Arg::Int64(10)]) };
        assert!(matches!(result, Err(FfiError::ArityMismatch { .. })));
    }

    #[test]
    fn test_unsupported_shape() {
        let odd = bind(
            "odd",
            test_add as *const (),
            Signature::new(
                [ParamKind::Float64, ParamKind::Int64, ParamKind::Float64],
                ReturnKind::Float64,
            ),
        );
        let result = unsafe { odd.call(&[Arg::Float64(1.0), Arg::Int64(1), Arg::Float64(1.0)]) };
        assert!(matches!(result, Err(FfiError::UnsupportedSignature(_))));
    }

    #[test]
    fn test_arg_describe_matches_kind_names() {
        let data = [1_i64];
        let arg = Arg::buffer(&data);
        let kind = ParamKind::Buffer(ElemType::Int64);
        assert!(arg.matches(&kind));
        assert_eq!(arg.describe(), kind.display_name());
    }
}
