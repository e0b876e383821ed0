//! Struct marshal - `#[repr(C)]` mirrors of native structs and their ownership
//!
//! Two directions:
//! - Host-built structs (`Person`) point into host buffers; `PersonMarshal`
//!   keeps those buffers alive for the call and reads the output afterwards.
//! - Native-populated structs (`UserInfo`, `EvenResult`) may carry native
//!   allocations; `NativeOwned<S>` reads them status-first and runs the
//!   paired deallocator exactly once, as the type's `ReleasePolicy` demands.
//!
//! Every struct moves through `Constructed → Passed → Populated → Read →
//! Released`. Skipping or repeating a step is an `OwnershipFault`.

use crate::caller::NativeFunction;
use crate::error::{FfiError, FfiResult, MarshalError};
use crate::marshal::{copy_c_str, decode_c_buffer};
use crate::ownership::{self, ResourceKind};
use serde::Serialize;
use std::ffi::{c_char, CString};

/// When a native-populated struct must go back to its deallocator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleasePolicy {
    /// Holds no native allocations
    Never,
    /// Always holds native allocations
    Always,
    /// Holds an allocation only when its error field is set
    WhenErrorSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StructState {
    Constructed,
    Passed,
    Populated,
    Read,
    Released,
}

/// Ordered state of one struct instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLifecycle {
    name: &'static str,
    state: StructState,
}

impl StructLifecycle {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: StructState::Constructed,
        }
    }

    pub fn state(&self) -> StructState {
        self.state
    }

    /// Move to `next`, or fail without changing state
    pub fn advance(&mut self, next: StructState) -> FfiResult<()> {
        use StructState::*;
        let allowed = matches!(
            (self.state, next),
            (Constructed, Passed)
                | (Passed, Populated)
                | (Populated, Read)
                | (Populated, Released)
                | (Read, Read)
                | (Read, Released)
        );
        if !allowed {
            return Err(FfiError::OwnershipFault(format!(
                "struct {} cannot go from {:?} to {:?}",
                self.name, self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }
}

/// A `#[repr(C)]` struct that crosses the boundary
///
/// # Safety
///
/// The implementing type must have exactly the layout of the C struct
/// named `NAME`, and `decode` may only dereference pointers the native side
/// guarantees valid while the struct is unreleased.
pub unsafe trait NativeStruct: Copy + 'static {
    /// C struct name, as used in signatures
    const NAME: &'static str;
    const POLICY: ReleasePolicy;

    /// Host-side copy with owned data
    type Record;

    /// What the paired deallocator takes
    type ReleaseArg: NativeStruct;

    /// Error message pointer; null means success
    fn error_ptr(&self) -> *const c_char {
        std::ptr::null()
    }

    /// Copy the data fields out
    ///
    /// # Safety
    ///
    /// Pointer fields must still be valid.
    unsafe fn decode(&self) -> Result<Self::Record, MarshalError>;

    fn release_arg(&self) -> Self::ReleaseArg;

    fn requires_release(&self) -> bool {
        match Self::POLICY {
            ReleasePolicy::Never => false,
            ReleasePolicy::Always => true,
            ReleasePolicy::WhenErrorSet => !self.error_ptr().is_null(),
        }
    }
}

/// `struct person`: every pointer refers to host memory
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Person {
    pub first_name: *const c_char,
    pub last_name: *const c_char,
    pub full_name: *mut c_char,
    pub full_name_len: i64,
}

unsafe impl NativeStruct for Person {
    const NAME: &'static str = "person";
    const POLICY: ReleasePolicy = ReleasePolicy::Never;
    type Record = String;
    type ReleaseArg = Person;

    unsafe fn decode(&self) -> Result<String, MarshalError> {
        if self.full_name.is_null() || self.full_name_len <= 0 {
            return Err(MarshalError::NullPointer("person.full_name".to_string()));
        }
        let buffer = std::slice::from_raw_parts(
            self.full_name as *const u8,
            self.full_name_len as usize,
        );
        decode_c_buffer(buffer)
    }

    fn release_arg(&self) -> Person {
        *self
    }
}

/// `error`: a message allocated by the native side, or null
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct NativeError {
    pub err: *mut c_char,
}

unsafe impl NativeStruct for NativeError {
    const NAME: &'static str = "error";
    const POLICY: ReleasePolicy = ReleasePolicy::WhenErrorSet;
    type Record = ();
    type ReleaseArg = NativeError;

    fn error_ptr(&self) -> *const c_char {
        self.err
    }

    unsafe fn decode(&self) -> Result<(), MarshalError> {
        Ok(())
    }

    fn release_arg(&self) -> NativeError {
        *self
    }
}

/// `even_result`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct EvenResult {
    pub result: bool,
    pub err: NativeError,
}

unsafe impl NativeStruct for EvenResult {
    const NAME: &'static str = "even_result";
    const POLICY: ReleasePolicy = ReleasePolicy::WhenErrorSet;
    type Record = bool;
    type ReleaseArg = NativeError;

    fn error_ptr(&self) -> *const c_char {
        self.err.err
    }

    unsafe fn decode(&self) -> Result<bool, MarshalError> {
        Ok(self.result)
    }

    fn release_arg(&self) -> NativeError {
        self.err
    }
}

/// `user_info`: both strings belong to the native side until `delUserInfo`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct UserInfo {
    pub name: *mut c_char,
    pub description: *mut c_char,
    pub name_length: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserInfoRecord {
    pub name: String,
    pub description: String,
    pub name_length: i64,
}

unsafe impl NativeStruct for UserInfo {
    const NAME: &'static str = "user_info";
    const POLICY: ReleasePolicy = ReleasePolicy::Always;
    type Record = UserInfoRecord;
    type ReleaseArg = UserInfo;

    unsafe fn decode(&self) -> Result<UserInfoRecord, MarshalError> {
        Ok(UserInfoRecord {
            name: copy_c_str(self.name, "user_info.name")?,
            description: copy_c_str(self.description, "user_info.description")?,
            name_length: self.name_length,
        })
    }

    fn release_arg(&self) -> UserInfo {
        *self
    }
}

/// Guard around a struct the native side populated
///
/// Reads check the status field before any data field. The deallocator
/// runs once: from `release`, `into_record`, or on drop.
pub struct NativeOwned<S: NativeStruct> {
    function: String,
    value: S,
    releaser: NativeFunction,
    lifecycle: StructLifecycle,
    needs_release: bool,
}

impl<S: NativeStruct> NativeOwned<S> {
    /// Take ownership of `value` as returned by `function`
    ///
    /// # Safety
    ///
    /// `value` must come straight from the native call, and `releaser` must
    /// be the matching deallocator taking `S::ReleaseArg`.
    pub unsafe fn new(function: &str, value: S, releaser: NativeFunction) -> FfiResult<Self> {
        let mut lifecycle = StructLifecycle::new(S::NAME);
        lifecycle.advance(StructState::Passed)?;
        lifecycle.advance(StructState::Populated)?;
        let needs_release = value.requires_release();
        if needs_release {
            ownership::note_acquired(ResourceKind::NativeStruct);
        }
        Ok(Self {
            function: function.to_string(),
            value,
            releaser,
            lifecycle,
            needs_release,
        })
    }

    pub fn state(&self) -> StructState {
        self.lifecycle.state()
    }

    pub fn is_error(&self) -> bool {
        !self.value.error_ptr().is_null()
    }

    /// Status-checked copy of the data, leaving the struct owned
    ///
    /// When the status field is set the data is never decoded and the
    /// native message comes back as `NativeFault`.
    pub fn read(&mut self) -> FfiResult<S::Record> {
        if self.lifecycle.state() == StructState::Released {
            return Err(FfiError::OwnershipFault(format!(
                "struct {} read after release",
                S::NAME
            )));
        }
        let err = self.value.error_ptr();
        if !err.is_null() {
            // Safety: a set error field points to a live native string.
            let message = unsafe { copy_c_str(err, "error.err") }?;
            return Err(FfiError::NativeFault {
                function: self.function.clone(),
                message,
            });
        }
        // Safety: the struct is unreleased, so its pointers are still live.
        let record = unsafe { self.value.decode() }?;
        self.lifecycle.advance(StructState::Read)?;
        Ok(record)
    }

    /// Read, then release before returning either the data or the error
    pub fn into_record(mut self) -> FfiResult<S::Record> {
        let record = self.read();
        self.release_inner()?;
        record
    }

    pub fn release(mut self) -> FfiResult<()> {
        self.release_inner()
    }

    /// Marked `Released` only once the deallocator has run
    fn release_inner(&mut self) -> FfiResult<()> {
        let mut released = self.lifecycle.clone();
        released.advance(StructState::Released)?;
        if self.needs_release {
            let mut arg = self.value.release_arg();
            // Safety: `new`'s contract pairs the releaser with this struct.
            unsafe { self.releaser.call_struct_arg(&mut arg)? };
            self.needs_release = false;
            ownership::note_released(ResourceKind::NativeStruct);
        }
        self.lifecycle = released;
        Ok(())
    }
}

impl<S: NativeStruct> Drop for NativeOwned<S> {
    fn drop(&mut self) {
        if self.lifecycle.state() == StructState::Released {
            return;
        }
        if self.needs_release {
            tracing::warn!(
                function = %self.function,
                releaser = self.releaser.name(),
                "native struct released on drop"
            );
        }
        if let Err(e) = self.release_inner() {
            tracing::error!(error = %e, "failed to release native struct");
        }
    }
}

impl<S: NativeStruct + std::fmt::Debug> std::fmt::Debug for NativeOwned<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeOwned")
            .field("function", &self.function)
            .field("value", &self.value)
            .field("state", &self.lifecycle.state())
            .finish()
    }
}

/// Host-side person
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonRecord {
    pub first_name: String,
    pub last_name: String,
}

impl PersonRecord {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }
}

/// Host buffers behind one `Person` passed by pointer
#[derive(Debug)]
pub struct PersonMarshal {
    first_name: CString,
    last_name: CString,
    full_name: Vec<u8>,
    lifecycle: StructLifecycle,
}

impl PersonMarshal {
    /// Copy the names and reserve `capacity` bytes for the full name
    pub fn new(record: &PersonRecord, capacity: usize) -> Result<Self, MarshalError> {
        let c_string = |s: &str| {
            CString::new(s).map_err(|e| {
                MarshalError::InvalidString(format!("String contains null byte: {}", e))
            })
        };
        Ok(Self {
            first_name: c_string(&record.first_name)?,
            last_name: c_string(&record.last_name)?,
            full_name: vec![0; capacity],
            lifecycle: StructLifecycle::new(Person::NAME),
        })
    }

    pub fn state(&self) -> StructState {
        self.lifecycle.state()
    }

    /// Build the struct over the host buffers and hand it to `call`
    ///
    /// The struct only lives inside `call`; its pointers cannot escape.
    pub fn pass<R>(&mut self, call: impl FnOnce(&mut Person) -> FfiResult<R>) -> FfiResult<R> {
        self.lifecycle.advance(StructState::Passed)?;
        let full_name_len = crate::buffer::c_len(self.full_name.len())?;
        let mut person = Person {
            first_name: self.first_name.as_ptr(),
            last_name: self.last_name.as_ptr(),
            full_name: self.full_name.as_mut_ptr() as *mut c_char,
            full_name_len,
        };
        let result = call(&mut person)?;
        self.lifecycle.advance(StructState::Populated)?;
        Ok(result)
    }

    /// Text the callee wrote into the full-name buffer
    pub fn full_name(&mut self) -> FfiResult<String> {
        self.lifecycle.advance(StructState::Read)?;
        Ok(decode_c_buffer(&self.full_name)?)
    }

    /// Hand the buffers back; nothing native to free
    pub fn finish(mut self) -> FfiResult<()> {
        self.lifecycle.advance(StructState::Released)
    }
}
