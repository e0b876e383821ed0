//! Reference native library for the snopher examples
//!
//! Exports the C ABI that the host side binds against:
//! - Scalar and buffer functions (`add`, `squares`, `normalize`, `dot`, `shuffle`, `increase`)
//! - String functions writing into caller buffers (`repeat`, `join`, `fill`)
//! - Struct-returning functions with paired deallocators
//!   (`even`/`evenNonNegative` + `delError`, `getUserInfo` + `delUserInfo`, `iota` + `delInts`)
//! - A function driving a host allocator callback (`sqrts`)
//!
//! Built as a `cdylib` for dynamic loading and as an `rlib` so tests can
//! take the address of each function directly.
//!
//! # Safety
//!
//! Every pointer argument is trusted to be valid for the declared length.
//! Null pointers and non-positive lengths are treated as empty input.

#![allow(non_snake_case)]

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::cell::Cell;
use std::ffi::{c_char, c_void, CStr, CString};
use std::fmt::Write as _;

thread_local! {
    static LIVE_ALLOCATIONS: Cell<i64> = const { Cell::new(0) };
}

fn track(delta: i64) {
    LIVE_ALLOCATIONS.with(|live| live.set(live.get() + delta));
}

/// `struct person` as declared in the C header
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Person {
    pub first_name: *const c_char,
    pub last_name: *const c_char,
    pub full_name: *mut c_char,
    pub full_name_len: i64,
}

/// `error`: a null `err` means success
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CError {
    pub err: *mut c_char,
}

/// `even_result`: multiple return values grouped in one struct
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct EvenResult {
    pub result: bool,
    pub err: CError,
}

/// `user_info`: both strings are owned by this library until `delUserInfo`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct UserInfo {
    pub name: *mut c_char,
    pub description: *mut c_char,
    pub name_length: i64,
}

/// Allocator supplied by the host: receives an array type code and an element count.
pub type AllocFn = unsafe extern "C" fn(type_code: *const c_char, n: i64) -> *mut c_void;

unsafe fn slice_of<'a, T>(ptr: *const T, n: i64) -> &'a [T] {
    if ptr.is_null() || n <= 0 {
        return &[];
    }
    std::slice::from_raw_parts(ptr, n as usize)
}

unsafe fn slice_of_mut<'a, T>(ptr: *mut T, n: i64) -> &'a mut [T] {
    if ptr.is_null() || n <= 0 {
        return &mut [];
    }
    std::slice::from_raw_parts_mut(ptr, n as usize)
}

unsafe fn read_str(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

/// Copies `text` into `out`, truncating to leave room for the NUL terminator.
unsafe fn write_c_buffer(text: &str, out: *mut c_char, out_n: i64) -> usize {
    let out = slice_of_mut(out as *mut u8, out_n);
    if out.is_empty() {
        return 0;
    }
    let written = text.len().min(out.len() - 1);
    out[..written].copy_from_slice(&text.as_bytes()[..written]);
    out[written] = 0;
    written
}

fn alloc_c_string(text: String) -> *mut c_char {
    // Interior NULs cannot come from CStr input; strip them from formatted text anyway.
    let bytes: Vec<u8> = text.into_bytes().into_iter().filter(|b| *b != 0).collect();
    match CString::new(bytes) {
        Ok(s) => {
            track(1);
            s.into_raw()
        }
        Err(_) => std::ptr::null_mut(),
    }
}

unsafe fn free_c_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
        track(-1);
    }
}

#[no_mangle]
pub extern "C" fn add(a: i64, b: i64) -> i64 {
    a.wrapping_add(b)
}

/// Writes the square of each input element to `out`.
#[no_mangle]
pub unsafe extern "C" fn squares(nums: *const f64, out: *mut f64, n: i64) {
    let nums = slice_of(nums, n);
    let out = slice_of_mut(out, n);
    for (o, x) in out.iter_mut().zip(nums) {
        *o = x * x;
    }
}

/// Divides each element by the Euclidean norm of the input.
///
/// A zero vector normalizes to zeros.
#[no_mangle]
pub unsafe extern "C" fn normalize(nums: *const f64, out: *mut f64, n: i64) {
    let nums = slice_of(nums, n);
    let out = slice_of_mut(out, n);
    let norm = nums.iter().map(|x| x * x).sum::<f64>().sqrt();
    for (o, x) in out.iter_mut().zip(nums) {
        *o = if norm == 0.0 { 0.0 } else { x / norm };
    }
}

#[no_mangle]
pub unsafe extern "C" fn dot(a: *const f64, na: i64, b: *const f64, nb: i64) -> f64 {
    let a = slice_of(a, na);
    let b = slice_of(b, nb);
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Shuffles in place with a fixed seed, so the permutation depends only on `n`.
#[no_mangle]
pub unsafe extern "C" fn shuffle(nums: *mut f64, n: i64) {
    let nums = slice_of_mut(nums, n);
    let mut rng = StdRng::seed_from_u64(0);
    nums.shuffle(&mut rng);
}

#[no_mangle]
pub unsafe extern "C" fn increase(nums: *mut i64, n: i64, a: i64) {
    for x in slice_of_mut(nums, n) {
        *x = x.wrapping_add(a);
    }
}

/// Writes `s` repeated `n` times into `out` and returns `out`.
#[no_mangle]
pub unsafe extern "C" fn repeat(s: *const c_char, n: i64, out: *mut c_char, out_n: i64) -> *mut c_char {
    let s = read_str(s);
    let limit = usize::try_from(out_n).unwrap_or(0).saturating_sub(1);
    let text = repeat_within(&s, n, limit);
    write_c_buffer(&text, out, out_n);
    out
}

/// `s` repeated `n` times, stopping once `limit` bytes are covered.
fn repeat_within(s: &str, n: i64, limit: usize) -> String {
    let mut text = String::new();
    if s.is_empty() {
        return text;
    }
    for _ in 0..n.max(0) {
        if text.len() >= limit {
            break;
        }
        text.push_str(s);
    }
    text
}

/// Joins a null-terminated array of strings with `sep` into `out`.
///
/// Returns the joined length, or -1 when it does not fit in `out_n - 1` bytes.
#[no_mangle]
pub unsafe extern "C" fn join(
    strs: *const *const c_char,
    sep: *const c_char,
    out: *mut c_char,
    out_n: i64,
) -> i64 {
    let mut words = Vec::new();
    if !strs.is_null() {
        let mut i = 0;
        while !(*strs.add(i)).is_null() {
            words.push(read_str(*strs.add(i)));
            i += 1;
        }
    }
    let joined = words.join(&read_str(sep));
    if out_n <= 0 || joined.len() as i64 > out_n - 1 {
        return -1;
    }
    write_c_buffer(&joined, out, out_n) as i64
}

/// Writes "first last" into the caller's `full_name` buffer.
#[no_mangle]
pub unsafe extern "C" fn fill(p: *mut Person) {
    let Some(p) = p.as_mut() else {
        return;
    };
    let mut full = read_str(p.first_name);
    let _ = write!(full, " {}", read_str(p.last_name));
    write_c_buffer(&full, p.full_name, p.full_name_len);
}

fn new_error(message: Option<String>) -> CError {
    CError {
        err: message.map_or(std::ptr::null_mut(), alloc_c_string),
    }
}

/// Reports whether `i` is even. Negative numbers are fine: -5 is simply odd.
#[no_mangle]
pub extern "C" fn even(i: i64) -> EvenResult {
    EvenResult {
        result: i % 2 == 0,
        err: new_error(None),
    }
}

/// Like `even`, but rejects negative input through the embedded error.
#[no_mangle]
pub extern "C" fn evenNonNegative(i: i64) -> EvenResult {
    if i < 0 {
        return EvenResult {
            result: false,
            err: new_error(Some(format!("{} is negative, want at least 0", i))),
        };
    }
    even(i)
}

#[no_mangle]
pub unsafe extern "C" fn delError(err: CError) {
    free_c_string(err.err);
}

#[no_mangle]
pub unsafe extern "C" fn getUserInfo(name: *const c_char) -> UserInfo {
    let name = read_str(name);
    let description = format!("User {:?} has {} letters in their name", name, name.len());
    UserInfo {
        name_length: name.len() as i64,
        name: alloc_c_string(name),
        description: alloc_c_string(description),
    }
}

#[no_mangle]
pub unsafe extern "C" fn delUserInfo(info: UserInfo) {
    free_c_string(info.name);
    free_c_string(info.description);
}

/// Asks the host for a header string and `n` doubles, then fills in `sqrt(i + 1)`.
#[no_mangle]
pub unsafe extern "C" fn sqrts(alloc: Option<AllocFn>, n: i64) {
    let Some(alloc) = alloc else {
        return;
    };
    let header = format!("Square roots up to {}:", n);
    let bytes = alloc(c"B".as_ptr(), header.len() as i64) as *mut u8;
    if bytes.is_null() {
        return;
    }
    slice_of_mut(bytes, header.len() as i64).copy_from_slice(header.as_bytes());

    let floats = alloc(c"d".as_ptr(), n) as *mut f64;
    for (i, x) in slice_of_mut(floats, n).iter_mut().enumerate() {
        *x = ((i + 1) as f64).sqrt();
    }
}

/// Returns a newly allocated `[0, 1, ..., n-1]`, or null when `n <= 0` or
/// the values cannot be allocated.
#[no_mangle]
pub extern "C" fn iota(n: i64) -> *mut i64 {
    if n <= 0 {
        return std::ptr::null_mut();
    }
    let Ok(len) = usize::try_from(n) else {
        return std::ptr::null_mut();
    };
    let mut values = Vec::new();
    if values.try_reserve_exact(len).is_err() {
        return std::ptr::null_mut();
    }
    values.extend(0..n);
    let values = values.into_boxed_slice();
    track(1);
    Box::into_raw(values) as *mut i64
}

#[no_mangle]
pub unsafe extern "C" fn delInts(p: *mut i64, n: i64) {
    if p.is_null() || n <= 0 {
        return;
    }
    drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(p, n as usize)));
    track(-1);
}

/// Outstanding allocations made by this library on the calling thread.
#[no_mangle]
pub extern "C" fn liveAllocations() -> i64 {
    LIVE_ALLOCATIONS.with(Cell::get)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add() {
        assert_eq!(add(10, 15), 25);
        assert_eq!(add(i64::MAX, 1), i64::MIN);
    }

    #[test]
    fn test_write_c_buffer_truncates() {
        let mut buf = [0x7f_u8; 4];
        let written = unsafe { write_c_buffer("abcdef", buf.as_mut_ptr() as *mut c_char, 4) };
        assert_eq!(written, 3);
        assert_eq!(&buf, b"abc\0");
    }

    #[test]
    fn test_write_c_buffer_zero_capacity() {
        let written = unsafe { write_c_buffer("abc", std::ptr::null_mut(), 0) };
        assert_eq!(written, 0);
    }

    #[test]
    fn test_repeat_stops_at_buffer_size() {
        let mut buf = [0_u8; 8];
        let s = c"Badger";
        unsafe { repeat(s.as_ptr(), i64::MAX, buf.as_mut_ptr() as *mut c_char, 8) };
        assert_eq!(&buf, b"BadgerB\0");
        assert_eq!(repeat_within("ab", i64::MAX, 5), "ababab");
        assert_eq!(repeat_within("", i64::MAX, 5), "");
        assert_eq!(repeat_within("ab", -2, 5), "");
    }

    #[test]
    fn test_iota_refuses_what_it_cannot_allocate() {
        assert!(iota(0).is_null());
        assert!(iota(i64::MAX).is_null());

        let p = iota(3);
        assert_eq!(unsafe { std::slice::from_raw_parts(p, 3) }, &[0, 1, 2]);
        unsafe { delInts(p, 3) };
    }

    #[test]
    fn test_even_negative_is_not_an_error() {
        let r = even(-5);
        assert!(!r.result);
        assert!(r.err.err.is_null());
    }

    #[test]
    fn test_even_non_negative_allocates_error() {
        let before = liveAllocations();
        let r = evenNonNegative(-3);
        assert!(!r.err.err.is_null());
        assert_eq!(liveAllocations(), before + 1);
        unsafe { delError(r.err) };
        assert_eq!(liveAllocations(), before);
    }

    #[test]
    fn test_iota_and_del_ints() {
        let before = liveAllocations();
        let p = iota(3);
        let values = unsafe { std::slice::from_raw_parts(p, 3) };
        assert_eq!(values, &[0, 1, 2]);
        unsafe { delInts(p, 3) };
        assert_eq!(liveAllocations(), before);
        assert!(iota(0).is_null());
    }
}
