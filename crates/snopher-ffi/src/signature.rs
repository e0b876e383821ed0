//! Signature descriptors - the declared calling convention of one native function

use crate::caller::Arg;
use crate::error::{FfiError, FfiResult};
use crate::types::{ParamKind, ReturnKind};
use serde::Serialize;
use std::fmt;

/// Ordered parameter kinds plus the return kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Signature {
    params: Vec<ParamKind>,
    returns: ReturnKind,
}

impl Signature {
    pub fn new(params: impl Into<Vec<ParamKind>>, returns: ReturnKind) -> Self {
        Self {
            params: params.into(),
            returns,
        }
    }

    pub fn params(&self) -> &[ParamKind] {
        &self.params
    }

    pub fn returns(&self) -> ReturnKind {
        self.returns
    }

    /// Check arity and argument kinds without touching native code
    ///
    /// Nothing is coerced: an `f32` buffer where `f64` is declared, or an
    /// integer where a float is declared, is a `TypeMismatch`.
    pub fn validate(&self, args: &[Arg<'_>]) -> FfiResult<()> {
        if args.len() != self.params.len() {
            return Err(FfiError::ArityMismatch {
                expected: self.params.len(),
                got: args.len(),
            });
        }
        for (arg, kind) in args.iter().zip(&self.params) {
            if !arg.matches(kind) {
                return Err(FfiError::mismatch(kind.display_name(), arg.describe()));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self.params.iter().map(ParamKind::display_name).collect();
        write!(f, "({})->{}", params.join(","), self.returns.display_name())
    }
}
