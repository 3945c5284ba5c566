//! Guest-callable functions and their signatures.

use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::error::{Fault, FaultResult};

/// The type of a guest value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    I32,
    I64,
    F32,
    F64,
}

/// A guest value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Value {
    /// The type of this value.
    pub fn ty(&self) -> ValueType {
        match self {
            Value::I32(_) => ValueType::I32,
            Value::I64(_) => ValueType::I64,
            Value::F32(_) => ValueType::F32,
            Value::F64(_) => ValueType::F64,
        }
    }

    /// Extract an `i32`, if this is one.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(*v),
            _ => None,
        }
    }
}

/// A function signature.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct FuncType {
    pub params: Vec<ValueType>,
    pub results: Vec<ValueType>,
}

impl FuncType {
    pub fn new(params: impl Into<Vec<ValueType>>, results: impl Into<Vec<ValueType>>) -> Self {
        Self {
            params: params.into(),
            results: results.into(),
        }
    }

    /// The signature of thread entry and error functions: `(i32) -> ()`.
    pub fn thread_entry() -> Self {
        Self::new([ValueType::I32], [])
    }
}

impl fmt::Display for FuncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} -> {:?}", self.params, self.results)
    }
}

/// Host implementation backing a guest function.
pub type HostFn = dyn Fn(&Context, &[Value]) -> FaultResult<Vec<Value>> + Send + Sync;

/// A callable guest function.
///
/// Functions are shared through `Arc` so tables, thread records and the
/// collector's root enumeration can all refer to the same instance.
pub struct Function {
    name: String,
    ty: FuncType,
    body: Box<HostFn>,
}

impl Function {
    /// Create a new function.
    pub fn new<F>(name: impl Into<String>, ty: FuncType, body: F) -> Arc<Self>
    where
        F: Fn(&Context, &[Value]) -> FaultResult<Vec<Value>> + Send + Sync + 'static,
    {
        Arc::new(Self {
            name: name.into(),
            ty,
            body: Box::new(body),
        })
    }

    /// Create a `(i32) -> ()` function, the shape used for thread entry points.
    pub fn thread_entry<F>(name: impl Into<String>, body: F) -> Arc<Self>
    where
        F: Fn(&Context, i32) -> FaultResult<()> + Send + Sync + 'static,
    {
        Self::new(name, FuncType::thread_entry(), move |ctx, args| {
            let argument = args.first().and_then(Value::as_i32).unwrap_or_default();
            body(ctx, argument).map(|()| Vec::new())
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &FuncType {
        &self.ty
    }

    /// Invoke the function in `ctx`.
    ///
    /// The arguments must match the parameter types exactly.
    pub fn invoke(&self, ctx: &Context, args: &[Value]) -> FaultResult<Vec<Value>> {
        let matches = args.len() == self.ty.params.len()
            && args.iter().zip(&self.ty.params).all(|(a, p)| a.ty() == *p);
        if !matches {
            return Err(Fault::InvalidArgument(format!(
                "{} expects {:?}",
                self.name, self.ty.params
            )));
        }
        (self.body)(ctx, args)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .finish_non_exhaustive()
    }
}
