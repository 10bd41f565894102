pub mod context;
pub mod eval;

pub use context::{Bindings, ExecutionContext, Initializer, ParamId};
