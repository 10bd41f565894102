pub mod compose;
pub mod expr;

pub use compose::DEFAULT_EVAL_BUDGET;
pub use expr::Expr;
