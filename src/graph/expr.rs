use crate::exec::context::ParamId;
use crate::layers::activation::Activation;
use crate::layers::cost::CostKind;
use crate::math::ops::PoolMode;

/// An evaluable forward expression over a built topology.
///
/// `Input` and `Label` are placeholders bound at evaluation time; `Param`
/// refers to a parameter tensor owned by the execution context, so the same
/// expression observes in-place parameter updates between evaluations.
#[derive(Debug, Clone)]
pub enum Expr {
    Input,
    Label,
    Param(ParamId),
    /// Matrix product of two rank-2 values.
    MatMul(Box<Expr>, Box<Expr>),
    /// Broadcast addition of a rank-1 bias along the trailing axis.
    AddBias(Box<Expr>, Box<Expr>),
    Activate(Activation, Box<Expr>),
    /// SAME-padded stride-1 convolution plus channel bias.
    Conv2d {
        input: Box<Expr>,
        kernel: Box<Expr>,
        bias: Box<Expr>,
    },
    Pool {
        mode: PoolMode,
        pool_h: usize,
        pool_w: usize,
        input: Box<Expr>,
    },
    /// Reshape to `(batch, features)` at a flatten boundary.
    Flatten(Box<Expr>),
    /// Channel-axis concatenation of pipe branch outputs, in branch order.
    Concat(Vec<Expr>),
    /// Scalar objective of predictions against the bound label.
    Cost(CostKind, Box<Expr>, Box<Expr>),
}
