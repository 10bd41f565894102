//! Recursive evaluation of forward expressions against bound data.
//!
//! All data-dependent shape violations surface here as `BuildNetwork`
//! errors: construction-time checks cannot see the real input, so feeding a
//! tensor of the wrong width fails at evaluation time, not at `add` time.

use crate::error::{NetError, NetResult};
use crate::exec::context::{Bindings, ExecutionContext};
use crate::graph::expr::Expr;
use crate::math::ops::{concat_channels, conv2d_same, pool2d};
use crate::math::tensor::Tensor;

impl ExecutionContext {
    /// Evaluates `expr` with the given bindings, producing a value tensor.
    pub fn evaluate(&self, expr: &Expr, bindings: &Bindings<'_>) -> NetResult<Tensor> {
        match expr {
            Expr::Input => Ok(bindings.input.clone()),
            Expr::Label => bindings
                .label
                .cloned()
                .ok_or_else(|| NetError::network("please provide a label matrix")),
            Expr::Param(id) => Ok(self.param(*id).clone()),
            Expr::MatMul(a, b) => {
                let a = self.evaluate(a, bindings)?;
                let b = self.evaluate(b, bindings)?;
                a.matmul(&b)
            }
            Expr::AddBias(x, bias) => {
                let x = self.evaluate(x, bindings)?;
                let bias = self.evaluate(bias, bindings)?;
                x.add_bias(&bias)
            }
            Expr::Activate(activation, x) => {
                let x = self.evaluate(x, bindings)?;
                Ok(x.map(|v| activation.apply(v)))
            }
            Expr::Conv2d { input, kernel, bias } => {
                let input = self.evaluate(input, bindings)?;
                let kernel = self.evaluate(kernel, bindings)?;
                let bias = self.evaluate(bias, bindings)?;
                conv2d_same(&input, &kernel)?.add_bias(&bias)
            }
            Expr::Pool { mode, pool_h, pool_w, input } => {
                let input = self.evaluate(input, bindings)?;
                pool2d(&input, *mode, *pool_h, *pool_w)
            }
            Expr::Flatten(x) => Ok(self.evaluate(x, bindings)?.flatten_rows()),
            Expr::Concat(parts) => {
                let mut evaluated = Vec::with_capacity(parts.len());
                for part in parts {
                    evaluated.push(self.evaluate(part, bindings)?);
                }
                concat_channels(&evaluated)
            }
            Expr::Cost(kind, predicted, expected) => {
                let predicted = self.evaluate(predicted, bindings)?;
                let expected = self.evaluate(expected, bindings)?;
                kind.evaluate(&predicted, &expected)
            }
        }
    }
}
