//! Forward composition: turning a built topology into an evaluable
//! expression, plus the batched prediction conveniences layered on top.

use crate::error::{NetError, NetResult};
use crate::exec::context::{Bindings, ExecutionContext, ParamId};
use crate::graph::expr::Expr;
use crate::layers::layer::{Layer, SubKind};
use crate::math::ops::PoolMode;
use crate::math::tensor::Tensor;
use crate::topology::builder::Topology;
use crate::topology::pipe::Pipe;

/// Element budget for a single evaluation batch: large inputs are split so
/// that one batch holds at most this many input elements.
pub const DEFAULT_EVAL_BUDGET: usize = 1_000_000;

impl Topology {
    /// Walks the layer list and produces the forward expression.
    ///
    /// With `label = None` the terminal position yields the raw projection:
    /// the last activation is skipped for a plain terminal layer, and an
    /// inert-slot terminal (the cost layer) passes the carried value through
    /// unchanged. With a label, the terminal cost layer produces the scalar
    /// objective. `want_pipe_raw` instead applies the terminal layer in
    /// full; pipe branches are composed this way.
    pub fn compose(
        &self,
        input: Expr,
        label: Option<Expr>,
        want_pipe_raw: bool,
    ) -> NetResult<Expr> {
        let n = self.len();
        if n == 0 {
            return Err(NetError::network("cannot compose an empty topology"));
        }
        let mut cache = self.apply_layer(0, input, None)?;
        for i in 1..n {
            if i == n - 1 {
                if label.is_none() {
                    if want_pipe_raw {
                        return self.apply_layer(i, cache, None);
                    }
                    return self.raw_projection(i, cache);
                }
                return self.apply_layer(i, cache, label.as_ref());
            }
            cache = self.apply_layer(i, cache, None)?;
        }
        Ok(cache)
    }

    /// Per-layer intermediate expressions for diagnostics. Pure function of
    /// the topology and the input expression; safe to call repeatedly.
    pub fn compose_all(&self, input: Expr) -> NetResult<Vec<Expr>> {
        let n = self.len();
        if n == 0 {
            return Err(NetError::network("cannot compose an empty topology"));
        }
        let mut activations = vec![self.apply_layer(0, input, None)?];
        for i in 1..n {
            let carried = activations[activations.len() - 1].clone();
            let next = if i == n - 1 {
                self.raw_projection(i, carried)?
            } else {
                self.apply_layer(i, carried, None)?
            };
            activations.push(next);
        }
        Ok(activations)
    }

    /// Forward evaluation split into bounded batches for memory control.
    /// Each batch holds at most `element_budget` input elements (at least
    /// one row); partial results are stacked back in input order, so the
    /// result is identical to a single-batch evaluation.
    pub fn predict(
        &self,
        ctx: &ExecutionContext,
        input: &Tensor,
        element_budget: usize,
    ) -> NetResult<Tensor> {
        let expr = self.compose(Expr::Input, None, false)?;
        let input = if input.rank() == 1 {
            Tensor::from_parts(&[1, input.len()], input.data.clone())?
        } else {
            input.clone()
        };
        let rows = input.shape[0];
        let per_row = input.row_units().max(1);
        let single_batch = (element_budget / per_row).max(1);
        if single_batch >= rows {
            return ctx.evaluate(&expr, &Bindings::input_only(&input));
        }
        let mut parts = Vec::new();
        let mut start = 0;
        while start < rows {
            let end = (start + single_batch).min(rows);
            let batch = input.slice_rows(start, end);
            parts.push(ctx.evaluate(&expr, &Bindings::input_only(&batch))?);
            start = end;
        }
        Tensor::vstack(&parts)
    }

    /// Row-wise argmax over `predict` output.
    pub fn predict_classes(
        &self,
        ctx: &ExecutionContext,
        input: &Tensor,
        element_budget: usize,
    ) -> NetResult<Vec<usize>> {
        Ok(self.predict(ctx, input, element_budget)?.argmax_rows())
    }

    /// Scalar objective of the topology against labeled data.
    pub fn cost(&self, ctx: &ExecutionContext, input: &Tensor, label: &Tensor) -> NetResult<f64> {
        let expr = self.compose(Expr::Input, Some(Expr::Label), false)?;
        let value = ctx.evaluate(&expr, &Bindings::with_label(input, label))?;
        Ok(value.data[0])
    }

    fn apply_layer(&self, i: usize, carried: Expr, label: Option<&Expr>) -> NetResult<Expr> {
        match &self.layers()[i] {
            Layer::Plain(p) => {
                let x = if p.is_fc { Expr::Flatten(Box::new(carried)) } else { carried };
                let (w, b) = self.slot_params(i)?;
                Ok(Expr::Activate(
                    p.activation,
                    Box::new(Expr::AddBias(
                        Box::new(Expr::MatMul(Box::new(x), Box::new(Expr::Param(w)))),
                        Box::new(Expr::Param(b)),
                    )),
                ))
            }
            Layer::Conv(c) => {
                let (w, b) = self.slot_params(i)?;
                Ok(Expr::Activate(
                    c.activation,
                    Box::new(Expr::Conv2d {
                        input: Box::new(carried),
                        kernel: Box::new(Expr::Param(w)),
                        bias: Box::new(Expr::Param(b)),
                    }),
                ))
            }
            Layer::Sub(s) => match s.kind {
                // Pure pass-through at evaluation time; the stochastic mask
                // belongs to the training backend.
                SubKind::Dropout { .. } => Ok(carried),
                SubKind::MaxPool { pool_h, pool_w } => Ok(Expr::Pool {
                    mode: PoolMode::Max,
                    pool_h,
                    pool_w,
                    input: Box::new(carried),
                }),
                SubKind::AvgPool { pool_h, pool_w } => Ok(Expr::Pool {
                    mode: PoolMode::Avg,
                    pool_h,
                    pool_w,
                    input: Box::new(carried),
                }),
                SubKind::Cost(kind) => match label {
                    Some(label) => Ok(Expr::Cost(
                        kind,
                        Box::new(carried),
                        Box::new(label.clone()),
                    )),
                    None => Ok(carried),
                },
            },
            Layer::Pipe(pipe) => self.pipe_expr(pipe, carried),
        }
    }

    /// Terminal position without a label: the projection with the
    /// nonlinearity (and cost) skipped, flattening first when the previous
    /// layer produced a feature map. Inert-slot layers pass the carried
    /// value through; conv-like terminals apply their own transform, which
    /// is the only projection they have.
    fn raw_projection(&self, i: usize, carried: Expr) -> NetResult<Expr> {
        let prev_conv = i > 0 && self.layers()[i - 1].conv_like();
        match &self.layers()[i] {
            Layer::Plain(_) => {
                let carried = if prev_conv { Expr::Flatten(Box::new(carried)) } else { carried };
                let (w, b) = self.slot_params(i)?;
                Ok(Expr::AddBias(
                    Box::new(Expr::MatMul(Box::new(carried), Box::new(Expr::Param(w)))),
                    Box::new(Expr::Param(b)),
                ))
            }
            Layer::Sub(s) if !s.kind.conv_flavored() => {
                let carried = if prev_conv { Expr::Flatten(Box::new(carried)) } else { carried };
                Ok(carried)
            }
            _ => self.apply_layer(i, carried, None),
        }
    }

    /// Every branch evaluated on the identical input, concatenated along
    /// the channel axis in branch-index order.
    fn pipe_expr(&self, pipe: &Pipe, input: Expr) -> NetResult<Expr> {
        let mut parts = Vec::with_capacity(pipe.branch_count());
        for branch in pipe.branches() {
            parts.push(branch.compose(input.clone(), None, true)?);
        }
        Ok(Expr::Concat(parts))
    }

    fn slot_params(&self, i: usize) -> NetResult<(ParamId, ParamId)> {
        let w = self.weights()[i].param();
        let b = self.bias()[i].param();
        match (w, b) {
            (Some(w), Some(b)) => Ok((w, b)),
            _ => Err(NetError::network(format!(
                "layer {i} ('{}') carries no learned parameters",
                self.layers()[i].name()
            ))),
        }
    }
}
