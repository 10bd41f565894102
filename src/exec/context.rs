use std::f64::consts::PI;

use rand::prelude::*;

use crate::math::tensor::Tensor;

/// Opaque handle to a parameter tensor owned by an [`ExecutionContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamId(pub(crate) usize);

/// How a freshly created parameter tensor is filled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Initializer {
    /// Normal samples with the given standard deviation, redrawn until they
    /// fall within two standard deviations of zero.
    TruncatedNormal { std: f64 },
    Constant(f64),
}

/// Input (and optional label) tensors bound to an expression at evaluation
/// time. The input is always required; the label only for cost expressions.
pub struct Bindings<'a> {
    pub input: &'a Tensor,
    pub label: Option<&'a Tensor>,
}

impl<'a> Bindings<'a> {
    pub fn input_only(input: &'a Tensor) -> Bindings<'a> {
        Bindings { input, label: None }
    }

    pub fn with_label(input: &'a Tensor, label: &'a Tensor) -> Bindings<'a> {
        Bindings { input, label: Some(label) }
    }
}

/// Owns every parameter tensor of one or more topologies plus the random
/// state used to initialize them.
///
/// The context is an explicit object: it is created (opened) with a seed,
/// passed to each build/evaluate call, and closed by dropping it. Parameter
/// shapes are fixed at creation; an external optimizer may rewrite parameter
/// *contents* in place through [`ExecutionContext::param_mut`].
pub struct ExecutionContext {
    rng: StdRng,
    params: Vec<Tensor>,
}

impl ExecutionContext {
    /// Opens a context with an explicit seed for reproducible initialization.
    pub fn with_seed(seed: u64) -> ExecutionContext {
        ExecutionContext { rng: StdRng::seed_from_u64(seed), params: Vec::new() }
    }

    /// Opens a context seeded from the operating system.
    pub fn from_entropy() -> ExecutionContext {
        ExecutionContext { rng: StdRng::from_entropy(), params: Vec::new() }
    }

    /// Allocates a parameter tensor and returns its handle. Shapes are fixed
    /// for the lifetime of the context.
    pub fn create_parameter(&mut self, shape: &[usize], init: Initializer) -> ParamId {
        let tensor = match init {
            Initializer::TruncatedNormal { std } => {
                let mut t = Tensor::zeros(shape);
                for v in t.data.iter_mut() {
                    *v = self.sample_truncated_normal(std);
                }
                t
            }
            Initializer::Constant(value) => Tensor::filled(shape, value),
        };
        self.params.push(tensor);
        ParamId(self.params.len() - 1)
    }

    pub fn param(&self, id: ParamId) -> &Tensor {
        &self.params[id.0]
    }

    /// In-place access for optimizer updates; the shape must not change.
    pub fn param_mut(&mut self, id: ParamId) -> &mut Tensor {
        &mut self.params[id.0]
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Samples a single value from N(0, 1) using the Box-Muller transform.
    /// Both u1 and u2 must be uniform on (0, 1] to avoid log(0).
    fn sample_standard_normal(&mut self) -> f64 {
        let u1: f64 = 1.0 - self.rng.gen::<f64>();
        let u2: f64 = 1.0 - self.rng.gen::<f64>();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }

    fn sample_truncated_normal(&mut self, std: f64) -> f64 {
        loop {
            let x = self.sample_standard_normal();
            if x.abs() <= 2.0 {
                return x * std;
            }
        }
    }
}
