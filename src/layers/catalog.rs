use serde::{Deserialize, Serialize};

use crate::error::{NetError, NetResult};
use crate::layers::activation::Activation;
use crate::layers::cost::CostKind;
use crate::layers::layer::{ConvLayer, Layer, PlainLayer, SubKind, SubLayer};
use crate::layers::shape::{Dim, KernelSpec, ShapeSpec};

/// A layer request by name plus constructor arguments. This is the unit the
/// catalog resolves, the builder validates, and the build record serializes.
///
/// `shape` declares at most `(input, output)`; for convolutional layers it
/// holds at most the input map (the output derives from `kernel` and
/// `n_filters`). `w_std` / `b_init` override the parameter initializers for
/// this layer only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shape: Vec<Dim>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel: Option<(usize, usize)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_filters: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_prob: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branches: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w_std: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b_init: Option<f64>,
}

impl LayerSpec {
    pub fn new(name: impl Into<String>) -> LayerSpec {
        LayerSpec {
            name: name.into(),
            shape: Vec::new(),
            kernel: None,
            n_filters: None,
            keep_prob: None,
            branches: None,
            w_std: None,
            b_init: None,
        }
    }

    /// Shorthand for a pipe container with `branches` parallel branches.
    pub fn pipe(branches: usize) -> LayerSpec {
        let mut spec = LayerSpec::new("pipe");
        spec.branches = Some(branches);
        spec
    }

    pub fn with_shape(mut self, input: usize, output: usize) -> LayerSpec {
        self.shape = vec![Dim::Flat(input), Dim::Flat(output)];
        self
    }

    pub fn with_output(mut self, output: usize) -> LayerSpec {
        self.shape = vec![Dim::Flat(output)];
        self
    }

    pub fn with_input_map(mut self, channels: usize, height: usize, width: usize) -> LayerSpec {
        self.shape = vec![Dim::map(channels, height, width)];
        self
    }

    pub fn with_kernel(mut self, height: usize, width: usize) -> LayerSpec {
        self.kernel = Some((height, width));
        self
    }

    pub fn with_filters(mut self, n_filters: usize) -> LayerSpec {
        self.n_filters = Some(n_filters);
        self
    }

    pub fn with_keep_prob(mut self, keep_prob: f64) -> LayerSpec {
        self.keep_prob = Some(keep_prob);
        self
    }

    pub fn with_init(mut self, w_std: f64, b_init: f64) -> LayerSpec {
        self.w_std = Some(w_std);
        self.b_init = Some(b_init);
        self
    }

    pub(crate) fn declared(&self) -> NetResult<ShapeSpec> {
        ShapeSpec::from_dims(&self.shape)
    }

    fn kernel_spec(&self) -> NetResult<KernelSpec> {
        let (height, width) = self.kernel.ok_or_else(|| {
            NetError::layer(format!("layer '{}' requires a kernel window", self.name))
        })?;
        if height == 0 || width == 0 {
            return Err(NetError::layer(format!(
                "layer '{}' requires a non-zero kernel window, {height}x{width} found",
                self.name
            )));
        }
        Ok(match self.n_filters {
            Some(n_filters) => KernelSpec::Filters { n_filters, height, width },
            None => KernelSpec::Window { height, width },
        })
    }
}

/// Outcome of a catalog lookup against a non-empty topology.
#[derive(Debug)]
pub enum Resolved {
    /// The layer already carries a complete, self-sufficient shape; the
    /// builder appends it without further inference (pools).
    SelfSufficient(Layer),
    /// The layer plus whether its input dimension was stated explicitly
    /// (the builder's dimension check applies only to explicit inputs).
    Shaped { layer: Layer, input_explicit: bool },
}

/// Resolves layer names and constructor arguments into layer instances.
pub struct LayerCatalog;

impl LayerCatalog {
    pub fn is_conv_name(name: &str) -> bool {
        name.strip_prefix("conv_")
            .is_some_and(|rest| Activation::by_name(rest).is_some())
    }

    /// Resolves a spec for an empty topology. The first layer must own a
    /// learned projection and declare a complete shape.
    pub fn first_layer(spec: &LayerSpec) -> NetResult<Layer> {
        let declared = spec.declared()?;
        if let Some(activation) = Activation::by_name(&spec.name) {
            return match declared {
                ShapeSpec::Full(Dim::Flat(input), Dim::Flat(output)) => {
                    Ok(Layer::plain(activation, input, output))
                }
                ShapeSpec::Full(..) => Err(NetError::layer(format!(
                    "invalid first layer '{}' (expected flat dimensions)",
                    spec.name
                ))),
                _ => Err(NetError::layer(format!(
                    "invalid first layer '{}' (a full two-element shape is required)",
                    spec.name
                ))),
            };
        }
        if let Some(rest) = spec.name.strip_prefix("conv_") {
            if let Some(activation) = Activation::by_name(rest) {
                let kernel = spec.kernel_spec()?;
                return match declared.declared_input().or(declared.declared_output()) {
                    Some(Dim::Map { channels, height, width }) => Ok(Layer::Conv(
                        ConvLayer::new(activation, channels, height, width, kernel),
                    )),
                    _ => Err(NetError::layer(format!(
                        "invalid first layer '{}' (an input feature map is required)",
                        spec.name
                    ))),
                };
            }
        }
        if Self::is_sub_name(&spec.name) {
            return Err(NetError::layer(format!(
                "invalid first layer '{}' (the first layer should not be a sub-layer)",
                spec.name
            )));
        }
        if spec.name.eq_ignore_ascii_case("pipe") {
            return Err(NetError::layer(
                "a pipe requires a preceding layer to branch from",
            ));
        }
        Err(NetError::lookup(format!("unknown layer '{}'", spec.name)))
    }

    /// Resolves a spec against the previous layer and the current dimension.
    pub fn resolve(spec: &LayerSpec, parent: &Layer, cursor: Dim) -> NetResult<Resolved> {
        let declared = spec.declared()?;

        if let Some(activation) = Activation::by_name(&spec.name) {
            let output = match declared.declared_output() {
                Some(Dim::Flat(n)) => n,
                Some(Dim::Map { .. }) => {
                    return Err(NetError::layer(format!(
                        "layer '{}' expects a flat output dimension",
                        spec.name
                    )))
                }
                None => {
                    return Err(NetError::layer(format!(
                        "layer '{}' requires an output dimension",
                        spec.name
                    )))
                }
            };
            let (input, input_explicit) = match declared.declared_input() {
                Some(dim) => (dim.units(), true),
                None => (cursor.units(), false),
            };
            return Ok(Resolved::Shaped {
                layer: Layer::Plain(PlainLayer {
                    activation,
                    in_dim: input,
                    out_dim: output,
                    is_fc: false,
                }),
                input_explicit,
            });
        }

        if let Some(rest) = spec.name.strip_prefix("conv_") {
            if let Some(activation) = Activation::by_name(rest) {
                let kernel = spec.kernel_spec()?;
                // For convolutions a single-entry shape is the input map;
                // the output derives from the kernel spec.
                let declared_in = match declared {
                    ShapeSpec::Full(input, _) => Some(input),
                    ShapeSpec::Out(dim) => Some(dim),
                    ShapeSpec::Inferred => None,
                };
                let (input, input_explicit) = match declared_in {
                    Some(dim) => (dim, true),
                    None if parent.conv_like() => {
                        let (c, h, w) = parent.conv_out()?;
                        (Dim::map(c, h, w), false)
                    }
                    None => match cursor {
                        Dim::Map { .. } => (cursor, false),
                        Dim::Flat(_) => {
                            return Err(NetError::layer(format!(
                                "layer '{}' requires a feature-map input, flat dimension {} found",
                                spec.name, cursor
                            )))
                        }
                    },
                };
                let (c, h, w) = input.map_dims().ok_or_else(|| {
                    NetError::layer(format!(
                        "layer '{}' requires a feature-map input, {input} found",
                        spec.name
                    ))
                })?;
                return Ok(Resolved::Shaped {
                    layer: Layer::Conv(ConvLayer::new(activation, c, h, w, kernel)),
                    input_explicit,
                });
            }
        }

        if spec.name == "dropout" {
            let input = cursor.flat().ok_or_else(|| {
                NetError::layer(format!(
                    "sub-layer 'dropout' requires a flat input, {cursor} found"
                ))
            })?;
            let output = match declared.declared_output() {
                Some(dim) => dim,
                None => Dim::Flat(input),
            };
            return Ok(Resolved::Shaped {
                layer: Layer::Sub(SubLayer {
                    kind: SubKind::Dropout { keep_prob: spec.keep_prob.unwrap_or(0.5) },
                    in_dim: Dim::Flat(input),
                    out_dim: output,
                }),
                input_explicit: false,
            });
        }

        if spec.name == "max_pool" || spec.name == "avg_pool" {
            let (pool_h, pool_w) = spec.kernel.ok_or_else(|| {
                NetError::layer(format!("layer '{}' requires a pooling window", spec.name))
            })?;
            if pool_h == 0 || pool_w == 0 {
                return Err(NetError::layer(format!(
                    "layer '{}' requires a non-zero pooling window, {pool_h}x{pool_w} found",
                    spec.name
                )));
            }
            let source = if parent.conv_like() {
                let (c, h, w) = parent.conv_out()?;
                Dim::map(c, h, w)
            } else {
                cursor
            };
            let (c, h, w) = source.map_dims().ok_or_else(|| {
                NetError::layer(format!(
                    "sub-layer '{}' requires a feature-map input, {source} found",
                    spec.name
                ))
            })?;
            let kind = if spec.name == "max_pool" {
                SubKind::MaxPool { pool_h, pool_w }
            } else {
                SubKind::AvgPool { pool_h, pool_w }
            };
            return Ok(Resolved::SelfSufficient(Layer::Sub(SubLayer {
                kind,
                in_dim: Dim::map(c, h, w),
                out_dim: Dim::map(c, h.div_ceil(pool_h), w.div_ceil(pool_w)),
            })));
        }

        if let Some(kind) = CostKind::by_name(&spec.name) {
            let input = cursor.flat().ok_or_else(|| {
                NetError::layer(format!(
                    "cost layer '{}' requires a flat input, {cursor} found",
                    spec.name
                ))
            })?;
            let output = match declared.declared_output() {
                Some(dim) => dim,
                None => Dim::Flat(input),
            };
            return Ok(Resolved::Shaped {
                layer: Layer::Sub(SubLayer {
                    kind: SubKind::Cost(kind),
                    in_dim: Dim::Flat(input),
                    out_dim: output,
                }),
                input_explicit: false,
            });
        }

        Err(NetError::lookup(format!("unknown layer '{}'", spec.name)))
    }

    fn is_sub_name(name: &str) -> bool {
        matches!(name, "dropout" | "max_pool" | "avg_pool") || CostKind::by_name(name).is_some()
    }
}
