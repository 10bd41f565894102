use crate::error::{NetError, NetResult};
use crate::layers::activation::Activation;
use crate::layers::catalog::LayerSpec;
use crate::layers::cost::CostKind;
use crate::layers::shape::{Dim, KernelSpec};
use crate::topology::pipe::Pipe;

/// A layer of the topology, as a closed set of kinds.
///
/// - `Plain`: an activation layer owning a learned `(in, out)` projection.
/// - `Sub`: a shape-preserving transform (dropout, pooling) or the
///   terminal cost layer; never owns a learned projection.
/// - `Conv`: a convolutional layer owning a learned filter bank.
/// - `Pipe`: a container of parallel branch topologies.
#[derive(Debug)]
pub enum Layer {
    Plain(PlainLayer),
    Sub(SubLayer),
    Conv(ConvLayer),
    Pipe(Pipe),
}

#[derive(Debug, Clone)]
pub struct PlainLayer {
    pub activation: Activation,
    pub in_dim: usize,
    pub out_dim: usize,
    /// Set when the input arrives as a flattened feature map (the layer sits
    /// on a convolution-to-dense boundary).
    pub is_fc: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SubKind {
    Dropout { keep_prob: f64 },
    MaxPool { pool_h: usize, pool_w: usize },
    AvgPool { pool_h: usize, pool_w: usize },
    Cost(CostKind),
}

impl SubKind {
    /// Pools transform feature maps and carry empty parameter slots; the
    /// other sub-layers operate on flat values with inert slots.
    pub fn conv_flavored(&self) -> bool {
        matches!(self, SubKind::MaxPool { .. } | SubKind::AvgPool { .. })
    }

    pub fn is_cost(&self) -> bool {
        matches!(self, SubKind::Cost(_))
    }
}

#[derive(Debug, Clone)]
pub struct SubLayer {
    pub kind: SubKind,
    pub in_dim: Dim,
    pub out_dim: Dim,
}

#[derive(Debug, Clone)]
pub struct ConvLayer {
    pub activation: Activation,
    pub in_channels: usize,
    pub in_h: usize,
    pub in_w: usize,
    pub kernel: KernelSpec,
    /// Set when the next layer consumes this layer's output flattened
    /// (the layer is the base of a convolution-to-dense transition).
    pub is_fc_base: bool,
}

impl ConvLayer {
    pub fn new(
        activation: Activation,
        in_channels: usize,
        in_h: usize,
        in_w: usize,
        kernel: KernelSpec,
    ) -> ConvLayer {
        ConvLayer { activation, in_channels, in_h, in_w, kernel, is_fc_base: false }
    }

    pub fn n_filters(&self) -> usize {
        self.kernel.filters_for(self.in_channels)
    }

    // SAME padding, stride 1: spatial extent is preserved.
    pub fn out_h(&self) -> usize {
        self.in_h
    }

    pub fn out_w(&self) -> usize {
        self.in_w
    }

    pub fn out_map(&self) -> Dim {
        Dim::map(self.n_filters(), self.out_h(), self.out_w())
    }
}

impl Layer {
    /// Pre-built plain layer with an explicit `(input, output)` shape.
    pub fn plain(activation: Activation, in_dim: usize, out_dim: usize) -> Layer {
        Layer::Plain(PlainLayer { activation, in_dim, out_dim, is_fc: false })
    }

    /// Pre-built convolutional layer from an input map and a kernel spec.
    pub fn conv(activation: Activation, input: (usize, usize, usize), kernel: KernelSpec) -> Layer {
        let (c, h, w) = input;
        Layer::Conv(ConvLayer::new(activation, c, h, w, kernel))
    }

    pub fn dropout(dim: usize, keep_prob: f64) -> Layer {
        Layer::Sub(SubLayer {
            kind: SubKind::Dropout { keep_prob },
            in_dim: Dim::Flat(dim),
            out_dim: Dim::Flat(dim),
        })
    }

    pub fn cost(kind: CostKind, dim: usize) -> Layer {
        Layer::Sub(SubLayer {
            kind: SubKind::Cost(kind),
            in_dim: Dim::Flat(dim),
            out_dim: Dim::Flat(dim),
        })
    }

    /// Display name used in structure reports and build records.
    pub fn name(&self) -> String {
        match self {
            Layer::Plain(p) => p.activation.name().to_string(),
            Layer::Conv(c) => format!("Conv{}", c.activation.name()),
            Layer::Sub(s) => match s.kind {
                SubKind::Dropout { .. } => "Dropout".to_string(),
                SubKind::MaxPool { .. } => "MaxPool".to_string(),
                SubKind::AvgPool { .. } => "AvgPool".to_string(),
                SubKind::Cost(kind) => kind.name().to_string(),
            },
            Layer::Pipe(_) => "Pipe".to_string(),
        }
    }

    /// The terminal cost layer; nothing may be appended after it.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Layer::Sub(s) if s.kind.is_cost())
    }

    /// Layers whose output is a feature map: convolutions, pools, and pipes.
    pub fn conv_like(&self) -> bool {
        match self {
            Layer::Conv(_) | Layer::Pipe(_) => true,
            Layer::Sub(s) => s.kind.conv_flavored(),
            Layer::Plain(_) => false,
        }
    }

    /// Output feature map `(channels, height, width)` of a conv-like layer.
    pub fn conv_out(&self) -> NetResult<(usize, usize, usize)> {
        match self {
            Layer::Conv(c) => Ok((c.n_filters(), c.out_h(), c.out_w())),
            Layer::Pipe(p) => p.out_shape(),
            Layer::Sub(s) if s.kind.conv_flavored() => {
                s.out_dim.map_dims().ok_or_else(|| {
                    NetError::layer("pooling layer does not carry a feature-map shape")
                })
            }
            _ => Err(NetError::layer(format!(
                "layer '{}' does not produce a feature map",
                self.name()
            ))),
        }
    }

    pub fn in_dim(&self) -> NetResult<Dim> {
        match self {
            Layer::Plain(p) => Ok(Dim::Flat(p.in_dim)),
            Layer::Sub(s) => Ok(s.in_dim),
            Layer::Conv(c) => Ok(Dim::map(c.in_channels, c.in_h, c.in_w)),
            Layer::Pipe(p) => p.in_shape().map(|(c, h, w)| Dim::map(c, h, w)),
        }
    }

    pub fn out_dim(&self) -> NetResult<Dim> {
        match self {
            Layer::Plain(p) => Ok(Dim::Flat(p.out_dim)),
            Layer::Sub(s) => Ok(s.out_dim),
            Layer::Conv(c) => Ok(c.out_map()),
            Layer::Pipe(p) => p.out_shape().map(|(c, h, w)| Dim::map(c, h, w)),
        }
    }

    /// Build record entry equivalent to re-adding this layer by name.
    pub fn to_spec(&self) -> LayerSpec {
        match self {
            Layer::Plain(p) => LayerSpec::new(p.activation.catalog_name())
                .with_shape(p.in_dim, p.out_dim),
            Layer::Conv(c) => {
                let (kh, kw) = c.kernel.window();
                let mut spec = LayerSpec::new(format!("conv_{}", c.activation.catalog_name()))
                    .with_input_map(c.in_channels, c.in_h, c.in_w)
                    .with_kernel(kh, kw);
                if let KernelSpec::Filters { n_filters, .. } = c.kernel {
                    spec = spec.with_filters(n_filters);
                }
                spec
            }
            Layer::Sub(s) => match s.kind {
                SubKind::Dropout { keep_prob } => {
                    let mut spec = LayerSpec::new("dropout").with_keep_prob(keep_prob);
                    spec.shape = vec![s.out_dim];
                    spec
                }
                SubKind::MaxPool { pool_h, pool_w } => {
                    LayerSpec::new("max_pool").with_kernel(pool_h, pool_w)
                }
                SubKind::AvgPool { pool_h, pool_w } => {
                    LayerSpec::new("avg_pool").with_kernel(pool_h, pool_w)
                }
                SubKind::Cost(kind) => {
                    let mut spec = LayerSpec::new(kind.catalog_name());
                    spec.shape = vec![s.out_dim];
                    spec
                }
            },
            Layer::Pipe(p) => LayerSpec::pipe(p.branch_count()),
        }
    }
}
