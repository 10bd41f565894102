use crate::error::{NetError, NetResult};
use crate::exec::context::{ExecutionContext, Initializer, ParamId};
use crate::layers::catalog::{LayerCatalog, LayerSpec, Resolved};
use crate::layers::layer::{ConvLayer, Layer};
use crate::layers::shape::Dim;
use crate::topology::pipe::Pipe;
use crate::topology::spec::{BuildOp, TopologySpec};

/// Default standard deviation for truncated-normal weight initialization.
pub const DEFAULT_W_STD: f64 = 0.1;
/// Default constant fill for fresh bias tensors.
pub const DEFAULT_B_INIT: f64 = 0.1;

/// Weight slot attached to a layer by position.
///
/// `Identity(d)` marks the inert pass-through slot of a non-conv sub-layer:
/// it reports a `(d, d)` shape but no matrix is ever materialized; the
/// forward composer treats the layer as a pure transform of its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightSlot {
    Param(ParamId),
    Identity(usize),
    Empty,
}

impl WeightSlot {
    pub fn shape(&self, ctx: &ExecutionContext) -> Option<Vec<usize>> {
        match self {
            WeightSlot::Param(id) => Some(ctx.param(*id).shape.clone()),
            WeightSlot::Identity(d) => Some(vec![*d, *d]),
            WeightSlot::Empty => None,
        }
    }

    pub fn param(&self) -> Option<ParamId> {
        match self {
            WeightSlot::Param(id) => Some(*id),
            _ => None,
        }
    }
}

/// Bias slot attached to a layer by position; `Zeros` is the inert
/// counterpart of [`WeightSlot::Identity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiasSlot {
    Param(ParamId),
    Zeros(usize),
    Empty,
}

impl BiasSlot {
    pub fn shape(&self, ctx: &ExecutionContext) -> Option<Vec<usize>> {
        match self {
            BiasSlot::Param(id) => Some(ctx.param(*id).shape.clone()),
            BiasSlot::Zeros(d) => Some(vec![*d]),
            BiasSlot::Empty => None,
        }
    }

    pub fn param(&self) -> Option<ParamId> {
        match self {
            BiasSlot::Param(id) => Some(*id),
            _ => None,
        }
    }
}

/// An incrementally built network topology: the ordered layer list, the
/// parallel weight/bias slot arrays, the `current_dimension` cursor (the
/// expected input shape of the next layer), and the build record used for
/// serialization replay.
///
/// The three parallel arrays always have equal length; a rejected mutation
/// leaves all of them at their pre-call state.
#[derive(Debug, Default)]
pub struct Topology {
    layers: Vec<Layer>,
    weights: Vec<WeightSlot>,
    bias: Vec<BiasSlot>,
    current_dimension: Option<Dim>,
    record: Vec<BuildOp>,
}

impl Topology {
    pub fn new() -> Topology {
        Topology::default()
    }

    /// Shortcut constructor: a sigmoid chain over the given widths
    /// terminated by a cross-entropy layer.
    pub fn from_units(ctx: &mut ExecutionContext, units: &[usize]) -> NetResult<Topology> {
        if units.len() < 2 {
            return Err(NetError::layer("at least 2 layer widths are needed"));
        }
        let mut topology = Topology::new();
        topology.add(ctx, &LayerSpec::new("sigmoid").with_shape(units[0], units[1]))?;
        for &width in &units[2..] {
            topology.add(ctx, &LayerSpec::new("sigmoid").with_output(width))?;
        }
        let last = *units.last().unwrap();
        topology.add(ctx, &LayerSpec::new("cross_entropy").with_output(last))?;
        Ok(topology)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn weights(&self) -> &[WeightSlot] {
        &self.weights
    }

    pub fn bias(&self) -> &[BiasSlot] {
        &self.bias
    }

    pub fn current_dimension(&self) -> Option<Dim> {
        self.current_dimension
    }

    pub fn record(&self) -> &[BuildOp] {
        &self.record
    }

    /// Weight/bias shapes per layer position, `None` for empty slots.
    pub fn slot_shapes(
        &self,
        ctx: &ExecutionContext,
    ) -> Vec<(Option<Vec<usize>>, Option<Vec<usize>>)> {
        self.weights
            .iter()
            .zip(self.bias.iter())
            .map(|(w, b)| (w.shape(ctx), b.shape(ctx)))
            .collect()
    }

    /// Captures the build record for serialization; replaying it against a
    /// fresh builder reproduces the same layer count and slot shapes.
    pub fn to_spec(&self, name: impl Into<String>) -> TopologySpec {
        TopologySpec { name: name.into(), ops: self.record.clone() }
    }

    /// Appends a layer resolved from a name plus constructor arguments.
    pub fn add(&mut self, ctx: &mut ExecutionContext, spec: &LayerSpec) -> NetResult<()> {
        spec.declared()?;
        if spec.name.eq_ignore_ascii_case("pipe") {
            return self.add_pipe(spec);
        }
        if self.layers.is_empty() {
            let layer = LayerCatalog::first_layer(spec)?;
            return self.append_first(ctx, layer, spec.w_std, spec.b_init, BuildOp::add(spec));
        }
        self.guard_terminal()?;
        let cursor = self.refresh_cursor()?;
        let parent = self.layers.last().unwrap();
        let (layer, input_explicit) = match LayerCatalog::resolve(spec, parent, cursor)? {
            Resolved::SelfSufficient(layer) => (layer, false),
            Resolved::Shaped { layer, input_explicit } => (layer, input_explicit),
        };
        self.append(ctx, layer, input_explicit, cursor, spec.w_std, spec.b_init, BuildOp::add(spec))
    }

    /// Appends a pre-built layer carrying a complete shape.
    pub fn add_layer(&mut self, ctx: &mut ExecutionContext, layer: Layer) -> NetResult<()> {
        let op = BuildOp::add(&layer.to_spec());
        if self.layers.is_empty() {
            return self.append_first(ctx, layer, None, None, op);
        }
        self.guard_terminal()?;
        if let Layer::Pipe(pipe) = layer {
            self.push_pipe(pipe, op);
            return Ok(());
        }
        let cursor = self.refresh_cursor()?;
        self.append(ctx, layer, true, cursor, None, None, op)
    }

    /// Appends a layer to branch `branch` of the most recently added pipe.
    pub fn add_pipe_layer(
        &mut self,
        ctx: &mut ExecutionContext,
        branch: usize,
        spec: &LayerSpec,
    ) -> NetResult<()> {
        if !matches!(self.layers.last(), Some(Layer::Pipe(_))) {
            return Err(NetError::layer(
                "adding pipe layers to a non-pipe layer is not allowed",
            ));
        }
        // Branch input inherited from the pipe's predecessor in this topology.
        let derived = if self.layers.len() >= 2 {
            let predecessor = &self.layers[self.layers.len() - 2];
            predecessor.conv_out().ok().map(|(c, h, w)| Dim::map(c, h, w))
        } else {
            None
        };
        match self.layers.last_mut() {
            Some(Layer::Pipe(pipe)) => pipe.add(ctx, branch, spec, derived)?,
            _ => {
                return Err(NetError::layer(
                    "adding pipe layers to a non-pipe layer is not allowed",
                ))
            }
        }
        self.record.push(BuildOp::AddPipeLayer { branch, spec: spec.clone() });
        Ok(())
    }

    /// Structure report, including nested pipe structures.
    pub fn describe(&self) -> String {
        if self.layers.is_empty() {
            return "None".to_string();
        }
        let mut out = String::new();
        out.push_str(&format!("{}\nStructure\n{}\n", "=".repeat(30), "-".repeat(30)));
        let input = self.layers[0]
            .in_dim()
            .map(|d| d.to_string())
            .unwrap_or_else(|_| "(pending)".to_string());
        out.push_str(&format!("Input  :  {:<10} - {}\n", "Dimension", input));
        for layer in &self.layers {
            if layer.is_terminal() {
                out.push_str(&format!("Cost   :  {:<10}\n", layer.name()));
                continue;
            }
            let dim = layer
                .out_dim()
                .map(|d| d.to_string())
                .unwrap_or_else(|_| "(pending)".to_string());
            match layer {
                Layer::Pipe(pipe) => out.push_str(&format!(
                    "Layer  :  Pipe ({:^3}) - {}\n",
                    pipe.branch_count(),
                    dim
                )),
                _ => out.push_str(&format!("Layer  :  {:<10} - {}\n", layer.name(), dim)),
            }
        }
        out.push_str(&"=".repeat(30));
        for layer in &self.layers {
            if let Layer::Pipe(pipe) = layer {
                out.push('\n');
                out.push_str(&pipe.describe());
            }
        }
        out
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn guard_terminal(&self) -> NetResult<()> {
        if self.layers.last().is_some_and(Layer::is_terminal) {
            return Err(NetError::layer("cannot extend past terminal layer"));
        }
        Ok(())
    }

    /// The cursor, refreshed from the pipe's now-known output shape when the
    /// last layer is a pipe (its shape finalizes only once branches exist).
    fn refresh_cursor(&mut self) -> NetResult<Dim> {
        if let Some(Layer::Pipe(pipe)) = self.layers.last() {
            let (c, h, w) = pipe.out_shape()?;
            self.current_dimension = Some(Dim::map(c, h, w));
        }
        self.current_dimension
            .ok_or_else(|| NetError::layer("topology has no current dimension"))
    }

    fn add_pipe(&mut self, spec: &LayerSpec) -> NetResult<()> {
        let branches = spec
            .branches
            .ok_or_else(|| NetError::layer("a pipe requires a branch count"))?;
        if branches == 0 {
            return Err(NetError::layer("a pipe requires at least one branch"));
        }
        if self.layers.is_empty() {
            return Err(NetError::layer(
                "a pipe requires a preceding layer to branch from",
            ));
        }
        self.guard_terminal()?;
        self.push_pipe(Pipe::new(branches), BuildOp::add(spec));
        Ok(())
    }

    fn push_pipe(&mut self, pipe: Pipe, op: BuildOp) {
        // The cursor is left untouched; it is refreshed from the pipe's
        // branches once the next layer is appended.
        self.layers.push(Layer::Pipe(pipe));
        self.weights.push(WeightSlot::Empty);
        self.bias.push(BiasSlot::Empty);
        self.record.push(op);
        self.check_invariant();
    }

    fn append_first(
        &mut self,
        ctx: &mut ExecutionContext,
        layer: Layer,
        w_std: Option<f64>,
        b_init: Option<f64>,
        op: BuildOp,
    ) -> NetResult<()> {
        let (w_slot, b_slot) = match &layer {
            Layer::Plain(p) => Self::alloc_dense(ctx, p.in_dim, p.out_dim, w_std, b_init),
            Layer::Conv(c) => Self::alloc_kernel(ctx, c, w_std, b_init),
            Layer::Sub(_) => {
                return Err(NetError::layer(
                    "invalid first layer (the first layer should not be a sub-layer)",
                ))
            }
            Layer::Pipe(_) => {
                return Err(NetError::layer(
                    "a pipe requires a preceding layer to branch from",
                ))
            }
        };
        let next = layer.out_dim()?;
        self.layers.push(layer);
        self.weights.push(w_slot);
        self.bias.push(b_slot);
        self.record.push(op);
        self.current_dimension = Some(next);
        self.check_invariant();
        Ok(())
    }

    fn append(
        &mut self,
        ctx: &mut ExecutionContext,
        mut layer: Layer,
        input_explicit: bool,
        cursor: Dim,
        w_std: Option<f64>,
        b_init: Option<f64>,
        op: BuildOp,
    ) -> NetResult<()> {
        let parent = self.layers.last().unwrap();
        let parent_conv = parent.conv_like();
        let parent_out = if parent_conv { Some(parent.conv_out()?) } else { None };

        // Shape validation; everything fallible happens before any mutation.
        match &layer {
            Layer::Sub(s) if !s.kind.is_cost() && !s.kind.conv_flavored() => {
                if s.out_dim != cursor {
                    return Err(NetError::layer(format!(
                        "invalid sub-layer (output shape should be {}, {} found)",
                        cursor, s.out_dim
                    )));
                }
            }
            Layer::Plain(p) if input_explicit && !parent_conv => {
                if Dim::Flat(p.in_dim) != cursor {
                    return Err(NetError::layer(format!(
                        "invalid layer (input shape should be {}, {} found)",
                        cursor, p.in_dim
                    )));
                }
            }
            Layer::Conv(c) if input_explicit && !parent_conv => {
                let declared = Dim::map(c.in_channels, c.in_h, c.in_w);
                if declared != cursor {
                    return Err(NetError::layer(format!(
                        "invalid layer (input shape should be {cursor}, {declared} found)"
                    )));
                }
            }
            Layer::Sub(s) if !s.kind.conv_flavored() && cursor.is_map() => {
                return Err(NetError::layer(format!(
                    "sub-layer '{}' requires a flat input, {cursor} found",
                    layer.name()
                )));
            }
            _ => {}
        }

        // Parameter allocation per transition kind.
        let (w_slot, b_slot) = match &mut layer {
            Layer::Plain(p) => {
                if let Some((c, h, w)) = parent_out {
                    // Convolution-to-dense boundary: the activation path
                    // flattens to (batch, features) before this layer.
                    p.in_dim = c * h * w;
                    p.is_fc = true;
                }
                Self::alloc_dense(ctx, p.in_dim, p.out_dim, w_std, b_init)
            }
            Layer::Conv(c) => {
                if let Some((pc, ph, pw)) = parent_out {
                    // Channel/spatial inference replaces any declared input.
                    c.in_channels = pc;
                    c.in_h = ph;
                    c.in_w = pw;
                }
                Self::alloc_kernel(ctx, c, w_std, b_init)
            }
            Layer::Sub(s) if s.kind.conv_flavored() => (WeightSlot::Empty, BiasSlot::Empty),
            Layer::Sub(s) => {
                let dim = s.in_dim.units();
                (WeightSlot::Identity(dim), BiasSlot::Zeros(dim))
            }
            Layer::Pipe(_) => (WeightSlot::Empty, BiasSlot::Empty),
        };

        if parent_conv && matches!(layer, Layer::Plain(_)) {
            if let Some(Layer::Conv(base)) = self.layers.last_mut() {
                base.is_fc_base = true;
            }
        }

        let next = layer.out_dim()?;
        self.layers.push(layer);
        self.weights.push(w_slot);
        self.bias.push(b_slot);
        self.record.push(op);
        self.current_dimension = Some(next);
        self.check_invariant();
        Ok(())
    }

    fn alloc_dense(
        ctx: &mut ExecutionContext,
        in_dim: usize,
        out_dim: usize,
        w_std: Option<f64>,
        b_init: Option<f64>,
    ) -> (WeightSlot, BiasSlot) {
        let w = ctx.create_parameter(
            &[in_dim, out_dim],
            Initializer::TruncatedNormal { std: w_std.unwrap_or(DEFAULT_W_STD) },
        );
        let b = ctx.create_parameter(
            &[out_dim],
            Initializer::Constant(b_init.unwrap_or(DEFAULT_B_INIT)),
        );
        (WeightSlot::Param(w), BiasSlot::Param(b))
    }

    fn alloc_kernel(
        ctx: &mut ExecutionContext,
        conv: &ConvLayer,
        w_std: Option<f64>,
        b_init: Option<f64>,
    ) -> (WeightSlot, BiasSlot) {
        let (kh, kw) = conv.kernel.window();
        let filters = conv.n_filters();
        let w = ctx.create_parameter(
            &[kh, kw, conv.in_channels, filters],
            Initializer::TruncatedNormal { std: w_std.unwrap_or(DEFAULT_W_STD) },
        );
        let b = ctx.create_parameter(
            &[filters],
            Initializer::Constant(b_init.unwrap_or(DEFAULT_B_INIT)),
        );
        (WeightSlot::Param(w), BiasSlot::Param(b))
    }

    fn check_invariant(&self) {
        debug_assert_eq!(self.layers.len(), self.weights.len());
        debug_assert_eq!(self.layers.len(), self.bias.len());
    }
}
