use crate::error::{NetError, NetResult};
use crate::exec::context::ExecutionContext;
use crate::layers::catalog::{LayerCatalog, LayerSpec};
use crate::layers::shape::Dim;
use crate::topology::builder::Topology;

/// A container of N independent branch topologies evaluated in parallel on
/// the same incoming feature map and concatenated along the channel axis in
/// branch-index order.
///
/// A pipe acts as a single layer entry in its parent topology; its own
/// output shape only becomes defined once every branch has at least one
/// layer.
#[derive(Debug)]
pub struct Pipe {
    branches: Vec<Topology>,
    initialized: Vec<bool>,
}

impl Pipe {
    pub fn new(branches: usize) -> Pipe {
        Pipe {
            branches: (0..branches).map(|_| Topology::new()).collect(),
            initialized: vec![false; branches],
        }
    }

    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    pub fn branches(&self) -> &[Topology] {
        &self.branches
    }

    pub fn branch(&self, idx: usize) -> Option<&Topology> {
        self.branches.get(idx)
    }

    pub fn initialized(&self) -> &[bool] {
        &self.initialized
    }

    /// Appends a layer to branch `idx`, delegating to the branch's own
    /// builder. When the branch is still empty and the spec does not declare
    /// an input, `derived_input` (the parent topology's view of the pipe's
    /// predecessor) becomes the branch input shape.
    pub(crate) fn add(
        &mut self,
        ctx: &mut ExecutionContext,
        idx: usize,
        spec: &LayerSpec,
        derived_input: Option<Dim>,
    ) -> NetResult<()> {
        if idx >= self.branches.len() {
            return Err(NetError::layer(format!(
                "pipe branch index {idx} is out of range ({} branches)",
                self.branches.len()
            )));
        }
        let mut spec = spec.clone();
        if !self.initialized[idx] {
            if let Some(input) = derived_input {
                if LayerCatalog::is_conv_name(&spec.name) {
                    // A conv spec's single shape entry already is its input.
                    if spec.shape.is_empty() {
                        spec.shape = vec![input];
                    }
                } else if spec.shape.len() == 1 {
                    spec.shape.insert(0, input);
                }
            }
        }
        self.branches[idx].add(ctx, &spec)?;
        self.initialized[idx] = true;
        Ok(())
    }

    /// Total output channel count: the sum over all branch outputs.
    pub fn n_filters(&self) -> NetResult<usize> {
        self.out_shape().map(|(channels, _, _)| channels)
    }

    /// Output feature map `(channels, height, width)` of the whole pipe.
    /// Every branch must be initialized and agree on the spatial extent.
    pub fn out_shape(&self) -> NetResult<(usize, usize, usize)> {
        let mut channels = 0;
        let mut spatial: Option<(usize, usize)> = None;
        for (i, branch) in self.branches.iter().enumerate() {
            let dim = branch.current_dimension().ok_or_else(|| {
                NetError::layer(format!("pipe branch {i} has no layers yet"))
            })?;
            let (c, h, w) = dim.map_dims().ok_or_else(|| {
                NetError::layer(format!(
                    "pipe branch {i} does not end in a feature map ({dim} found)"
                ))
            })?;
            channels += c;
            match spatial {
                None => spatial = Some((h, w)),
                Some((h0, w0)) if (h0, w0) != (h, w) => {
                    return Err(NetError::layer(format!(
                        "pipe branches disagree on spatial output \
                         (branch 0 yields {h0}x{w0}, branch {i} yields {h}x{w})"
                    )))
                }
                Some(_) => {}
            }
        }
        let (h, w) = spatial
            .ok_or_else(|| NetError::layer("pipe has no branches"))?;
        Ok((channels, h, w))
    }

    /// Input feature map shared by every branch, read from branch 0.
    pub fn in_shape(&self) -> NetResult<(usize, usize, usize)> {
        let first = self
            .branches
            .first()
            .and_then(|branch| branch.layers().first())
            .ok_or_else(|| NetError::layer("pipe branch 0 has no layers yet"))?;
        first.in_dim()?.map_dims().ok_or_else(|| {
            NetError::layer("pipe branch 0 does not start from a feature map")
        })
    }

    /// Structure report covering every branch.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        out.push_str(&"=".repeat(60));
        out.push_str("\nPipe Structure\n");
        for (i, branch) in self.branches.iter().enumerate() {
            out.push_str(&format!("{}\nbranch {i}\n", "-".repeat(60)));
            out.push_str(&branch.describe());
            out.push('\n');
        }
        out.push_str(&"=".repeat(60));
        out
    }
}
