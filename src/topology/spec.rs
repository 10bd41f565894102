use serde::{Deserialize, Serialize};

use crate::error::NetResult;
use crate::exec::context::ExecutionContext;
use crate::layers::catalog::LayerSpec;
use crate::topology::builder::Topology;

/// One recorded mutation of a topology: a plain `add` or a pipe-branch add.
/// Replaying the record in order against a fresh builder rebuilds an
/// equivalent topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BuildOp {
    Add { spec: LayerSpec },
    AddPipeLayer { branch: usize, spec: LayerSpec },
}

impl BuildOp {
    pub(crate) fn add(spec: &LayerSpec) -> BuildOp {
        BuildOp::Add { spec: spec.clone() }
    }
}

/// A fully serializable description of a topology as the ordered list of
/// build operations that produced it.
///
/// `TopologySpec` can be saved to / loaded from JSON independently of any
/// parameter values; replaying it reproduces identical layer counts, shapes,
/// and parameter-slot shapes (fresh parameter values are drawn from the
/// context it is replayed against).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologySpec {
    /// Human-readable name used as the file stem.
    pub name: String,
    /// Ordered build operations (first layer first).
    pub ops: Vec<BuildOp>,
}

impl TopologySpec {
    /// Serializes the spec to a pretty-printed JSON file.
    pub fn save_json(&self, path: &str) -> std::io::Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    }

    /// Deserializes a `TopologySpec` from a JSON file.
    pub fn load_json(path: &str) -> std::io::Result<TopologySpec> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    }

    /// Rebuilds a topology by replaying every recorded operation, in order,
    /// against a fresh builder.
    pub fn rebuild(&self, ctx: &mut ExecutionContext) -> NetResult<Topology> {
        let mut topology = Topology::new();
        for op in &self.ops {
            match op {
                BuildOp::Add { spec } => topology.add(ctx, spec)?,
                BuildOp::AddPipeLayer { branch, spec } => {
                    topology.add_pipe_layer(ctx, *branch, spec)?
                }
            }
        }
        Ok(topology)
    }
}
