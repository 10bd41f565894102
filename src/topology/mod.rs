pub mod builder;
pub mod pipe;
pub mod spec;

pub use builder::{BiasSlot, Topology, WeightSlot};
pub use pipe::Pipe;
pub use spec::{BuildOp, TopologySpec};
