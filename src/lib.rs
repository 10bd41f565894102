pub mod error;
pub mod exec;
pub mod graph;
pub mod layers;
pub mod math;
pub mod topology;

// Convenience re-exports
pub use error::{NetError, NetResult};
pub use exec::context::{Bindings, ExecutionContext, Initializer, ParamId};
pub use graph::compose::DEFAULT_EVAL_BUDGET;
pub use graph::expr::Expr;
pub use layers::activation::Activation;
pub use layers::catalog::{LayerCatalog, LayerSpec};
pub use layers::cost::CostKind;
pub use layers::layer::Layer;
pub use layers::shape::{Dim, KernelSpec};
pub use math::tensor::Tensor;
pub use topology::builder::{BiasSlot, Topology, WeightSlot};
pub use topology::pipe::Pipe;
pub use topology::spec::{BuildOp, TopologySpec};
