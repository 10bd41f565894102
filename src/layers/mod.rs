pub mod activation;
pub mod catalog;
pub mod cost;
pub mod layer;
pub mod shape;

pub use activation::Activation;
pub use catalog::{LayerCatalog, LayerSpec, Resolved};
pub use cost::CostKind;
pub use layer::{ConvLayer, Layer, PlainLayer, SubKind, SubLayer};
pub use shape::{Dim, KernelSpec, ShapeSpec};
