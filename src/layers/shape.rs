use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{NetError, NetResult};

/// A single dimension value flowing through the topology: either a flat
/// feature width (dense layers) or a `(channels, height, width)` feature map
/// (convolutional layers). The builder's `current_dimension` cursor is a
/// `Dim`, as are the entries of a declared layer shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dim {
    Flat(usize),
    Map { channels: usize, height: usize, width: usize },
}

impl Dim {
    pub fn map(channels: usize, height: usize, width: usize) -> Dim {
        Dim::Map { channels, height, width }
    }

    /// Total element count of one sample with this dimension.
    pub fn units(&self) -> usize {
        match self {
            Dim::Flat(n) => *n,
            Dim::Map { channels, height, width } => channels * height * width,
        }
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Dim::Map { .. })
    }

    pub fn map_dims(&self) -> Option<(usize, usize, usize)> {
        match self {
            Dim::Map { channels, height, width } => Some((*channels, *height, *width)),
            Dim::Flat(_) => None,
        }
    }

    pub fn flat(&self) -> Option<usize> {
        match self {
            Dim::Flat(n) => Some(*n),
            Dim::Map { .. } => None,
        }
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Flat(n) => write!(f, "{n}"),
            Dim::Map { channels, height, width } => {
                write!(f, "({channels}, {height}, {width})")
            }
        }
    }
}

/// A declared layer shape of arity 0, 1, or 2.
///
/// - arity 0: everything is inferred from the cursor / constructor arguments
/// - arity 1: output only; the input is the current dimension
/// - arity 2: explicit `(input, output)`
///
/// Any other arity is a construction-time violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeSpec {
    Inferred,
    Out(Dim),
    Full(Dim, Dim),
}

impl ShapeSpec {
    pub fn from_dims(dims: &[Dim]) -> NetResult<ShapeSpec> {
        match dims {
            [] => Ok(ShapeSpec::Inferred),
            [out] => Ok(ShapeSpec::Out(*out)),
            [input, out] => Ok(ShapeSpec::Full(*input, *out)),
            _ => Err(NetError::layer(format!(
                "invalid layer shape (arity should be at most 2, {} found)",
                dims.len()
            ))),
        }
    }

    pub fn declared_input(&self) -> Option<Dim> {
        match self {
            ShapeSpec::Full(input, _) => Some(*input),
            _ => None,
        }
    }

    pub fn declared_output(&self) -> Option<Dim> {
        match self {
            ShapeSpec::Out(out) | ShapeSpec::Full(_, out) => Some(*out),
            ShapeSpec::Inferred => None,
        }
    }
}

/// Convolution kernel declaration.
///
/// `Window` carries spatial extent only; the filter count is inherited from
/// the input channel count. `Filters` declares the filter count explicitly.
/// Both produce `(kernel_h, kernel_w, in_channels, out_channels)` weights,
/// preserving the two historical kernel-spec layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KernelSpec {
    Window { height: usize, width: usize },
    Filters { n_filters: usize, height: usize, width: usize },
}

impl KernelSpec {
    pub fn window(&self) -> (usize, usize) {
        match self {
            KernelSpec::Window { height, width } => (*height, *width),
            KernelSpec::Filters { height, width, .. } => (*height, *width),
        }
    }

    /// Filter count once the input channel count is known.
    pub fn filters_for(&self, in_channels: usize) -> usize {
        match self {
            KernelSpec::Window { .. } => in_channels,
            KernelSpec::Filters { n_filters, .. } => *n_filters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_arity_is_bounded() {
        let too_many = [Dim::Flat(1), Dim::Flat(2), Dim::Flat(3)];
        assert!(matches!(
            ShapeSpec::from_dims(&too_many),
            Err(NetError::BuildLayer(_))
        ));
        assert_eq!(ShapeSpec::from_dims(&[]).unwrap(), ShapeSpec::Inferred);
    }

    #[test]
    fn window_kernels_inherit_channels() {
        let k = KernelSpec::Window { height: 3, width: 3 };
        assert_eq!(k.filters_for(8), 8);
        let k = KernelSpec::Filters { n_filters: 16, height: 3, width: 3 };
        assert_eq!(k.filters_for(8), 16);
    }
}
