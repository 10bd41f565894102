use std::f64::consts::E;

/// Element-wise nonlinearities applied after a layer's linear transform.
///
/// `ReLU6` is the 0..6 clipped rectifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Tanh,
    Sigmoid,
    ReLU,
    Elu,
    Softplus,
    Identity,
    ReLU6,
}

impl Activation {
    pub fn apply(&self, x: f64) -> f64 {
        match self {
            Activation::Tanh => x.tanh(),
            Activation::Sigmoid => 1.0 / (1.0 + E.powf(-x)),
            Activation::ReLU => if x > 0.0 { x } else { 0.0 },
            Activation::Elu => if x > 0.0 { x } else { E.powf(x) - 1.0 },
            Activation::Softplus => (1.0 + E.powf(x)).ln(),
            Activation::Identity => x,
            Activation::ReLU6 => x.max(0.0).min(6.0),
        }
    }

    /// Display name used in structure reports.
    pub fn name(&self) -> &'static str {
        match self {
            Activation::Tanh => "Tanh",
            Activation::Sigmoid => "Sigmoid",
            Activation::ReLU => "ReLU",
            Activation::Elu => "ELU",
            Activation::Softplus => "Softplus",
            Activation::Identity => "Identity",
            Activation::ReLU6 => "ReLU6",
        }
    }

    /// Catalog lookup by lower-case name.
    pub fn by_name(name: &str) -> Option<Activation> {
        match name {
            "tanh" => Some(Activation::Tanh),
            "sigmoid" => Some(Activation::Sigmoid),
            "relu" => Some(Activation::ReLU),
            "elu" => Some(Activation::Elu),
            "softplus" => Some(Activation::Softplus),
            "identity" => Some(Activation::Identity),
            "relu6" => Some(Activation::ReLU6),
            _ => None,
        }
    }

    pub fn catalog_name(&self) -> &'static str {
        match self {
            Activation::Tanh => "tanh",
            Activation::Sigmoid => "sigmoid",
            Activation::ReLU => "relu",
            Activation::Elu => "elu",
            Activation::Softplus => "softplus",
            Activation::Identity => "identity",
            Activation::ReLU6 => "relu6",
        }
    }
}
