use crate::error::{NetError, NetResult};
use crate::math::tensor::Tensor;

/// Small epsilon added inside log() to prevent log(0) = -inf.
const EPS: f64 = 1e-12;

/// Objective computed by the terminal cost layer.
///
/// - `CrossEntropy`: softmax cross-entropy over raw logits, averaged over
///   the batch; pair with a one-hot (or soft) target distribution.
/// - `Mse`: mean of the squared element-wise differences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostKind {
    CrossEntropy,
    Mse,
}

impl CostKind {
    pub fn name(&self) -> &'static str {
        match self {
            CostKind::CrossEntropy => "CrossEntropy",
            CostKind::Mse => "MSE",
        }
    }

    pub fn by_name(name: &str) -> Option<CostKind> {
        match name {
            "cross_entropy" => Some(CostKind::CrossEntropy),
            "mse" => Some(CostKind::Mse),
            _ => None,
        }
    }

    pub fn catalog_name(&self) -> &'static str {
        match self {
            CostKind::CrossEntropy => "cross_entropy",
            CostKind::Mse => "mse",
        }
    }

    /// Scalar objective over a batch of predictions and matching targets.
    pub fn evaluate(&self, predicted: &Tensor, expected: &Tensor) -> NetResult<Tensor> {
        if predicted.shape != expected.shape || predicted.rank() != 2 {
            return Err(NetError::network(format!(
                "label tensor of shape {:?} does not match predictions of shape {:?}",
                expected.shape, predicted.shape
            )));
        }
        let (rows, cols) = (predicted.shape[0], predicted.shape[1]);
        if rows == 0 {
            return Err(NetError::network("cannot compute a cost over an empty batch"));
        }
        let value = match self {
            CostKind::CrossEntropy => {
                let mut total = 0.0;
                for r in 0..rows {
                    let logits = &predicted.data[r * cols..(r + 1) * cols];
                    let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                    let denom: f64 = logits.iter().map(|&z| (z - max).exp()).sum();
                    for (c, &z) in logits.iter().enumerate() {
                        let p = (z - max).exp() / denom;
                        total -= expected.data[r * cols + c] * (p + EPS).ln();
                    }
                }
                total / rows as f64
            }
            CostKind::Mse => {
                predicted
                    .data
                    .iter()
                    .zip(expected.data.iter())
                    .map(|(p, e)| (p - e).powi(2))
                    .sum::<f64>()
                    / predicted.len() as f64
            }
        };
        Ok(Tensor::scalar(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mse_means_over_all_elements() {
        let p = Tensor::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        let e = Tensor::from_rows(vec![vec![0.0, 2.0], vec![3.0, 2.0]]);
        let loss = CostKind::Mse.evaluate(&p, &e).unwrap();
        assert!((loss.data[0] - (1.0 + 4.0) / 4.0).abs() < 1e-12);
    }

    #[test]
    fn cross_entropy_is_low_for_confident_correct_logits() {
        let p = Tensor::from_rows(vec![vec![10.0, -10.0]]);
        let e = Tensor::from_rows(vec![vec![1.0, 0.0]]);
        let loss = CostKind::CrossEntropy.evaluate(&p, &e).unwrap();
        assert!(loss.data[0] < 1e-6);
    }

    #[test]
    fn label_width_mismatch_is_a_network_error() {
        let p = Tensor::zeros(&[1, 3]);
        let e = Tensor::zeros(&[1, 2]);
        assert!(matches!(
            CostKind::Mse.evaluate(&p, &e),
            Err(NetError::BuildNetwork(_))
        ));
    }
}
