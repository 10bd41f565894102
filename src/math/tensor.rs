use crate::error::{NetError, NetResult};

/// A dense row-major tensor of `f64` values with a runtime shape.
///
/// Rank conventions used throughout the crate:
/// - rank 2 `(batch, features)` for dense values,
/// - rank 4 `(batch, height, width, channels)` for feature maps,
/// - rank 1 for bias vectors, `[1]` for scalar results.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

impl Tensor {
    pub fn zeros(shape: &[usize]) -> Tensor {
        Tensor {
            shape: shape.to_vec(),
            data: vec![0.0; shape.iter().product()],
        }
    }

    pub fn filled(shape: &[usize], value: f64) -> Tensor {
        Tensor {
            shape: shape.to_vec(),
            data: vec![value; shape.iter().product()],
        }
    }

    pub fn scalar(value: f64) -> Tensor {
        Tensor { shape: vec![1], data: vec![value] }
    }

    /// Builds a tensor from parts, validating that the element count matches.
    pub fn from_parts(shape: &[usize], data: Vec<f64>) -> NetResult<Tensor> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(NetError::network(format!(
                "tensor data of length {} does not fill shape {:?}",
                data.len(),
                shape
            )));
        }
        Ok(Tensor { shape: shape.to_vec(), data })
    }

    /// Convenience constructor for `(rows, cols)` matrices from nested rows.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Tensor {
        let r = rows.len();
        let c = if r == 0 { 0 } else { rows[0].len() };
        Tensor {
            shape: vec![r, c],
            data: rows.into_iter().flatten().collect(),
        }
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of elements in one sample, i.e. everything past the batch axis.
    pub fn row_units(&self) -> usize {
        self.shape.iter().skip(1).product()
    }

    pub fn map<F>(&self, functor: F) -> Tensor
    where
        F: Fn(f64) -> f64,
    {
        Tensor {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&x| functor(x)).collect(),
        }
    }

    /// Matrix product of two rank-2 tensors.
    pub fn matmul(&self, rhs: &Tensor) -> NetResult<Tensor> {
        if self.rank() != 2 || rhs.rank() != 2 || self.shape[1] != rhs.shape[0] {
            return Err(NetError::network(format!(
                "cannot multiply tensors of shapes {:?} and {:?}",
                self.shape, rhs.shape
            )));
        }
        let (n, k, m) = (self.shape[0], self.shape[1], rhs.shape[1]);
        let mut res = Tensor::zeros(&[n, m]);
        for i in 0..n {
            for j in 0..m {
                let mut sum = 0.0;
                for p in 0..k {
                    sum += self.data[i * k + p] * rhs.data[p * m + j];
                }
                res.data[i * m + j] = sum;
            }
        }
        Ok(res)
    }

    /// Adds a rank-1 bias along the trailing axis, broadcasting over all
    /// leading axes.
    pub fn add_bias(&self, bias: &Tensor) -> NetResult<Tensor> {
        let last = *self.shape.last().unwrap_or(&0);
        if bias.rank() != 1 || bias.len() != last {
            return Err(NetError::network(format!(
                "bias of shape {:?} does not broadcast over {:?}",
                bias.shape, self.shape
            )));
        }
        let mut res = self.clone();
        for (i, v) in res.data.iter_mut().enumerate() {
            *v += bias.data[i % last];
        }
        Ok(res)
    }

    /// Reshapes to `(batch, units)`, keeping the batch axis.
    pub fn flatten_rows(&self) -> Tensor {
        let batch = *self.shape.first().unwrap_or(&0);
        Tensor {
            shape: vec![batch, self.row_units()],
            data: self.data.clone(),
        }
    }

    /// Stacks same-width pieces along the batch axis, in the order given.
    pub fn vstack(parts: &[Tensor]) -> NetResult<Tensor> {
        let first = parts
            .first()
            .ok_or_else(|| NetError::network("cannot stack an empty list of tensors"))?;
        let tail = &first.shape[1..];
        let mut batch = 0;
        let mut data = Vec::new();
        for part in parts {
            if &part.shape[1..] != tail {
                return Err(NetError::network(format!(
                    "cannot stack tensors of shapes {:?} and {:?}",
                    first.shape, part.shape
                )));
            }
            batch += part.shape[0];
            data.extend_from_slice(&part.data);
        }
        let mut shape = vec![batch];
        shape.extend_from_slice(tail);
        Ok(Tensor { shape, data })
    }

    /// Copies rows `start..end` along the batch axis.
    pub fn slice_rows(&self, start: usize, end: usize) -> Tensor {
        let units = self.row_units();
        let mut shape = self.shape.clone();
        shape[0] = end - start;
        Tensor {
            shape,
            data: self.data[start * units..end * units].to_vec(),
        }
    }

    /// Index of the maximum entry in each row of a rank-2 tensor.
    pub fn argmax_rows(&self) -> Vec<usize> {
        let cols = if self.rank() == 2 { self.shape[1] } else { self.len() };
        self.data
            .chunks(cols.max(1))
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |best, (i, &v)| {
                        if v > best.1 { (i, v) } else { best }
                    })
                    .0
            })
            .collect()
    }
}
