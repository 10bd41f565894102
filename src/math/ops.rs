//! Numeric kernels for feature-map expressions.
//!
//! Feature maps are rank-4 `(batch, height, width, channels)` tensors and
//! convolution weights are rank-4 `(kernel_h, kernel_w, in_channels,
//! out_channels)` tensors. Convolutions use SAME padding with stride 1;
//! pooling uses SAME padding with stride equal to the window, so the output
//! extent is `ceil(input / window)`.

use crate::error::{NetError, NetResult};
use crate::math::tensor::Tensor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolMode {
    Max,
    Avg,
}

fn expect_map(x: &Tensor, what: &str) -> NetResult<(usize, usize, usize, usize)> {
    if x.rank() != 4 {
        return Err(NetError::network(format!(
            "{what} expects a (batch, height, width, channels) tensor, shape {:?} found",
            x.shape
        )));
    }
    Ok((x.shape[0], x.shape[1], x.shape[2], x.shape[3]))
}

/// 2-D convolution, SAME padding, stride 1.
pub fn conv2d_same(input: &Tensor, kernel: &Tensor) -> NetResult<Tensor> {
    let (n, h, w, c) = expect_map(input, "conv2d")?;
    if kernel.rank() != 4 || kernel.shape[2] != c {
        return Err(NetError::network(format!(
            "convolution kernel {:?} does not apply to input {:?}",
            kernel.shape, input.shape
        )));
    }
    let (kh, kw, _, f) = (kernel.shape[0], kernel.shape[1], kernel.shape[2], kernel.shape[3]);
    let (pad_h, pad_w) = ((kh - 1) / 2, (kw - 1) / 2);

    let mut out = Tensor::zeros(&[n, h, w, f]);
    let in_at = |b: usize, y: usize, x: usize, ch: usize| input.data[((b * h + y) * w + x) * c + ch];
    let k_at = |dy: usize, dx: usize, ch: usize, fl: usize| {
        kernel.data[((dy * kw + dx) * c + ch) * f + fl]
    };
    for b in 0..n {
        for y in 0..h {
            for x in 0..w {
                for fl in 0..f {
                    let mut sum = 0.0;
                    for dy in 0..kh {
                        let sy = y + dy;
                        if sy < pad_h || sy - pad_h >= h {
                            continue;
                        }
                        for dx in 0..kw {
                            let sx = x + dx;
                            if sx < pad_w || sx - pad_w >= w {
                                continue;
                            }
                            for ch in 0..c {
                                sum += in_at(b, sy - pad_h, sx - pad_w, ch) * k_at(dy, dx, ch, fl);
                            }
                        }
                    }
                    out.data[((b * h + y) * w + x) * f + fl] = sum;
                }
            }
        }
    }
    Ok(out)
}

/// Spatial pooling with stride equal to the window. Average pooling divides
/// by the number of in-bounds cells, matching SAME-padded semantics.
pub fn pool2d(input: &Tensor, mode: PoolMode, pool_h: usize, pool_w: usize) -> NetResult<Tensor> {
    let (n, h, w, c) = expect_map(input, "pooling")?;
    if pool_h == 0 || pool_w == 0 {
        return Err(NetError::network("pooling window must be non-zero"));
    }
    let (oh, ow) = (h.div_ceil(pool_h), w.div_ceil(pool_w));
    let mut out = Tensor::zeros(&[n, oh, ow, c]);
    let in_at = |b: usize, y: usize, x: usize, ch: usize| input.data[((b * h + y) * w + x) * c + ch];
    for b in 0..n {
        for oy in 0..oh {
            let (y0, y1) = (oy * pool_h, ((oy + 1) * pool_h).min(h));
            for ox in 0..ow {
                let (x0, x1) = (ox * pool_w, ((ox + 1) * pool_w).min(w));
                for ch in 0..c {
                    let mut acc = match mode {
                        PoolMode::Max => f64::NEG_INFINITY,
                        PoolMode::Avg => 0.0,
                    };
                    for y in y0..y1 {
                        for x in x0..x1 {
                            let v = in_at(b, y, x, ch);
                            match mode {
                                PoolMode::Max => acc = acc.max(v),
                                PoolMode::Avg => acc += v,
                            }
                        }
                    }
                    if mode == PoolMode::Avg {
                        acc /= ((y1 - y0) * (x1 - x0)) as f64;
                    }
                    out.data[((b * oh + oy) * ow + ox) * c + ch] = acc;
                }
            }
        }
    }
    Ok(out)
}

/// Concatenates feature maps along the channel axis, in the order given.
pub fn concat_channels(parts: &[Tensor]) -> NetResult<Tensor> {
    let first = parts
        .first()
        .ok_or_else(|| NetError::network("cannot concatenate an empty list of maps"))?;
    let (n, h, w, _) = expect_map(first, "channel concat")?;
    let mut channels = 0;
    for part in parts {
        let (pn, ph, pw, pc) = expect_map(part, "channel concat")?;
        if (pn, ph, pw) != (n, h, w) {
            return Err(NetError::network(format!(
                "cannot concatenate maps of shapes {:?} and {:?}",
                first.shape, part.shape
            )));
        }
        channels += pc;
    }
    let mut out = Tensor::zeros(&[n, h, w, channels]);
    for b in 0..n {
        for y in 0..h {
            for x in 0..w {
                let mut offset = 0;
                for part in parts {
                    let pc = part.shape[3];
                    let src = ((b * h + y) * w + x) * pc;
                    let dst = ((b * h + y) * w + x) * channels + offset;
                    out.data[dst..dst + pc].copy_from_slice(&part.data[src..src + pc]);
                    offset += pc;
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_kernel_preserves_map() {
        // 1x1 kernel with weight 1.0 on a single channel.
        let input = Tensor::from_parts(&[1, 2, 2, 1], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let kernel = Tensor::from_parts(&[1, 1, 1, 1], vec![1.0]).unwrap();
        let out = conv2d_same(&input, &kernel).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn conv_same_keeps_spatial_extent() {
        let input = Tensor::zeros(&[2, 5, 7, 3]);
        let kernel = Tensor::zeros(&[3, 3, 3, 4]);
        let out = conv2d_same(&input, &kernel).unwrap();
        assert_eq!(out.shape, vec![2, 5, 7, 4]);
    }

    #[test]
    fn max_pool_ceil_division() {
        let input = Tensor::from_parts(
            &[1, 3, 3, 1],
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0],
        )
        .unwrap();
        let out = pool2d(&input, PoolMode::Max, 2, 2).unwrap();
        assert_eq!(out.shape, vec![1, 2, 2, 1]);
        assert_eq!(out.data, vec![5.0, 6.0, 8.0, 9.0]);
    }

    #[test]
    fn avg_pool_divides_by_valid_cells() {
        let input = Tensor::from_parts(&[1, 1, 3, 1], vec![2.0, 4.0, 9.0]).unwrap();
        let out = pool2d(&input, PoolMode::Avg, 1, 2).unwrap();
        // Second window holds a single valid cell.
        assert_eq!(out.data, vec![3.0, 9.0]);
    }

    #[test]
    fn concat_follows_part_order() {
        let a = Tensor::from_parts(&[1, 1, 1, 2], vec![1.0, 2.0]).unwrap();
        let b = Tensor::from_parts(&[1, 1, 1, 1], vec![3.0]).unwrap();
        let out = concat_channels(&[a, b]).unwrap();
        assert_eq!(out.shape, vec![1, 1, 1, 3]);
        assert_eq!(out.data, vec![1.0, 2.0, 3.0]);
    }
}
