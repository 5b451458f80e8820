//! Coordinate-transform algebra.
//!
//! A [`TensorDescriptor`] starts from a *naive* strided layout (lengths and
//! strides over memory) and stacks stages of [`Transform`]s on top of it. The
//! top-most dimensions are the logical view a kernel iterates over; the
//! bottom-most are the raw strided dimensions.
//!
//! Offsets are defined for every index inside the top lengths, including the
//! padded region introduced by [`Transform::RightPad`]. Whether an index
//! touches real data is answered separately by
//! [`TensorDescriptor::is_valid_index`].

mod transform;

pub use transform::Transform;

use crate::error::{Result, TensorError};
use crate::shape::Shape;

/// One layer of transforms, mapping the dimensions below it onto new ones.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Stage {
    transforms: Vec<Transform>,
    lower_ids: Vec<Vec<usize>>,
    upper_ids: Vec<Vec<usize>>,
    lower_lengths: Vec<usize>,
    upper_lengths: Vec<usize>,
}

impl Stage {
    fn calculate_lower_index(&self, upper: &[usize]) -> Vec<usize> {
        let mut lower = vec![0usize; self.lower_lengths.len()];
        for ((transform, lower_ids), upper_ids) in self
            .transforms
            .iter()
            .zip(&self.lower_ids)
            .zip(&self.upper_ids)
        {
            let up: Vec<usize> = upper_ids.iter().map(|&d| upper[d]).collect();
            let mut lo = vec![0usize; lower_ids.len()];
            transform.calculate_lower_index(&up, &mut lo);
            for (&d, v) in lower_ids.iter().zip(lo) {
                lower[d] = v;
            }
        }
        lower
    }

    fn calculate_upper_index(&self, lower: &[usize]) -> Vec<usize> {
        let mut upper = vec![0usize; self.upper_lengths.len()];
        for ((transform, lower_ids), upper_ids) in self
            .transforms
            .iter()
            .zip(&self.lower_ids)
            .zip(&self.upper_ids)
        {
            let lo: Vec<usize> = lower_ids.iter().map(|&d| lower[d]).collect();
            let mut up = vec![0usize; upper_ids.len()];
            transform.calculate_upper_index(&lo, &mut up);
            for (&d, v) in upper_ids.iter().zip(up) {
                upper[d] = v;
            }
        }
        upper
    }
}

/// A strided tensor layout viewed through a chain of coordinate transforms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorDescriptor {
    lengths: Vec<usize>,
    strides: Vec<usize>,
    stages: Vec<Stage>,
}

impl TensorDescriptor {
    /// Create a naive descriptor: `offset = Σ index[i] * strides[i]`.
    pub fn naive(lengths: Vec<usize>, strides: Vec<usize>) -> Result<Self> {
        if lengths.len() != strides.len() {
            return Err(TensorError::RankMismatch {
                expected: lengths.len(),
                got: strides.len(),
            });
        }
        Ok(TensorDescriptor {
            lengths,
            strides,
            stages: Vec::new(),
        })
    }

    /// Create a naive descriptor with packed row-major strides.
    pub fn packed(lengths: Vec<usize>) -> Self {
        let strides = Shape::from_slice(&lengths).strides();
        TensorDescriptor {
            lengths,
            strides,
            stages: Vec::new(),
        }
    }

    /// Stack a new stage of transforms on top of this descriptor.
    ///
    /// `lower_ids[i]` names the current top dimensions consumed by
    /// `transforms[i]`; `upper_ids[i]` names the new dimensions it produces.
    /// Across the stage, lower ids must cover every current dimension exactly
    /// once and upper ids must cover the new dimensions exactly once.
    pub fn transform(
        &self,
        transforms: Vec<Transform>,
        lower_ids: Vec<Vec<usize>>,
        upper_ids: Vec<Vec<usize>>,
    ) -> Result<Self> {
        if transforms.len() != lower_ids.len() || transforms.len() != upper_ids.len() {
            return Err(TensorError::InvalidStage(format!(
                "{} transforms but {} lower and {} upper id groups",
                transforms.len(),
                lower_ids.len(),
                upper_ids.len()
            )));
        }

        let lower_lengths = self.lengths().to_vec();
        let new_rank: usize = transforms.iter().map(Transform::num_upper_dims).sum();

        for (i, transform) in transforms.iter().enumerate() {
            if lower_ids[i].len() != transform.num_lower_dims()
                || upper_ids[i].len() != transform.num_upper_dims()
            {
                return Err(TensorError::InvalidStage(format!(
                    "transform {} expects {} lower and {} upper dims, got {:?} -> {:?}",
                    i,
                    transform.num_lower_dims(),
                    transform.num_upper_dims(),
                    lower_ids[i],
                    upper_ids[i]
                )));
            }
            if let Transform::Unmerge { lengths } = transform {
                if lengths.is_empty() {
                    return Err(TensorError::InvalidStage(
                        "unmerge needs at least one upper length".to_string(),
                    ));
                }
            }
        }

        check_permutation(&lower_ids, lower_lengths.len(), "lower")?;
        check_permutation(&upper_ids, new_rank, "upper")?;

        let mut upper_lengths = vec![0usize; new_rank];
        for ((transform, lower), upper) in transforms.iter().zip(&lower_ids).zip(&upper_ids) {
            if let Some(expected) = transform.lower_lengths() {
                for (&d, len) in lower.iter().zip(expected) {
                    if lower_lengths[d] != len {
                        return Err(TensorError::TransformLengthMismatch {
                            dim: d,
                            expected: lower_lengths[d],
                            got: len,
                        });
                    }
                }
            }
            for (&d, len) in upper.iter().zip(transform.upper_lengths()) {
                upper_lengths[d] = len;
            }
        }

        let mut stages = self.stages.clone();
        stages.push(Stage {
            transforms,
            lower_ids,
            upper_ids,
            lower_lengths,
            upper_lengths,
        });
        Ok(TensorDescriptor {
            lengths: self.lengths.clone(),
            strides: self.strides.clone(),
            stages,
        })
    }

    /// Number of top (logical) dimensions.
    pub fn rank(&self) -> usize {
        self.lengths().len()
    }

    /// Lengths of the top (logical) dimensions.
    pub fn lengths(&self) -> &[usize] {
        match self.stages.last() {
            Some(stage) => &stage.upper_lengths,
            None => &self.lengths,
        }
    }

    /// Length of top dimension `dim`.
    ///
    /// # Panics
    /// Panics if `dim >= rank()`.
    pub fn length(&self, dim: usize) -> usize {
        self.lengths()[dim]
    }

    pub fn num_stages(&self) -> usize {
        self.stages.len()
    }

    /// Number of elements spanned by the naive layout.
    pub fn element_space_size(&self) -> usize {
        if self.lengths.iter().any(|&l| l == 0) {
            return 0;
        }
        1 + self
            .lengths
            .iter()
            .zip(&self.strides)
            .map(|(&l, &s)| (l - 1) * s)
            .sum::<usize>()
    }

    /// Encode a top index into the naive (bottom) multi-index.
    pub fn calculate_bottom_index(&self, top: &[usize]) -> Result<Vec<usize>> {
        self.check_top(top)?;
        let mut index = top.to_vec();
        for stage in self.stages.iter().rev() {
            index = stage.calculate_lower_index(&index);
        }
        Ok(index)
    }

    /// Decode a naive (bottom) multi-index back into the top index.
    ///
    /// Bottom coordinates past a dimension's end are accepted, since that is
    /// where padded top indices land.
    pub fn calculate_top_index(&self, bottom: &[usize]) -> Result<Vec<usize>> {
        if bottom.len() != self.lengths.len() {
            return Err(TensorError::RankMismatch {
                expected: self.lengths.len(),
                got: bottom.len(),
            });
        }
        let mut index = bottom.to_vec();
        for stage in &self.stages {
            index = stage.calculate_upper_index(&index);
        }
        Ok(index)
    }

    /// Linear memory offset of a top index.
    pub fn calculate_offset(&self, top: &[usize]) -> Result<usize> {
        let bottom = self.calculate_bottom_index(top)?;
        Ok(bottom
            .iter()
            .zip(&self.strides)
            .map(|(&i, &s)| i * s)
            .sum())
    }

    /// Whether a top index addresses real data rather than padding.
    ///
    /// An index is valid iff its coordinate stays inside the lengths of every
    /// level of the chain.
    pub fn is_valid_index(&self, top: &[usize]) -> Result<bool> {
        self.check_top(top)?;
        let mut index = top.to_vec();
        for stage in self.stages.iter().rev() {
            index = stage.calculate_lower_index(&index);
            if !within(&index, &stage.lower_lengths) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Recover the top index addressing `offset`.
    ///
    /// Defined for non-overlapping naive layouts and offsets of real (unpadded)
    /// data. Returns `None` when no valid index maps onto `offset`.
    pub fn decode_offset(&self, offset: usize) -> Option<Vec<usize>> {
        let mut order: Vec<usize> = (0..self.lengths.len()).collect();
        order.sort_by(|&a, &b| self.strides[b].cmp(&self.strides[a]));

        let mut rem = offset;
        let mut bottom = vec![0usize; self.lengths.len()];
        for &d in &order {
            if self.lengths[d] <= 1 || self.strides[d] == 0 {
                continue;
            }
            let i = rem / self.strides[d];
            if i >= self.lengths[d] {
                return None;
            }
            bottom[d] = i;
            rem -= i * self.strides[d];
        }
        if rem != 0 {
            return None;
        }

        let top = self.calculate_top_index(&bottom).ok()?;
        match self.calculate_offset(&top) {
            Ok(o) if o == offset => Some(top),
            _ => None,
        }
    }

    fn check_top(&self, top: &[usize]) -> Result<()> {
        let lengths = self.lengths();
        if top.len() != lengths.len() {
            return Err(TensorError::RankMismatch {
                expected: lengths.len(),
                got: top.len(),
            });
        }
        if !within(top, lengths) {
            return Err(TensorError::IndexOutOfRange {
                index: top.to_vec(),
                lengths: lengths.to_vec(),
            });
        }
        Ok(())
    }
}

fn within(index: &[usize], lengths: &[usize]) -> bool {
    index.iter().zip(lengths).all(|(&i, &len)| i < len)
}

fn check_permutation(ids: &[Vec<usize>], rank: usize, side: &str) -> Result<()> {
    let mut seen = vec![false; rank];
    for &d in ids.iter().flatten() {
        if d >= rank || seen[d] {
            return Err(TensorError::InvalidStage(format!(
                "{} ids {:?} are not a permutation of 0..{}",
                side, ids, rank
            )));
        }
        seen[d] = true;
    }
    if seen.iter().any(|s| !s) {
        return Err(TensorError::InvalidStage(format!(
            "{} ids {:?} do not cover 0..{}",
            side, ids, rank
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// [M, K] row-major with leading dimension `ld`, padded to tile multiples
    /// and split as [K0, M, K1].
    fn padded_ak0_m_ak1(m: usize, k: usize, ld: usize) -> TensorDescriptor {
        let naive = TensorDescriptor::naive(vec![m, k], vec![ld, 1]).unwrap();
        let padded = naive
            .transform(
                vec![Transform::right_pad(m, 8 - m % 8), Transform::right_pad(k, 4 - k % 4)],
                vec![vec![0], vec![1]],
                vec![vec![0], vec![1]],
            )
            .unwrap();
        let k_padded = padded.length(1);
        padded
            .transform(
                vec![
                    Transform::unmerge(vec![k_padded / 2, 2]),
                    Transform::pass_through(padded.length(0)),
                ],
                vec![vec![1], vec![0]],
                vec![vec![0, 2], vec![1]],
            )
            .unwrap()
    }

    #[test]
    fn test_naive_offset() {
        let d = TensorDescriptor::naive(vec![3, 4], vec![10, 1]).unwrap();
        assert_eq!(d.calculate_offset(&[2, 3]).unwrap(), 23);
        assert_eq!(d.element_space_size(), 24);
    }

    #[test]
    fn test_naive_rank_mismatch() {
        assert!(TensorDescriptor::naive(vec![3, 4], vec![1]).is_err());
    }

    #[test]
    fn test_padded_split_lengths() {
        let d = padded_ak0_m_ak1(5, 7, 7);
        assert_eq!(d.lengths(), &[4, 8, 2]);
        assert_eq!(d.num_stages(), 2);
        // (k0=1, m=2, k1=1) -> k=3, m=2
        assert_eq!(d.calculate_bottom_index(&[1, 2, 1]).unwrap(), vec![2, 3]);
        assert_eq!(d.calculate_offset(&[1, 2, 1]).unwrap(), 2 * 7 + 3);
    }

    #[test]
    fn test_padding_is_invalid_but_addressable() {
        let d = padded_ak0_m_ak1(5, 7, 7);
        // m = 6 is padding.
        assert!(!d.is_valid_index(&[0, 6, 0]).unwrap());
        assert!(d.calculate_offset(&[0, 6, 0]).is_ok());
        // k = 7 is padding (k0=3, k1=1).
        assert!(!d.is_valid_index(&[3, 0, 1]).unwrap());
        assert!(d.is_valid_index(&[3, 4, 0]).unwrap());
    }

    #[test]
    fn test_out_of_range_top_index() {
        let d = padded_ak0_m_ak1(5, 7, 7);
        assert!(matches!(
            d.calculate_offset(&[4, 0, 0]),
            Err(TensorError::IndexOutOfRange { .. })
        ));
        assert!(matches!(
            d.calculate_offset(&[0, 0]),
            Err(TensorError::RankMismatch { .. })
        ));
    }

    #[test]
    fn test_round_trip_through_bottom_index() {
        let d = padded_ak0_m_ak1(5, 7, 7);
        for k0 in 0..4 {
            for m in 0..8 {
                for k1 in 0..2 {
                    let top = [k0, m, k1];
                    let bottom = d.calculate_bottom_index(&top).unwrap();
                    assert_eq!(d.calculate_top_index(&bottom).unwrap(), top.to_vec());
                }
            }
        }
    }

    #[test]
    fn test_decode_offset_raw_domain() {
        let d = padded_ak0_m_ak1(5, 7, 9);
        for m in 0..5 {
            for k in 0..7 {
                let top = [k / 2, m, k % 2];
                let offset = d.calculate_offset(&top).unwrap();
                assert_eq!(d.decode_offset(offset), Some(top.to_vec()));
            }
        }
        // Offset 7 falls in the gap between rows (ld = 9 > k = 7).
        assert_eq!(d.decode_offset(7), None);
    }

    #[test]
    fn test_merge_permuted_dims() {
        // Logical [G=2, M=3, O=4] stored as [M, G, O].
        let d = TensorDescriptor::naive(vec![2, 3, 4], vec![4, 8, 1]).unwrap();
        let merged = d
            .transform(
                vec![Transform::merge(vec![2, 3]), Transform::pass_through(4)],
                vec![vec![0, 1], vec![2]],
                vec![vec![0], vec![1]],
            )
            .unwrap();
        assert_eq!(merged.lengths(), &[6, 4]);
        // flat 4 -> (g=1, m=1) -> 1*4 + 1*8 = 12, plus o=3
        assert_eq!(merged.calculate_offset(&[4, 3]).unwrap(), 15);
    }

    #[test]
    fn test_transform_rejects_bad_ids() {
        let d = TensorDescriptor::packed(vec![2, 3]);
        let err = d.transform(
            vec![Transform::pass_through(2), Transform::pass_through(3)],
            vec![vec![0], vec![0]],
            vec![vec![0], vec![1]],
        );
        assert!(matches!(err, Err(TensorError::InvalidStage(_))));

        let err = d.transform(
            vec![Transform::pass_through(2)],
            vec![vec![0]],
            vec![vec![0]],
        );
        assert!(matches!(err, Err(TensorError::InvalidStage(_))));
    }

    #[test]
    fn test_transform_rejects_length_mismatch() {
        let d = TensorDescriptor::packed(vec![2, 3]);
        let err = d.transform(
            vec![Transform::pass_through(2), Transform::right_pad(4, 4)],
            vec![vec![0], vec![1]],
            vec![vec![0], vec![1]],
        );
        assert_eq!(
            err.unwrap_err(),
            TensorError::TransformLengthMismatch {
                dim: 1,
                expected: 3,
                got: 4
            }
        );
    }

    #[test]
    fn test_unmerge_overhang_is_invalid() {
        // 10 rows tiled as 3 blocks of 4: rows 10 and 11 do not exist.
        let d = TensorDescriptor::packed(vec![10])
            .transform(vec![Transform::unmerge(vec![3, 4])], vec![vec![0]], vec![vec![0, 1]])
            .unwrap();
        assert!(d.is_valid_index(&[2, 1]).unwrap());
        assert!(!d.is_valid_index(&[2, 2]).unwrap());
    }
}
