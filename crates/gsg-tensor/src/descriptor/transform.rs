/// A primitive coordinate transform.
///
/// Each transform relates a group of *upper* (logical, closer to the user)
/// dimensions to a group of *lower* (closer to memory) dimensions. Index
/// calculation always runs upper -> lower when addressing memory, and
/// lower -> upper when decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transform {
    /// Identity on a single dimension.
    PassThrough { length: usize },
    /// Several lower dimensions collapse into one upper dimension, row-major.
    Merge { lengths: Vec<usize> },
    /// One lower dimension splits into several upper dimensions, row-major.
    Unmerge { lengths: Vec<usize> },
    /// One dimension extended on the right from `length` to `padded_length`.
    ///
    /// Upper indices in `length..padded_length` map to lower indices past the
    /// end of the lower dimension, which is what marks them as padding.
    RightPad { length: usize, padded_length: usize },
}

impl Transform {
    pub fn pass_through(length: usize) -> Self {
        Transform::PassThrough { length }
    }

    pub fn merge(lengths: Vec<usize>) -> Self {
        Transform::Merge { lengths }
    }

    pub fn unmerge(lengths: Vec<usize>) -> Self {
        Transform::Unmerge { lengths }
    }

    /// Pad `length` on the right by `pad` elements.
    pub fn right_pad(length: usize, pad: usize) -> Self {
        Transform::RightPad {
            length,
            padded_length: length + pad,
        }
    }

    /// Number of lower dimensions this transform consumes.
    pub fn num_lower_dims(&self) -> usize {
        match self {
            Transform::Merge { lengths } => lengths.len(),
            _ => 1,
        }
    }

    /// Number of upper dimensions this transform produces.
    pub fn num_upper_dims(&self) -> usize {
        match self {
            Transform::Unmerge { lengths } => lengths.len(),
            _ => 1,
        }
    }

    /// Lengths of the lower dimensions this transform expects to consume.
    ///
    /// `None` for `Unmerge`, which may re-tile its lower dimension non-exactly.
    pub fn lower_lengths(&self) -> Option<Vec<usize>> {
        match self {
            Transform::PassThrough { length } => Some(vec![*length]),
            Transform::Merge { lengths } => Some(lengths.clone()),
            Transform::Unmerge { .. } => None,
            Transform::RightPad { length, .. } => Some(vec![*length]),
        }
    }

    /// Lengths of the upper dimensions this transform produces.
    pub fn upper_lengths(&self) -> Vec<usize> {
        match self {
            Transform::PassThrough { length } => vec![*length],
            Transform::Merge { lengths } => vec![lengths.iter().product()],
            Transform::Unmerge { lengths } => lengths.clone(),
            Transform::RightPad { padded_length, .. } => vec![*padded_length],
        }
    }

    /// Maps an upper index onto the lower index, writing into `lower`.
    pub fn calculate_lower_index(&self, upper: &[usize], lower: &mut [usize]) {
        match self {
            Transform::PassThrough { .. } | Transform::RightPad { .. } => lower[0] = upper[0],
            Transform::Merge { lengths } => decompose(upper[0], lengths, lower),
            Transform::Unmerge { lengths } => lower[0] = compose(upper, lengths),
        }
    }

    /// Maps a lower index back onto the upper index, writing into `upper`.
    pub fn calculate_upper_index(&self, lower: &[usize], upper: &mut [usize]) {
        match self {
            Transform::PassThrough { .. } | Transform::RightPad { .. } => upper[0] = lower[0],
            Transform::Merge { lengths } => upper[0] = compose(lower, lengths),
            Transform::Unmerge { lengths } => decompose(lower[0], lengths, upper),
        }
    }
}

/// Row-major flattening of `index` over `lengths`.
fn compose(index: &[usize], lengths: &[usize]) -> usize {
    index
        .iter()
        .zip(lengths)
        .fold(0usize, |acc, (&i, &len)| acc * len + i)
}

/// Row-major split of `flat` over `lengths`.
///
/// The outermost coordinate absorbs any overflow so that `compose` and
/// `decompose` stay exact inverses even outside the nominal range.
fn decompose(flat: usize, lengths: &[usize], out: &mut [usize]) {
    let mut rem = flat;
    for i in (1..lengths.len()).rev() {
        let len = lengths[i].max(1);
        out[i] = rem % len;
        rem /= len;
    }
    if !lengths.is_empty() {
        out[0] = rem;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_round_trip() {
        let t = Transform::merge(vec![2, 3, 4]);
        assert_eq!(t.upper_lengths(), vec![24]);
        for flat in 0..24 {
            let mut lower = [0usize; 3];
            t.calculate_lower_index(&[flat], &mut lower);
            let mut upper = [0usize; 1];
            t.calculate_upper_index(&lower, &mut upper);
            assert_eq!(upper[0], flat);
        }
        let mut lower = [0usize; 3];
        t.calculate_lower_index(&[23], &mut lower);
        assert_eq!(lower, [1, 2, 3]);
    }

    #[test]
    fn test_unmerge_is_inverse_of_merge() {
        let t = Transform::unmerge(vec![4, 8]);
        let mut lower = [0usize; 1];
        t.calculate_lower_index(&[3, 5], &mut lower);
        assert_eq!(lower[0], 29);
        let mut upper = [0usize; 2];
        t.calculate_upper_index(&[29], &mut upper);
        assert_eq!(upper, [3, 5]);
    }

    #[test]
    fn test_merge_overflow_goes_to_outermost() {
        let t = Transform::merge(vec![2, 5]);
        let mut lower = [0usize; 2];
        t.calculate_lower_index(&[13], &mut lower);
        assert_eq!(lower, [2, 3]);
        let mut upper = [0usize; 1];
        t.calculate_upper_index(&lower, &mut upper);
        assert_eq!(upper[0], 13);
    }

    #[test]
    fn test_right_pad_lengths() {
        let t = Transform::right_pad(100, 28);
        assert_eq!(t.lower_lengths(), Some(vec![100]));
        assert_eq!(t.upper_lengths(), vec![128]);
        let mut lower = [0usize; 1];
        t.calculate_lower_index(&[120], &mut lower);
        assert_eq!(lower[0], 120);
    }
}
