/// In-place softmax over one row of scores where masked entries are `-inf`.
///
/// A row with every entry masked becomes all zeros rather than NaN.
pub fn masked_softmax(row: &mut [f32]) {
    // Find max for numerical stability
    let max_val = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if max_val == f32::NEG_INFINITY {
        row.fill(0.0);
        return;
    }

    let mut sum = 0.0f32;
    for x in row.iter_mut() {
        *x = (*x - max_val).exp();
        sum += *x;
    }
    for x in row.iter_mut() {
        *x /= sum;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_softmax_sums_to_one() {
        let mut row = [1.0, 2.0, 3.0, 4.0];
        masked_softmax(&mut row);
        assert_abs_diff_eq!(row.iter().sum::<f32>(), 1.0, epsilon = 1e-6);
        assert!(row[3] > row[2] && row[2] > row[1]);
    }

    #[test]
    fn test_masked_entries_get_zero() {
        let mut row = [0.5, f32::NEG_INFINITY, 0.5, f32::NEG_INFINITY];
        masked_softmax(&mut row);
        assert_abs_diff_eq!(row[0], 0.5, epsilon = 1e-6);
        assert_eq!(row[1], 0.0);
        assert_abs_diff_eq!(row[2], 0.5, epsilon = 1e-6);
        assert_eq!(row[3], 0.0);
    }

    #[test]
    fn test_fully_masked_row_is_zero() {
        let mut row = [f32::NEG_INFINITY; 5];
        masked_softmax(&mut row);
        assert!(row.iter().all(|&x| x == 0.0));
    }
}
