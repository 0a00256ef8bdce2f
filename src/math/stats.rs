//! Mean and standard deviation over finite real sequences.
//!
//! The z-score convention used by the outlier pass is the *sample* standard
//! deviation (n - 1 denominator).

/// Arithmetic mean. `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n - 1 denominator). `None` for fewer than two
/// values.
pub fn sample_stddev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    Some((ss / (values.len() as f64 - 1.0)).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_basic() {
        assert_eq!(mean(&[1.0, 2.0, 3.0]), Some(2.0));
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn sample_stddev_matches_hand_computation() {
        // values 2, 4, 4, 4, 5, 5, 7, 9: sample variance = 32/7
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let sd = sample_stddev(&v).unwrap();
        assert!((sd - (32.0_f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn sample_stddev_needs_two_values() {
        assert_eq!(sample_stddev(&[1.0]), None);
    }

    #[test]
    fn sample_stddev_zero_for_identical_values() {
        let sd = sample_stddev(&[3.5, 3.5, 3.5, 3.5]).unwrap();
        assert_eq!(sd, 0.0);
    }
}
