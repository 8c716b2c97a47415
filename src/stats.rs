pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Median of `values`, sorting them in place.
///
/// An even number of values yields the upper of the two middle ones, so
/// two samples resolve to the faster one.
pub fn median_f64(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    values.sort_by(|a, b| a.total_cmp(b));

    Some(values[values.len() / 2])
}

/// Sample variance with Bessel's correction: Σ(xᵢ − mean)² / (n − 1).
///
/// No square root is taken. A single value has a variance of 0.
pub fn sample_variance(values: &[f64]) -> Option<f64> {
    let avg = mean(values)?;

    if values.len() == 1 {
        return Some(0.0);
    }

    let squares = values.iter().map(|v| (v - avg) * (v - avg)).sum::<f64>();

    Some(squares / (values.len() - 1) as f64)
}
