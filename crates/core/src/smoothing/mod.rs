/// Moving average over `values` using up to `window` neighbours on each side.
///
/// Windows are clipped at the sequence boundaries: edge elements are averaged
/// over the neighbours that actually exist, with no wraparound or padding.
pub fn apply_smoothing(values: &[f32], window: usize) -> Vec<f32> {
    let len = values.len();
    (0..len)
        .map(|index| {
            let start = index.saturating_sub(window);
            let end = (index + window + 1).min(len);
            let slice = &values[start..end];
            slice.iter().sum::<f32>() / slice.len() as f32
        })
        .collect()
}

/// Arithmetic mean of `values`, or zero for an empty slice.
pub fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}
