/// Column-wise z-score parameters, kept so raw inputs can be scaled the
/// same way at prediction time.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingParams {
    pub means: Vec<f64>,
    /// Population standard deviations, with zero replaced by 1.
    pub std_devs: Vec<f64>,
}

impl ScalingParams {
    pub fn apply(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(self.std_devs.iter()))
            .map(|(value, (mean, std_dev))| (value - mean) / std_dev)
            .collect()
    }
}

pub fn standardize(rows: &[Vec<f64>]) -> (Vec<Vec<f64>>, ScalingParams) {
    let columns = rows.first().map(Vec::len).unwrap_or(0);
    let count = rows.len().max(1) as f64;

    let means: Vec<f64> = (0..columns)
        .map(|col| rows.iter().map(|row| row[col]).sum::<f64>() / count)
        .collect();

    let std_devs: Vec<f64> = (0..columns)
        .map(|col| {
            let variance = rows
                .iter()
                .map(|row| (row[col] - means[col]).powi(2))
                .sum::<f64>()
                / count;
            let std_dev = variance.sqrt();
            if std_dev == 0.0 {
                1.0
            } else {
                std_dev
            }
        })
        .collect();

    let params = ScalingParams { means, std_devs };
    let scaled = rows.iter().map(|row| params.apply(row)).collect();
    (scaled, params)
}
