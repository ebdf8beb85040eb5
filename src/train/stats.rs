//! Training run bookkeeping

use serde::Serialize;

/// Counters and last losses of a training run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrainingStats {
    /// Step restored from a checkpoint, 0 for a fresh run
    pub start_step: usize,
    /// First and last step the loop executed
    pub first_step: Option<usize>,
    pub last_step: Option<usize>,
    pub d_updates: usize,
    pub g_updates: usize,
    pub samples_written: usize,
    pub sample_failures: usize,
    pub checkpoints_saved: usize,
    pub last_d_loss: Option<f32>,
    pub last_g_loss: Option<f32>,
    pub elapsed_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_serialize() {
        let stats = TrainingStats { d_updates: 5, g_updates: 1, ..TrainingStats::default() };
        let json = serde_json::to_string(&stats).expect("json");
        assert!(json.contains(r#""d_updates":5"#));
    }
}
