/// Counters for how well prediction is holding up.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SimulationStats {
    pub tick_count: u64,
    pub correction_count: u64,
    /// Sum of position errors that triggered corrections, in cm
    pub accumulated_position_error: f64,
    pub bits_sent: u64,
}

impl SimulationStats {
    pub fn mean_correction_error(&self) -> f64 {
        if self.correction_count == 0 {
            return 0.0;
        }
        self.accumulated_position_error / self.correction_count as f64
    }

    pub fn record_correction(&mut self, error: f32) {
        self.correction_count += 1;
        self.accumulated_position_error += error as f64;
    }
}
