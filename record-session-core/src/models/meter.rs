/// Lowest reportable channel power, in dBFS. Silence and anything quieter
/// clamp to this value.
pub const MIN_POWER_DB: f32 = -160.0;

/// Highest reportable channel power, in dBFS (full scale).
pub const MAX_POWER_DB: f32 = 0.0;

/// Per-channel average power snapshot taken while recording.
///
/// One entry per configured channel, each within
/// [`MIN_POWER_DB`]..=[`MAX_POWER_DB`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeterSample(Vec<f32>);

impl MeterSample {
    /// Build a sample with exactly `channels` entries.
    ///
    /// Missing channels are filled with [`MIN_POWER_DB`], extra ones dropped,
    /// and every value is clamped into range (NaN reads as silence).
    pub fn from_powers(mut powers: Vec<f32>, channels: usize) -> Self {
        powers.resize(channels, MIN_POWER_DB);
        for power in powers.iter_mut() {
            *power = if power.is_nan() {
                MIN_POWER_DB
            } else {
                power.clamp(MIN_POWER_DB, MAX_POWER_DB)
            };
        }
        Self(powers)
    }

    pub fn silent(channels: usize) -> Self {
        Self(vec![MIN_POWER_DB; channels])
    }

    pub fn channels(&self) -> usize {
        self.0.len()
    }

    pub fn powers(&self) -> &[f32] {
        &self.0
    }

    /// Loudest channel, or `None` for an empty sample.
    pub fn peak(&self) -> Option<f32> {
        self.0.iter().copied().reduce(f32::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_and_truncates_to_channel_count() {
        let padded = MeterSample::from_powers(vec![-20.0], 2);
        assert_eq!(padded.powers(), &[-20.0, MIN_POWER_DB]);

        let truncated = MeterSample::from_powers(vec![-20.0, -30.0, -40.0], 1);
        assert_eq!(truncated.powers(), &[-20.0]);
    }

    #[test]
    fn clamps_out_of_range_values() {
        let sample = MeterSample::from_powers(vec![3.0, -500.0, f32::NAN], 3);
        assert_eq!(sample.powers(), &[MAX_POWER_DB, MIN_POWER_DB, MIN_POWER_DB]);
    }

    #[test]
    fn peak_of_channels() {
        let sample = MeterSample::from_powers(vec![-40.0, -12.5], 2);
        assert_eq!(sample.peak(), Some(-12.5));
        assert_eq!(MeterSample::default().peak(), None);
    }
}
