//! Decoded track buffer

/// A fully decoded audio file held in memory.
///
/// Samples are interleaved f32. `total_samples` counts frames (samples per
/// channel), which is the unit the playback cursor and progress events use.
#[derive(Debug, Clone)]
pub struct Track {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
    total_samples: u64,
    source: String,
}

impl Track {
    pub fn new(
        samples: Vec<f32>,
        sample_rate: u32,
        channels: u16,
        source: impl Into<String>,
    ) -> Self {
        let channels = channels.max(1);
        let total_samples = (samples.len() / channels as usize) as u64;
        Self {
            samples,
            sample_rate,
            channels,
            total_samples,
            source: source.into(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    /// Path the track was loaded from, as given by the requester
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Length in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.total_samples as f64 / self.sample_rate as f64
    }

    /// Interleaved samples of one frame, or `None` past the end
    pub fn frame(&self, index: u64) -> Option<&[f32]> {
        if index >= self.total_samples {
            return None;
        }
        let start = index as usize * self.channels as usize;
        Some(&self.samples[start..start + self.channels as usize])
    }
}
