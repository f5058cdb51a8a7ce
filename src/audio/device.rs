//! Output device enumeration and selection

use cpal::traits::{DeviceTrait, HostTrait};
use serde::Serialize;

use crate::error::OutputError;

/// Wrapper around a cpal output device
pub struct AudioDevice {
    inner: cpal::Device,
    pub name: String,
}

impl AudioDevice {
    pub fn from_cpal(device: cpal::Device) -> Self {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        Self { inner: device, name }
    }

    pub fn inner(&self) -> &cpal::Device {
        &self.inner
    }

    /// Pick a stream configuration for a track.
    ///
    /// Prefers an f32 configuration that supports the track's sample rate
    /// and channel count; otherwise falls back to the device default with
    /// the requested rate if any range allows it.
    pub fn stream_config_for(
        &self,
        sample_rate: u32,
        channels: u16,
    ) -> Result<cpal::StreamConfig, OutputError> {
        let rate = cpal::SampleRate(sample_rate);
        let ranges: Vec<cpal::SupportedStreamConfigRange> = self
            .inner
            .supported_output_configs()
            .map(|iter| iter.collect())
            .map_err(|e| OutputError::DeviceNotFound(e.to_string()))?;

        let supports_rate = |r: &cpal::SupportedStreamConfigRange| {
            rate >= r.min_sample_rate() && rate <= r.max_sample_rate()
        };

        if let Some(range) = ranges.iter().find(|r| {
            r.sample_format() == cpal::SampleFormat::F32
                && r.channels() == channels
                && supports_rate(r)
        }) {
            return Ok(range.clone().with_sample_rate(rate).config());
        }

        let default = self
            .inner
            .default_output_config()
            .map_err(|e| OutputError::DeviceNotFound(e.to_string()))?;
        let mut config = default.config();
        if ranges
            .iter()
            .any(|r| r.channels() == config.channels && supports_rate(r))
        {
            config.sample_rate = rate;
        }
        Ok(config)
    }
}

/// Output device description for the status API
#[derive(Debug, Clone, Serialize)]
pub struct OutputDeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub sample_rates: Vec<u32>,
    pub channels: Vec<u16>,
}

/// List all output devices on the default host
pub fn list_output_devices() -> Vec<OutputDeviceInfo> {
    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());

    let mut devices = Vec::new();
    if let Ok(outputs) = host.output_devices() {
        for device in outputs {
            if let Ok(name) = device.name() {
                let (sample_rates, channels) = get_device_capabilities(&device);
                devices.push(OutputDeviceInfo {
                    is_default: default_name.as_ref() == Some(&name),
                    name,
                    sample_rates,
                    channels,
                });
            }
        }
    }
    devices
}

fn get_device_capabilities(device: &cpal::Device) -> (Vec<u32>, Vec<u16>) {
    let mut rates = Vec::new();
    let mut chans = Vec::new();

    if let Ok(configs) = device.supported_output_configs() {
        for config in configs {
            for rate_val in [22050u32, 44100, 48000, 88200, 96000] {
                let rate = cpal::SampleRate(rate_val);
                if rate >= config.min_sample_rate()
                    && rate <= config.max_sample_rate()
                    && !rates.contains(&rate_val)
                {
                    rates.push(rate_val);
                }
            }
            if !chans.contains(&config.channels()) {
                chans.push(config.channels());
            }
        }
    }

    rates.sort();
    chans.sort();
    (rates, chans)
}

/// Get default output device
pub fn get_default_output_device() -> Result<AudioDevice, OutputError> {
    let host = cpal::default_host();
    host.default_output_device()
        .map(AudioDevice::from_cpal)
        .ok_or_else(|| OutputError::DeviceNotFound("No default output device".to_string()))
}
