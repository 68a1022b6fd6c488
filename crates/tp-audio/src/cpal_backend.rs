//! CPAL-based audio output backend.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tp_engine::{AudioSink, DeviceError};
use tracing::{debug, error};

/// CPAL-based audio output.
///
/// The mixer thread pushes interleaved 16-bit samples into a lock-free
/// queue; the device callback pops them and spreads them over however
/// many channels the device has.
pub struct CpalOutput {
    stream: Stream,
    producer: HeapProd<i16>,
    channels: u16,
    rate: u32,
    failed: Arc<AtomicBool>,
}

impl CpalOutput {
    /// Open the default output device for `channels` interleaved channels
    /// (1 or 2) at `rate` Hz.
    ///
    /// If the device cannot run at `rate`, its default rate is used instead;
    /// check [`rate`](Self::rate) before configuring the player.
    pub fn open(rate: u32, channels: u16) -> Result<Self, DeviceError> {
        if !(1..=2).contains(&channels) {
            return Err(DeviceError::BadArg(format!("{} output channels", channels)));
        }
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| DeviceError::Unavailable("no default output device".into()))?;

        let config = choose_config(&device, rate)?;
        let device_channels = config.channels as usize;
        let actual_rate = config.sample_rate.0;
        debug!(
            device = device.name().unwrap_or_default(),
            rate = actual_rate,
            device_channels,
            "opened output device"
        );

        // About 100ms of audio
        let capacity = (actual_rate as usize / 10).max(256) * channels as usize;
        let (producer, consumer) = HeapRb::<i16>::new(capacity).split();

        let failed = Arc::new(AtomicBool::new(false));
        let stream = build_stream(&device, &config, consumer, channels as usize, failed.clone())?;
        stream
            .play()
            .map_err(|e| DeviceError::Failed(e.to_string()))?;

        Ok(Self {
            stream,
            producer,
            channels,
            rate: actual_rate,
            failed,
        })
    }

    /// Rate the device actually runs at.
    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// Block until the device has consumed everything queued.
    pub fn drain(&mut self) -> Result<(), DeviceError> {
        while !self.producer.is_empty() {
            self.check()?;
            std::thread::sleep(Duration::from_millis(5));
        }
        Ok(())
    }

    /// Stop the device immediately.
    pub fn pause(&self) -> Result<(), DeviceError> {
        self.stream
            .pause()
            .map_err(|e| DeviceError::Failed(e.to_string()))
    }

    fn check(&self) -> Result<(), DeviceError> {
        if self.failed.load(Ordering::Relaxed) {
            Err(DeviceError::Failed("output stream stopped".into()))
        } else {
            Ok(())
        }
    }
}

impl AudioSink for CpalOutput {
    /// Spins until the queue has room for at least one sample.
    fn write(&mut self, samples: &[i16]) -> Result<usize, DeviceError> {
        loop {
            self.check()?;
            let written = self.producer.push_slice(samples);
            if written > 0 || samples.is_empty() {
                return Ok(written);
            }
            std::hint::spin_loop();
        }
    }

    fn channels(&self) -> u16 {
        self.channels
    }
}

/// Prefer a supported f32 config that covers `rate`; otherwise fall back
/// to the device default.
fn choose_config(device: &Device, rate: u32) -> Result<StreamConfig, DeviceError> {
    let supported = device
        .supported_output_configs()
        .map_err(|e| DeviceError::Unavailable(e.to_string()))?
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .find(|c| c.min_sample_rate().0 <= rate && rate <= c.max_sample_rate().0);

    if let Some(range) = supported {
        return Ok(range.with_sample_rate(SampleRate(rate)).into());
    }

    let fallback = device
        .default_output_config()
        .map_err(|e| DeviceError::Unavailable(e.to_string()))?;
    debug!(requested = rate, using = fallback.sample_rate().0, "rate not supported");
    Ok(fallback.into())
}

fn build_stream(
    device: &Device,
    config: &StreamConfig,
    mut consumer: HeapCons<i16>,
    source_channels: usize,
    failed: Arc<AtomicBool>,
) -> Result<Stream, DeviceError> {
    let device_channels = config.channels as usize;
    let mut frame = [0i16; 2];

    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for chunk in data.chunks_mut(device_channels) {
                    // Only take whole frames so the channels stay aligned
                    if consumer.occupied_len() < source_channels {
                        chunk.fill(0.0);
                        continue;
                    }
                    consumer.pop_slice(&mut frame[..source_channels]);
                    for (i, sample) in chunk.iter_mut().enumerate() {
                        // Mono feeds every device channel; stereo feeds the first two
                        let src = if source_channels == 1 {
                            Some(frame[0])
                        } else {
                            frame.get(i).copied()
                        };
                        *sample = src.map_or(0.0, |s| s as f32 / 32768.0);
                    }
                }
            },
            move |err| {
                error!(%err, "audio stream error");
                failed.store(true, Ordering::Relaxed);
            },
            None,
        )
        .map_err(|e| DeviceError::Failed(e.to_string()))
}
