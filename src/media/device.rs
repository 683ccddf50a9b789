//! Device Backend - Mikrofon Capture über cpal
//!
//! Öffnet das Standard-Eingabegerät und schreibt aufgenommene Samples
//! in den Ring-Buffer des Handles. Das Enabled-Flag der Audio-Spur wird
//! im Callback geprüft: stummgeschaltet werden keine Samples geliefert,
//! der Stream selbst läuft weiter.
//!
//! Kamera-Frames zieht die Transportschicht direkt von der Plattform;
//! die Video-Spur trägt hier Flag und Identität.

use super::capture::{
    CaptureBackend, CaptureError, CaptureGuard, CaptureHandle, Track, TrackKind, RING_BUFFER_SIZE,
    SAMPLE_RATE,
};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig, SupportedStreamConfigRange};
use parking_lot::Mutex;
use ringbuf::{traits::*, HeapRb};
use serde::Serialize;
use std::sync::Arc;

// ============================================================================
// INPUT DEVICES
// ============================================================================

/// Sichtbares Eingabegerät
#[derive(Debug, Clone, Serialize)]
pub struct InputDevice {
    pub name: String,
    pub is_default: bool,
}

// ============================================================================
// DEVICE BACKEND
// ============================================================================

/// Capture-Backend über das Standard-Eingabegerät
pub struct DeviceBackend;

impl DeviceBackend {
    pub fn new() -> Self {
        Self
    }

    /// Listet die verfügbaren Eingabegeräte
    pub fn input_devices() -> Result<Vec<InputDevice>, CaptureError> {
        let host = cpal::default_host();
        let default_name = host.default_input_device().and_then(|d| d.name().ok());

        let devices = host
            .input_devices()
            .map_err(|e| CaptureError::UnsupportedConfig(e.to_string()))?
            .filter_map(|d| {
                d.name().ok().map(|name| InputDevice {
                    is_default: Some(&name) == default_name.as_ref(),
                    name,
                })
            })
            .collect();

        Ok(devices)
    }

    /// Findet die beste Input-Konfiguration
    fn find_best_input_config(device: &Device) -> Result<StreamConfig, CaptureError> {
        let configs = device
            .supported_input_configs()
            .map_err(|e| CaptureError::UnsupportedConfig(e.to_string()))?;

        Self::select_best_config(configs.collect())
    }

    /// Wählt die beste Konfiguration aus einer Liste
    fn select_best_config(
        configs: Vec<SupportedStreamConfigRange>,
    ) -> Result<StreamConfig, CaptureError> {
        // Priorität: 48kHz > andere Raten, F32 > andere Formate
        let target_rate = cpal::SampleRate(SAMPLE_RATE);

        for config in &configs {
            if config.min_sample_rate() <= target_rate
                && config.max_sample_rate() >= target_rate
                && config.sample_format() == SampleFormat::F32
            {
                return Ok(config.with_sample_rate(target_rate).into());
            }
        }

        for config in &configs {
            if config.sample_format() == SampleFormat::F32 {
                let rate = if config.min_sample_rate() <= target_rate
                    && config.max_sample_rate() >= target_rate
                {
                    target_rate
                } else {
                    config.max_sample_rate()
                };
                return Ok(config.with_sample_rate(rate).into());
            }
        }

        if let Some(config) = configs.first() {
            return Ok(config.with_max_sample_rate().into());
        }

        Err(CaptureError::UnsupportedConfig(
            "No suitable capture configuration found".to_string(),
        ))
    }
}

impl Default for DeviceBackend {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// DEVICE GUARD
// ============================================================================

/// Hält den laufenden cpal-Stream bis zum Release
///
/// Note: Stream ist nicht Send, daher wrappen wir in einen Send-fähigen
/// Guard; gestoppt wird durch Droppen des Streams.
struct DeviceGuard {
    input_stream: Option<Stream>,
}

unsafe impl Send for DeviceGuard {}

impl CaptureGuard for DeviceGuard {
    fn stop(&mut self) {
        self.input_stream = None;
        tracing::info!("Audio capture stopped");
    }
}

// ============================================================================
// CAPTURE BACKEND IMPL
// ============================================================================

#[async_trait]
impl CaptureBackend for DeviceBackend {
    async fn acquire(&self) -> Result<CaptureHandle, CaptureError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(CaptureError::NoInputDevice)?;

        let config = Self::find_best_input_config(&device)?;

        tracing::info!(
            "Starting audio capture: {} Hz, {} channels",
            config.sample_rate.0,
            config.channels
        );

        let audio = Track::new(TrackKind::Audio, "audio");
        let video = Track::new(TrackKind::Video, "video");
        let capture_buffer = Arc::new(Mutex::new(HeapRb::new(RING_BUFFER_SIZE)));
        let input_level = Arc::new(Mutex::new(0.0f32));

        let buffer = Arc::clone(&capture_buffer);
        let level = Arc::clone(&input_level);
        let audio_track = audio.clone();
        let target_sample_rate = SAMPLE_RATE;
        let source_sample_rate = config.sample_rate.0;

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    // Audio Level berechnen (RMS); Metering läuft auch
                    // stummgeschaltet weiter
                    let rms: f32 =
                        (data.iter().map(|s| s * s).sum::<f32>() / data.len() as f32).sqrt();
                    *level.lock() = rms.min(1.0);

                    if !audio_track.is_enabled() {
                        return;
                    }

                    // Resampling falls nötig (zu 48kHz)
                    let samples: Vec<f32> = if source_sample_rate != target_sample_rate {
                        // Einfaches Linear-Resampling
                        let ratio = target_sample_rate as f32 / source_sample_rate as f32;
                        let new_len = (data.len() as f32 * ratio) as usize;
                        (0..new_len)
                            .map(|i| {
                                let src_idx = i as f32 / ratio;
                                let idx = src_idx as usize;
                                let frac = src_idx - idx as f32;
                                let s1 = data.get(idx).copied().unwrap_or(0.0);
                                let s2 = data.get(idx + 1).copied().unwrap_or(s1);
                                s1 + (s2 - s1) * frac
                            })
                            .collect()
                    } else {
                        data.to_vec()
                    };

                    // In Ring-Buffer schreiben
                    let mut buffer = buffer.lock();
                    for sample in samples {
                        let _ = buffer.try_push(sample);
                    }
                },
                |err| {
                    tracing::error!("Audio capture error: {}", err);
                },
                None,
            )
            .map_err(|e| CaptureError::StreamBuild(e.to_string()))?;

        stream
            .play()
            .map_err(|e| CaptureError::StreamStart(e.to_string()))?;

        Ok(CaptureHandle::new(
            audio,
            video,
            capture_buffer,
            input_level,
            Box::new(DeviceGuard {
                input_stream: Some(stream),
            }),
        ))
    }
}
