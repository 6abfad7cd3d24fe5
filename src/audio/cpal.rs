// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::{error, info, span, warn, Level};

use super::thread_priority::{configure_render_thread, render_thread_priority, rt_audio_enabled};
use super::{AudioError, AudioGraph};
use crate::config;

/// A small wrapper around a cpal::Device that renders an audio graph into it.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The output channel count.
    channels: u16,
    /// The render sample rate.
    sample_rate: u32,
    /// Frames rendered per block on the producer thread.
    block_frames: usize,
    /// The sample format the device prefers.
    sample_format: cpal::SampleFormat,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The underlying cpal device.
    device: cpal::Device,
    /// The render and output threads, while running.
    running: Mutex<Option<Running>>,
}

/// The threads feeding a running output.
struct Running {
    alive: Arc<AtomicBool>,
    producer: thread::JoinHandle<()>,
    output: thread::JoinHandle<()>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.channels,
            self.host_id.name()
        )
    }
}

fn backend<E: fmt::Display>(e: E) -> AudioError {
    AudioError::Backend(e.to_string())
}

fn device_name(device: &cpal::Device) -> Result<String, AudioError> {
    Ok(device.description().map_err(backend)?.name().to_string())
}

/// Pulls interleaved f32 samples from the ring and converts them for the device.
/// Any shortfall is played as silence.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut ring: HeapCons<f32>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            scratch.resize(data.len(), 0.0);
            let read = ring.pop_slice(&mut scratch);
            scratch[read..].fill(0.0);
            for (dst, src) in data.iter_mut().zip(scratch.iter()) {
                *dst = T::from_sample(*src);
            }
        },
        |err| error!("CPAL output stream error: {}", err),
        None,
    )
}

/// Renders graph blocks into the ring until told to stop.
fn produce(
    graph: Arc<Mutex<AudioGraph>>,
    mut ring: HeapProd<f32>,
    alive: Arc<AtomicBool>,
    block_frames: usize,
    channels: usize,
) {
    configure_render_thread(render_thread_priority(), rt_audio_enabled());

    let block_samples = block_frames * channels;
    let mut scratch = vec![0.0f32; block_samples];
    while alive.load(Ordering::Relaxed) {
        if ring.vacant_len() >= block_samples {
            graph.lock().render_interleaved(&mut scratch, channels);
            ring.push_slice(&scratch);
        } else {
            thread::sleep(Duration::from_micros(500));
        }
    }
}

impl Device {
    /// Lists cpal devices and produces the Device trait.
    pub fn list() -> Result<Vec<Box<dyn super::Device>>, Box<dyn Error>> {
        Ok(Device::list_cpal_devices()?
            .into_iter()
            .map(|device| {
                let device: Box<dyn super::Device> = Box::new(device);
                device
            })
            .collect())
    }

    /// Lists cpal devices.
    fn list_cpal_devices() -> Result<Vec<Device>, Box<dyn Error>> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices: Vec<Device> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.output_devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let Ok(output_config) = device.default_output_config() else {
                    continue;
                };
                let Ok(name) = device_name(&device) else {
                    continue;
                };

                devices.push(Device {
                    name,
                    channels: output_config.channels(),
                    sample_rate: output_config.sample_rate(),
                    block_frames: 512,
                    sample_format: output_config.sample_format(),
                    host_id,
                    device,
                    running: Mutex::new(None),
                })
            }
        }

        devices.sort_by_key(|device| device.name.to_string());
        Ok(devices)
    }

    /// Gets the configured cpal device. "default" picks the host's default output.
    pub fn get(config: &config::Audio) -> Result<Device, AudioError> {
        let name = config.device();
        let host = cpal::default_host();
        let device = if name == "default" {
            host.default_output_device()
                .ok_or(AudioError::NoDefaultDevice)?
        } else {
            let _shh_stderr = shh::stderr().map_err(backend)?;
            host.output_devices()
                .map_err(backend)?
                .find(|device| {
                    device_name(device)
                        .map(|candidate| candidate.trim() == name)
                        .unwrap_or(false)
                })
                .ok_or_else(|| AudioError::DeviceNotFound(name.to_string()))?
        };

        let output_config = device.default_output_config().map_err(backend)?;
        Ok(Device {
            name: device_name(&device)?,
            channels: config.channels().unwrap_or(output_config.channels()),
            sample_rate: config.sample_rate(),
            block_frames: config.buffer_size(),
            sample_format: output_config.sample_format(),
            host_id: host.id(),
            device,
            running: Mutex::new(None),
        })
    }

    /// Opens the cpal stream on its own thread and keeps it alive until stopped. The stream
    /// is created on the thread that owns it; the result is reported back before returning.
    fn spawn_output(
        &self,
        ring: HeapCons<f32>,
        alive: Arc<AtomicBool>,
    ) -> Result<thread::JoinHandle<()>, AudioError> {
        let device = self.device.clone();
        let sample_format = self.sample_format;
        let config = cpal::StreamConfig {
            channels: self.channels,
            sample_rate: self.sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };
        let (started_tx, started_rx) = crossbeam_channel::bounded::<Result<(), AudioError>>(1);

        let output = thread::spawn(move || {
            let stream = match sample_format {
                cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, ring),
                cpal::SampleFormat::I32 => build_stream::<i32>(&device, &config, ring),
                cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, ring),
                cpal::SampleFormat::F64 => build_stream::<f64>(&device, &config, ring),
                _ => build_stream::<f32>(&device, &config, ring),
            };
            let stream = match stream.map_err(backend).and_then(|stream| {
                stream.play().map_err(backend)?;
                Ok(stream)
            }) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = started_tx.send(Err(e));
                    return;
                }
            };
            info!("CPAL output stream started successfully");
            let _ = started_tx.send(Ok(()));

            while alive.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(100));
            }
            drop(stream);
        });

        match started_rx.recv() {
            Ok(Ok(())) => Ok(output),
            Ok(Err(e)) => {
                let _ = output.join();
                Err(e)
            }
            Err(_) => Err(AudioError::Backend(
                "output thread exited before the stream started".to_string(),
            )),
        }
    }
}

impl super::Device for Device {
    fn name(&self) -> &str {
        &self.name
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start(&self, graph: Arc<Mutex<AudioGraph>>) -> Result<(), AudioError> {
        let span = span!(Level::INFO, "start output (cpal)");
        let _enter = span.enter();

        let mut running = self.running.lock();
        if running.is_some() {
            return Err(AudioError::AlreadyStarted(self.name.clone()));
        }

        // Roughly 100ms of audio, never less than a few blocks.
        let channels = self.channels as usize;
        let capacity = (self.sample_rate as usize * channels / 10)
            .max(self.block_frames * channels * 4);
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();

        let alive = Arc::new(AtomicBool::new(true));
        let output = self.spawn_output(consumer, alive.clone())?;

        let producer = {
            let alive = alive.clone();
            let block_frames = self.block_frames;
            thread::spawn(move || produce(graph, producer, alive, block_frames, channels))
        };

        info!(
            device = self.name,
            channels = self.channels,
            sample_rate = self.sample_rate,
            format = ?self.sample_format,
            "Output started."
        );
        *running = Some(Running {
            alive,
            producer,
            output,
        });
        Ok(())
    }

    fn stop(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };
        running.alive.store(false, Ordering::Relaxed);
        if running.producer.join().is_err() {
            warn!(device = self.name, "Render thread panicked");
        }
        if running.output.join().is_err() {
            warn!(device = self.name, "Output thread panicked");
        }
        info!(device = self.name, "Output stopped.");
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        super::Device::stop(self);
    }
}
