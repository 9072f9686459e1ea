use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::SampleFormat;
use live_voice_types::AudioFrame;
use rubato::{FastFixedIn, Resampler};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};

use crate::audio::{create_resampler, downmix, float_to_pcm16, pcm16_to_float, rms, INPUT_SAMPLE_RATE};
use crate::device::get_or_default_input;

/// Samples per outbound frame, at 16 kHz.
pub const FRAME_SAMPLES: usize = 2048;
/// Frames buffered between the audio thread and the session before new ones are dropped.
pub const FRAME_QUEUE: usize = 64;

const RESAMPLER_CHUNK: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("no input device: {0}")]
    NoDevice(String),
    #[error("unsupported input configuration: {0}")]
    Unsupported(String),
    #[error("failed to open input stream: {0}")]
    Stream(String),
    #[error("already recording")]
    AlreadyRecording,
    #[error("capture thread exited before reporting")]
    ThreadGone,
}

/// Turns device callbacks into 16 kHz PCM16 frames.
///
/// Input is down-mixed to mono and resampled when the device rate differs.
/// Output accumulates until a full [`FRAME_SAMPLES`] buffer is available.
pub struct CaptureWorklet {
    channels: usize,
    resampler: Option<FastFixedIn<f32>>,
    staged: Vec<f32>,
    buffer: Vec<f32>,
}

impl CaptureWorklet {
    pub fn new(device_rate: u32, channels: usize) -> Result<Self, CaptureError> {
        let resampler = if device_rate == INPUT_SAMPLE_RATE {
            None
        } else {
            let resampler = create_resampler(device_rate as f64, INPUT_SAMPLE_RATE as f64, RESAMPLER_CHUNK)
                .map_err(|e| CaptureError::Unsupported(e.to_string()))?;
            Some(resampler)
        };
        Ok(Self {
            channels: channels.max(1),
            resampler,
            staged: Vec::new(),
            buffer: Vec::with_capacity(FRAME_SAMPLES * 2),
        })
    }

    /// Feeds interleaved device samples; `emit` receives each full frame and its RMS level.
    pub fn process(&mut self, data: &[f32], mut emit: impl FnMut(AudioFrame, f32)) {
        let mono = downmix(data, self.channels);
        match self.resampler.as_mut() {
            None => self.buffer.extend_from_slice(&mono),
            Some(resampler) => {
                self.staged.extend_from_slice(&mono);
                loop {
                    let needed = resampler.input_frames_next();
                    if self.staged.len() < needed {
                        break;
                    }
                    let chunk: Vec<f32> = self.staged.drain(..needed).collect();
                    match resampler.process(&[chunk], None) {
                        Ok(out) => {
                            if let Some(channel) = out.first() {
                                self.buffer.extend_from_slice(channel);
                            }
                        }
                        Err(e) => tracing::warn!("failed to resample capture chunk: {}", e),
                    }
                }
            }
        }

        while self.buffer.len() >= FRAME_SAMPLES {
            let samples: Vec<f32> = self.buffer.drain(..FRAME_SAMPLES).collect();
            let volume = rms(&samples);
            emit(AudioFrame::from_samples(&float_to_pcm16(&samples), INPUT_SAMPLE_RATE), volume);
        }
    }
}

/// Something that produces microphone frames.
pub trait CaptureSource: Send + Sync {
    fn is_supported(&self) -> bool;
    fn start(&self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError>;
    fn stop(&self);
}

struct Running {
    stop_tx: std::sync::mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Microphone capture on a dedicated thread that owns the cpal stream.
pub struct AudioRecorder {
    device_name: Option<String>,
    running: Mutex<Option<Running>>,
    dropped: Arc<AtomicU64>,
    level: watch::Sender<f32>,
}

impl AudioRecorder {
    pub fn new(device_name: Option<String>) -> Self {
        let (level, _) = watch::channel(0.0);
        Self {
            device_name,
            running: Mutex::new(None),
            dropped: Arc::new(AtomicU64::new(0)),
            level,
        }
    }

    /// RMS level of the latest captured frame, 0.0 while stopped.
    pub fn level(&self) -> watch::Receiver<f32> {
        self.level.subscribe()
    }

    /// Frames discarded because the session side was not keeping up.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_recording(&self) -> bool {
        self.running.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }
}

impl CaptureSource for AudioRecorder {
    fn is_supported(&self) -> bool {
        get_or_default_input(self.device_name.clone()).is_ok()
    }

    fn start(&self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            return Err(CaptureError::AlreadyRecording);
        }

        let (frame_tx, frame_rx) = mpsc::channel(FRAME_QUEUE);
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
        let device_name = self.device_name.clone();
        let level = self.level.clone();
        let dropped = Arc::clone(&self.dropped);

        let handle = thread::spawn(move || {
            let stream = match open_input(device_name, frame_tx, level, dropped) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(CaptureError::Stream(e.to_string())));
                return;
            }
            let _ = ready_tx.send(Ok(()));
            // parked until stop() or the recorder is dropped
            let _ = stop_rx.recv();
            drop(stream);
            tracing::debug!("capture thread finished");
        });

        match ready_rx.recv() {
            Ok(Ok(())) => {
                tracing::info!("recording started");
                *running = Some(Running { stop_tx, handle });
                Ok(frame_rx)
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(CaptureError::ThreadGone)
            }
        }
    }

    fn stop(&self) {
        let running = self.running.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(running) = running {
            let _ = running.stop_tx.send(());
            if running.handle.join().is_err() {
                tracing::warn!("capture thread panicked");
            }
            self.level.send_replace(0.0);
            tracing::info!("recording stopped, {} frame(s) dropped so far", self.dropped_frames());
        }
    }
}

impl Drop for AudioRecorder {
    fn drop(&mut self) {
        self.stop();
    }
}

fn frame_sink(
    mut worklet: CaptureWorklet,
    frames: mpsc::Sender<AudioFrame>,
    level: watch::Sender<f32>,
    dropped: Arc<AtomicU64>,
) -> impl FnMut(&[f32]) + Send + 'static {
    move |data: &[f32]| {
        worklet.process(data, |frame, volume| {
            level.send_replace(volume);
            match frames.try_send(frame) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    dropped.fetch_add(1, Ordering::Relaxed);
                }
                Err(TrySendError::Closed(_)) => {}
            }
        });
    }
}

fn open_input(
    device_name: Option<String>,
    frames: mpsc::Sender<AudioFrame>,
    level: watch::Sender<f32>,
    dropped: Arc<AtomicU64>,
) -> Result<cpal::Stream, CaptureError> {
    let device = get_or_default_input(device_name).map_err(|e| CaptureError::NoDevice(e.to_string()))?;
    let supported = device
        .default_input_config()
        .map_err(|e| CaptureError::Unsupported(e.to_string()))?;
    let config: cpal::StreamConfig = supported.clone().into();
    tracing::debug!(
        "input device: {}, {}ch, {}hz, {:?}",
        device.name().unwrap_or_default(),
        config.channels,
        config.sample_rate.0,
        supported.sample_format()
    );

    let worklet = CaptureWorklet::new(config.sample_rate.0, config.channels as usize)?;
    let err_fn = |e: cpal::StreamError| tracing::error!("input stream error: {}", e);

    let stream = match supported.sample_format() {
        SampleFormat::F32 => {
            let mut sink = frame_sink(worklet, frames, level, dropped);
            device.build_input_stream(&config, move |data: &[f32], _: &cpal::InputCallbackInfo| sink(data), err_fn, None)
        }
        SampleFormat::I16 => {
            let mut sink = frame_sink(worklet, frames, level, dropped);
            device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| sink(&pcm16_to_float(data)),
                err_fn,
                None,
            )
        }
        other => return Err(CaptureError::Unsupported(format!("sample format {:?}", other))),
    };
    stream.map_err(|e| CaptureError::Stream(e.to_string()))
}
