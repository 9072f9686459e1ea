use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::device::get_or_default_output;
use crate::streamer::{FrameClock, PlaybackSink};

/// Segments queued from the scheduler to the output callback.
pub const COMMAND_QUEUE: usize = 256;

/// A segment to mix in at clock time `start`.
#[derive(Debug, Clone)]
pub struct RenderCommand {
    pub start: f64,
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
    /// [`StopSignal::count`] when the segment was scheduled.
    pub generation: u64,
}

/// Stop requests from the scheduler to the output callback.
///
/// Requests are counted rather than queued, so a full command queue can
/// never swallow one.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    count: Arc<AtomicU64>,
    ramp_bits: Arc<AtomicU64>,
}

impl StopSignal {
    pub fn request(&self, ramp_secs: f64) {
        self.ramp_bits.store(ramp_secs.to_bits(), Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Release);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    fn ramp_secs(&self) -> f64 {
        f64::from_bits(self.ramp_bits.load(Ordering::Relaxed))
    }
}

struct Voice {
    start_frame: f64,
    samples: Arc<[f32]>,
    step: f64,
    fade: Option<(u64, u64)>,
}

impl Voice {
    fn end_frame(&self) -> f64 {
        self.start_frame + self.samples.len() as f64 / self.step
    }

    fn sample_at(&self, frame: u64) -> f32 {
        let pos = (frame as f64 - self.start_frame) * self.step;
        if pos < 0.0 {
            return 0.0;
        }
        let idx = pos.floor() as usize;
        let Some(&a) = self.samples.get(idx) else {
            return 0.0;
        };
        // hold the last sample instead of sliding toward silence
        let b = self.samples.get(idx + 1).copied().unwrap_or(a);
        let frac = (pos - idx as f64) as f32;
        let value = a + (b - a) * frac;
        match self.fade {
            None => value,
            Some((from, len)) => {
                let elapsed = frame.saturating_sub(from) as f32;
                let gain = (1.0 - elapsed / len.max(1) as f32).max(0.0);
                value * gain
            }
        }
    }

    fn finished(&self, frame: u64) -> bool {
        let faded = self.fade.is_some_and(|(from, len)| frame >= from + len);
        faded || frame as f64 >= self.end_frame()
    }
}

/// Mixes scheduled segments into interleaved device frames.
///
/// Every rendered frame advances the shared [`FrameClock`], which is the
/// clock the scheduler reads.
pub struct Renderer {
    rate: u32,
    channels: usize,
    clock: FrameClock,
    stops: StopSignal,
    stops_seen: u64,
    voices: Vec<Voice>,
}

impl Renderer {
    pub fn new(rate: u32, channels: usize, clock: FrameClock, stops: StopSignal) -> Self {
        Self {
            rate: rate.max(1),
            channels: channels.max(1),
            clock,
            stops_seen: stops.count(),
            stops,
            voices: Vec::new(),
        }
    }

    /// Applies stop requests made since the last call: started segments fade
    /// out, segments that have not started are voided.
    pub fn sync_stops(&mut self) {
        let count = self.stops.count();
        if count == self.stops_seen {
            return;
        }
        self.stops_seen = count;
        let now = self.clock.frames();
        let ramp = (self.stops.ramp_secs() * self.rate as f64).round() as u64;
        self.voices.retain(|v| v.start_frame <= now as f64);
        for voice in self.voices.iter_mut() {
            voice.fade.get_or_insert((now, ramp));
        }
    }

    /// Queues a segment. Segments scheduled before an applied stop are dropped.
    pub fn apply(&mut self, command: RenderCommand) {
        if command.generation < self.stops_seen {
            return;
        }
        self.voices.push(Voice {
            start_frame: command.start * self.rate as f64,
            samples: command.samples,
            step: command.sample_rate as f64 / self.rate as f64,
            fade: None,
        });
    }

    pub fn active(&self) -> usize {
        self.voices.len()
    }

    pub fn render(&mut self, out: &mut [f32]) {
        let base = self.clock.frames();
        let frames = out.len() / self.channels;
        for (i, frame) in out.chunks_mut(self.channels).enumerate() {
            let t = base + i as u64;
            let mixed: f32 = self.voices.iter().map(|v| v.sample_at(t)).sum();
            frame.fill(mixed.clamp(-1.0, 1.0));
        }
        let end = base + frames as u64;
        self.voices.retain(|v| !v.finished(end));
        self.clock.advance(frames as u64);
    }
}

/// Output device sink. The cpal stream lives on its own thread and pulls
/// commands from a lock-free queue.
pub struct CpalPlayback {
    producer: HeapProd<RenderCommand>,
    stops: StopSignal,
    clock: FrameClock,
    sample_rate: u32,
    stop_tx: std::sync::mpsc::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl CpalPlayback {
    pub fn start(device_name: Option<String>) -> anyhow::Result<Self> {
        let (producer, consumer) = HeapRb::<RenderCommand>::new(COMMAND_QUEUE).split();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
        let stops = StopSignal::default();
        let render_stops = stops.clone();

        // cpal streams are not Send, so the device is opened on the thread that keeps it
        let handle = thread::spawn(move || {
            let stream = match open_output(device_name, consumer, render_stops) {
                Ok((stream, clock)) => {
                    let _ = ready_tx.send(Ok(clock));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let _ = stop_rx.recv();
            drop(stream);
        });

        match ready_rx.recv() {
            Ok(Ok(clock)) => Ok(Self {
                producer,
                stops,
                sample_rate: clock.rate(),
                clock,
                stop_tx,
                handle: Some(handle),
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                anyhow::bail!("playback thread exited before reporting")
            }
        }
    }

    pub fn clock(&self) -> FrameClock {
        self.clock.clone()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

}

impl PlaybackSink for CpalPlayback {
    fn schedule(&mut self, start: f64, samples: Arc<[f32]>, sample_rate: u32) {
        let command = RenderCommand {
            start,
            samples,
            sample_rate,
            generation: self.stops.count(),
        };
        if self.producer.try_push(command).is_err() {
            tracing::debug!("render queue full, dropping segment");
        }
    }

    fn stop(&mut self, ramp_secs: f64) {
        self.stops.request(ramp_secs);
    }
}

impl Drop for CpalPlayback {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn open_output(
    device_name: Option<String>,
    mut commands: HeapCons<RenderCommand>,
    stops: StopSignal,
) -> anyhow::Result<(cpal::Stream, FrameClock)> {
    let device = get_or_default_output(device_name)?;
    let supported = device.default_output_config()?;
    if supported.sample_format() != SampleFormat::F32 {
        anyhow::bail!("unsupported output sample format {:?}", supported.sample_format());
    }
    let config: StreamConfig = supported.into();
    tracing::info!("output stream config: {:?}", &config);

    let clock = FrameClock::new(config.sample_rate.0);
    let mut renderer = Renderer::new(config.sample_rate.0, config.channels as usize, clock.clone(), stops);
    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            renderer.sync_stops();
            while let Some(command) = commands.try_pop() {
                renderer.apply(command);
            }
            renderer.render(data);
        },
        move |err| tracing::error!("output stream error: {}", err),
        None,
    )?;
    stream.play()?;
    Ok((stream, clock))
}
