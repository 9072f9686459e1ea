use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::audio::{bytes_to_float, split_segments, OUTPUT_SAMPLE_RATE};

pub const MAX_SEGMENT_SAMPLES: usize = 7680;
pub const INITIAL_BUFFER_SECS: f64 = 0.1;
pub const SCHEDULE_AHEAD_SECS: f64 = 0.2;
pub const STOP_RAMP_SECS: f64 = 0.1;
pub const PUMP_INTERVAL: Duration = Duration::from_millis(25);

/// Monotonic playback time in seconds.
pub trait AudioClock: Send {
    fn now(&self) -> f64;
}

/// Clock driven by the number of frames the output device has rendered.
#[derive(Debug, Clone)]
pub struct FrameClock {
    frames: Arc<AtomicU64>,
    rate: u32,
}

impl FrameClock {
    pub fn new(rate: u32) -> Self {
        Self {
            frames: Arc::new(AtomicU64::new(0)),
            rate: rate.max(1),
        }
    }

    pub fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::Relaxed);
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }
}

impl AudioClock for FrameClock {
    fn now(&self) -> f64 {
        self.frames() as f64 / self.rate as f64
    }
}

/// Where scheduled segments end up.
pub trait PlaybackSink: Send {
    /// Plays `samples` starting at clock time `start`.
    fn schedule(&mut self, start: f64, samples: Arc<[f32]>, sample_rate: u32);
    /// Fades out everything playing over `ramp_secs` and voids what has not started.
    fn stop(&mut self, ramp_secs: f64);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamerEvent {
    Complete,
}

/// Gapless scheduler for inbound PCM16 audio.
///
/// Segments are placed back to back on a cursor that never moves behind the
/// clock, so consecutive segments cannot overlap. Only audio due within
/// [`SCHEDULE_AHEAD_SECS`] is handed to the sink, which keeps `stop` cheap.
pub struct AudioStreamer<C, S> {
    clock: C,
    sink: S,
    sample_rate: u32,
    queue: VecDeque<Arc<[f32]>>,
    cursor: f64,
    playing: bool,
    completes_at: Option<f64>,
    taps: Vec<mpsc::Sender<Arc<[f32]>>>,
    events: broadcast::Sender<StreamerEvent>,
}

impl<C: AudioClock, S: PlaybackSink> AudioStreamer<C, S> {
    pub fn new(clock: C, sink: S) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            clock,
            sink,
            sample_rate: OUTPUT_SAMPLE_RATE,
            queue: VecDeque::new(),
            cursor: 0.0,
            playing: false,
            completes_at: None,
            taps: Vec::new(),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamerEvent> {
        self.events.subscribe()
    }

    /// Returns a receiver that sees every scheduled segment. A slow reader misses segments.
    pub fn add_tap(&mut self, capacity: usize) -> mpsc::Receiver<Arc<[f32]>> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.taps.push(tx);
        rx
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn add_pcm16(&mut self, bytes: &[u8]) {
        let samples = bytes_to_float(bytes);
        if samples.is_empty() {
            return;
        }
        for segment in split_segments(&samples, MAX_SEGMENT_SAMPLES) {
            self.queue.push_back(Arc::from(segment));
        }
        if !self.playing {
            self.playing = true;
            self.cursor = self.clock.now() + INITIAL_BUFFER_SECS;
        }
        self.completes_at = None;
        self.pump();
    }

    /// Schedules whatever is due and fires completion once the stream has drained.
    pub fn pump(&mut self) {
        let now = self.clock.now();
        while self.cursor < now + SCHEDULE_AHEAD_SECS {
            let Some(segment) = self.queue.pop_front() else {
                break;
            };
            let start = self.cursor.max(now);
            self.sink.schedule(start, Arc::clone(&segment), self.sample_rate);
            self.feed_taps(&segment);
            self.cursor = start + segment.len() as f64 / self.sample_rate as f64;
        }

        if !self.playing || !self.queue.is_empty() {
            return;
        }
        match self.completes_at {
            None => self.completes_at = Some(self.cursor),
            Some(end) if now >= end => {
                self.playing = false;
                self.completes_at = None;
                let _ = self.events.send(StreamerEvent::Complete);
                tracing::debug!("playback drained");
            }
            Some(_) => {}
        }
    }

    pub fn stop(&mut self) {
        self.queue.clear();
        self.cursor = self.clock.now();
        self.playing = false;
        self.completes_at = None;
        self.sink.stop(STOP_RAMP_SECS);
    }

    fn feed_taps(&mut self, segment: &Arc<[f32]>) {
        self.taps.retain(|tap| match tap.try_send(Arc::clone(segment)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }
}

#[derive(Debug)]
pub enum PlayerCommand {
    Pcm16(Vec<u8>),
    Stop,
}

/// Cloneable front door to a streamer running in [`spawn_player`].
#[derive(Debug, Clone)]
pub struct PlayerHandle {
    tx: mpsc::UnboundedSender<PlayerCommand>,
}

impl PlayerHandle {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PlayerCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn add_pcm16(&self, bytes: Vec<u8>) {
        if self.tx.send(PlayerCommand::Pcm16(bytes)).is_err() {
            tracing::debug!("player task is gone, dropping audio");
        }
    }

    pub fn stop(&self) {
        let _ = self.tx.send(PlayerCommand::Stop);
    }
}

/// Runs `streamer` until every handle is dropped.
pub fn spawn_player<C, S>(mut streamer: AudioStreamer<C, S>) -> (PlayerHandle, JoinHandle<()>)
where
    C: AudioClock + 'static,
    S: PlaybackSink + 'static,
{
    let (handle, mut rx) = PlayerHandle::channel();
    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(PUMP_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(PlayerCommand::Pcm16(bytes)) => streamer.add_pcm16(&bytes),
                    Some(PlayerCommand::Stop) => streamer.stop(),
                    None => break,
                },
                _ = interval.tick() => streamer.pump(),
            }
        }
    });
    (handle, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Log {
        scheduled: Vec<(f64, usize)>,
        stops: Vec<f64>,
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        log: Arc<Mutex<Log>>,
    }

    impl PlaybackSink for RecordingSink {
        fn schedule(&mut self, start: f64, samples: Arc<[f32]>, _sample_rate: u32) {
            self.log.lock().unwrap().scheduled.push((start, samples.len()));
        }

        fn stop(&mut self, ramp_secs: f64) {
            self.log.lock().unwrap().stops.push(ramp_secs);
        }
    }

    fn pcm(samples: usize) -> Vec<u8> {
        vec![0u8; samples * 2]
    }

    fn streamer() -> (AudioStreamer<FrameClock, RecordingSink>, FrameClock, RecordingSink) {
        let clock = FrameClock::new(OUTPUT_SAMPLE_RATE);
        let sink = RecordingSink::default();
        (AudioStreamer::new(clock.clone(), sink.clone()), clock, sink)
    }

    fn assert_no_overlap(scheduled: &[(f64, usize)]) {
        for pair in scheduled.windows(2) {
            let (start, len) = pair[0];
            let end = start + len as f64 / OUTPUT_SAMPLE_RATE as f64;
            assert!(pair[1].0 >= end - 1e-9, "{:?} overlaps {:?}", pair[1], pair[0]);
        }
    }

    #[test]
    fn test_first_segment_waits_for_initial_buffer() {
        let (mut streamer, _clock, sink) = streamer();

        streamer.add_pcm16(&pcm(2400));

        let log = sink.log.lock().unwrap();
        assert_eq!(log.scheduled.len(), 1);
        assert!((log.scheduled[0].0 - INITIAL_BUFFER_SECS).abs() < 1e-9);
    }

    #[test]
    fn test_long_chunks_are_split() {
        let (mut streamer, clock, sink) = streamer();

        streamer.add_pcm16(&pcm(MAX_SEGMENT_SAMPLES * 2 + 10));
        for _ in 0..10 {
            clock.advance(2400);
            streamer.pump();
        }

        let lens: Vec<_> = sink.log.lock().unwrap().scheduled.iter().map(|s| s.1).collect();
        assert_eq!(lens, vec![MAX_SEGMENT_SAMPLES, MAX_SEGMENT_SAMPLES, 10]);
    }

    #[test]
    fn test_segments_never_overlap_under_irregular_arrival() {
        let (mut streamer, clock, sink) = streamer();

        for (i, size) in [1200usize, 4800, 300, 7680, 9000, 50, 2400].iter().enumerate() {
            streamer.add_pcm16(&pcm(*size));
            clock.advance((i as u64 * 977) % 3000);
            streamer.pump();
        }
        for _ in 0..100 {
            clock.advance(600);
            streamer.pump();
        }

        let log = sink.log.lock().unwrap();
        assert_eq!(log.scheduled.iter().map(|s| s.1).sum::<usize>(), 25430);
        assert_no_overlap(&log.scheduled);
    }

    #[test]
    fn test_back_to_back_segments_are_gapless() {
        let (mut streamer, clock, sink) = streamer();

        streamer.add_pcm16(&pcm(2400));
        streamer.add_pcm16(&pcm(2400));
        streamer.add_pcm16(&pcm(2400));
        for _ in 0..10 {
            clock.advance(1200);
            streamer.pump();
        }

        let log = sink.log.lock().unwrap();
        assert_eq!(log.scheduled.len(), 3);
        for pair in log.scheduled.windows(2) {
            let end = pair[0].0 + pair[0].1 as f64 / OUTPUT_SAMPLE_RATE as f64;
            assert!((pair[1].0 - end).abs() < 1e-9);
        }
    }

    #[test]
    fn test_stop_clears_queue_and_ramps_sink() {
        let (mut streamer, clock, sink) = streamer();

        streamer.add_pcm16(&pcm(OUTPUT_SAMPLE_RATE as usize * 2));
        assert!(streamer.queued() > 0);
        let scheduled_before = sink.log.lock().unwrap().scheduled.len();

        streamer.stop();
        clock.advance(OUTPUT_SAMPLE_RATE as u64);
        streamer.pump();

        let log = sink.log.lock().unwrap();
        assert_eq!(streamer.queued(), 0);
        assert_eq!(log.stops, vec![STOP_RAMP_SECS]);
        assert_eq!(log.scheduled.len(), scheduled_before);
        assert!(!streamer.is_playing());
    }

    #[test]
    fn test_audio_after_stop_restarts_from_now() {
        let (mut streamer, clock, sink) = streamer();

        streamer.add_pcm16(&pcm(OUTPUT_SAMPLE_RATE as usize));
        clock.advance(2400);
        streamer.stop();
        streamer.add_pcm16(&pcm(240));

        let log = sink.log.lock().unwrap();
        let (start, _) = *log.scheduled.last().unwrap();
        assert!((start - (0.1 + INITIAL_BUFFER_SECS)).abs() < 1e-9);
    }

    #[test]
    fn test_completion_fires_once_per_drained_stream() {
        let (mut streamer, clock, _sink) = streamer();
        let mut events = streamer.subscribe();

        streamer.add_pcm16(&pcm(2400));
        for _ in 0..20 {
            clock.advance(1200);
            streamer.pump();
        }
        assert_eq!(events.try_recv().unwrap(), StreamerEvent::Complete);
        assert!(events.try_recv().is_err());

        streamer.add_pcm16(&pcm(2400));
        for _ in 0..20 {
            clock.advance(1200);
            streamer.pump();
        }
        assert_eq!(events.try_recv().unwrap(), StreamerEvent::Complete);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_taps_do_not_block_scheduling() {
        let (mut streamer, clock, sink) = streamer();
        let mut tap = streamer.add_tap(1);

        streamer.add_pcm16(&pcm(MAX_SEGMENT_SAMPLES * 3));
        for _ in 0..10 {
            clock.advance(2400);
            streamer.pump();
        }

        assert_eq!(sink.log.lock().unwrap().scheduled.len(), 3);
        assert!(tap.try_recv().is_ok());
        assert!(tap.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_player_applies_stop_before_later_audio() {
        let (streamer, _clock, sink) = streamer();
        let (handle, task) = spawn_player(streamer);

        handle.add_pcm16(pcm(2400));
        handle.stop();
        handle.add_pcm16(pcm(240));
        drop(handle);
        task.await.unwrap();

        let log = sink.log.lock().unwrap();
        assert_eq!(log.stops.len(), 1);
        assert_eq!(log.scheduled.iter().map(|s| s.1).collect::<Vec<_>>(), vec![2400, 240]);
    }
}
