//! Terminal level meter for the microphone and the model's voice.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use live_voice_utils::audio::rms;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

const WIDTH: usize = 20;
const REFRESH: Duration = Duration::from_millis(150);
/// RMS of normal speech sits well below 1.0, so levels are stretched.
const GAIN: f32 = 4.0;

pub fn bar(level: f32, width: usize) -> String {
    let filled = ((level * GAIN).clamp(0.0, 1.0) * width as f32).round() as usize;
    format!("[{}{}]", "#".repeat(filled), " ".repeat(width - filled))
}

/// RMS of the newest segment waiting in `tap`, `None` when nothing arrived.
fn newest_level(tap: &mut mpsc::Receiver<Arc<[f32]>>) -> Option<f32> {
    let mut newest = None;
    while let Ok(segment) = tap.try_recv() {
        newest = Some(rms(&segment));
    }
    newest
}

/// Redraws one status line on stderr until aborted.
pub fn spawn_meter(input: watch::Receiver<f32>, mut output: mpsc::Receiver<Arc<[f32]>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(REFRESH);
        let mut speaker = 0.0;
        loop {
            interval.tick().await;
            speaker = newest_level(&mut output).unwrap_or(speaker * 0.5);
            let mic = *input.borrow();
            let mut stderr = std::io::stderr();
            let _ = write!(stderr, "\rmic {} model {}", bar(mic, WIDTH), bar(speaker, WIDTH));
            let _ = stderr.flush();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_scales_and_clamps() {
        assert_eq!(bar(0.0, 4), "[    ]");
        assert_eq!(bar(0.125, 4), "[##  ]");
        assert_eq!(bar(3.0, 4), "[####]");
        assert_eq!(bar(-1.0, 4), "[    ]");
    }

    #[tokio::test]
    async fn test_newest_level_takes_last_segment() {
        let (tx, mut rx) = mpsc::channel(4);
        assert_eq!(newest_level(&mut rx), None);

        tx.send(Arc::from(vec![0.1_f32; 4])).await.unwrap();
        tx.send(Arc::from(vec![0.5_f32, -0.5])).await.unwrap();

        assert_eq!(newest_level(&mut rx), Some(0.5));
        assert_eq!(newest_level(&mut rx), None);
    }
}
