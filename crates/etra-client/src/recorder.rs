use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backend::Prompt;
use crate::error::CaptureError;

pub const MIC_UNAVAILABLE: &str = "Cannot access the microphone";

/// A microphone. `start` acquires the device, `stop` releases it and hands
/// back everything captured in between.
#[async_trait]
pub trait AudioCapture: Send + Sync {
    async fn start(&self) -> Result<(), CaptureError>;
    /// Returns `(mime, bytes)`.
    async fn stop(&self) -> Result<(String, Vec<u8>), CaptureError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub duration_secs: u32,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Voice recorder with a once-per-second duration counter.
///
/// The counter task is aborted on `stop` and on drop, so it never outlives
/// the recorder.
pub struct VoiceRecorder {
    capture: Arc<dyn AudioCapture>,
    prompt: Arc<dyn Prompt>,
    elapsed: Arc<AtomicU32>,
    timer: Option<JoinHandle<()>>,
    tick: Duration,
}

impl VoiceRecorder {
    pub fn new(capture: Arc<dyn AudioCapture>, prompt: Arc<dyn Prompt>) -> Self {
        Self {
            capture,
            prompt,
            elapsed: Arc::new(AtomicU32::new(0)),
            timer: None,
            tick: Duration::from_secs(1),
        }
    }

    /// Override the counter period.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn is_recording(&self) -> bool {
        self.timer.is_some()
    }

    /// Seconds counted since `start`.
    pub fn elapsed_secs(&self) -> u32 {
        self.elapsed.load(Ordering::Relaxed)
    }

    pub async fn start(&mut self) -> Result<(), CaptureError> {
        if self.is_recording() {
            return Ok(());
        }

        if let Err(e) = self.capture.start().await {
            warn!("Microphone start failed: {}", e);
            self.prompt.alert(MIC_UNAVAILABLE);
            self.elapsed.store(0, Ordering::Relaxed);
            return Err(e);
        }

        self.elapsed.store(0, Ordering::Relaxed);
        let elapsed = self.elapsed.clone();
        let tick = self.tick;
        self.timer = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            // First tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                elapsed.fetch_add(1, Ordering::Relaxed);
            }
        }));
        debug!("Recording started");
        Ok(())
    }

    /// Stop and return the clip. `None` when nothing was recording.
    pub async fn stop(&mut self) -> Result<Option<AudioClip>, CaptureError> {
        let Some(timer) = self.timer.take() else {
            return Ok(None);
        };
        timer.abort();
        let duration_secs = self.elapsed.swap(0, Ordering::Relaxed);

        let (mime, bytes) = self.capture.stop().await?;
        debug!("Recording stopped after {}s ({} bytes)", duration_secs, bytes.len());
        Ok(Some(AudioClip {
            duration_secs,
            mime,
            bytes,
        }))
    }
}

impl Drop for VoiceRecorder {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::AtomicBool;

    use super::*;

    struct FakeMic {
        available: bool,
        live: AtomicBool,
    }

    #[async_trait]
    impl AudioCapture for FakeMic {
        async fn start(&self) -> Result<(), CaptureError> {
            if !self.available {
                return Err(CaptureError::Unavailable("denied".into()));
            }
            self.live.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&self) -> Result<(String, Vec<u8>), CaptureError> {
            self.live.store(false, Ordering::SeqCst);
            Ok(("audio/webm".into(), vec![1, 2, 3]))
        }
    }

    #[derive(Default)]
    struct Alerts(Mutex<Vec<String>>);

    #[async_trait]
    impl Prompt for Alerts {
        async fn confirm(&self, _question: &str) -> bool {
            true
        }

        fn alert(&self, message: &str) {
            self.0.lock().unwrap().push(message.into());
        }
    }

    fn mic(available: bool) -> Arc<FakeMic> {
        Arc::new(FakeMic {
            available,
            live: AtomicBool::new(false),
        })
    }

    #[tokio::test]
    async fn counts_while_recording_and_releases_the_mic() {
        let mic = mic(true);
        let alerts = Arc::new(Alerts::default());
        let mut recorder = VoiceRecorder::new(mic.clone(), alerts.clone()).with_tick(Duration::from_millis(20));

        recorder.start().await.unwrap();
        assert!(recorder.is_recording());
        tokio::time::sleep(Duration::from_millis(110)).await;
        assert!(recorder.elapsed_secs() >= 2);

        let clip = recorder.stop().await.unwrap().unwrap();
        assert!(clip.duration_secs >= 2);
        assert_eq!(clip.mime, "audio/webm");
        assert!(!mic.live.load(Ordering::SeqCst));
        assert!(!recorder.is_recording());
        assert_eq!(recorder.elapsed_secs(), 0);

        // Counter is gone once stopped.
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(recorder.elapsed_secs(), 0);
        assert!(recorder.stop().await.unwrap().is_none());
        assert!(alerts.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn mic_failure_alerts_and_stays_idle() {
        let alerts = Arc::new(Alerts::default());
        let mut recorder = VoiceRecorder::new(mic(false), alerts.clone());

        assert!(recorder.start().await.is_err());
        assert!(!recorder.is_recording());
        assert_eq!(*alerts.0.lock().unwrap(), [MIC_UNAVAILABLE]);
    }
}
