use std::sync::Arc;
use std::time::Duration;

use bson::DateTime;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use proctor_utils::dispatch::{RawSignal, SignalDispatcher};

use crate::capability::{FaceSource, MicrophoneSampler, ObjectClassifier};
use crate::evidence::EvidenceCapture;
use crate::report::Reporter;

#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Cadence of classifier inference over the camera feed.
    pub camera_interval: Duration,
    /// Cadence of microphone energy sampling.
    pub voice_interval: Duration,
    /// Coarse resynchronization of unreported state to the server.
    pub autosave_interval: Duration,
    pub channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            camera_interval: Duration::from_millis(500),
            voice_interval: Duration::from_millis(16),
            autosave_interval: Duration::from_secs(15),
            channel_capacity: 64,
        }
    }
}

fn now_ms() -> i64 {
    DateTime::now().timestamp_millis()
}

/// One proctored exam session: independently-scheduled producers feed one
/// signal channel, a single consumer owns the dispatcher (the sole holder
/// of debouncer state), and qualifying events are captured and reported
/// without ever blocking a producer.
pub struct ProctorSession {
    signal_tx: mpsc::Sender<RawSignal>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ProctorSession {
    /// Spawns the detection loops. Any absent provider disables only its
    /// own signal; the session runs with whatever capabilities exist.
    pub fn spawn(
        config: SessionConfig,
        classifier: Option<Box<dyn ObjectClassifier>>,
        mut faces: FaceSource,
        microphone: Option<Box<dyn MicrophoneSampler>>,
        evidence: Option<EvidenceCapture>,
        reporter: Arc<Reporter>,
    ) -> Self {
        let (signal_tx, signal_rx) = mpsc::channel(config.channel_capacity);
        let (shutdown_tx, _) = watch::channel(false);
        let mut tasks = Vec::new();

        match classifier {
            Some(classifier) => {
                tasks.push(tokio::spawn(camera_loop(
                    config.camera_interval,
                    classifier,
                    faces,
                    signal_tx.clone(),
                    shutdown_tx.subscribe(),
                )));
            }
            None => {
                // Face location is driven off the camera cadence, so it
                // cannot run without the classifier either.
                warn!("object classifier unavailable; camera signals disabled");
                faces.release();
            }
        }

        match microphone {
            Some(microphone) => {
                tasks.push(tokio::spawn(voice_loop(
                    config.voice_interval,
                    microphone,
                    signal_tx.clone(),
                    shutdown_tx.subscribe(),
                )));
            }
            None => warn!("microphone unavailable; voice signal disabled"),
        }

        tasks.push(tokio::spawn(consume_loop(
            signal_rx,
            evidence,
            Arc::clone(&reporter),
            shutdown_tx.subscribe(),
        )));
        tasks.push(tokio::spawn(autosave_loop(
            config.autosave_interval,
            reporter,
            shutdown_tx.subscribe(),
        )));

        Self {
            signal_tx,
            shutdown_tx,
            tasks,
        }
    }

    /// Sender for externally-produced signals (browser events). The
    /// channel is the single inbound path into the dispatcher.
    pub fn signal_sender(&self) -> mpsc::Sender<RawSignal> {
        self.signal_tx.clone()
    }

    /// Stops every loop and releases capture devices. Call on every exit
    /// path, including error paths, so camera and microphone handles never
    /// leak past the session.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        drop(self.signal_tx);
        for task in self.tasks {
            if let Err(e) = task.await {
                debug!(error = ?e, "session task join failed");
            }
        }
        info!("proctor session stopped");
    }
}

async fn camera_loop(
    interval: Duration,
    mut classifier: Box<dyn ObjectClassifier>,
    mut faces: FaceSource,
    tx: mpsc::Sender<RawSignal>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    // Inference can outlast a tick; skipped ticks mean a slow model never
    // stacks overlapping invocations.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                let observation = match classifier.classify().await {
                    Ok(observation) => observation,
                    Err(e) => {
                        debug!(error = ?e, "classifier tick failed");
                        continue;
                    }
                };
                let boxes = faces.face_boxes(&observation.objects).await;
                if tx.send(RawSignal::Objects(observation.objects)).await.is_err() {
                    break;
                }
                if let Some(boxes) = boxes {
                    let sent = tx
                        .send(RawSignal::Faces {
                            boxes,
                            frame_w: observation.frame_w,
                            frame_h: observation.frame_h,
                        })
                        .await;
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
    }

    classifier.release();
    faces.release();
}

async fn voice_loop(
    interval: Duration,
    mut microphone: Box<dyn MicrophoneSampler>,
    tx: mpsc::Sender<RawSignal>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                match microphone.sample_rms().await {
                    Ok(rms) => {
                        if tx.send(RawSignal::Audio { rms }).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => debug!(error = ?e, "microphone tick failed"),
                }
            }
        }
    }

    microphone.release();
}

async fn consume_loop(
    mut rx: mpsc::Receiver<RawSignal>,
    mut evidence: Option<EvidenceCapture>,
    reporter: Arc<Reporter>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut dispatcher = SignalDispatcher::new();

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(signal) => {
                    handle_signal(&mut dispatcher, &mut evidence, &reporter, signal).await;
                }
                None => break,
            },
            _ = shutdown.changed() => {
                // Drain what producers already queued, then stop
                while let Ok(signal) = rx.try_recv() {
                    handle_signal(&mut dispatcher, &mut evidence, &reporter, signal).await;
                }
                break;
            }
        }
    }

    // Final resynchronization before the session ends
    let _ = reporter.flush().await;
}

async fn handle_signal(
    dispatcher: &mut SignalDispatcher,
    evidence: &mut Option<EvidenceCapture>,
    reporter: &Reporter,
    signal: RawSignal,
) {
    for event in dispatcher.dispatch(signal, now_ms()) {
        info!(kind = ?event.kind, confidence = ?event.confidence, "violation detected");
        let captured = match evidence.as_mut() {
            Some(capture) => capture.capture(event.kind, event.confidence).await,
            None => None,
        };
        reporter.note_event(event.kind, captured);
        // Best-effort immediate save; failures stay pending for the next
        // autosave and never reach the producers.
        let _ = reporter.flush().await;
    }
}

async fn autosave_loop(
    interval: Duration,
    reporter: Arc<Reporter>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                let _ = reporter.flush().await;
            }
        }
    }
}
