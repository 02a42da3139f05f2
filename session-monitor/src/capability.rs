use async_trait::async_trait;
use tracing::warn;

use proctor_utils::dispatch::DetectedObject;
use proctor_utils::drift::BoundingBox;

/// One camera tick's worth of object classifier output.
#[derive(Clone, Debug)]
pub struct CameraObservation {
    pub objects: Vec<DetectedObject>,
    pub frame_w: f64,
    pub frame_h: f64,
}

/// Object detection over the camera feed. Inference suspends while the
/// model executes; the camera loop skips ticks while a call is in flight.
#[async_trait]
pub trait ObjectClassifier: Send {
    async fn classify(&mut self) -> anyhow::Result<CameraObservation>;

    /// Release the underlying capture device.
    fn release(&mut self) {}
}

/// Dedicated face detection over the camera feed.
#[async_trait]
pub trait FaceLocator: Send {
    async fn locate(&mut self) -> anyhow::Result<Vec<BoundingBox>>;

    fn release(&mut self) {}
}

/// Continuous microphone energy sampling.
#[async_trait]
pub trait MicrophoneSampler: Send {
    /// RMS energy of the current sampling window.
    async fn sample_rms(&mut self) -> anyhow::Result<f64>;

    fn release(&mut self) {}
}

/// Frame capture for evidence screenshots.
#[async_trait]
pub trait FrameGrabber: Send {
    async fn grab_jpeg(&mut self) -> anyhow::Result<Vec<u8>>;
}

/// Face detection capability with graceful degradation. Callers depend on
/// this interface only, never on which variant is active: a missing face
/// locator downgrades to approximate person boxes from the object
/// classifier instead of failing the session.
pub enum FaceSource {
    Precise(Box<dyn FaceLocator>),
    PersonFallback,
    Unavailable,
}

impl FaceSource {
    /// Face boxes for the current tick, or `None` when the face signal is
    /// disabled. A failed locate skips this tick rather than killing the
    /// signal.
    pub async fn face_boxes(&mut self, objects: &[DetectedObject]) -> Option<Vec<BoundingBox>> {
        match self {
            FaceSource::Precise(locator) => match locator.locate().await {
                Ok(boxes) => Some(boxes),
                Err(e) => {
                    warn!(error = ?e, "face locator tick failed");
                    None
                }
            },
            FaceSource::PersonFallback => Some(
                objects
                    .iter()
                    .filter(|object| object.class == "person")
                    .filter_map(|object| object.bbox)
                    .collect(),
            ),
            FaceSource::Unavailable => None,
        }
    }

    pub fn release(&mut self) {
        if let FaceSource::Precise(locator) = self {
            locator.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(x_min: f64) -> DetectedObject {
        DetectedObject {
            class: "person".to_string(),
            score: 0.9,
            bbox: Some(BoundingBox::new(x_min, 100.0, x_min + 200.0, 400.0)),
        }
    }

    #[tokio::test]
    async fn person_fallback_reuses_classifier_output() {
        let mut source = FaceSource::PersonFallback;
        let objects = vec![
            person(100.0),
            DetectedObject {
                class: "cell phone".to_string(),
                score: 0.8,
                bbox: None,
            },
            person(350.0),
        ];
        let boxes = source.face_boxes(&objects).await.unwrap();
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].x_min, 100.0);
    }

    #[tokio::test]
    async fn unavailable_source_disables_the_signal() {
        let mut source = FaceSource::Unavailable;
        assert!(source.face_boxes(&[person(100.0)]).await.is_none());
    }

    struct FailingLocator;

    #[async_trait]
    impl FaceLocator for FailingLocator {
        async fn locate(&mut self) -> anyhow::Result<Vec<BoundingBox>> {
            anyhow::bail!("camera busy")
        }
    }

    #[tokio::test]
    async fn failed_locate_skips_the_tick() {
        let mut source = FaceSource::Precise(Box::new(FailingLocator));
        assert!(source.face_boxes(&[]).await.is_none());
    }
}
