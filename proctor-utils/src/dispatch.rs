use models::ViolationType;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::debounce::ViolationDebouncer;
use crate::drift::{BoundingBox, DriftEvaluator};
use crate::voice::VoiceActivityDetector;

/// Score above which a `cell phone` detection counts.
pub const CELL_PHONE_MIN_SCORE: f64 = 0.5;
/// Score above which any other prohibited class counts.
pub const PROHIBITED_MIN_SCORE: f64 = 0.6;
/// A blurred window only becomes a violation after staying unfocused this long.
pub const WINDOW_BLUR_DWELL_MS: i64 = 3_000;

/// One detection from the object classifier.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DetectedObject {
    pub class: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
}

/// Raw browser-side callbacks, before classification. Serialized form is a
/// tagged object (`{"event": "keyDown", "key": "F12"}`) so an embedder can
/// feed events over a line protocol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum BrowserEvent {
    TabHidden,
    WindowBlur,
    WindowFocus,
    ContextMenu,
    Copy,
    Cut,
    Paste,
    FullscreenExit,
    DevToolsOpened,
    ApplicationSwitch,
    KeyDown {
        key: String,
        #[serde(default)]
        ctrl: bool,
        #[serde(default)]
        meta: bool,
        #[serde(default)]
        shift: bool,
        #[serde(default)]
        alt: bool,
    },
}

/// Tagged union of everything the independent signal producers emit.
/// All producers feed one channel of these; the dispatcher is the sole
/// consumer and the only holder of debouncer state.
#[derive(Clone, Debug)]
pub enum RawSignal {
    /// Object classifier output for one camera tick.
    Objects(Vec<DetectedObject>),
    /// Face locator output (or person-fallback boxes) for one camera tick.
    Faces {
        boxes: Vec<BoundingBox>,
        frame_w: f64,
        frame_h: f64,
    },
    /// One microphone energy sample.
    Audio { rms: f64 },
    Browser(BrowserEvent),
}

/// A qualifying violation, ready for evidence capture and reporting.
#[derive(Clone, Debug, PartialEq)]
pub struct ViolationEvent {
    pub kind: ViolationType,
    pub confidence: Option<f64>,
    pub occurred_at_ms: i64,
}

/// Objects the classifier can actually recognize that have no business in
/// frame during an exam.
pub fn is_prohibited_class(class: &str) -> bool {
    matches!(
        class,
        // Electronic devices
        "cell phone" | "laptop" | "mouse" | "remote" | "keyboard" | "tv" | "microwave"
        | "oven" | "toaster"
        // Books and writing materials
        | "book" | "scissors"
        // Food and drinks, common cheating aids
        | "bottle" | "cup" | "apple" | "banana" | "orange" | "sandwich" | "pizza"
        | "donut" | "cake"
        // Personal items
        | "backpack" | "handbag" | "suitcase" | "umbrella" | "tie"
        // Misc objects seen used for cheating
        | "clock" | "vase" | "teddy bear" | "hair drier" | "toothbrush"
    )
}

/// Maps a raw browser event to the violation it evidences, if any.
/// Focus-tracking events (`WindowBlur`/`WindowFocus`) are stateful and
/// handled by the dispatcher, not here.
pub fn classify_browser_event(event: &BrowserEvent) -> Option<ViolationType> {
    match event {
        BrowserEvent::TabHidden => Some(ViolationType::TabSwitch),
        BrowserEvent::ContextMenu => Some(ViolationType::RightClick),
        BrowserEvent::Copy | BrowserEvent::Cut | BrowserEvent::Paste => {
            Some(ViolationType::CopyPaste)
        }
        BrowserEvent::FullscreenExit => Some(ViolationType::FullScreenExit),
        BrowserEvent::DevToolsOpened => Some(ViolationType::DevTools),
        BrowserEvent::ApplicationSwitch => Some(ViolationType::ApplicationSwitch),
        BrowserEvent::KeyDown {
            key,
            ctrl,
            meta,
            shift,
            alt,
        } => classify_key(key, *ctrl, *meta, *shift, *alt),
        BrowserEvent::WindowBlur | BrowserEvent::WindowFocus => None,
    }
}

fn classify_key(key: &str, ctrl: bool, meta: bool, shift: bool, alt: bool) -> Option<ViolationType> {
    // Screenshot shortcuts take priority over every other meta combo
    if key == "PrintScreen" {
        return Some(ViolationType::PrintScreen);
    }
    if meta && shift && matches!(key, "3" | "4" | "5" | "S") {
        return Some(ViolationType::PrintScreen);
    }
    if ctrl && matches!(key, "c" | "v" | "a" | "x" | "z" | "s") {
        return Some(ViolationType::CopyPaste);
    }
    if meta && !shift
        && matches!(key, "c" | "v" | "a" | "x" | "z" | "s" | "C" | "V" | "A" | "X" | "Z" | "S")
    {
        return Some(ViolationType::CopyPaste);
    }
    if key == "F12" {
        return Some(ViolationType::DevTools);
    }
    if alt && key == "Tab" {
        return Some(ViolationType::ApplicationSwitch);
    }
    // The bare platform key opens a launcher / app switcher
    if matches!(key, "Meta" | "OS") {
        return Some(ViolationType::ApplicationSwitch);
    }
    None
}

/// Routes raw signals through the shared debouncer and the drift/voice
/// state machines. One instance per session; every producer's signals pass
/// through here, which is what bounds the event rate per type.
#[derive(Debug)]
pub struct SignalDispatcher {
    debouncer: ViolationDebouncer,
    drift: DriftEvaluator,
    voice: VoiceActivityDetector,
    blur_since: Option<i64>,
}

impl SignalDispatcher {
    pub fn new() -> Self {
        Self::with_parts(
            ViolationDebouncer::default(),
            DriftEvaluator::default(),
            VoiceActivityDetector::default(),
        )
    }

    pub fn with_parts(
        debouncer: ViolationDebouncer,
        drift: DriftEvaluator,
        voice: VoiceActivityDetector,
    ) -> Self {
        Self {
            debouncer,
            drift,
            voice,
            blur_since: None,
        }
    }

    /// Consumes one raw signal and returns the qualifying events, already
    /// debounced. Signals arrive from concurrent producers; callers must
    /// hold this dispatcher behind a single owner so per-type timestamp
    /// updates stay atomic.
    pub fn dispatch(&mut self, signal: RawSignal, now_ms: i64) -> Vec<ViolationEvent> {
        let mut events = Vec::new();

        match signal {
            RawSignal::Objects(objects) => {
                for object in &objects {
                    if object.class == "cell phone" && object.score > CELL_PHONE_MIN_SCORE {
                        self.push(&mut events, ViolationType::CellPhone, Some(object.score), now_ms);
                    } else if is_prohibited_class(&object.class)
                        && object.score > PROHIBITED_MIN_SCORE
                    {
                        trace!(class = %object.class, score = object.score, "prohibited object");
                        self.push(
                            &mut events,
                            ViolationType::ProhibitedObject,
                            Some(object.score),
                            now_ms,
                        );
                    }
                }
            }
            RawSignal::Faces {
                boxes,
                frame_w,
                frame_h,
            } => {
                if boxes.is_empty() {
                    self.push(&mut events, ViolationType::NoFace, Some(1.0), now_ms);
                    self.drift.observe(None, frame_w, frame_h, now_ms);
                } else {
                    if boxes.len() > 1 {
                        self.push(&mut events, ViolationType::MultipleFace, Some(1.0), now_ms);
                    }
                    if self.drift.observe(Some(&boxes[0]), frame_w, frame_h, now_ms) {
                        self.push(&mut events, ViolationType::AttentionDrift, Some(1.0), now_ms);
                    }
                }
            }
            RawSignal::Audio { rms } => {
                if self.voice.sample(rms, now_ms) {
                    self.push(&mut events, ViolationType::VoiceDetected, Some(1.0), now_ms);
                }
            }
            RawSignal::Browser(event) => match event {
                BrowserEvent::WindowBlur => {
                    self.blur_since.get_or_insert(now_ms);
                }
                BrowserEvent::WindowFocus => {
                    self.blur_since = None;
                }
                other => {
                    if let Some(kind) = classify_browser_event(&other) {
                        self.push(&mut events, kind, None, now_ms);
                    }
                }
            },
        }

        // A blur only counts once the window has stayed unfocused long
        // enough; any later signal tick can trip the check.
        if let Some(since) = self.blur_since {
            if now_ms - since >= WINDOW_BLUR_DWELL_MS {
                self.blur_since = None;
                self.push(&mut events, ViolationType::WindowBlur, None, now_ms);
            }
        }

        events
    }

    fn push(
        &mut self,
        events: &mut Vec<ViolationEvent>,
        kind: ViolationType,
        confidence: Option<f64>,
        now_ms: i64,
    ) {
        if self.debouncer.should_fire(kind, now_ms) {
            events.push(ViolationEvent {
                kind,
                confidence,
                occurred_at_ms: now_ms,
            });
        }
    }
}

impl Default for SignalDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
