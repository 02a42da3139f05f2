use std::collections::HashMap;

use models::ViolationType;

pub const DEFAULT_COOLDOWN_MS: i64 = 3_000;

/// Per-type cooldown filter. Every signal source for a session shares one
/// instance, so bursty raw detections collapse to at most one logical event
/// per type per cooldown window.
#[derive(Debug)]
pub struct ViolationDebouncer {
    cooldown_ms: i64,
    last_fired: HashMap<ViolationType, i64>,
}

impl ViolationDebouncer {
    pub fn new(cooldown_ms: i64) -> Self {
        Self {
            cooldown_ms,
            last_fired: HashMap::new(),
        }
    }

    /// Returns true and records `now_ms` iff no event of `kind` fired within
    /// the cooldown window. State is only touched on a firing decision;
    /// suppressed detections never extend the window.
    pub fn should_fire(&mut self, kind: ViolationType, now_ms: i64) -> bool {
        if let Some(last) = self.last_fired.get(&kind) {
            if now_ms - last < self.cooldown_ms {
                return false;
            }
        }
        self.last_fired.insert(kind, now_ms);
        true
    }
}

impl Default for ViolationDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_detection_fires_immediately() {
        let mut debouncer = ViolationDebouncer::default();
        assert!(debouncer.should_fire(ViolationType::TabSwitch, 1_000));
    }

    #[test]
    fn repeat_within_cooldown_is_suppressed() {
        let mut debouncer = ViolationDebouncer::default();
        assert!(debouncer.should_fire(ViolationType::CellPhone, 0));
        assert!(!debouncer.should_fire(ViolationType::CellPhone, 1));
        assert!(!debouncer.should_fire(ViolationType::CellPhone, 2_999));
        assert!(debouncer.should_fire(ViolationType::CellPhone, 3_000));
    }

    #[test]
    fn suppression_does_not_extend_the_window() {
        let mut debouncer = ViolationDebouncer::default();
        assert!(debouncer.should_fire(ViolationType::NoFace, 0));
        // A suppressed burst at 2900 must not push the next firing past 3000
        assert!(!debouncer.should_fire(ViolationType::NoFace, 2_900));
        assert!(debouncer.should_fire(ViolationType::NoFace, 3_000));
    }

    #[test]
    fn types_do_not_share_cooldown_state() {
        let mut debouncer = ViolationDebouncer::default();
        assert!(debouncer.should_fire(ViolationType::TabSwitch, 0));
        assert!(debouncer.should_fire(ViolationType::CopyPaste, 1));
        assert!(!debouncer.should_fire(ViolationType::TabSwitch, 2));
        assert!(!debouncer.should_fire(ViolationType::CopyPaste, 2));
    }

    #[test]
    fn firing_updates_the_window_start() {
        let mut debouncer = ViolationDebouncer::new(1_000);
        assert!(debouncer.should_fire(ViolationType::VoiceDetected, 0));
        assert!(debouncer.should_fire(ViolationType::VoiceDetected, 1_500));
        // Window restarts from 1500, not from 0
        assert!(!debouncer.should_fire(ViolationType::VoiceDetected, 2_400));
        assert!(debouncer.should_fire(ViolationType::VoiceDetected, 2_500));
    }
}
