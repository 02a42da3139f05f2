/// Tunables for the voice activity detector.
#[derive(Clone, Debug)]
pub struct VoiceConfig {
    /// Exponential smoothing factor for the ambient baseline.
    pub smoothing: f64,
    /// Multiple of the baseline a sample must exceed to count as active.
    pub threshold_factor: f64,
    /// Minimum sensitivity floor for silent rooms.
    pub floor: f64,
    /// Accumulated active time required before firing.
    pub fire_after_ms: f64,
    /// Inactive ticks decay the accumulator at this fraction of dt.
    pub decay_factor: f64,
    /// Clamp on per-tick elapsed time; guards against a stalled sampler.
    pub max_dt_ms: f64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            smoothing: 0.98,
            threshold_factor: 1.2,
            floor: 0.006,
            fire_after_ms: 800.0,
            decay_factor: 0.6,
            max_dt_ms: 100.0,
        }
    }
}

/// Adaptive-baseline energy detector with a leaky integrator. A fixed
/// absolute threshold is unreliable across microphones and rooms; the
/// baseline self-calibrates to ambient noise, and the integrator requires
/// sustained energy before firing, filtering out coughs and clicks.
#[derive(Debug)]
pub struct VoiceActivityDetector {
    config: VoiceConfig,
    baseline: Option<f64>,
    active_accum_ms: f64,
    last_sample_ms: Option<i64>,
    active: bool,
}

impl VoiceActivityDetector {
    pub fn new(config: VoiceConfig) -> Self {
        Self {
            config,
            baseline: None,
            active_accum_ms: 0.0,
            last_sample_ms: None,
            active: false,
        }
    }

    /// Feed one RMS energy sample. Returns true when sustained speech has
    /// accumulated past the firing threshold; the accumulator then resets
    /// so a later sustained period fires again.
    pub fn sample(&mut self, rms: f64, now_ms: i64) -> bool {
        let baseline = match self.baseline {
            Some(b) => {
                let b = self.config.smoothing * b + (1.0 - self.config.smoothing) * rms;
                self.baseline = Some(b);
                b
            }
            None => {
                self.baseline = Some(rms);
                rms
            }
        };

        let threshold = (baseline * self.config.threshold_factor).max(self.config.floor);
        let dt = match self.last_sample_ms {
            Some(last) => ((now_ms - last) as f64).clamp(0.0, self.config.max_dt_ms),
            None => 0.0,
        };
        self.last_sample_ms = Some(now_ms);

        if rms > threshold {
            self.active = true;
            self.active_accum_ms += dt;
        } else {
            self.active = false;
            self.active_accum_ms = (self.active_accum_ms - self.config.decay_factor * dt).max(0.0);
        }

        if self.active_accum_ms > self.config.fire_after_ms {
            self.active_accum_ms = 0.0;
            return true;
        }
        false
    }

    /// Whether the most recent sample exceeded the adaptive threshold.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Accumulated active time, for HUD-style introspection.
    pub fn level_ms(&self) -> f64 {
        self.active_accum_ms
    }
}

impl Default for VoiceActivityDetector {
    fn default() -> Self {
        Self::new(VoiceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUIET: f64 = 0.001;
    const LOUD: f64 = 0.1;
    const TICK_MS: i64 = 20;

    /// Feeds `n` samples at a 20 ms cadence starting from `start_ms`,
    /// returning how many fired.
    fn run(detector: &mut VoiceActivityDetector, rms: f64, start_ms: i64, n: usize) -> usize {
        (0..n)
            .filter(|i| detector.sample(rms, start_ms + *i as i64 * TICK_MS))
            .count()
    }

    #[test]
    fn sustained_speech_fires_exactly_once() {
        let mut detector = VoiceActivityDetector::default();
        // Calibrate the baseline on silence first
        assert_eq!(run(&mut detector, QUIET, 0, 10), 0);
        // 800 ms must accumulate: the 41st loud tick reaches 820 ms and fires
        let fired = run(&mut detector, LOUD, 200, 41);
        assert_eq!(fired, 1);
        assert_eq!(detector.level_ms(), 0.0);
    }

    #[test]
    fn a_second_sustained_period_fires_again() {
        let mut detector = VoiceActivityDetector::default();
        run(&mut detector, QUIET, 0, 10);
        assert_eq!(run(&mut detector, LOUD, 200, 45), 1);
        // Quiet gap, then another sustained stretch
        run(&mut detector, QUIET, 1_100, 10);
        assert_eq!(run(&mut detector, LOUD, 1_300, 45), 1);
    }

    #[test]
    fn single_loud_tick_does_not_fire() {
        let mut detector = VoiceActivityDetector::default();
        run(&mut detector, QUIET, 0, 10);
        assert!(!detector.sample(LOUD, 200));
        assert_eq!(run(&mut detector, QUIET, 220, 20), 0);
    }

    #[test]
    fn brief_silence_decays_rather_than_resets() {
        let mut detector = VoiceActivityDetector::default();
        run(&mut detector, QUIET, 0, 10);
        // 600 ms of speech, not yet enough to fire
        assert_eq!(run(&mut detector, LOUD, 200, 31), 0);
        let before = detector.level_ms();
        assert!(before >= 600.0);
        // Two quiet ticks shave 0.6 * dt each, they do not zero the integral
        assert!(!detector.sample(QUIET, 840));
        assert!(!detector.sample(QUIET, 860));
        assert!(detector.level_ms() > before - 3.0 * 20.0);
        assert!(detector.level_ms() < before);
    }

    #[test]
    fn baseline_adapts_to_a_noisy_room() {
        let mut detector = VoiceActivityDetector::default();
        // Constant ambient hum becomes the baseline; it never reads as voice
        let fired = run(&mut detector, 0.05, 0, 200);
        assert_eq!(fired, 0);
        assert!(!detector.is_active());
    }

    #[test]
    fn floor_guards_silent_rooms() {
        let mut detector = VoiceActivityDetector::default();
        // Near-zero baseline: threshold is the floor, not 1.2 * ~0
        run(&mut detector, 0.0001, 0, 10);
        assert!(!detector.sample(0.004, 200));
        assert!(!detector.is_active());
        assert!(!detector.sample(0.05, 220));
        assert!(detector.is_active());
    }

    #[test]
    fn first_sample_seeds_the_baseline() {
        let mut detector = VoiceActivityDetector::default();
        // First sample initializes baseline to itself: dt is 0, nothing fires
        assert!(!detector.sample(LOUD, 0));
        assert_eq!(detector.level_ms(), 0.0);
    }
}
