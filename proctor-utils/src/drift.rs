use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Axis-aligned box in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl BoundingBox {
    pub fn new(x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Extents clamp to at least one pixel so degenerate detector output
    /// cannot produce a zero-area or zero-width box.
    pub fn width(&self) -> f64 {
        (self.x_max - self.x_min).max(1.0)
    }

    pub fn height(&self) -> f64 {
        (self.y_max - self.y_min).max(1.0)
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.x_min + self.x_max) / 2.0,
            (self.y_min + self.y_max) / 2.0,
        )
    }
}

/// Geometric thresholds for the drift classifier. Tunable, but
/// `validate` enforces the ordering the classifier depends on.
#[derive(Clone, Debug)]
pub struct DriftConfig {
    /// Normalized center-x window the face must occupy to count as centered.
    pub center_x: (f64, f64),
    pub center_y: (f64, f64),
    /// Normalized bands beyond which the face counts as near an edge.
    pub edge_x: (f64, f64),
    pub edge_y: (f64, f64),
    /// Minimum box-area fraction of the frame; smaller reads as leaned away.
    pub min_area_frac: f64,
    /// Width/height below this suggests a turned (yawed) face.
    pub max_sideways_aspect: f64,
    /// Dwell before emitting when an edge/size/aspect signal holds.
    pub dwell_fast_ms: i64,
    /// Dwell for a face that is merely off-center but otherwise normal.
    pub dwell_slow_ms: i64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            center_x: (0.28, 0.72),
            center_y: (0.22, 0.78),
            edge_x: (0.25, 0.75),
            edge_y: (0.20, 0.80),
            min_area_frac: 0.035,
            max_sideways_aspect: 0.7,
            dwell_fast_ms: 400,
            dwell_slow_ms: 800,
        }
    }
}

impl DriftConfig {
    /// Threshold values may be tuned, but their ordering must hold:
    /// edge bands sit outside the center window, windows are non-empty,
    /// and the fast dwell never exceeds the slow one.
    pub fn validate(&self) -> Result<(), Error> {
        for (name, (lo, hi)) in [
            ("center_x", self.center_x),
            ("center_y", self.center_y),
            ("edge_x", self.edge_x),
            ("edge_y", self.edge_y),
        ] {
            if !(0.0..=1.0).contains(&lo) || !(0.0..=1.0).contains(&hi) || lo >= hi {
                return Err(Error::InvalidConfig(format!(
                    "{name} must be an ordered pair within [0, 1], got ({lo}, {hi})"
                )));
            }
        }
        if self.edge_x.0 > self.center_x.0 || self.edge_x.1 < self.center_x.1 {
            return Err(Error::InvalidConfig(
                "edge_x band must enclose center_x window".into(),
            ));
        }
        if self.edge_y.0 > self.center_y.0 || self.edge_y.1 < self.center_y.1 {
            return Err(Error::InvalidConfig(
                "edge_y band must enclose center_y window".into(),
            ));
        }
        if self.min_area_frac <= 0.0 || self.min_area_frac >= 1.0 {
            return Err(Error::InvalidConfig(format!(
                "min_area_frac must be in (0, 1), got {}",
                self.min_area_frac
            )));
        }
        if self.max_sideways_aspect <= 0.0 {
            return Err(Error::InvalidConfig(
                "max_sideways_aspect must be positive".into(),
            ));
        }
        if self.dwell_fast_ms <= 0 || self.dwell_fast_ms > self.dwell_slow_ms {
            return Err(Error::InvalidConfig(format!(
                "dwell ordering violated: fast {} ms, slow {} ms",
                self.dwell_fast_ms, self.dwell_slow_ms
            )));
        }
        Ok(())
    }
}

/// Per-tick geometry classification of a face (or fallback person) box.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DriftSignals {
    pub in_center: bool,
    pub near_edge: bool,
    pub too_small: bool,
    pub sideways: bool,
}

impl DriftSignals {
    pub fn drifting(&self) -> bool {
        !self.in_center || self.near_edge || self.too_small || self.sideways
    }

    /// Edge/size/aspect signals get the shorter dwell; a face that is only
    /// off-center gets a longer grace period.
    pub fn fast_dwell(&self) -> bool {
        self.near_edge || self.too_small || self.sideways
    }
}

pub fn evaluate(bbox: &BoundingBox, frame_w: f64, frame_h: f64, config: &DriftConfig) -> DriftSignals {
    let (cx, cy) = bbox.center();
    let nx = cx / frame_w;
    let ny = cy / frame_h;
    let area_frac = (bbox.width() * bbox.height()) / (frame_w * frame_h);
    let aspect = bbox.width() / bbox.height();

    DriftSignals {
        in_center: nx > config.center_x.0
            && nx < config.center_x.1
            && ny > config.center_y.0
            && ny < config.center_y.1,
        near_edge: nx < config.edge_x.0
            || nx > config.edge_x.1
            || ny < config.edge_y.0
            || ny > config.edge_y.1,
        too_small: area_frac < config.min_area_frac,
        sideways: aspect < config.max_sideways_aspect,
    }
}

/// Dwell-timer state machine over the per-tick geometry classification.
/// Emits one `attentionDrift` per sustained drift episode, then resets so a
/// continuous drift can re-fire once the session cooldown allows.
#[derive(Debug)]
pub struct DriftEvaluator {
    config: DriftConfig,
    drift_since: Option<i64>,
}

impl DriftEvaluator {
    pub fn new(config: DriftConfig) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            config,
            drift_since: None,
        })
    }

    /// Feed one tick's primary box. `None` (no face or person in frame)
    /// resets to centered; absence is counted elsewhere as `noFace`, never
    /// as drift. Returns true when a drift event should be emitted.
    pub fn observe(
        &mut self,
        bbox: Option<&BoundingBox>,
        frame_w: f64,
        frame_h: f64,
        now_ms: i64,
    ) -> bool {
        let Some(bbox) = bbox else {
            self.drift_since = None;
            return false;
        };

        let signals = evaluate(bbox, frame_w, frame_h, &self.config);
        if !signals.drifting() {
            self.drift_since = None;
            return false;
        }

        let since = *self.drift_since.get_or_insert(now_ms);
        let dwell = if signals.fast_dwell() {
            self.config.dwell_fast_ms
        } else {
            self.config.dwell_slow_ms
        };
        if now_ms - since >= dwell {
            self.drift_since = None;
            return true;
        }
        false
    }

    pub fn is_centered(&self) -> bool {
        self.drift_since.is_none()
    }
}

impl Default for DriftEvaluator {
    fn default() -> Self {
        Self {
            config: DriftConfig::default(),
            drift_since: None,
        }
    }
}
