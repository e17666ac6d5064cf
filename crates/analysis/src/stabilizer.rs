//! Temporal stabilizer: votes over a short classification history to keep
//! the output from flickering between types.
//!
//! Switching vehicle -> walking is deliberately cheap and walking ->
//! vehicle deliberately expensive; a missed trip end costs less than a
//! phantom trip.

use std::collections::VecDeque;

use model::{ClassificationResult, MovementType};

pub const DEFAULT_HISTORY_LENGTH: usize = 5;

const CONFIDENCE_EXPONENT: f64 = 1.5;
const CURRENT_MULTIPLIER: f64 = 2.5;

const WALKING_PROTECTION_BASE: f64 = 0.7;
const WALKING_PROTECTION_SLOPE: f64 = 0.1;
const WALKING_SWITCH_CONFIDENCE: f64 = 0.6;

const OSCILLATION_MAX_CONFIDENCE: f64 = 0.85;
const OSCILLATION_REVERT_CONFIDENCE: f64 = 0.7;

const OVERRIDE_DOMINANCE: f64 = 0.6;
const HEAVY_COMPETITION: f64 = 0.5;
const BLEND_HEAVY: f64 = 0.4;
const BLEND_LIGHT: f64 = 0.7;
const PROTECTED_CONFIDENCE: f64 = 0.75;
const PROTECTED_DOMINANCE_BASE: f64 = 0.75;
const PROTECTED_DOMINANCE_SLOPE: f64 = 0.1;
const VEHICLE_TAKEOVER_DOMINANCE: f64 = 0.8;

const WALKING_EVIDENCE_RATIO: f64 = 0.35;
const WALKING_EVIDENCE_DAMPING: f64 = 0.5;

const CONSISTENT_SHARE: f64 = 0.7;
const CONSISTENCY_REWARD: f64 = 1.05;
const CONSISTENCY_CAP: f64 = 0.98;

/// Weighted vote per movement type.
#[derive(Debug, Clone, Copy, Default)]
struct Votes([f64; 4]);

impl Votes {
    fn add(&mut self, t: MovementType, w: f64) {
        if w.is_finite() && w > 0.0 {
            self.0[t.index()] += w;
        }
    }

    fn total(&self) -> f64 {
        self.0.iter().sum()
    }

    fn share(&self, t: MovementType) -> f64 {
        let total = self.total();
        if total > 0.0 { self.0[t.index()] / total } else { 0.0 }
    }

    /// Winning type and its share of the total.
    fn dominant(&self) -> (MovementType, f64) {
        let mut best = MovementType::Unknown;
        let mut best_w = -1.0;
        for t in MovementType::ALL {
            if self.0[t.index()] > best_w {
                best = t;
                best_w = self.0[t.index()];
            }
        }
        (best, self.share(best))
    }

    fn runner_up_share(&self, winner: MovementType) -> f64 {
        MovementType::ALL
            .iter()
            .filter(|t| **t != winner)
            .map(|t| self.share(*t))
            .fold(0.0, f64::max)
    }
}

fn history_type_weight(t: MovementType, confidence: f64) -> f64 {
    match t {
        MovementType::Vehicle if confidence < 0.8 => 0.65,
        MovementType::Vehicle => 1.0,
        MovementType::Walking if confidence > 0.75 => 1.5,
        MovementType::Walking => 1.3,
        MovementType::Stationary | MovementType::Unknown => 1.0,
    }
}

fn current_type_weight(t: MovementType, confidence: f64) -> f64 {
    match t {
        MovementType::Vehicle if confidence > 0.85 => 1.0,
        MovementType::Vehicle if confidence > 0.7 => 0.85,
        MovementType::Vehicle => 0.6,
        MovementType::Walking => 1.2 + 0.3 * confidence,
        MovementType::Stationary if confidence > 0.8 => 1.3,
        MovementType::Stationary | MovementType::Unknown => 1.0,
    }
}

fn confidence_weight(confidence: f64) -> f64 {
    confidence.clamp(0.0, 1.0).powf(CONFIDENCE_EXPONENT)
}

fn retyped(current: &ClassificationResult, t: MovementType, confidence: f64) -> ClassificationResult {
    let confidence = confidence.clamp(0.0, 1.0);
    let mut out = current.clone();
    out.movement_type = t;
    out.confidence = confidence;
    match t {
        MovementType::Vehicle => out.vehicle_confidence = out.vehicle_confidence.max(confidence),
        MovementType::Walking => out.walking_confidence = out.walking_confidence.max(confidence),
        MovementType::Stationary => out.stationary_confidence = out.stationary_confidence.max(confidence),
        MovementType::Unknown => {}
    }
    out
}

pub struct Stabilizer {
    history: VecDeque<ClassificationResult>,
    capacity: usize,
}

impl Default for Stabilizer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LENGTH)
    }
}

impl Stabilizer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { history: VecDeque::with_capacity(capacity), capacity }
    }

    /// Stabilize `current` against the history, then record the raw result.
    pub fn stabilize(&mut self, current: ClassificationResult) -> ClassificationResult {
        let out = self.resolve(&current);
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(current);
        out
    }

    pub fn history(&self) -> impl Iterator<Item = &ClassificationResult> {
        self.history.iter()
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Recency- and confidence-weighted votes over the history alone.
    fn history_votes(&self) -> Votes {
        let mut votes = Votes::default();
        let n = self.history.len();
        if n == 0 {
            return votes;
        }
        let newest = 2f64.powi(n as i32 - 1);
        for (i, r) in self.history.iter().enumerate() {
            let recency = 2f64.powi(i as i32) / newest;
            let w = recency
                * confidence_weight(r.confidence)
                * history_type_weight(r.movement_type, r.confidence);
            votes.add(r.movement_type, w);
        }
        votes
    }

    /// `Some(a)` when the last three entries read a-b-a.
    fn oscillation(&self) -> Option<MovementType> {
        let n = self.history.len();
        if n < 3 {
            return None;
        }
        let a = self.history[n - 3].movement_type;
        let b = self.history[n - 2].movement_type;
        let c = self.history[n - 1].movement_type;
        (a == c && a != b).then_some(a)
    }

    fn count(&self, t: MovementType) -> usize {
        self.history.iter().filter(|r| r.movement_type == t).count()
    }

    fn resolve(&self, current: &ClassificationResult) -> ClassificationResult {
        if self.history.is_empty() {
            return current.clone();
        }
        let conf = current.confidence;
        let cur_t = current.movement_type;
        let history = self.history_votes();
        let (history_dominant, history_ratio) = history.dominant();

        // Sustained walking is not overridden by a thin vehicle majority.
        if cur_t == MovementType::Walking
            && history_dominant == MovementType::Vehicle
            && history_ratio < WALKING_PROTECTION_BASE + WALKING_PROTECTION_SLOPE * conf
        {
            return current.clone();
        }

        if history_dominant == MovementType::Vehicle
            && cur_t == MovementType::Walking
            && conf > WALKING_SWITCH_CONFIDENCE
        {
            return current.clone();
        }

        if let Some(a) = self.oscillation() {
            if cur_t != a && conf < OSCILLATION_MAX_CONFIDENCE && self.count(a) > self.count(cur_t) {
                return retyped(current, a, OSCILLATION_REVERT_CONFIDENCE);
            }
        }

        let mut combined = history;
        combined.add(
            cur_t,
            CURRENT_MULTIPLIER * confidence_weight(conf) * current_type_weight(cur_t, conf),
        );
        let (dominant, dominance) = combined.dominant();

        if dominant != cur_t && dominance > OVERRIDE_DOMINANCE {
            return self.override_current(current, &combined, dominant, dominance);
        }

        let walking_evidence = history.share(MovementType::Walking);
        if cur_t == MovementType::Vehicle && walking_evidence > WALKING_EVIDENCE_RATIO {
            let vehicle = conf * (1.0 - WALKING_EVIDENCE_DAMPING * walking_evidence);
            let walking = (current.walking_confidence * (1.0 + walking_evidence)).clamp(0.0, 1.0);
            let mut out = if walking > vehicle {
                retyped(current, MovementType::Walking, walking)
            } else {
                retyped(current, MovementType::Vehicle, vehicle)
            };
            out.vehicle_confidence = vehicle.clamp(0.0, 1.0);
            out.walking_confidence = walking;
            return out;
        }

        if combined.share(cur_t) > CONSISTENT_SHARE {
            let boosted = (conf * CONSISTENCY_REWARD).min(CONSISTENCY_CAP).max(conf);
            return retyped(current, cur_t, boosted);
        }

        current.clone()
    }

    fn override_current(
        &self,
        current: &ClassificationResult,
        combined: &Votes,
        dominant: MovementType,
        dominance: f64,
    ) -> ClassificationResult {
        let conf = current.confidence;
        let cur_t = current.movement_type;
        let heavy = combined.runner_up_share(dominant) / dominance > HEAVY_COMPETITION;
        let f = if heavy { BLEND_HEAVY } else { BLEND_LIGHT };
        let blended = conf * (1.0 - f) + dominance * f;

        if conf > PROTECTED_CONFIDENCE
            && dominance <= PROTECTED_DOMINANCE_BASE + PROTECTED_DOMINANCE_SLOPE * conf
        {
            return current.clone();
        }

        match (dominant, cur_t) {
            (MovementType::Vehicle, MovementType::Walking) if dominance <= VEHICLE_TAKEOVER_DOMINANCE => {
                current.clone()
            }
            (MovementType::Walking, MovementType::Vehicle) => {
                retyped(current, MovementType::Walking, blended)
            }
            _ => retyped(current, dominant, blended),
        }
    }
}
