//! §4.6 EntryQualityGate: a confluence scorer over independent evidences.
//! `norm(e_i)` reduces each raw evidence to roughly [-1, 1] using a rolling
//! mean/stddev, the same Welford's-algorithm approach the teacher's
//! `RollingStats` (in the signal quality filter) uses for outlier detection --
//! here repurposed to normalise evidence magnitude instead of rejecting
//! outliers.

use std::collections::HashMap;

use crate::domain::{EntryQuality, EntryQualityClass, IndicatorFrame, Side, Signal};

/// Welford's online mean/variance, used to normalise each evidence stream.
#[derive(Debug, Clone, Default)]
pub struct RollingStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RollingStats {
    pub fn update(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    pub fn std_dev(&self) -> f64 {
        if self.count < 2 {
            1.0
        } else {
            (self.m2 / (self.count - 1) as f64).sqrt().max(1e-9)
        }
    }

    pub fn normalize(&self, value: f64) -> f64 {
        ((value - self.mean) / self.std_dev()).clamp(-3.0, 3.0) / 3.0
    }
}

#[derive(Debug, Clone)]
pub struct QualityThresholds {
    pub reject: f64,
    pub good: f64,
    pub premium: f64,
    pub allow_marginal: bool,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            reject: 0.25,
            good: 0.55,
            premium: 0.80,
            allow_marginal: false,
        }
    }
}

pub struct EntryQualityGate {
    thresholds: QualityThresholds,
    evidence_stats: HashMap<&'static str, RollingStats>,
    weights: [( &'static str, f64); 5],
}

impl Default for EntryQualityGate {
    fn default() -> Self {
        Self::new(QualityThresholds::default())
    }
}

impl EntryQualityGate {
    pub fn new(thresholds: QualityThresholds) -> Self {
        Self {
            thresholds,
            evidence_stats: HashMap::new(),
            weights: [
                ("trend_flip_agreement", 0.25),
                ("support_resistance_proximity", 0.20),
                ("momentum_alignment", 0.25),
                ("session_timing", 0.10),
                ("structure", 0.20),
            ],
        }
    }

    fn evidence(&self, signal: &Signal, indicators: &IndicatorFrame) -> HashMap<&'static str, f64> {
        let mut evidence = HashMap::new();

        let ema_fast = indicators.last("ema_10");
        let ema_slow = indicators.last("ema_20");
        let trend_agrees = match signal.side {
            Side::Long => ema_fast - ema_slow,
            Side::Short => ema_slow - ema_fast,
        };
        evidence.insert("trend_flip_agreement", trend_agrees);

        let bb_upper = indicators.last("bb_upper_20_2");
        let bb_lower = indicators.last("bb_lower_20_2");
        let width = (bb_upper - bb_lower).abs().max(1e-9);
        let proximity = match signal.side {
            Side::Long => (signal.entry_price - bb_lower) / width,
            Side::Short => (bb_upper - signal.entry_price) / width,
        };
        evidence.insert("support_resistance_proximity", -proximity);

        let rsi = indicators.last("rsi_14");
        let momentum = match signal.side {
            Side::Long => rsi - 50.0,
            Side::Short => 50.0 - rsi,
        };
        evidence.insert("momentum_alignment", momentum);

        let hour = signal.timestamp.format("%H").to_string().parse::<u32>().unwrap_or(12);
        let session_score = if (7..20).contains(&hour) { 1.0 } else { -0.5 };
        evidence.insert("session_timing", session_score);

        let adx = indicators.last("adx_14");
        evidence.insert("structure", adx - 20.0);

        evidence
    }

    /// Evaluates the confluence score, updating the rolling normalisers as it
    /// goes (so normalisation adapts across the run, as the teacher's own
    /// `RollingStats` usage does).
    pub fn evaluate(&mut self, signal: &Signal, indicators: &IndicatorFrame) -> EntryQuality {
        let raw_evidence = self.evidence(signal, indicators);
        let mut score = 0.0;

        for (key, weight) in self.weights {
            if let Some(&value) = raw_evidence.get(key) {
                if value.is_nan() {
                    continue;
                }
                let stats = self.evidence_stats.entry(key).or_default();
                stats.update(value);
                let normalized = stats.normalize(value);
                score += weight * ((normalized + 1.0) / 2.0);
            }
        }
        score = score.clamp(0.0, 1.0);

        let (class, multiplier) = if score < self.thresholds.reject {
            (EntryQualityClass::Reject, 0.0)
        } else if score < self.thresholds.good {
            if self.thresholds.allow_marginal {
                (EntryQualityClass::Marginal, 0.5)
            } else {
                (EntryQualityClass::Reject, 0.0)
            }
        } else if score < self.thresholds.premium {
            (EntryQualityClass::Good, 0.85)
        } else {
            (EntryQualityClass::Premium, 1.0)
        };

        EntryQuality {
            class,
            score,
            size_multiplier: multiplier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{IndicatorSeries, Side, Timeframe};

    fn strong_frame() -> IndicatorFrame {
        let mut columns = HashMap::new();
        columns.insert("ema_10".into(), IndicatorSeries { values: vec![1.105] });
        columns.insert("ema_20".into(), IndicatorSeries { values: vec![1.100] });
        columns.insert("bb_upper_20_2".into(), IndicatorSeries { values: vec![1.110] });
        columns.insert("bb_lower_20_2".into(), IndicatorSeries { values: vec![1.090] });
        columns.insert("rsi_14".into(), IndicatorSeries { values: vec![62.0] });
        columns.insert("adx_14".into(), IndicatorSeries { values: vec![32.0] });
        IndicatorFrame { columns }
    }

    #[test]
    fn strong_confluence_classifies_above_reject() {
        let mut gate = EntryQualityGate::default();
        let signal = Signal::new("EURUSD", Timeframe::M15, Side::Long, 1.10, 1.095, 1.11, 0.7, "test", "t");
        // Warm up the rolling normaliser with a few neutral samples first.
        for _ in 0..5 {
            gate.evaluate(&signal, &strong_frame());
        }
        let quality = gate.evaluate(&signal, &strong_frame());
        assert_ne!(quality.class, EntryQualityClass::Reject);
    }
}
