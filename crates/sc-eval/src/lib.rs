//! Scores a predicted event list against ground truth.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::info;

pub const DEFAULT_MAX_DT: f64 = 3.0;

/// An event as read from either document. Only `t` and `id` take part in
/// matching; every other field is carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(default)]
    pub t: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EventRecord {
    pub fn new(t: f64, id: impl Into<String>) -> Self {
        Self {
            t,
            id: Some(id.into()),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct EventDocument {
    #[serde(default)]
    events: Vec<EventRecord>,
}

pub fn load_events(path: &Path) -> Result<Vec<EventRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let doc: EventDocument = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(doc.events)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedPair {
    pub pred: EventRecord,
    pub gt: EventRecord,
}

impl MatchedPair {
    pub fn dt(&self) -> f64 {
        (self.pred.t - self.gt.t).abs()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchOutcome {
    pub matched: Vec<MatchedPair>,
    pub unmatched_pred: Vec<EventRecord>,
    pub unmatched_gt: Vec<EventRecord>,
}

/// Greedy, ground-truth-first assignment. Each ground-truth event, in input
/// order, takes the closest unused prediction with the same id within
/// `max_dt`; the earliest prediction wins equal deltas. Nothing is
/// re-matched once consumed.
pub fn match_events(pred: &[EventRecord], gt: &[EventRecord], max_dt: f64) -> MatchOutcome {
    let mut used_pred = vec![false; pred.len()];
    let mut used_gt = vec![false; gt.len()];
    let mut matched = Vec::new();

    for (gi, g) in gt.iter().enumerate() {
        let mut best: Option<(usize, f64)> = None;
        for (pi, p) in pred.iter().enumerate() {
            if used_pred[pi] || p.id != g.id {
                continue;
            }
            let dt = (p.t - g.t).abs();
            if dt <= max_dt && best.map_or(true, |(_, b)| dt < b) {
                best = Some((pi, dt));
            }
        }
        if let Some((pi, _)) = best {
            used_pred[pi] = true;
            used_gt[gi] = true;
            matched.push(MatchedPair {
                pred: pred[pi].clone(),
                gt: g.clone(),
            });
        }
    }

    let unmatched = |events: &[EventRecord], used: &[bool]| {
        events
            .iter()
            .zip(used)
            .filter(|(_, used)| !**used)
            .map(|(e, _)| e.clone())
            .collect()
    };

    MatchOutcome {
        unmatched_pred: unmatched(pred, &used_pred),
        unmatched_gt: unmatched(gt, &used_gt),
        matched,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub mean_dt: f64,
}

impl Metrics {
    /// Empty denominators score 0.
    pub fn from_outcome(outcome: &MatchOutcome) -> Self {
        let tp = outcome.matched.len() as f64;
        let fp = outcome.unmatched_pred.len() as f64;
        let fn_ = outcome.unmatched_gt.len() as f64;

        let precision = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
        let recall = if tp + fn_ > 0.0 { tp / (tp + fn_) } else { 0.0 };
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        let mean_dt = if outcome.matched.is_empty() {
            0.0
        } else {
            outcome.matched.iter().map(MatchedPair::dt).sum::<f64>() / tp
        };

        Self {
            precision,
            recall,
            f1,
            mean_dt,
        }
    }
}

/// Scoring document written by the `evaluate` tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub metrics: Metrics,
    pub matched: Vec<MatchedPair>,
    pub unmatched_pred: Vec<EventRecord>,
    pub unmatched_gt: Vec<EventRecord>,
}

impl Evaluation {
    pub fn score(pred: &[EventRecord], gt: &[EventRecord], max_dt: f64) -> Self {
        let outcome = match_events(pred, gt, max_dt);
        let metrics = Metrics::from_outcome(&outcome);
        Self {
            metrics,
            matched: outcome.matched,
            unmatched_pred: outcome.unmatched_pred,
            unmatched_gt: outcome.unmatched_gt,
        }
    }
}

/// Load both documents' `events` and score them.
pub fn evaluate(pred_path: &Path, gt_path: &Path, max_dt: f64) -> Result<Evaluation> {
    let pred = load_events(pred_path)?;
    let gt = load_events(gt_path)?;
    let evaluation = Evaluation::score(&pred, &gt, max_dt);
    info!(
        "Evaluated {} prediction(s) against {} ground-truth event(s): P={:.3} R={:.3} F1={:.3}",
        pred.len(),
        gt.len(),
        evaluation.metrics.precision,
        evaluation.metrics.recall,
        evaluation.metrics.f1
    );
    Ok(evaluation)
}
