//! Append-only prediction log, ground-truth feedback, and daily aggregation.
//! The log itself is engine-owned; persisting it past process lifetime is
//! the out-of-scope repository's job — this module ships the in-memory
//! reference the coordinator and CLI runner use.

use crate::model::{ExecutionType, PredictionRecord};
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// One day's rollup of a model's predictions vs. recorded feedback.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyAggregate {
    pub date: NaiveDate,
    pub model_type: String,
    pub model_version: String,
    pub prediction_count: usize,
    pub feedback_count: usize,
    pub fallback_count: usize,
    pub mean_absolute_error: f64,
    pub avg_latency: f64,
    pub max_latency: f64,
    pub avg_confidence: f64,
    pub min_confidence: f64,
    pub avg_feedback_score: f64,
}

#[derive(Clone)]
pub struct PredictionLog {
    records: Arc<Mutex<Vec<PredictionRecord>>>,
}

impl PredictionLog {
    pub fn new() -> Self {
        Self { records: Arc::new(Mutex::new(Vec::new())) }
    }

    /// Append a prediction. Returns the assigned id.
    #[allow(clippy::too_many_arguments)]
    pub fn append(
        &self,
        model_type: impl Into<String>,
        model_version: impl Into<String>,
        input_features: HashMap<String, f64>,
        raw_prediction: f64,
        confidence: f64,
        execution_type: ExecutionType,
        latency_ms: Option<f64>,
        is_fallback: bool,
    ) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let record = PredictionRecord {
            id: id.clone(),
            model_type: model_type.into(),
            model_version: model_version.into(),
            input_features,
            raw_prediction,
            confidence,
            execution_type,
            created_at: Utc::now(),
            latency_ms,
            is_fallback,
            actual_value: None,
            feedback_score: None,
            feedback_at: None,
        };
        self.records.lock().push(record);
        id
    }

    /// Attach ground truth to a previously logged prediction. `feedback_score` is typically `1 - |error| /
    /// actual` or similar; left to the caller to define.
    pub fn submit_feedback(&self, prediction_id: &str, actual_value: f64, feedback_score: f64) -> bool {
        let mut records = self.records.lock();
        match records.iter_mut().find(|r| r.id == prediction_id) {
            Some(record) => {
                record.actual_value = Some(actual_value);
                record.feedback_score = Some(feedback_score);
                record.feedback_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    pub fn get(&self, prediction_id: &str) -> Option<PredictionRecord> {
        self.records.lock().iter().find(|r| r.id == prediction_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Roll up every prediction with feedback into one `DailyAggregate` per
    /// `(date, model_type, model_version)`.
    pub fn aggregate_daily(&self) -> Vec<DailyAggregate> {
        let records = self.records.lock();
        let mut groups: HashMap<(NaiveDate, String, String), Vec<&PredictionRecord>> = HashMap::new();
        for record in records.iter() {
            let key = (record.created_at.date_naive(), record.model_type.clone(), record.model_version.clone());
            groups.entry(key).or_default().push(record);
        }

        let mut aggregates: Vec<DailyAggregate> = groups
            .into_iter()
            .map(|((date, model_type, model_version), group)| {
                let with_feedback: Vec<&&PredictionRecord> = group.iter().filter(|r| r.actual_value.is_some()).collect();
                let mae = if with_feedback.is_empty() {
                    0.0
                } else {
                    with_feedback.iter().map(|r| (r.raw_prediction - r.actual_value.unwrap()).abs()).sum::<f64>()
                        / with_feedback.len() as f64
                };

                let latencies: Vec<f64> = group.iter().filter_map(|r| r.latency_ms).collect();
                let avg_latency = mean(&latencies);
                let max_latency = latencies.iter().cloned().fold(0.0, f64::max);

                let confidences: Vec<f64> = group.iter().map(|r| r.confidence).collect();
                let avg_confidence = mean(&confidences);
                let min_confidence = confidences.iter().cloned().fold(f64::INFINITY, f64::min);
                let min_confidence = if min_confidence.is_finite() { min_confidence } else { 0.0 };

                let feedback_scores: Vec<f64> = with_feedback.iter().filter_map(|r| r.feedback_score).collect();
                let avg_feedback_score = mean(&feedback_scores);

                DailyAggregate {
                    date,
                    model_type,
                    model_version,
                    prediction_count: group.len(),
                    feedback_count: with_feedback.len(),
                    fallback_count: group.iter().filter(|r| r.is_fallback).count(),
                    mean_absolute_error: mae,
                    avg_latency,
                    max_latency,
                    avg_confidence,
                    min_confidence,
                    avg_feedback_score,
                }
            })
            .collect();

        aggregates.sort_by(|a, b| a.date.cmp(&b.date).then(a.model_type.cmp(&b.model_type)).then(a.model_version.cmp(&b.model_version)));
        aggregates
    }

    /// Predictions still awaiting feedback older than `cutoff` — useful for
    /// alerting on a feedback pipeline that has stalled.
    pub fn stale_without_feedback(&self, cutoff: DateTime<Utc>) -> Vec<PredictionRecord> {
        self.records.lock().iter().filter(|r| r.feedback_at.is_none() && r.created_at < cutoff).cloned().collect()
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

impl Default for PredictionLog {
    fn default() -> Self {
        Self::new()
    }
}
