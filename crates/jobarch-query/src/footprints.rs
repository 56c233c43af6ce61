//! Per-job metric footprints paired with node-hour weights

use jobarch_core::JobRecord;
use serde::{Deserialize, Serialize};

/// One metric's per-job values. `None` marks a job without a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricFootprints {
    pub metric: String,
    pub data: Vec<Option<f64>>,
}

/// Index-aligned sequences: entry `i` of every sequence belongs to the same job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Footprints {
    pub nodehours: Vec<f64>,
    pub metrics: Vec<MetricFootprints>,
}

impl Footprints {
    pub fn new(metrics: &[String]) -> Self {
        Self {
            nodehours: Vec::new(),
            metrics: metrics
                .iter()
                .map(|metric| MetricFootprints {
                    metric: metric.clone(),
                    data: Vec::new(),
                })
                .collect(),
        }
    }

    /// Append one job. `values` is in the order the metrics were given.
    pub fn push(&mut self, job: &JobRecord, values: Vec<Option<f64>>) {
        debug_assert_eq!(values.len(), self.metrics.len());
        self.nodehours.push(job.node_hours());
        for (series, value) in self.metrics.iter_mut().zip(values) {
            series.data.push(value.filter(|v| v.is_finite()));
        }
    }

    pub fn len(&self) -> usize {
        self.nodehours.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodehours.is_empty()
    }

    pub fn is_aligned(&self) -> bool {
        self.metrics
            .iter()
            .all(|series| series.data.len() == self.nodehours.len())
    }

    pub fn metric(&self, name: &str) -> Option<&MetricFootprints> {
        self.metrics.iter().find(|series| series.metric == name)
    }
}
