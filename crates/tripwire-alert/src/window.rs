use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use tripwire_common::types::MetricSample;

/// Recent samples keyed by `source:name`, bounded by age and count.
pub struct MetricBuffer {
    retention: Duration,
    max_samples: usize,
    series: HashMap<String, VecDeque<MetricSample>>,
}

fn series_key(source: &str, name: &str) -> String {
    format!("{source}:{name}")
}

impl MetricBuffer {
    pub fn new(retention_secs: u64, max_samples: usize) -> Self {
        Self {
            retention: Duration::seconds(retention_secs as i64),
            max_samples: max_samples.max(1),
            series: HashMap::new(),
        }
    }

    /// Appends a sample and prunes its series.
    pub fn push(&mut self, sample: MetricSample, now: DateTime<Utc>) {
        let cutoff = now - self.retention;
        let entry = self
            .series
            .entry(series_key(&sample.source, &sample.name))
            .or_default();
        entry.push_back(sample);
        evict(entry, cutoff);
        while entry.len() > self.max_samples {
            entry.pop_front();
        }
    }

    /// Drops expired samples everywhere, and empty series with them.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.retention;
        self.series.retain(|_, entry| {
            evict(entry, cutoff);
            !entry.is_empty()
        });
    }

    /// Samples of `metric_name` from every source with `timestamp >= since`,
    /// in arrival order per source.
    pub fn samples_since(&self, metric_name: &str, since: DateTime<Utc>) -> Vec<MetricSample> {
        self.series
            .values()
            .filter(|entry| entry.front().is_some_and(|s| s.name == metric_name))
            .flat_map(|entry| entry.iter().filter(|s| s.timestamp >= since).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.series.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn series_count(&self) -> usize {
        self.series.len()
    }
}

// Samples can arrive out of order, so scan the whole series instead of
// stopping at the first fresh one.
fn evict(entry: &mut VecDeque<MetricSample>, cutoff: DateTime<Utc>) {
    entry.retain(|s| s.timestamp >= cutoff);
}
