//! 调度过程指标采集, 基于metrics crate, 由API侧以Prometheus格式导出。

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use outreach_domain::repositories::QueueCounts;

/// 调度指标采集器
pub struct MetricsCollector {
    sends_total: Counter,
    send_failures_total: Counter,
    duplicate_invitations_total: Counter,
    cancelled_events_total: Counter,
    released_claims_total: Counter,
    cycle_duration: Histogram,
    queue_due: Gauge,
    queue_pending: Gauge,
    queue_in_flight: Gauge,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            sends_total: counter!("outreach_sends_total"),
            send_failures_total: counter!("outreach_send_failures_total"),
            duplicate_invitations_total: counter!("outreach_duplicate_invitations_total"),
            cancelled_events_total: counter!("outreach_cancelled_events_total"),
            released_claims_total: counter!("outreach_released_claims_total"),
            cycle_duration: histogram!("outreach_dispatch_cycle_duration_seconds"),
            queue_due: gauge!("outreach_queue_due"),
            queue_pending: gauge!("outreach_queue_pending"),
            queue_in_flight: gauge!("outreach_queue_in_flight"),
        }
    }

    pub fn record_sent(&self) {
        self.sends_total.increment(1);
    }

    pub fn record_failed(&self) {
        self.send_failures_total.increment(1);
    }

    pub fn record_duplicate(&self) {
        self.duplicate_invitations_total.increment(1);
    }

    pub fn record_cancelled(&self, count: u64) {
        self.cancelled_events_total.increment(count);
    }

    pub fn record_released(&self, count: u64) {
        self.released_claims_total.increment(count);
    }

    pub fn record_cycle_duration(&self, seconds: f64) {
        self.cycle_duration.record(seconds);
    }

    pub fn record_queue_depth(&self, counts: &QueueCounts) {
        self.queue_due.set(counts.due as f64);
        self.queue_pending.set(counts.pending as f64);
        self.queue_in_flight.set(counts.in_flight as f64);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
