//! Prometheus metrics for the unlock flow, fed through [`UnlockObserver`].

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;
use services::{DispatchReport, SweepReport, UnlockObserver};

use domains::{Capsule, CapsuleId};

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum Delivery {
    Sent,
    Failed,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DeliveryLabels {
    pub outcome: Delivery,
}

pub struct Metrics {
    registry: Registry,
    unlocks: Counter,
    lost_races: Counter,
    notifications: Family<DeliveryLabels, Counter>,
    sweeps: Counter,
    sweep_errors: Counter,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("capsulr");
        let unlocks = Counter::default();
        let lost_races = Counter::default();
        let notifications = Family::<DeliveryLabels, Counter>::default();
        let sweeps = Counter::default();
        let sweep_errors = Counter::default();

        registry.register("capsule_unlocks", "Capsules moved from locked to unlocked", unlocks.clone());
        registry.register(
            "unlock_races_lost",
            "Unlock attempts that found the capsule already unlocked",
            lost_races.clone(),
        );
        registry.register("notifications", "Notifications by delivery outcome", notifications.clone());
        registry.register("sweeps", "Completed sweep ticks", sweeps.clone());
        registry.register("sweep_errors", "Per-capsule and query failures during sweeps", sweep_errors.clone());

        Self { registry, unlocks, lost_races, notifications, sweeps, sweep_errors }
    }

    /// OpenMetrics text exposition.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut body = String::new();
        encode(&mut body, &self.registry)?;
        Ok(body)
    }

    pub fn unlocks(&self) -> u64 {
        self.unlocks.get()
    }
}

impl UnlockObserver for Metrics {
    fn on_unlock(&self, _capsule: &Capsule) {
        self.unlocks.inc();
    }

    fn on_delivery(&self, dispatch: &DispatchReport) {
        self.notifications
            .get_or_create(&DeliveryLabels { outcome: Delivery::Sent })
            .inc_by(dispatch.sent as u64);
        self.notifications
            .get_or_create(&DeliveryLabels { outcome: Delivery::Failed })
            .inc_by(dispatch.failed.len() as u64);
    }

    fn on_lost_race(&self, _capsule: CapsuleId) {
        self.lost_races.inc();
    }

    fn on_sweep(&self, report: &SweepReport) {
        self.sweeps.inc();
        self.sweep_errors.inc_by(report.errors.len() as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_show_up_in_exposition() {
        let metrics = Metrics::new();
        metrics.on_unlock(&sample_capsule());
        metrics.on_delivery(&DispatchReport { sent: 2, failed: vec![] });
        metrics.on_sweep(&SweepReport::default());

        let text = metrics.encode().unwrap();
        assert_eq!(metrics.unlocks(), 1);
        assert!(text.contains("capsulr_capsule_unlocks_total 1"));
        assert!(text.contains("capsulr_notifications_total{outcome=\"Sent\"} 2"));
        assert!(text.contains("capsulr_sweeps_total 1"));
    }

    fn sample_capsule() -> Capsule {
        Capsule::create(
            uuid::Uuid::now_v7(),
            domains::NewCapsule { title: "m".into(), ..Default::default() },
            chrono::Utc::now(),
        )
        .unwrap()
    }
}
