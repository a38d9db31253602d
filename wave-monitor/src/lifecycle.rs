use std::time::Duration;

use tokio::time::Instant;
use wave_core::{DevicePhase, PhaseChange, TelemetryEvent};

/// Access-control phase tracker.
///
/// Every qualifying event moves the phase and re-arms a single idle deadline.
/// There is never more than one deadline: arming replaces the previous one.
#[derive(Debug)]
pub struct DeviceLifecycle {
    phase: DevicePhase,
    idle_after: Duration,
    deadline: Option<Instant>,
}

impl DeviceLifecycle {
    pub fn new(idle_after: Duration) -> Self {
        Self {
            phase: DevicePhase::Idle,
            idle_after,
            deadline: None,
        }
    }

    pub fn phase(&self) -> DevicePhase {
        self.phase
    }

    /// When the phase falls back to `Idle` if nothing else happens.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn on_event(&mut self, event: &TelemetryEvent, now: Instant) -> Option<PhaseChange> {
        let next = match event {
            TelemetryEvent::CardDetected | TelemetryEvent::UidScanned { .. } => {
                DevicePhase::Detecting
            }
            TelemetryEvent::UidAuthorized { .. } => DevicePhase::Authorized,
            TelemetryEvent::UidUnauthorized => DevicePhase::Denied,
            _ => return None,
        };

        self.phase = next;
        self.deadline = Some(now + self.idle_after);
        Some(PhaseChange::new(next))
    }

    /// Falls back to `Idle` once the deadline has passed.
    pub fn expire(&mut self, now: Instant) -> Option<PhaseChange> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                self.phase = DevicePhase::Idle;
                Some(PhaseChange::new(DevicePhase::Idle))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDLE: Duration = Duration::from_secs(4);

    #[test]
    fn scan_then_verdict() {
        let mut lifecycle = DeviceLifecycle::new(IDLE);
        let t0 = Instant::now();

        let change = lifecycle
            .on_event(&TelemetryEvent::UidScanned { uid: "04 A3".into() }, t0)
            .unwrap();
        assert_eq!(change.phase, DevicePhase::Detecting);
        assert!(change.should_pulse());

        let change = lifecycle
            .on_event(&TelemetryEvent::UidUnauthorized, t0)
            .unwrap();
        assert_eq!(change.phase, DevicePhase::Denied);
        assert!(!change.should_pulse());
        assert_eq!(lifecycle.deadline(), Some(t0 + IDLE));
    }

    #[test]
    fn idle_exactly_after_timeout() {
        let mut lifecycle = DeviceLifecycle::new(IDLE);
        let t0 = Instant::now();
        lifecycle.on_event(&TelemetryEvent::CardDetected, t0);

        assert_eq!(lifecycle.expire(t0 + IDLE - Duration::from_millis(1)), None);
        assert_eq!(lifecycle.phase(), DevicePhase::Detecting);

        let change = lifecycle.expire(t0 + IDLE).unwrap();
        assert_eq!(change.phase, DevicePhase::Idle);
        assert_eq!(lifecycle.deadline(), None);

        // nothing left to expire
        assert_eq!(lifecycle.expire(t0 + IDLE * 2), None);
    }

    #[test]
    fn new_event_rearms_deadline() {
        let mut lifecycle = DeviceLifecycle::new(IDLE);
        let t0 = Instant::now();
        lifecycle.on_event(&TelemetryEvent::CardDetected, t0);

        let t1 = t0 + Duration::from_secs(3);
        lifecycle.on_event(&TelemetryEvent::UidAuthorized { message: None }, t1);
        assert_eq!(lifecycle.deadline(), Some(t1 + IDLE));

        assert_eq!(lifecycle.expire(t0 + IDLE), None);
        assert_eq!(lifecycle.phase(), DevicePhase::Authorized);
        assert!(lifecycle.expire(t1 + IDLE).is_some());
    }

    #[test]
    fn unrelated_events_are_ignored() {
        let mut lifecycle = DeviceLifecycle::new(IDLE);
        let t0 = Instant::now();
        assert_eq!(lifecycle.on_event(&TelemetryEvent::SoundEnabled, t0), None);
        assert_eq!(lifecycle.deadline(), None);
        assert_eq!(lifecycle.phase(), DevicePhase::Idle);
    }
}
