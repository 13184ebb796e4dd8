//! `ConfirmationPolicy`: decides, per risk level, whether a proposed
//! batch of actions should be parked for user approval.

use crate::event::SecurityRisk;

pub trait ConfirmationPolicy: Send + Sync {
    fn should_confirm(&self, risk: SecurityRisk) -> bool;

    /// Confirmation applies to a whole batch: if any action in the
    /// batch should be confirmed, the entire batch is parked. A lone
    /// `finish` or lone `think` action is exempt regardless of policy
    /// (checked by the caller, not here — the policy only ever sees
    /// risks, not tool kinds).
    fn should_confirm_batch(&self, risks: &[SecurityRisk]) -> bool {
        risks.iter().any(|r| self.should_confirm(*r))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NeverConfirm;

impl ConfirmationPolicy for NeverConfirm {
    fn should_confirm(&self, _risk: SecurityRisk) -> bool {
        false
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysConfirm;

impl ConfirmationPolicy for AlwaysConfirm {
    fn should_confirm(&self, _risk: SecurityRisk) -> bool {
        true
    }
}

/// Confirms any action at or above `threshold`.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmRisky {
    pub threshold: SecurityRisk,
}

fn risk_rank(risk: SecurityRisk) -> u8 {
    match risk {
        SecurityRisk::Unknown => 0,
        SecurityRisk::Low => 1,
        SecurityRisk::Medium => 2,
        SecurityRisk::High => 3,
    }
}

impl ConfirmationPolicy for ConfirmRisky {
    fn should_confirm(&self, risk: SecurityRisk) -> bool {
        risk_rank(risk) >= risk_rank(self.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_confirm_never_confirms() {
        assert!(!NeverConfirm.should_confirm(SecurityRisk::High));
    }

    #[test]
    fn always_confirm_always_confirms() {
        assert!(AlwaysConfirm.should_confirm(SecurityRisk::Unknown));
    }

    #[test]
    fn confirm_risky_respects_threshold() {
        let policy = ConfirmRisky { threshold: SecurityRisk::Medium };
        assert!(!policy.should_confirm(SecurityRisk::Low));
        assert!(policy.should_confirm(SecurityRisk::Medium));
        assert!(policy.should_confirm(SecurityRisk::High));
    }

    #[test]
    fn batch_confirms_if_any_action_requires_it() {
        let policy = ConfirmRisky { threshold: SecurityRisk::High };
        let risks = [SecurityRisk::Low, SecurityRisk::High];
        assert!(policy.should_confirm_batch(&risks));
    }
}
