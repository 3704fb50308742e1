//! Status enums for orders and payment attempts.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a payment attempt, independent of checkout step.
///
/// Happy path is monotonic (`Pending -> Authorized | Paid`). `Failed` and
/// `Cancelled` are reachable from `Pending` and are terminal for the current
/// attempt; a retry re-enters at `Pending`. `Refunded` only follows a
/// settled payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Authorized,
    Paid,
    Failed,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    /// Whether the payment has been proven valid (captured or authorized).
    #[must_use]
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Authorized | Self::Paid)
    }

    /// Whether this attempt ended without money moving.
    #[must_use]
    pub const fn is_terminal_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Cancelled)
    }

    /// Whether a transition to `next` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Pending => matches!(
                next,
                Self::Authorized | Self::Paid | Self::Failed | Self::Cancelled
            ),
            Self::Authorized => matches!(next, Self::Paid | Self::Failed),
            Self::Paid => matches!(next, Self::Refunded),
            // A fresh attempt starts over at Pending.
            Self::Failed | Self::Cancelled => matches!(next, Self::Pending),
            Self::Refunded => false,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Authorized => "authorized",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        };
        write!(f, "{s}")
    }
}

/// Lifecycle state of the order itself.
///
/// A draft order stays `Draft` while the shopper iterates on it, moves to
/// `Processing` while finalization is in flight, and `Completed` once the
/// backend has converted it into an immutable order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderLifecycle {
    #[default]
    Draft,
    Processing,
    Completed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settled_states() {
        assert!(PaymentStatus::Authorized.is_settled());
        assert!(PaymentStatus::Paid.is_settled());
        assert!(!PaymentStatus::Pending.is_settled());
        assert!(!PaymentStatus::Failed.is_settled());
    }

    #[test]
    fn test_happy_path_transitions() {
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Authorized));
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Paid));
        assert!(PaymentStatus::Authorized.can_transition_to(PaymentStatus::Paid));
    }

    #[test]
    fn test_failure_is_terminal_for_attempt() {
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Failed));
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Cancelled));

        // Only a fresh attempt leaves a failed state.
        assert!(PaymentStatus::Failed.can_transition_to(PaymentStatus::Pending));
        assert!(!PaymentStatus::Failed.can_transition_to(PaymentStatus::Paid));
        assert!(!PaymentStatus::Cancelled.can_transition_to(PaymentStatus::Authorized));
    }

    #[test]
    fn test_no_leaving_refunded() {
        assert!(PaymentStatus::Paid.can_transition_to(PaymentStatus::Refunded));
        assert!(!PaymentStatus::Refunded.can_transition_to(PaymentStatus::Pending));
        assert!(!PaymentStatus::Refunded.can_transition_to(PaymentStatus::Paid));
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&PaymentStatus::Authorized).expect("serialize");
        assert_eq!(json, "\"authorized\"");
        let json = serde_json::to_string(&OrderLifecycle::Processing).expect("serialize");
        assert_eq!(json, "\"processing\"");
    }
}
