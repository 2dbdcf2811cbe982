use std::sync::Arc;

use tracing::warn;

use super::super::remote::Entitlements;
use super::{CoinDebit, ContentItem};
use crate::error::{EngineError, RemoteError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PaymentKind {
    Subscription,
    Coin,
}

/// Outcome of gating one item activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AccessDecision {
    Allowed,
    RequiresLogin,
    RequiresAgeVerification { threshold: u8 },
    RequiresPayment(PaymentKind),
    /// Entitlement service failed or timed out; retrying may succeed.
    PaymentError,
}

impl AccessDecision {
    pub(crate) fn prompt(self) -> String {
        match self {
            Self::Allowed => "Playing.".to_string(),
            Self::RequiresLogin => "Sign in to watch this episode.".to_string(),
            Self::RequiresAgeVerification { threshold } => {
                format!("Verify you are {threshold}+ to watch this episode.")
            }
            Self::RequiresPayment(PaymentKind::Subscription) => {
                "Subscribe to unlock this episode.".to_string()
            }
            Self::RequiresPayment(PaymentKind::Coin) => {
                "Not enough coins. Top up to unlock this episode.".to_string()
            }
            Self::PaymentError => "Payment check failed. Press r to try again.".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GateStep {
    Decided(AccessDecision),
    /// Premium item without a subscription; the caller must run the one-time
    /// coin debit and feed the result to [`AccessGate::resolve_coin_debit`].
    NeedsCoinDebit,
}

pub(crate) struct AccessGate {
    entitlements: Arc<dyn Entitlements>,
}

impl AccessGate {
    pub(crate) fn new(entitlements: Arc<dyn Entitlements>) -> Self {
        Self { entitlements }
    }

    /// Decides what can be decided without asking the entitlement service.
    /// `None` means the item needs [`Self::evaluate`], which may block on the
    /// network and so belongs on a worker thread.
    pub(crate) fn precheck(&self, item: &ContentItem, age_limit: u8) -> Option<AccessDecision> {
        if !self.entitlements.has_identity() {
            return Some(AccessDecision::RequiresLogin);
        }
        if age_limit == 0 && !item.is_premium {
            return Some(AccessDecision::Allowed);
        }
        None
    }

    /// Forgets cached entitlements so the next evaluation sees fresh answers.
    pub(crate) fn refresh(&self) {
        self.entitlements.refresh();
    }

    /// First match wins: identity, then age limit, then premium access.
    pub(crate) fn evaluate(&self, item: &ContentItem, age_limit: u8) -> GateStep {
        if !self.entitlements.has_identity() {
            return GateStep::Decided(AccessDecision::RequiresLogin);
        }

        if age_limit > 0 {
            match self.entitlements.is_age_verified(age_limit) {
                Ok(true) => {}
                Ok(false) => {
                    return GateStep::Decided(AccessDecision::RequiresAgeVerification {
                        threshold: age_limit,
                    });
                }
                Err(err) => return GateStep::Decided(entitlement_failure(&item.item_id, err)),
            }
        }

        if !item.is_premium {
            return GateStep::Decided(AccessDecision::Allowed);
        }

        match self.entitlements.has_active_subscription() {
            Ok(true) => GateStep::Decided(AccessDecision::Allowed),
            Ok(false) if item.coin_price.is_none() => {
                GateStep::Decided(AccessDecision::RequiresPayment(PaymentKind::Subscription))
            }
            Ok(false) => GateStep::NeedsCoinDebit,
            Err(err) => GateStep::Decided(entitlement_failure(&item.item_id, err)),
        }
    }

    /// Distinguishes "buy more coins" from "try again".
    pub(crate) fn resolve_coin_debit(
        item_id: &str,
        result: Result<CoinDebit, RemoteError>,
    ) -> AccessDecision {
        match result {
            Ok(CoinDebit {
                sufficient_balance: false,
                ..
            }) => AccessDecision::RequiresPayment(PaymentKind::Coin),
            Ok(CoinDebit { debited: true, .. }) => AccessDecision::Allowed,
            Ok(CoinDebit { debited: false, .. }) => {
                warn!(%item_id, "coin balance sufficient but debit was not applied");
                AccessDecision::PaymentError
            }
            Err(err) => entitlement_failure(item_id, err),
        }
    }
}

fn entitlement_failure(item_id: &str, err: RemoteError) -> AccessDecision {
    let err = EngineError::EntitlementCheckFailed(err);
    warn!(%item_id, error = %err, "gating item behind payment error");
    AccessDecision::PaymentError
}
