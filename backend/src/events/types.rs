//! Simulation event types
//!
//! Every state transition of the protocol and of the group lifecycle is driven
//! by one of these events. An `Event` is immutable once created; the scheduler
//! owns it until dispatch and it is dropped afterwards.

use crate::models::network::NodeId;
use crate::models::payment::PaymentId;
use serde::{Deserialize, Serialize};

/// Kind of a scheduled event
///
/// The channel-update broadcasts carry the index of the attempt they report
/// on, since the payment may have retried (and overwritten its live route and
/// error) before the broadcast fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    FindPath,
    SendPayment,
    ForwardPayment,
    ReceivePayment,
    ForwardSuccess,
    ForwardFail,
    ReceiveSuccess,
    ReceiveFail,
    ChannelUpdateFail { attempt: usize },
    ChannelUpdateSuccess { attempt: usize },
    UpdateGroup,
    ConstructGroups,
    /// Network growth; never scheduled by the payment protocol itself
    OpenChannel,
}

impl EventKind {
    /// Short name used in logs and diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::FindPath => "find_path",
            EventKind::SendPayment => "send_payment",
            EventKind::ForwardPayment => "forward_payment",
            EventKind::ReceivePayment => "receive_payment",
            EventKind::ForwardSuccess => "forward_success",
            EventKind::ForwardFail => "forward_fail",
            EventKind::ReceiveSuccess => "receive_success",
            EventKind::ReceiveFail => "receive_fail",
            EventKind::ChannelUpdateFail { .. } => "channel_update_fail",
            EventKind::ChannelUpdateSuccess { .. } => "channel_update_success",
            EventKind::UpdateGroup => "update_group",
            EventKind::ConstructGroups => "construct_groups",
            EventKind::OpenChannel => "open_channel",
        }
    }

    /// True for the events that move a payment through its HTLC states
    pub fn is_payment_transition(&self) -> bool {
        !matches!(
            self,
            EventKind::ChannelUpdateFail { .. }
                | EventKind::ChannelUpdateSuccess { .. }
                | EventKind::UpdateGroup
                | EventKind::ConstructGroups
                | EventKind::OpenChannel
        )
    }
}

/// A scheduled event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Dispatch time (ms)
    pub time: u64,
    pub kind: EventKind,
    /// Node that processes the event
    pub node_id: NodeId,
    /// Associated payment; `None` for network-level events
    pub payment_id: Option<PaymentId>,
}

impl Event {
    pub fn new(
        time: u64,
        kind: EventKind,
        node_id: NodeId,
        payment_id: Option<PaymentId>,
    ) -> Self {
        Self {
            time,
            kind,
            node_id,
            payment_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_transition_classification() {
        assert!(EventKind::FindPath.is_payment_transition());
        assert!(EventKind::ReceiveFail.is_payment_transition());
        assert!(!EventKind::UpdateGroup.is_payment_transition());
        assert!(!EventKind::ChannelUpdateFail { attempt: 0 }.is_payment_transition());
        assert!(!EventKind::OpenChannel.is_payment_transition());
    }

    #[test]
    fn test_event_kind_serializes_tagged() {
        let json = serde_json::to_string(&EventKind::ChannelUpdateSuccess { attempt: 2 }).unwrap();
        assert_eq!(json, r#"{"type":"channel_update_success","attempt":2}"#);
    }
}
