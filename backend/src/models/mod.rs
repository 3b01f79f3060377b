//! Domain models for the channel network simulator

pub mod event;
pub mod group;
pub mod network;
pub mod payment;

// Re-exports
pub use event::{GroupEvent, GroupEventLog, JoinRole};
pub use group::{AdmissionBounds, Group, GroupId, GroupUpdate};
pub use network::{
    Channel, ChannelId, ChannelUpdate, Edge, EdgeId, LockedBalance, Network, NetworkError, Node,
    NodeId, NodePairResult, Policy,
};
pub use payment::{
    Attempt, EdgeSnapshot, Payment, PaymentError, PaymentErrorKind, PaymentId, Route, RouteHop,
};
