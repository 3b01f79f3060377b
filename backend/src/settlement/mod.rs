//! HTLC state machine
//!
//! `FindPath -> Send -> Forward* -> Receive -> (ForwardSuccess* -> ReceiveSuccess
//! | ForwardFail* -> ReceiveFail -> FindPath)`
//!
//! - `pathfinding`: path lookup per attempt, multi-path splitting
//! - `htlc`: per-hop forwarding, success and failure unwinding
//! - `results`: channel-update broadcasts into node-pair history

pub mod htlc;
pub mod pathfinding;
pub mod results;

pub use htlc::{
    check_forward_policy, forward_fail, forward_payment, forward_success, receive_fail,
    receive_payment, receive_success, send_payment, PolicyViolation,
};
pub use pathfinding::{find_path, path_still_viable};
pub use results::{channel_update_fail, channel_update_success};
