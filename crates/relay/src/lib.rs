//! # Crosstalk Relay Crate
//!
//! Core chat-relay domain types: the JSON wire protocol spoken over the
//! WebSocket, the bounded [`HistoryBuffer`] replayed to newcomers, and the
//! single-use [`InviteLedger`] gating signup.
//!
//! ## Architecture
//!
//! - **Events**: tagged client/server frames and the broadcast [`RelayMessage`]
//! - **History**: capacity-bounded recent-message buffer
//! - **Invites**: issue-and-burn invite codes

mod events;
mod history;
mod invites;

pub use events::{ClientEvent, RelayMessage, ServerEvent};
pub use history::HistoryBuffer;
pub use invites::InviteLedger;
