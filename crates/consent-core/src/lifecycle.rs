//! The consent state machine.
//!
//! ```text
//!   pending  --Approve--> approved
//!   pending  --Reject---> rejected
//!   pending  --Revoke---> revoked
//!   approved --Revoke---> revoked
//!   pending  --Expire---> expired
//!   approved --Expire---> expired
//! ```
//!
//! `rejected`, `expired` and `revoked` are terminal. `Expire` is only ever
//! raised by the sweep; owners cannot request it.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use crate::{Error, Result, consent::ConsentStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Event {
  Approve,
  Reject,
  Revoke,
  Expire,
}

impl Event {
  /// The status this event moves a record to, when it is allowed at all.
  pub fn target(self) -> ConsentStatus {
    match self {
      Self::Approve => ConsentStatus::Approved,
      Self::Reject => ConsentStatus::Rejected,
      Self::Revoke => ConsentStatus::Revoked,
      Self::Expire => ConsentStatus::Expired,
    }
  }

  /// The event an owner raises to reach `target`. Owners may not ask for
  /// `pending` or `expired`.
  pub fn requested_by_owner(
    current: ConsentStatus,
    target: ConsentStatus,
  ) -> Result<Self> {
    match target {
      ConsentStatus::Approved => Ok(Self::Approve),
      ConsentStatus::Rejected => Ok(Self::Reject),
      ConsentStatus::Revoked => Ok(Self::Revoke),
      ConsentStatus::Pending | ConsentStatus::Expired => {
        Err(Error::InvalidTransition { from: current, to: target })
      }
    }
  }
}

/// Apply `event` to a record currently in `from`.
pub fn transition(from: ConsentStatus, event: Event) -> Result<ConsentStatus> {
  use ConsentStatus::*;

  match (from, event) {
    (Pending, Event::Approve) => Ok(Approved),
    (Pending, Event::Reject) => Ok(Rejected),
    (Pending | Approved, Event::Revoke) => Ok(Revoked),
    (Pending | Approved, Event::Expire) => Ok(Expired),
    _ => Err(Error::InvalidTransition { from, to: event.target() }),
  }
}
