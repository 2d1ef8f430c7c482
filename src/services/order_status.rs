//! Order status state machine.
//!
//! Only PENDING and CLAIMED carry meaning; any other status string is kept as
//! given. Claiming is the transition that triggers fulfillment, and a claimed
//! order is final.

use serde::{Serialize, Serializer};
use std::fmt;

use crate::errors::ServiceError;

pub const PENDING: &str = "PENDING";
pub const CLAIMED: &str = "CLAIMED";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OrderStatus {
    #[default]
    Pending,
    Claimed,
    Other(String),
}

impl OrderStatus {
    /// Trims the input; PENDING and CLAIMED are matched case-insensitively.
    pub fn parse(raw: &str) -> Result<Self, ServiceError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ServiceError::ValidationError(
                "Status must not be empty".to_string(),
            ));
        }

        let status = if trimmed.eq_ignore_ascii_case(PENDING) {
            OrderStatus::Pending
        } else if trimmed.eq_ignore_ascii_case(CLAIMED) {
            OrderStatus::Claimed
        } else {
            OrderStatus::Other(trimmed.to_string())
        };
        Ok(status)
    }

    pub fn as_str(&self) -> &str {
        match self {
            OrderStatus::Pending => PENDING,
            OrderStatus::Claimed => CLAIMED,
            OrderStatus::Other(value) => value,
        }
    }

    pub fn is_claimed(&self) -> bool {
        matches!(self, OrderStatus::Claimed)
    }

    /// Validates moving from `self` to `next`.
    pub fn check_transition(&self, next: &OrderStatus) -> Result<(), ServiceError> {
        match (self, next) {
            (OrderStatus::Claimed, OrderStatus::Claimed) => Err(ServiceError::Conflict(
                "Order has already been claimed".to_string(),
            )),
            (OrderStatus::Claimed, other) => Err(ServiceError::InvalidStatus(format!(
                "Cannot move a claimed order to '{}'",
                other
            ))),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for OrderStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
