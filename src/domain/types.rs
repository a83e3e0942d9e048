//! Shared types for the venue queue

use serde::{Deserialize, Serialize};
use std::fmt;

/// Newtype wrapper for queue entry IDs to provide type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of service a customer is queueing for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceType {
    #[serde(rename = "dine-in")]
    DineIn,
    #[serde(rename = "takeout")]
    Takeout,
    #[serde(rename = "delivery")]
    Delivery,
}

impl ServiceType {
    pub const ALL: [ServiceType; 3] = [ServiceType::DineIn, ServiceType::Takeout, ServiceType::Delivery];

    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::DineIn => "dine-in",
            ServiceType::Takeout => "takeout",
            ServiceType::Delivery => "delivery",
        }
    }

    /// Numeric feature used by the wait-time model.
    ///
    /// Fixed for the lifetime of the data set: history records store this code,
    /// so reordering variants must not change it.
    #[inline]
    pub fn feature_code(&self) -> u8 {
        match self {
            ServiceType::DineIn => 0,
            ServiceType::Takeout => 1,
            ServiceType::Delivery => 2,
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ServiceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dine-in" => Ok(ServiceType::DineIn),
            "takeout" => Ok(ServiceType::Takeout),
            "delivery" => Ok(ServiceType::Delivery),
            other => Err(format!("unknown service type '{other}'")),
        }
    }
}

/// Lifecycle status of a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryStatus {
    #[serde(rename = "waiting")]
    Waiting,
    #[serde(rename = "seated")]
    Seated,
    #[serde(rename = "served")]
    Served,
    #[serde(rename = "no-show")]
    NoShow,
    #[serde(rename = "cancelled")]
    Cancelled,
}

impl EntryStatus {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Waiting => "waiting",
            EntryStatus::Seated => "seated",
            EntryStatus::Served => "served",
            EntryStatus::NoShow => "no-show",
            EntryStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal statuses are final and mutually exclusive
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, EntryStatus::Served | EntryStatus::NoShow | EntryStatus::Cancelled)
    }

    /// Whether a status update from `self` to `next` is allowed.
    ///
    /// Statuses only move forward: waiting -> seated -> terminal, and a
    /// terminal status never changes again (not even to itself).
    pub fn can_transition_to(&self, next: EntryStatus) -> bool {
        match self {
            EntryStatus::Waiting => true,
            EntryStatus::Seated => next != EntryStatus::Waiting,
            EntryStatus::Served | EntryStatus::NoShow | EntryStatus::Cancelled => false,
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(EntryStatus::Waiting),
            "seated" => Ok(EntryStatus::Seated),
            "served" => Ok(EntryStatus::Served),
            "no-show" => Ok(EntryStatus::NoShow),
            "cancelled" => Ok(EntryStatus::Cancelled),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

/// Check-in request as received from a caller.
///
/// `service_type` stays a string here; it is parsed during validation so an
/// unknown value surfaces as a validation error rather than a decode error.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckInRequest {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub party_size: u32,
    pub service_type: String,
    pub location: String,
}

impl CheckInRequest {
    pub fn new(name: &str, party_size: u32, service_type: &str, location: &str) -> Self {
        Self {
            name: name.to_string(),
            phone: None,
            party_size,
            service_type: service_type.to_string(),
            location: location.to_string(),
        }
    }

    pub fn with_phone(mut self, phone: &str) -> Self {
        self.phone = Some(phone.to_string());
        self
    }
}
