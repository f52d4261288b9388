use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status shared by ride requests and bookings.
///
/// `CustomerSelected` and `DriverEnRoute` are reserved values kept for
/// storage compatibility; nothing transitions into or out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "ride_status", rename_all = "snake_case")]
pub enum RideStatus {
    Requested,
    DriverOffered,
    CustomerSelected,
    Confirmed,
    DriverEnRoute,
    Arrived,
    Started,
    InProgress,
    Completed,
    CancelledByCustomer,
    CancelledByDriver,
    Expired,
}

impl RideStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::DriverOffered => "driver_offered",
            Self::CustomerSelected => "customer_selected",
            Self::Confirmed => "confirmed",
            Self::DriverEnRoute => "driver_en_route",
            Self::Arrived => "arrived",
            Self::Started => "started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::CancelledByCustomer => "cancelled_by_customer",
            Self::CancelledByDriver => "cancelled_by_driver",
            Self::Expired => "expired",
        }
    }

    /// A request that can still receive offers or be confirmed.
    pub fn is_open_request(&self) -> bool {
        matches!(self, Self::Requested | Self::DriverOffered)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::CancelledByCustomer | Self::CancelledByDriver)
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "offer_status", rename_all = "snake_case")]
pub enum OfferStatus {
    Active,
    Selected,
    Rejected,
    Withdrawn,
    Expired,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Selected => "selected",
            Self::Rejected => "rejected",
            Self::Withdrawn => "withdrawn",
            Self::Expired => "expired",
        }
    }

    /// Closed offers are never refreshed by a re-bid. An expired offer is not
    /// closed: the same driver may bid again while the request is open.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Selected | Self::Rejected | Self::Withdrawn)
    }
}

impl fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "ride_type", rename_all = "snake_case")]
pub enum RideType {
    Private,
    Carpool,
}
