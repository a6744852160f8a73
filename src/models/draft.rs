use chrono::{Duration, FixedOffset, NaiveDateTime};
use serde::Serialize;
use serde_json::{json, Value};

use super::{Booking, Category, EntityId};
use crate::errors::ClientError;
use crate::services::time_format;

pub const UNKNOWN_NAME: &str = "unknown";
pub const UNKNOWN_EMAIL: &str = "unknown@unknown.com";
pub const UNKNOWN_PHONE: &str = "0000000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormMode {
    Create,
    Edit(EntityId),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewCustomer {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomerSelection {
    Existing(EntityId),
    New(NewCustomer),
}

/// Transient state of the create/edit booking form. Times are local wall-clock.
#[derive(Debug, Clone)]
pub struct BookingFormState {
    pub mode: FormMode,
    pub service_ids: Vec<EntityId>,
    pub staff_id: Option<EntityId>,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub notes: String,
    pub customer: CustomerSelection,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ServiceLine {
    pub category_service_id: EntityId,
    pub user_id: EntityId,
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum CustomerInfo {
    Existing {
        id: EntityId,
    },
    New {
        first_name: String,
        last_name: String,
        email: String,
        phone: String,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BookingPayload {
    pub start_time: String,
    pub end_time: String,
    pub notes: String,
    pub services: Vec<ServiceLine>,
    pub customer_info: CustomerInfo,
}

fn or_placeholder(value: &str, placeholder: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        placeholder.to_string()
    } else {
        trimmed.to_string()
    }
}

impl BookingFormState {
    /// Blank create-mode form for a clicked slot; start and end both at `at`.
    pub fn create_at(at: NaiveDateTime) -> Self {
        Self {
            mode: FormMode::Create,
            service_ids: Vec::new(),
            staff_id: None,
            start: at,
            end: at,
            notes: String::new(),
            customer: CustomerSelection::New(NewCustomer::default()),
        }
    }

    /// Edit-mode form populated from a fetched booking.
    pub fn from_booking(booking: &Booking, offset: &FixedOffset) -> Self {
        let service_ids = booking
            .booking_services
            .iter()
            .filter_map(|s| s.category_service_id.clone())
            .collect();
        let staff_id = booking
            .booking_services
            .first()
            .and_then(|s| s.user_id.clone());

        let customer = match &booking.customer {
            Some(c) => match &c.id {
                Some(id) => CustomerSelection::Existing(id.clone()),
                None => CustomerSelection::New(NewCustomer {
                    first_name: c.first_name.clone().unwrap_or_default(),
                    last_name: c.last_name.clone().unwrap_or_default(),
                    email: c.email.clone().unwrap_or_default(),
                    phone: c.phone.clone().unwrap_or_default(),
                }),
            },
            None => CustomerSelection::New(NewCustomer::default()),
        };

        Self {
            mode: FormMode::Edit(booking.id.clone()),
            service_ids,
            staff_id,
            start: time_format::utc_to_local(&booking.start_at, offset),
            end: time_format::utc_to_local(&booking.end_at, offset),
            notes: booking.notes.clone().unwrap_or_default(),
            customer,
        }
    }

    /// End time implied by the summed durations of the selected services.
    pub fn suggested_end(&self, catalog: &[Category]) -> NaiveDateTime {
        let minutes: i64 = catalog
            .iter()
            .flat_map(|c| c.services.iter())
            .filter(|s| {
                s.id.as_ref()
                    .map(|id| self.service_ids.contains(id))
                    .unwrap_or(false)
            })
            .map(|s| s.duration as i64)
            .sum();
        self.start + Duration::minutes(minutes)
    }

    /// Client-side preconditions checked before any request is made.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.service_ids.iter().all(EntityId::is_blank) {
            return Err(ClientError::Validation(
                "Please select at least one service".to_string(),
            ));
        }
        if self.staff_id.as_ref().map_or(true, EntityId::is_blank) {
            return Err(ClientError::Validation(
                "Please select a staff member".to_string(),
            ));
        }
        if self.end <= self.start {
            return Err(ClientError::Validation(
                "The booking must end after it starts".to_string(),
            ));
        }
        if let CustomerSelection::Existing(id) = &self.customer {
            if id.is_blank() {
                return Err(ClientError::Validation(
                    "Please select a customer".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Wire shape for create/update. Blank new-customer fields get placeholder
    /// values instead of failing validation.
    pub fn to_payload(&self, offset: &FixedOffset) -> Result<BookingPayload, ClientError> {
        self.validate()?;

        let to_utc = |local: &NaiveDateTime| {
            time_format::local_to_utc(local, offset)
                .map(|dt| time_format::to_iso_utc(&dt))
                .ok_or_else(|| ClientError::Validation("Invalid booking time".to_string()))
        };

        let staff_id = self
            .staff_id
            .clone()
            .ok_or_else(|| ClientError::Validation("Please select a staff member".to_string()))?;

        let services = self
            .service_ids
            .iter()
            .filter(|id| !id.is_blank())
            .map(|id| ServiceLine {
                category_service_id: id.clone(),
                user_id: staff_id.clone(),
                notes: String::new(),
            })
            .collect();

        let customer_info = match &self.customer {
            CustomerSelection::Existing(id) => CustomerInfo::Existing { id: id.clone() },
            CustomerSelection::New(c) => CustomerInfo::New {
                first_name: or_placeholder(&c.first_name, UNKNOWN_NAME),
                last_name: or_placeholder(&c.last_name, UNKNOWN_NAME),
                email: or_placeholder(&c.email, UNKNOWN_EMAIL),
                phone: or_placeholder(&c.phone, UNKNOWN_PHONE),
            },
        };

        Ok(BookingPayload {
            start_time: to_utc(&self.start)?,
            end_time: to_utc(&self.end)?,
            notes: self.notes.clone(),
            services,
            customer_info,
        })
    }
}

/// Time-off form. Times are local wall-clock.
#[derive(Debug, Clone)]
pub struct TimeOffDraft {
    pub staff_id: Option<EntityId>,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub reason: String,
}

impl TimeOffDraft {
    /// One-hour block starting at `at`.
    pub fn starting_at(at: NaiveDateTime) -> Self {
        Self {
            staff_id: None,
            start: at,
            end: at + Duration::hours(1),
            reason: String::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if self.staff_id.as_ref().map_or(true, EntityId::is_blank) {
            return Err(ClientError::Validation(
                "Please select a staff member".to_string(),
            ));
        }
        if self.end <= self.start {
            return Err(ClientError::Validation(
                "Time off must end after it starts".to_string(),
            ));
        }
        Ok(())
    }

    /// Local-time payload; time fields are normalised to UTC by the gateway.
    pub fn to_params(&self) -> Result<Value, ClientError> {
        self.validate()?;
        Ok(json!({
            "user_id": self.staff_id,
            "start_date": self.start.format("%Y-%m-%d %H:%M").to_string(),
            "end_date": self.end.format("%Y-%m-%d %H:%M").to_string(),
            "reason": self.reason,
        }))
    }
}
