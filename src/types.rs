use crate::error::BookingError;
use crate::schema::{registrations, slots};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use diesel::{Associations, Identifiable, Queryable, Selectable};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

pub const REGISTRATION_UPDATED: &str = "registration-updated";

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Queryable, Selectable, Identifiable,
)]
#[diesel(table_name = slots)]
pub struct Slot {
    pub id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub max_capacity: i32,
    pub enabled: bool,
}

#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Queryable,
    Selectable,
    Identifiable,
    Associations,
)]
#[diesel(belongs_to(Slot))]
#[diesel(table_name = registrations)]
pub struct Registration {
    pub id: Uuid,
    pub slot_id: Uuid,
    pub full_name: String,
    pub id_number: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub attended: bool,
    pub created_at: DateTime<Utc>,
}

/// A slot as handed out to clients: the stored row, its registrations and the
/// capacity that is still free. The latter is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotView {
    #[serde(flatten)]
    pub slot: Slot,
    pub available_capacity: i64,
    pub registrations: Vec<Registration>,
}

impl SlotView {
    pub fn new(slot: Slot, registrations: Vec<Registration>) -> Self {
        let available_capacity = i64::from(slot.max_capacity) - registrations.len() as i64;
        Self {
            slot,
            available_capacity,
            registrations,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSlot {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub max_capacity: i32,
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewSlotRequest {
    pub date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub max_capacity: Option<i32>,
    pub enabled: Option<bool>,
}

impl NewSlotRequest {
    pub fn into_new_slot(self) -> Result<NewSlot, BookingError> {
        let (Some(date), Some(start_time), Some(end_time), Some(max_capacity)) =
            (self.date, self.start_time, self.end_time, self.max_capacity)
        else {
            return Err(BookingError::validation(
                "Missing required fields: date, start_time, end_time and max_capacity",
            ));
        };
        check_slot_fields(start_time, end_time, max_capacity)?;

        Ok(NewSlot {
            date,
            start_time,
            end_time,
            max_capacity,
            enabled: self.enabled.unwrap_or(true),
        })
    }
}

/// Partial update of a slot. Absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotUpdate {
    pub date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub max_capacity: Option<i32>,
    pub enabled: Option<bool>,
}

impl SlotUpdate {
    pub fn apply(&self, slot: &Slot) -> Slot {
        Slot {
            id: slot.id,
            date: self.date.unwrap_or(slot.date),
            start_time: self.start_time.unwrap_or(slot.start_time),
            end_time: self.end_time.unwrap_or(slot.end_time),
            max_capacity: self.max_capacity.unwrap_or(slot.max_capacity),
            enabled: self.enabled.unwrap_or(slot.enabled),
        }
    }
}

pub fn check_slot_fields(
    start_time: NaiveTime,
    end_time: NaiveTime,
    max_capacity: i32,
) -> Result<(), BookingError> {
    if max_capacity < 1 {
        return Err(BookingError::validation(
            "max_capacity must be a positive number",
        ));
    }
    if end_time <= start_time {
        return Err(BookingError::validation("end_time must be after start_time"));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct NewRegistration {
    #[validate(length(min = 1, message = "full_name is required"))]
    pub full_name: String,
    #[validate(length(min = 1, message = "id_number is required"))]
    pub id_number: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AttendedRequest {
    pub attended: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotFilter {
    pub enabled_only: Option<bool>,
    pub date: Option<NaiveDate>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl SlotFilter {
    pub fn enabled_only(&self) -> bool {
        self.enabled_only.unwrap_or(false)
    }

    pub fn matches(&self, slot: &Slot) -> bool {
        if self.enabled_only() && !slot.enabled {
            return false;
        }
        if self.date.is_some_and(|date| slot.date != date) {
            return false;
        }
        if self.from.is_some_and(|from| slot.date < from) {
            return false;
        }
        if self.to.is_some_and(|to| slot.date > to) {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RegistrationSearch {
    #[validate(length(min = 1, message = "id_number must not be empty"))]
    pub id_number: String,
}

/// Payload of the `registration-updated` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationUpdated {
    pub registration_id: Uuid,
    pub slot_id: Uuid,
    pub attended: bool,
    pub timestamp: DateTime<Utc>,
}

impl From<&Registration> for RegistrationUpdated {
    fn from(registration: &Registration) -> Self {
        Self {
            registration_id: registration.id,
            slot_id: registration.slot_id,
            attended: registration.attended,
            timestamp: Utc::now(),
        }
    }
}
