//! Business rules that decide whether a registration (or a slot change) may be
//! committed.
//!
//! Both checks are pure: the caller loads the slot together with its current
//! registrations inside its own atomic unit of work (a held mutex for the
//! in-memory store, a transaction holding the slot row lock for PostgreSQL)
//! and only writes if the check passes. Nothing here may be called on data
//! read outside that unit.

use crate::error::BookingError;
use crate::types::{check_slot_fields, Registration, Slot};

/// Validates a registration request against the slot it targets.
///
/// Checks run in a fixed order and the first violation wins: the slot must be
/// enabled, it must have capacity left, and the id number must not be
/// registered on it yet (exact, case-sensitive comparison).
pub fn check_registration(
    slot: &Slot,
    registrations: &[Registration],
    id_number: &str,
) -> Result<(), BookingError> {
    if !slot.enabled {
        return Err(BookingError::Disabled);
    }
    if registrations.len() as i64 >= i64::from(slot.max_capacity) {
        return Err(BookingError::CapacityExceeded);
    }
    if registrations
        .iter()
        .any(|registration| registration.id_number == id_number)
    {
        return Err(BookingError::DuplicateRegistration);
    }
    Ok(())
}

/// Validates a slot after an administrative update has been applied to it.
pub fn check_slot_update(updated: &Slot, registration_count: usize) -> Result<(), BookingError> {
    check_slot_fields(updated.start_time, updated.end_time, updated.max_capacity)?;
    if (registration_count as i64) > i64::from(updated.max_capacity) {
        return Err(BookingError::validation(format!(
            "max_capacity can't be lower than the {registration_count} existing registrations"
        )));
    }
    Ok(())
}

/// Deletion is only allowed for slots that own no registrations.
pub fn check_slot_removal(registration_count: usize) -> Result<(), BookingError> {
    if registration_count > 0 {
        return Err(BookingError::HasRegistrations);
    }
    Ok(())
}
