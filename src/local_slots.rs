use crate::{
    backend::SlotBackend,
    error::BookingError,
    registration_guard::{check_registration, check_slot_removal, check_slot_update},
    types::{NewRegistration, NewSlot, Registration, Slot, SlotFilter, SlotUpdate, SlotView},
};
use chrono::Utc;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct LocalSlot {
    slot: Slot,
    registrations: Vec<Registration>,
}

impl LocalSlot {
    fn view(&self) -> SlotView {
        SlotView::new(self.slot.clone(), self.registrations.clone())
    }
}

/// Impersistent slot store. A single mutex guards all slots, so every
/// operation is one atomic unit.
#[derive(Debug, Clone, Default)]
pub struct LocalSlots {
    slots: Arc<Mutex<HashMap<Uuid, LocalSlot>>>,
}

impl LocalSlots {
    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, LocalSlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SlotBackend for LocalSlots {
    fn slots(&self, filter: &SlotFilter) -> Result<Vec<SlotView>, BookingError> {
        let mut slots: Vec<SlotView> = self
            .lock()
            .values()
            .filter(|local| filter.matches(&local.slot))
            .map(LocalSlot::view)
            .collect();
        slots.sort_unstable_by_key(|view| (view.slot.date, view.slot.start_time));
        Ok(slots)
    }

    fn slot(&self, id: Uuid) -> Result<SlotView, BookingError> {
        self.lock()
            .get(&id)
            .map(LocalSlot::view)
            .ok_or_else(|| BookingError::slot_not_found(id))
    }

    fn add_slot(&self, new_slot: NewSlot) -> Result<SlotView, BookingError> {
        let slot = Slot {
            id: Uuid::new_v4(),
            date: new_slot.date,
            start_time: new_slot.start_time,
            end_time: new_slot.end_time,
            max_capacity: new_slot.max_capacity,
            enabled: new_slot.enabled,
        };
        let local = LocalSlot {
            slot,
            registrations: Vec::new(),
        };
        let view = local.view();
        self.lock().insert(view.slot.id, local);
        Ok(view)
    }

    fn update_slot(&self, id: Uuid, update: SlotUpdate) -> Result<SlotView, BookingError> {
        let mut slots = self.lock();
        let local = slots
            .get_mut(&id)
            .ok_or_else(|| BookingError::slot_not_found(id))?;

        let updated = update.apply(&local.slot);
        check_slot_update(&updated, local.registrations.len())?;
        local.slot = updated;
        Ok(local.view())
    }

    fn remove_slot(&self, id: Uuid) -> Result<(), BookingError> {
        let mut slots = self.lock();
        let local = slots
            .get(&id)
            .ok_or_else(|| BookingError::slot_not_found(id))?;
        check_slot_removal(local.registrations.len())?;
        slots.remove(&id);
        Ok(())
    }

    fn register(
        &self,
        slot_id: Uuid,
        registration: NewRegistration,
    ) -> Result<Registration, BookingError> {
        let mut slots = self.lock();
        let local = slots
            .get_mut(&slot_id)
            .ok_or_else(|| BookingError::slot_not_found(slot_id))?;

        if let Err(err) =
            check_registration(&local.slot, &local.registrations, &registration.id_number)
        {
            debug!(%slot_id, %err, "Registration rejected");
            return Err(err);
        }

        let registration = Registration {
            id: Uuid::new_v4(),
            slot_id,
            full_name: registration.full_name,
            id_number: registration.id_number,
            email: registration.email,
            phone: registration.phone,
            attended: false,
            created_at: Utc::now(),
        };
        local.registrations.push(registration.clone());
        Ok(registration)
    }

    fn set_attended(&self, id: Uuid, attended: bool) -> Result<Registration, BookingError> {
        let mut slots = self.lock();
        let registration = slots
            .values_mut()
            .flat_map(|local| local.registrations.iter_mut())
            .find(|registration| registration.id == id)
            .ok_or_else(|| BookingError::registration_not_found(id))?;
        registration.attended = attended;
        Ok(registration.clone())
    }

    fn search_registrations(&self, id_number: &str) -> Result<Vec<Registration>, BookingError> {
        let needle = id_number.trim().to_lowercase();
        let mut found: Vec<Registration> = self
            .lock()
            .values()
            .flat_map(|local| local.registrations.iter())
            .filter(|registration| registration.id_number.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        found.sort_by_key(|registration| registration.created_at);
        Ok(found)
    }
}
