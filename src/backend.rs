use crate::error::BookingError;
use crate::types::{NewRegistration, NewSlot, Registration, SlotFilter, SlotUpdate, SlotView};
use uuid::Uuid;

/// Slot Store seam. Implementations must make `register` a single atomic unit:
/// loading the slot with its registrations, running the registration guard and
/// inserting the new row can't interleave with another writer on the same slot.
pub trait SlotBackend: Clone + Send + Sync + 'static {
    fn slots(&self, filter: &SlotFilter) -> Result<Vec<SlotView>, BookingError>;
    fn slot(&self, id: Uuid) -> Result<SlotView, BookingError>;
    fn add_slot(&self, slot: NewSlot) -> Result<SlotView, BookingError>;
    fn update_slot(&self, id: Uuid, update: SlotUpdate) -> Result<SlotView, BookingError>;
    fn remove_slot(&self, id: Uuid) -> Result<(), BookingError>;
    fn register(
        &self,
        slot_id: Uuid,
        registration: NewRegistration,
    ) -> Result<Registration, BookingError>;
    fn set_attended(&self, id: Uuid, attended: bool) -> Result<Registration, BookingError>;
    fn search_registrations(&self, id_number: &str) -> Result<Vec<Registration>, BookingError>;
}
