use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use chrono::{NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use crate::{
    backend::SlotBackend,
    configuration::Configuration,
    error::BookingError,
    types::{
        NewRegistration, NewSlot, NewSlotRequest, Registration, Slot, SlotFilter, SlotUpdate,
        SlotView,
    },
};

pub fn example_new_slot() -> NewSlot {
    NewSlot {
        date: NaiveDate::from_ymd_opt(2025, 11, 28).unwrap(),
        start_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        end_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        max_capacity: 10,
        enabled: true,
    }
}

pub fn new_slot_request(max_capacity: i32) -> NewSlotRequest {
    let example = example_new_slot();
    NewSlotRequest {
        date: Some(example.date),
        start_time: Some(example.start_time),
        end_time: Some(example.end_time),
        max_capacity: Some(max_capacity),
        enabled: Some(true),
    }
}

pub fn new_registration(full_name: &str, id_number: &str) -> NewRegistration {
    NewRegistration {
        full_name: full_name.into(),
        id_number: id_number.into(),
        email: None,
        phone: None,
    }
}

#[derive(Clone)]
pub struct TestConfiguration {
    pub admin_password: Option<String>,
    pub keep_alive_interval: Duration,
}

impl Default for TestConfiguration {
    fn default() -> Self {
        Self {
            admin_password: None,
            keep_alive_interval: Duration::from_secs(30),
        }
    }
}

impl Configuration for TestConfiguration {
    fn port(&self) -> u16 {
        0
    }

    fn database_url(&self) -> Option<String> {
        None
    }

    fn pool_size(&self) -> u32 {
        1
    }

    fn admin_password(&self) -> Option<String> {
        self.admin_password.clone()
    }

    fn keep_alive_interval(&self) -> Duration {
        self.keep_alive_interval
    }

    fn seed_examples(&self) -> bool {
        false
    }
}

pub struct MockSlotBackendInner {
    pub success: AtomicBool,
    pub calls_to_slots: AtomicU64,
    pub calls_to_slot: AtomicU64,
    pub calls_to_add_slot: AtomicU64,
    pub calls_to_update_slot: AtomicU64,
    pub calls_to_remove_slot: AtomicU64,
    pub calls_to_register: AtomicU64,
    pub calls_to_set_attended: AtomicU64,
    pub calls_to_search_registrations: AtomicU64,
    pub slots: Mutex<Vec<SlotView>>,
}

/// Backend that records calls and either succeeds with canned data or fails
/// with a store error.
#[derive(Clone)]
pub struct MockSlotBackend(pub Arc<MockSlotBackendInner>);

impl MockSlotBackendInner {
    fn new() -> Self {
        Self {
            success: AtomicBool::new(true),
            calls_to_slots: AtomicU64::default(),
            calls_to_slot: AtomicU64::default(),
            calls_to_add_slot: AtomicU64::default(),
            calls_to_update_slot: AtomicU64::default(),
            calls_to_remove_slot: AtomicU64::default(),
            calls_to_register: AtomicU64::default(),
            calls_to_set_attended: AtomicU64::default(),
            calls_to_search_registrations: AtomicU64::default(),
            slots: Mutex::default(),
        }
    }
}

impl MockSlotBackend {
    pub fn new() -> Self {
        Self(Arc::new(MockSlotBackendInner::new()))
    }

    fn result(&self) -> Result<(), BookingError> {
        match self.0.success.load(Ordering::SeqCst) {
            true => Ok(()),
            false => Err(BookingError::store("Supposed to fail")),
        }
    }

    pub fn slot_view(id: Uuid) -> SlotView {
        let new_slot = example_new_slot();
        SlotView::new(
            Slot {
                id,
                date: new_slot.date,
                start_time: new_slot.start_time,
                end_time: new_slot.end_time,
                max_capacity: new_slot.max_capacity,
                enabled: new_slot.enabled,
            },
            vec![],
        )
    }

    fn registration(id: Uuid, slot_id: Uuid, attended: bool) -> Registration {
        Registration {
            id,
            slot_id,
            full_name: "Mock".into(),
            id_number: "000".into(),
            email: None,
            phone: None,
            attended,
            created_at: Utc::now(),
        }
    }
}

impl SlotBackend for MockSlotBackend {
    fn slots(&self, _filter: &SlotFilter) -> Result<Vec<SlotView>, BookingError> {
        self.0.calls_to_slots.fetch_add(1, Ordering::SeqCst);
        self.result()?;
        Ok(self.0.slots.lock().unwrap().clone())
    }

    fn slot(&self, id: Uuid) -> Result<SlotView, BookingError> {
        self.0.calls_to_slot.fetch_add(1, Ordering::SeqCst);
        self.result()?;
        Ok(Self::slot_view(id))
    }

    fn add_slot(&self, _slot: NewSlot) -> Result<SlotView, BookingError> {
        self.0.calls_to_add_slot.fetch_add(1, Ordering::SeqCst);
        self.result()?;
        Ok(Self::slot_view(Uuid::new_v4()))
    }

    fn update_slot(&self, id: Uuid, _update: SlotUpdate) -> Result<SlotView, BookingError> {
        self.0.calls_to_update_slot.fetch_add(1, Ordering::SeqCst);
        self.result()?;
        Ok(Self::slot_view(id))
    }

    fn remove_slot(&self, _id: Uuid) -> Result<(), BookingError> {
        self.0.calls_to_remove_slot.fetch_add(1, Ordering::SeqCst);
        self.result()
    }

    fn register(
        &self,
        slot_id: Uuid,
        _registration: NewRegistration,
    ) -> Result<Registration, BookingError> {
        self.0.calls_to_register.fetch_add(1, Ordering::SeqCst);
        self.result()?;
        Ok(Self::registration(Uuid::new_v4(), slot_id, false))
    }

    fn set_attended(&self, id: Uuid, attended: bool) -> Result<Registration, BookingError> {
        self.0.calls_to_set_attended.fetch_add(1, Ordering::SeqCst);
        self.result()?;
        Ok(Self::registration(id, Uuid::new_v4(), attended))
    }

    fn search_registrations(&self, _id_number: &str) -> Result<Vec<Registration>, BookingError> {
        self.0
            .calls_to_search_registrations
            .fetch_add(1, Ordering::SeqCst);
        self.result()?;
        Ok(vec![])
    }
}
