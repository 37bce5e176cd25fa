use crate::{
    backend::SlotBackend,
    error::BookingError,
    types::{
        NewRegistration, NewSlot, NewSlotRequest, Registration, RegistrationSearch,
        RegistrationUpdated, SlotFilter, SlotUpdate, SlotView, REGISTRATION_UPDATED,
    },
    update_bus::UpdateBus,
};
use chrono::{Duration, Local, NaiveTime};
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

/// Entry point for every slot and registration operation. Store calls run on
/// the blocking pool; successful registration writes are announced on the
/// update bus afterwards.
#[derive(Clone)]
pub struct SlotManager<T: SlotBackend> {
    backend: T,
    bus: UpdateBus<RegistrationUpdated>,
}

impl<T: SlotBackend> SlotManager<T> {
    pub fn new(backend: T, bus: UpdateBus<RegistrationUpdated>) -> Self {
        Self { backend, bus }
    }

    pub fn bus(&self) -> &UpdateBus<RegistrationUpdated> {
        &self.bus
    }

    async fn run<R, F>(&self, operation: F) -> Result<R, BookingError>
    where
        F: FnOnce(T) -> Result<R, BookingError> + Send + 'static,
        R: Send + 'static,
    {
        let backend = self.backend.clone();
        tokio::task::spawn_blocking(move || operation(backend)).await?
    }

    pub async fn insert_example_slots(&self) -> Result<(), BookingError> {
        const NUMBER_OF_EXAMPLES: i64 = 5;
        const OPENING_HOURS: [(u32, u32); 2] = [(8, 9), (10, 11)];

        for day in 1..=NUMBER_OF_EXAMPLES {
            let date = (Local::now() + Duration::days(day)).date_naive();
            for (start, end) in OPENING_HOURS {
                let (Some(start_time), Some(end_time)) = (
                    NaiveTime::from_hms_opt(start, 0, 0),
                    NaiveTime::from_hms_opt(end, 0, 0),
                ) else {
                    continue;
                };
                let new_slot = NewSlot {
                    date,
                    start_time,
                    end_time,
                    max_capacity: 10,
                    enabled: true,
                };
                self.run(move |backend| backend.add_slot(new_slot)).await?;
            }
        }
        info!("Inserted example slots");
        Ok(())
    }

    pub async fn slots(&self, filter: SlotFilter) -> Result<Vec<SlotView>, BookingError> {
        self.run(move |backend| backend.slots(&filter)).await
    }

    pub async fn slot(&self, id: Uuid) -> Result<SlotView, BookingError> {
        self.run(move |backend| backend.slot(id)).await
    }

    pub async fn add_slot(&self, request: NewSlotRequest) -> Result<SlotView, BookingError> {
        let new_slot = request.into_new_slot()?;
        let view = self.run(move |backend| backend.add_slot(new_slot)).await?;
        info!(slot_id = %view.slot.id, date = %view.slot.date, "Slot added");
        Ok(view)
    }

    pub async fn update_slot(
        &self,
        id: Uuid,
        update: SlotUpdate,
    ) -> Result<SlotView, BookingError> {
        let view = self.run(move |backend| backend.update_slot(id, update)).await?;
        info!(slot_id = %id, "Slot updated");
        Ok(view)
    }

    pub async fn remove_slot(&self, id: Uuid) -> Result<(), BookingError> {
        self.run(move |backend| backend.remove_slot(id)).await?;
        info!(slot_id = %id, "Slot removed");
        Ok(())
    }

    pub async fn register(
        &self,
        slot_id: Uuid,
        registration: NewRegistration,
    ) -> Result<Registration, BookingError> {
        registration.validate()?;
        let registration = self
            .run(move |backend| backend.register(slot_id, registration))
            .await?;
        info!(%slot_id, registration_id = %registration.id, "Registration created");
        self.announce(&registration);
        Ok(registration)
    }

    pub async fn set_attended(
        &self,
        id: Uuid,
        attended: bool,
    ) -> Result<Registration, BookingError> {
        let registration = self
            .run(move |backend| backend.set_attended(id, attended))
            .await?;
        info!(registration_id = %id, attended, "Attendance updated");
        self.announce(&registration);
        Ok(registration)
    }

    pub async fn search_registrations(
        &self,
        search: RegistrationSearch,
    ) -> Result<Vec<Registration>, BookingError> {
        // A blank query would match every registration.
        let search = RegistrationSearch {
            id_number: search.id_number.trim().to_string(),
        };
        search.validate()?;
        self.run(move |backend| backend.search_registrations(&search.id_number))
            .await
    }

    /// The write is already committed; a failing listener can't undo it.
    fn announce(&self, registration: &Registration) {
        let update = RegistrationUpdated::from(registration);
        let delivered = self.bus.publish(REGISTRATION_UPDATED, &update);
        debug!(
            registration_id = %update.registration_id,
            delivered,
            "Registration update published"
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        live_updates::{LiveMessage, LiveUpdateStream},
        local_slots::LocalSlots,
        testutils::{new_registration, new_slot_request},
    };
    use futures::StreamExt;
    use std::{
        sync::{Arc, Mutex},
        time::Duration as StdDuration,
    };
    use tokio::time::timeout;

    fn slot_manager() -> SlotManager<LocalSlots> {
        SlotManager::new(LocalSlots::default(), UpdateBus::new())
    }

    fn record_updates(
        slot_manager: &SlotManager<LocalSlots>,
    ) -> (
        Arc<Mutex<Vec<RegistrationUpdated>>>,
        crate::update_bus::Subscription<RegistrationUpdated>,
    ) {
        let updates = Arc::new(Mutex::new(vec![]));
        let recorded = updates.clone();
        let subscription = slot_manager
            .bus()
            .subscribe(REGISTRATION_UPDATED, move |update: &RegistrationUpdated| {
                recorded.lock().unwrap().push(update.clone());
                Ok(())
            });
        (updates, subscription)
    }

    #[tokio::test]
    async fn test_example_scenario() {
        let slot_manager = slot_manager();
        let slot_id = slot_manager
            .add_slot(new_slot_request(2))
            .await
            .unwrap()
            .slot
            .id;

        slot_manager
            .register(slot_id, new_registration("Ana", "111"))
            .await
            .unwrap();
        assert_eq!(slot_manager.slot(slot_id).await.unwrap().available_capacity, 1);

        slot_manager
            .register(slot_id, new_registration("Beto", "222"))
            .await
            .unwrap();
        assert_eq!(slot_manager.slot(slot_id).await.unwrap().available_capacity, 0);

        let err = slot_manager
            .register(slot_id, new_registration("Caro", "333"))
            .await
            .unwrap_err();
        assert_eq!(err, BookingError::CapacityExceeded);
        assert_eq!(slot_manager.slot(slot_id).await.unwrap().available_capacity, 0);
    }

    #[tokio::test]
    async fn test_register_publishes_one_update() {
        let slot_manager = slot_manager();
        let (updates, _subscription) = record_updates(&slot_manager);
        let slot_id = slot_manager
            .add_slot(new_slot_request(1))
            .await
            .unwrap()
            .slot
            .id;

        let registration = slot_manager
            .register(slot_id, new_registration("Ana", "111"))
            .await
            .unwrap();
        slot_manager
            .register(slot_id, new_registration("Beto", "222"))
            .await
            .unwrap_err();

        let updates = updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].registration_id, registration.id);
        assert_eq!(updates[0].slot_id, slot_id);
        assert!(!updates[0].attended);
    }

    #[tokio::test]
    async fn test_live_stream_receives_registration() {
        let slot_manager = slot_manager();
        let mut stream =
            LiveUpdateStream::connect(slot_manager.bus(), StdDuration::from_secs(3600));
        let slot_id = slot_manager
            .add_slot(new_slot_request(3))
            .await
            .unwrap()
            .slot
            .id;

        let registration = slot_manager
            .register(slot_id, new_registration("Ana", "111"))
            .await
            .unwrap();

        let message = timeout(StdDuration::from_secs(2), stream.next())
            .await
            .unwrap();
        let Some(LiveMessage::Update(update)) = message else {
            panic!("expected a registration update, got {message:?}");
        };
        assert_eq!(update.registration_id, registration.id);
        assert_eq!(update.slot_id, slot_id);
        assert!(!update.attended);
    }

    #[tokio::test]
    async fn test_failing_listener_does_not_fail_registration() {
        let slot_manager = slot_manager();
        let _broken = slot_manager
            .bus()
            .subscribe(REGISTRATION_UPDATED, |_: &RegistrationUpdated| {
                Err("listener broken".to_string())
            });
        let slot_id = slot_manager
            .add_slot(new_slot_request(1))
            .await
            .unwrap()
            .slot
            .id;

        slot_manager
            .register(slot_id, new_registration("Ana", "111"))
            .await
            .unwrap();
        assert_eq!(slot_manager.slot(slot_id).await.unwrap().registrations.len(), 1);
    }

    #[tokio::test]
    async fn test_set_attended_always_publishes() {
        let slot_manager = slot_manager();
        let slot_id = slot_manager
            .add_slot(new_slot_request(1))
            .await
            .unwrap()
            .slot
            .id;
        let registration = slot_manager
            .register(slot_id, new_registration("Ana", "111"))
            .await
            .unwrap();
        let (updates, _subscription) = record_updates(&slot_manager);

        let first = slot_manager.set_attended(registration.id, true).await.unwrap();
        let second = slot_manager.set_attended(registration.id, true).await.unwrap();
        assert_eq!(first, second);
        assert!(second.attended);

        let updates = updates.lock().unwrap();
        assert_eq!(updates.len(), 2);
        assert!(updates.iter().all(|update| update.attended));
        assert!(updates
            .iter()
            .all(|update| update.registration_id == registration.id));
    }

    #[tokio::test]
    async fn test_registration_requires_name_and_id_number() {
        let slot_manager = slot_manager();
        let slot_id = slot_manager
            .add_slot(new_slot_request(1))
            .await
            .unwrap()
            .slot
            .id;

        let err = slot_manager
            .register(slot_id, new_registration("", "111"))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));
        let err = slot_manager
            .register(slot_id, new_registration("Ana", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));
        assert!(slot_manager.slot(slot_id).await.unwrap().registrations.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registrations() {
        const CAPACITY: i32 = 4;
        const ATTEMPTS: usize = 25;

        let slot_manager = slot_manager();
        let slot_id = slot_manager
            .add_slot(new_slot_request(CAPACITY))
            .await
            .unwrap()
            .slot
            .id;

        let tasks: Vec<_> = (0..ATTEMPTS)
            .map(|i| {
                let slot_manager = slot_manager.clone();
                tokio::spawn(async move {
                    slot_manager
                        .register(slot_id, new_registration("Someone", &format!("id-{i}")))
                        .await
                })
            })
            .collect();

        let mut succeeded = 0;
        let mut rejected = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(BookingError::CapacityExceeded) => rejected += 1,
                Err(err) => panic!("unexpected error {err}"),
            }
        }
        assert_eq!(succeeded, CAPACITY as usize);
        assert_eq!(rejected, ATTEMPTS - CAPACITY as usize);
        assert_eq!(
            slot_manager.slot(slot_id).await.unwrap().registrations.len(),
            CAPACITY as usize
        );
    }

    #[tokio::test]
    async fn test_insert_example_slots() {
        let slot_manager = slot_manager();
        slot_manager.insert_example_slots().await.unwrap();

        let slots = slot_manager.slots(SlotFilter::default()).await.unwrap();
        assert_eq!(slots.len(), 10);
        assert!(slots.iter().all(|view| view.slot.enabled));
        assert!(slots.iter().all(|view| view.available_capacity == 10));
    }

    #[tokio::test]
    async fn test_add_slot_validates_request() {
        let slot_manager = slot_manager();
        let err = slot_manager
            .add_slot(NewSlotRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));
        assert!(slot_manager
            .slots(SlotFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[test_case::test_case(""; "empty")]
    #[test_case::test_case(" "; "single space")]
    #[test_case::test_case(" \t \n"; "mixed whitespace")]
    #[tokio::test]
    async fn test_search_rejects_blank_query(id_number: &str) {
        let slot_manager = slot_manager();
        let slot_id = slot_manager
            .add_slot(new_slot_request(2))
            .await
            .unwrap()
            .slot
            .id;
        slot_manager
            .register(slot_id, new_registration("Ana", "111"))
            .await
            .unwrap();

        let err = slot_manager
            .search_registrations(RegistrationSearch {
                id_number: id_number.into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));
    }

    #[tokio::test]
    async fn test_search_trims_query() {
        let slot_manager = slot_manager();
        let slot_id = slot_manager
            .add_slot(new_slot_request(2))
            .await
            .unwrap()
            .slot
            .id;
        slot_manager
            .register(slot_id, new_registration("Ana", "111"))
            .await
            .unwrap();
        slot_manager
            .register(slot_id, new_registration("Beto", "222"))
            .await
            .unwrap();

        let found = slot_manager
            .search_registrations(RegistrationSearch {
                id_number: " 11 ".into(),
            })
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].full_name, "Ana");
    }
}
