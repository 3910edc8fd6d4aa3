//! Shared harness for engine integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use slotbook_core::environment::Clock;
use slotbook_core::event_bus::EventBus;
use slotbook_core::types::{
    AppCode, Appointment, AppointmentDraft, BookerIdentity, Booking, SlotKey, UserId,
};
use slotbook_engine::{AppointmentService, DeviceTokenVerifier, SlotReservationEngine};
use slotbook_testing::{InMemoryBookingStore, RecordingHandler, fixtures, test_clock};
use std::sync::Arc;

pub struct Harness {
    pub store: InMemoryBookingStore,
    pub engine: SlotReservationEngine<InMemoryBookingStore>,
    pub appointments: AppointmentService<InMemoryBookingStore>,
    pub events: Arc<RecordingHandler>,
    pub owner: UserId,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(Arc::new(test_clock()), None)
    }

    pub fn build(clock: Arc<dyn Clock>, verifier: Option<Arc<dyn DeviceTokenVerifier>>) -> Self {
        slotbook_testing::init_tracing();
        let store = InMemoryBookingStore::new();
        let events = Arc::new(RecordingHandler::new());
        let mut bus = EventBus::new();
        bus.subscribe(events.clone());
        let bus = Arc::new(bus);

        Self {
            engine: SlotReservationEngine::new(
                store.clone(),
                Arc::clone(&bus),
                Arc::clone(&clock),
                verifier,
            ),
            appointments: AppointmentService::new(store.clone(), bus, clock),
            store,
            events,
            owner: UserId::new(),
        }
    }

    /// Create an appointment through the service, slots included.
    pub async fn open(&self, draft: AppointmentDraft) -> Appointment {
        self.appointments
            .create_appointment(self.owner, draft)
            .await
            .expect("appointment created")
    }

    /// Book `count` seats at `hour`:00 on the first day as a guest.
    pub async fn book(
        &self,
        app_code: &AppCode,
        hour: u32,
        count: u32,
        email: &str,
    ) -> Result<Booking, slotbook_core::BookingError> {
        self.engine
            .book_appointment(
                fixtures::guest_request(app_code, fixtures::first_day(), fixtures::time(hour, 0), count, email),
                BookerIdentity::Guest,
            )
            .await
    }

    pub fn slot(&self, app_code: &AppCode, hour: u32) -> Booking {
        self.store
            .slot(app_code, key(hour))
            .expect("slot exists")
    }

    pub fn seats(&self, app_code: &AppCode) -> u32 {
        self.store
            .appointment(app_code)
            .expect("appointment exists")
            .attendees_booked
    }
}

/// Slot key at `hour`:00 on the first day.
pub fn key(hour: u32) -> SlotKey {
    SlotKey::new(fixtures::first_day(), fixtures::time(hour, 0))
}
