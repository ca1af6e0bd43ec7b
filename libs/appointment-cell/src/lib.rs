pub mod models;
pub mod store;
pub mod services;
pub mod handlers;
pub mod router;

pub use models::*;
pub use router::appointment_routes;
pub use services::booking::BookingWorkflow;
pub use services::dispatcher::{DispatchStats, DispatcherSettings, SideEffectDispatcher, SideEffectEvent};
pub use store::{
    AppointmentStore, BookingStore, Guard, InMemoryBookingStore, SlotStore, StoreError,
    SupabaseBookingStore, UnitOfWork,
};
