pub mod booking;
pub mod conflict;
pub mod dispatcher;
pub mod lifecycle;
pub mod locks;
pub mod slots;

pub use booking::BookingWorkflow;
pub use conflict::{OverlapGuard, OverlapWindow};
pub use dispatcher::{DispatchStats, DispatcherSettings, SideEffectDispatcher, SideEffectEvent};
pub use lifecycle::AppointmentLifecycleService;
pub use locks::DoctorLocks;
pub use slots::SlotAllocator;
