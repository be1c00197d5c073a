pub mod booking;
pub mod catalog;
pub mod diagnosis;
pub mod inventory;
pub mod notification;
pub mod refdata;
pub mod shift;
pub mod slot;

pub use booking::{Booking, BookingPartLine, BookingServiceLine, BookingStatus, BusyRange};
pub use catalog::{Part, Service, ServiceKind, ServicePartMapping};
pub use diagnosis::{Diagnosis, PartRequirement};
pub use inventory::{InventoryLevel, ReceiptItem};
pub use notification::{TransitionEvent, TransitionKind};
pub use refdata::{Customer, Mechanic, Vehicle};
pub use shift::WorkShift;
pub use slot::{Slot, SlotsResult};
