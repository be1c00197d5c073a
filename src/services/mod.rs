pub mod duration;
pub mod inventory;
pub mod lifecycle;
pub mod notify;
pub mod overlap;
pub mod shifts;
pub mod slots;
