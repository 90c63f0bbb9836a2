pub mod chat;
pub mod onboard;
pub mod status;
pub mod wiring;
