pub mod booking_flow;
pub mod booking_store;
pub mod catalog;
pub mod cleanup;
pub mod hold_timer;
pub mod payment;
pub mod session;
pub mod sold_seats;
