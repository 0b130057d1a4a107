pub mod booking;
pub mod movie;
pub mod seat;
pub mod showtime;
pub mod theater;

pub use booking::{Booking, BookingStatus, CartItem, PaymentMethod, PendingBooking};
pub use movie::{Movie, MovieStatus};
pub use seat::{SeatConfig, SeatId, SeatStatus};
pub use showtime::Showtime;
pub use theater::{Screen, ScreenKind, Theater};
