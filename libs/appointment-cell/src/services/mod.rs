pub mod availability;
pub mod booking;
pub mod rules;
pub mod slots;

pub use availability::AvailabilityService;
pub use booking::BookingService;
pub use rules::BookingPolicy;
