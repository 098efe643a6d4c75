pub mod catalog;
pub mod doctor;
pub mod schedule;

pub use catalog::CatalogService;
pub use doctor::DoctorService;
pub use schedule::ScheduleService;
