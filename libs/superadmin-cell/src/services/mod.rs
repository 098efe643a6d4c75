pub mod health;
pub mod organizations;
pub mod users;

pub use health::HealthService;
pub use organizations::OrganizationService;
pub use users::UserService;
