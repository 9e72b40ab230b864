pub mod citizen;
pub mod registration;
pub mod registration_center;

pub use citizen::Citizen;
pub use registration::Registration;
pub use registration_center::RegistrationCenter;
