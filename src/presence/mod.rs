pub mod service;

pub use service::PresenceService;
