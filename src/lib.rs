pub mod alerts;
pub mod api;
pub mod clock;
pub mod config;
pub mod control;
pub mod db;
pub mod error;
pub mod presence;
pub mod reconcile;
pub mod registry;
pub mod store;
