pub mod ota;
pub mod policy;

pub use policy::{evaluate, Decision};
