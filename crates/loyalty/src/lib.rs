#![warn(clippy::unwrap_used)]

pub mod initial;
pub mod ledger;
pub mod memory;
pub mod periods;
pub mod quarterly;
pub mod rules;
pub mod runner;
pub mod service;
pub mod shipments;
pub mod store;

pub use initial::{InitialEngine, InitialRunReport};
pub use memory::InMemoryStore;
pub use quarterly::{QuarterlyEngine, QuarterlyRunReport};
pub use service::AccrualService;
pub use shipments::{record_shipment, NewShipment};
pub use store::{CustomerBatch, Expect, RewardsStore};
