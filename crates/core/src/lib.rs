pub mod config;
pub mod error;
pub mod loyalty;
pub mod program;
pub mod types;

pub use config::AppConfig;
pub use error::{RewardsError, RewardsResult};
pub use program::ProgramSnapshot;
