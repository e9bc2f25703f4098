pub mod gateway;
pub mod user;

pub use gateway::{GatewayError, MemoryGateway, SqliteGateway, UserGateway};
pub use user::{Group, ReactionCounts, ScenarioStep, UserId, UserRecord, STEP_COUNT};
