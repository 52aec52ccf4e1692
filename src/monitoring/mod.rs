pub mod alerts;
pub mod health;
pub mod logger;
pub mod metrics;
