//! Common library for the Aurora Nova services
//!
//! This crate provides shared functionality used across the Aurora Nova
//! services: PostgreSQL connectivity and the storage error type every store
//! adapter reports through.
//!
//! ```rust,no_run
//! use common::database::{DatabaseConfig, health_check, init_pool};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DatabaseConfig::from_env()?;
//!     let pool = init_pool(&config).await?;
//!     let is_healthy = health_check(&pool).await?;
//!     println!("Database health check: {}", is_healthy);
//!     Ok(())
//! }
//! ```

pub mod database;
pub mod error;
