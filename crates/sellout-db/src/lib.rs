//! Sellout DB - PostgreSQL repository for the synchronized entity tables
//!
//! This crate implements the [`sellout_core::traits::EntityStore`] seam on top
//! of `sqlx`, and ships the schema as embedded migrations.
//!
//! # Overview
//!
//! The main components are:
//! - [`PgEntityStore`] - Pool owner, migrations, health check and statistics
//! - [`PgEntityTransaction`] - One snapshot's unit of work

mod repository;

pub use repository::{PgEntityStore, PgEntityTransaction};
