//! Tenantry HTTP API Service.
//!
//! A multi-tenant admin and storefront API where every request is made
//! safe in layers:
//!
//! - **Tenant resolution**: the request host (or, on admin routes, the
//!   `tenant_id` cookie) binds one tenant for the lifetime of the request
//! - **Isolation**: handlers only reach tenant data through a guarded handle
//!   bound to that tenant
//! - **Idempotency**: mutations carrying an `Idempotency-Key` run at most
//!   once and replay their stored response byte for byte
//! - **Optimistic concurrency**: updates name the version they last saw
//! - **Rate limits**: fixed windows per client IP and per user
//!
//! # Authentication
//!
//! Admin routes take an HS256 Bearer JWT whose `sub` is the user id. What
//! the user may do is decided by their membership in the bound tenant.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers are async for the router even when they never await

pub mod audit;
pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod idempotency;
pub mod pipeline;
pub mod rate_limit;
pub mod response;
pub mod routes;
pub mod seed;
pub mod state;
pub mod tenant;
pub mod validation;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use routes::{create_router, create_shared_router};
pub use seed::{seed_demo, DemoSeed};
pub use state::AppState;
