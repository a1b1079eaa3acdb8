//! Tenantry Client SDK.
//!
//! A typed client for the tenantry admin and storefront API.
//!
//! # Example
//!
//! ```no_run
//! use tenantry_client::{AdminClient, ClientError, ClientOptions, NewProduct, ProductChanges};
//!
//! # async fn example() -> Result<(), ClientError> {
//! let client = AdminClient::with_options(
//!     "http://tenantry.internal:8080",
//!     "user-bearer-token",
//!     ClientOptions::for_host("acme.localhost"),
//! )?;
//!
//! let product = client
//!     .create_product(&NewProduct {
//!         sku: "ACME-042".to_string(),
//!         name: "Giant Magnet".to_string(),
//!         description: None,
//!         price_in_pence: 12_500,
//!         is_active: None,
//!     })
//!     .await?;
//!
//! let changes = ProductChanges {
//!     price_in_pence: Some(9_999),
//!     ..ProductChanges::default()
//! };
//! match client.update_product(product.id, product.version, changes).await {
//!     Ok(updated) => println!("now at version {}", updated.version),
//!     Err(ClientError::VersionConflict { current, .. }) => println!("stale, server has {current}"),
//!     Err(e) => return Err(e),
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod client;
mod error;
mod types;

pub use client::{AdminClient, ClientOptions};
pub use error::ClientError;
pub use types::{Caps, Catalog, ListParams, Member, NewProduct, Page, Ping, Product, ProductChanges, StorefrontTenant};
pub use tenantry_core::{MembershipId, ProductId, PublicProduct, TenantId};
