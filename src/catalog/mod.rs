//! Catalog web API: client, response models and link parsing

pub mod client;
pub mod links;
pub mod models;
pub mod paging;

pub use client::{decode, ApiError, CatalogApi, CatalogClient};
pub use links::{parse_link, parse_links_file, CatalogLink, LinkKind};
