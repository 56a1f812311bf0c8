//! Helpers for walking paged collections

use serde::de::DeserializeOwned;
use tracing::debug;

use super::client::{decode, ApiError, CatalogApi};
use super::models::Page;

/// Collect every item of an offset-paged endpoint
///
/// Requests pages of `limit` items until a short page comes back.
pub async fn collect_offset<T: DeserializeOwned>(
    api: &dyn CatalogApi,
    url: &str,
    limit: usize,
    extra: &[(&str, String)],
) -> Result<Vec<T>, ApiError> {
    let mut items = Vec::new();
    let mut offset = 0;
    loop {
        let mut params: Vec<(&str, String)> = extra.to_vec();
        params.push(("limit", limit.to_string()));
        params.push(("offset", offset.to_string()));

        let page: Page<T> = decode(url, api.fetch_paged(url, &params).await?)?;
        let count = page.items.len();
        offset += count;
        items.extend(page.items);
        debug!("{}: {} items so far", url, items.len());

        if count < limit {
            return Ok(items);
        }
    }
}

/// Collect every item by following each page's `next` link
///
/// `unwrap_page` extracts the page from the response, for endpoints that nest it.
pub async fn collect_next<T, F>(
    api: &dyn CatalogApi,
    url: &str,
    params: &[(&str, String)],
    unwrap_page: F,
) -> Result<Vec<T>, ApiError>
where
    T: DeserializeOwned,
    F: Fn(serde_json::Value) -> serde_json::Value,
{
    let mut items = Vec::new();
    let mut page: Page<T> = decode(url, unwrap_page(api.fetch_paged(url, params).await?))?;
    loop {
        items.extend(page.items);
        match page.next {
            Some(next) => {
                let (_, value) = api.fetch(&next).await?;
                page = decode(&next, unwrap_page(value))?;
            }
            None => return Ok(items),
        }
    }
}
