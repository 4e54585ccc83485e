mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::{Result, bail};
use reqwest::Url;
use serde::de::DeserializeOwned;

/// Issues a GET through `client` and deserializes the JSON body.
///
/// Non-success statuses are errors carrying the response body.
pub async fn fetch_json<C: HttpClient, T: DeserializeOwned>(client: &C, url: Url) -> Result<T> {
    let req = reqwest::Request::new(reqwest::Method::GET, url);

    let resp = client.execute(req).await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("request failed with status {}: {}", status, body);
    }

    Ok(resp.json().await?)
}
