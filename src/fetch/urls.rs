// src/fetch/urls.rs

use anyhow::{bail, Context, Result};
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;
use url::Url;

const MAX_RETRIES: usize = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Find the current-year auctions ZIP link on the results page.
///
/// The page lists several downloads per year; `link_pattern` is matched
/// against each link's filename to pick the current-year export.
pub async fn find_auction_zip_url(
    client: &Client,
    page_url: &str,
    link_pattern: &str,
) -> Result<String> {
    let pattern = Regex::new(link_pattern)
        .with_context(|| format!("bad link pattern `{}`", link_pattern))?;

    let mut attempt = 0;
    // retry loop
    let html = loop {
        attempt += 1;
        match client.get(page_url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(html) => break html,
                Err(_) if attempt < MAX_RETRIES => {
                    warn!(attempt, "reading results page failed; retrying");
                    sleep(RETRY_DELAY).await;
                }
                Err(e) => return Err(e.into()),
            },
            Ok(resp) => bail!("HTTP error fetching `{}`: {}", page_url, resp.status()),
            Err(_) if attempt < MAX_RETRIES => {
                warn!(attempt, "fetching results page failed; retrying");
                sleep(RETRY_DELAY).await;
            }
            Err(e) => return Err(e.into()),
        }
    };

    let base = Url::parse(page_url)?;
    select_zip_link(&html, &base, &pattern).with_context(|| {
        format!("no ZIP link matching `{}` on `{}`", link_pattern, page_url)
    })
}

fn select_zip_link(html: &str, base: &Url, pattern: &Regex) -> Option<String> {
    let selector =
        Selector::parse(r#"a[href$=".zip"]"#).expect("CSS selector for ZIP links should be valid");
    Html::parse_document(html)
        .select(&selector)
        .filter_map(|e| e.value().attr("href"))
        .filter_map(|href| base.join(href).ok())
        .map(|u| u.to_string())
        .find(|u| {
            let name = u.rsplit('/').next().unwrap_or(u.as_str());
            pattern.is_match(name)
        })
}
