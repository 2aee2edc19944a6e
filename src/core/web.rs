//! Web page ingestion for chat context.

use std::time::Duration;

use super::error::{Error, Result};

const MAX_CONTENT_CHARS: usize = 50_000;

/// Fetch `url` and return its readable text.
///
/// # Errors
///
/// Returns [`Error::Validation`] for a non-http(s) URL and [`Error::NotFound`]
/// if the page cannot be fetched.
pub async fn fetch_page(url: &str) -> Result<String> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(Error::validation(format!("Unsupported URL: {url}")));
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent(crate::build_info::user_agent())
        .build()
        .map_err(|e| Error::Init(format!("failed to build HTTP client: {e}")))?;

    let response = client
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| {
            tracing::warn!(url = %url, error = %e, "failed to fetch page");
            Error::not_found(format!("No web content found for {url}"))
        })?;

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("text/plain")
        .to_string();

    let body = response
        .text()
        .await
        .map_err(|e| Error::not_found(format!("failed to read {url}: {e}")))?;

    let content = if content_type.contains("html") {
        html_to_text(&body)
    } else {
        body
    };

    Ok(truncate(content))
}

fn truncate(content: String) -> String {
    if content.chars().count() <= MAX_CONTENT_CHARS {
        return content;
    }
    let total = content.chars().count();
    let head: String = content.chars().take(MAX_CONTENT_CHARS).collect();
    format!("{head}\n\n[Content truncated - {total} characters total]")
}

/// Strip markup from an HTML document.
pub fn html_to_text(html: &str) -> String {
    // Remove script and style elements
    let text = if let Ok(re) = regex::Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>") {
        re.replace_all(html, "").into_owned()
    } else {
        html.to_string()
    };

    // Replace block elements with newlines
    let text = if let Ok(re) = regex::Regex::new(r"(?i)<(br|p|div|h[1-6]|li|tr|pre)[^>]*>") {
        re.replace_all(&text, "\n").into_owned()
    } else {
        text
    };

    let text = if let Ok(re) = regex::Regex::new(r"<[^>]+>") {
        re.replace_all(&text, "").into_owned()
    } else {
        text
    };

    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&");

    let text = if let Ok(re) = regex::Regex::new(r"[ \t]+") {
        re.replace_all(&text, " ").into_owned()
    } else {
        text
    };

    let text = if let Ok(re) = regex::Regex::new(r"\n\s*\n\s*\n+") {
        re.replace_all(&text, "\n\n").into_owned()
    } else {
        text
    };

    text.trim().to_string()
}
