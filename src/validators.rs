//! Field-level validators applied at lesson-write time.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static YOUTUBE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://(www\.)?youtube\.com/.*").expect("valid pattern"));

/// Checks that a lesson video link points at YouTube.
///
/// An absent/empty URL passes (the field is optional). Otherwise the host
/// must be exactly `youtube.com` or `www.youtube.com` and the whole URL must
/// match `https?://(www.)?youtube.com/...`.
pub fn validate_youtube_link(link: &str) -> Result<(), String> {
    if link.is_empty() {
        return Ok(());
    }

    let host = Url::parse(link)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .unwrap_or_default();

    if host != "youtube.com" && host != "www.youtube.com" {
        return Err(format!(
            "Запрещена ссылка на {link}. Разрешены только ссылки на youtube.com"
        ));
    }

    if !YOUTUBE_PATTERN.is_match(link) {
        return Err(format!(
            "Некорректный формат ссылки {link}. Проверьте правильность URL"
        ));
    }

    Ok(())
}
