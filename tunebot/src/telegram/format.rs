//! Telegram HTML helpers.
//!
//! Messages are sent with `parse_mode: HTML`; anything that came from a user
//! or a provider (queries, titles, artists) must go through [`escape`].

use regex::Regex;
use std::sync::LazyLock;

static TAG_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"</?[a-z]+>").ok());

/// Escape text for an HTML-mode message body.
pub fn escape(text: &str) -> String {
    html_escape::encode_text(text).into_owned()
}

/// `<b>escaped</b>`
pub fn bold(text: &str) -> String {
    format!("<b>{}</b>", escape(text))
}

/// Convert an HTML-mode body back to plain text for the no-parse-mode retry.
pub fn to_plain(html: &str) -> String {
    let stripped = match TAG_RE.as_ref() {
        Some(re) => re.replace_all(html, "").into_owned(),
        None => html.to_string(),
    };
    html_escape::decode_html_entities(&stripped).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_special_chars() {
        assert_eq!(escape("Rock & Roll <live>"), "Rock &amp; Roll &lt;live&gt;");
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn bold_escapes_content() {
        assert_eq!(bold("AC/DC & co"), "<b>AC/DC &amp; co</b>");
    }

    #[test]
    fn to_plain_round_trips_user_text() {
        let html = format!("Results for {} (page 1/2)", bold("Tom & Jerry <3"));
        assert_eq!(to_plain(&html), "Results for Tom & Jerry <3 (page 1/2)");
    }
}
