//! Author name recovery from Facebook page URLs.
//!
//! Page URLs conventionally end in a readable slug such as
//! `facebook.com/jane-doe-politiker`. When a row has no profile name we turn
//! that slug into a display name instead of dropping the post.

use percent_encoding::percent_decode_str;
use url::Url;

/// Trailing slug tokens that name the kind of page rather than the person.
const SUFFIX_TOKENS: &[&str] = &["official", "officiel", "page", "side", "fanpage", "fb"];

/// Derive a display name from the last path segment of `url`.
///
/// Returns `None` when there is no URL, no usable path segment, or nothing
/// left after stripping numeric ids and page-kind suffixes.
pub fn recover_profile(url: Option<&str>) -> Option<String> {
    let url = url.map(str::trim).filter(|u| !u.is_empty())?;
    let segment = last_segment(url)?;

    // profile.php?id=... style links carry no name at all
    if segment.to_lowercase().contains(".php") {
        return None;
    }

    let mut tokens: Vec<&str> = segment
        .split(['-', '_', '.'])
        .filter(|token| !token.is_empty())
        .collect();

    while let Some(last) = tokens.last() {
        if is_suffix_token(last) {
            tokens.pop();
        } else {
            break;
        }
    }

    if tokens.is_empty() {
        return None;
    }

    let name = tokens
        .iter()
        .map(|token| title_case(token))
        .collect::<Vec<_>>()
        .join(" ");

    Some(name)
}

fn last_segment(url: &str) -> Option<String> {
    match Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()?
            .filter(|segment| !segment.is_empty())
            .last()
            .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned()),
        // not an absolute url, treat it as a bare path
        Err(_) => url
            .split(['?', '#'])
            .next()?
            .split('/')
            .filter(|segment| !segment.is_empty())
            .last()
            .map(str::to_string),
    }
}

fn is_suffix_token(token: &str) -> bool {
    token.chars().all(|c| c.is_ascii_digit())
        || SUFFIX_TOKENS.contains(&token.to_lowercase().as_str())
}

fn title_case(token: &str) -> String {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hyphenated_slug() {
        assert_eq!(
            recover_profile(Some("https://www.facebook.com/jane-doe-politiker")),
            Some("Jane Doe Politiker".to_string())
        );
    }

    #[test]
    fn test_trailing_slash_and_query_ignored() {
        assert_eq!(
            recover_profile(Some("https://www.facebook.com/lars-hansen/?ref=page_internal")),
            Some("Lars Hansen".to_string())
        );
    }

    #[test]
    fn test_numeric_suffix_stripped() {
        assert_eq!(
            recover_profile(Some("https://www.facebook.com/mette-jensen-104738291")),
            Some("Mette Jensen".to_string())
        );
    }

    #[test]
    fn test_page_kind_suffix_stripped() {
        assert_eq!(
            recover_profile(Some("https://facebook.com/anders.berg.official")),
            Some("Anders Berg".to_string())
        );
        assert_eq!(
            recover_profile(Some("https://facebook.com/SofieLund-side-2")),
            Some("Sofielund".to_string())
        );
    }

    #[test]
    fn test_danish_letters_title_cased() {
        assert_eq!(
            recover_profile(Some("https://facebook.com/søren-ØSTERGAARD")),
            Some("Søren Østergaard".to_string())
        );
    }

    #[test]
    fn test_numeric_only_segment_fails() {
        assert_eq!(
            recover_profile(Some("https://www.facebook.com/pages/Foo/123456789")),
            None
        );
        assert_eq!(recover_profile(Some("https://www.facebook.com/123456789")), None);
    }

    #[test]
    fn test_profile_php_fails() {
        assert_eq!(
            recover_profile(Some("https://www.facebook.com/profile.php?id=1000123")),
            None
        );
    }

    #[test]
    fn test_no_segment_fails() {
        assert_eq!(recover_profile(Some("https://www.facebook.com/")), None);
        assert_eq!(recover_profile(Some("https://www.facebook.com")), None);
        assert_eq!(recover_profile(Some("   ")), None);
        assert_eq!(recover_profile(None), None);
    }

    #[test]
    fn test_bare_path() {
        assert_eq!(
            recover_profile(Some("facebook.com/karen-holm")),
            Some("Karen Holm".to_string())
        );
    }

    #[test]
    fn test_only_suffix_tokens_fails() {
        assert_eq!(recover_profile(Some("https://facebook.com/official-page-42")), None);
    }
}
