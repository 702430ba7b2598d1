//! Locale fallback chain helpers.
//!
//! Metadata providers return better synopses when queried in the library
//! owner's language, but coverage is uneven. Lookups therefore walk an
//! ordered chain of locales: the primary language first, then a related
//! language, then English as the universal fallback.

/// Locale appended to every chain as the final fallback.
pub const FALLBACK_LOCALE: &str = "en";

/// Build the default locale fallback chain for a primary locale.
///
/// The chain is: primary locale, related locale(s) sharing a language family,
/// then `"en"`. Duplicates are removed while preserving order, so a primary
/// locale of `"en"` yields just `["en"]`.
///
/// # Examples
///
/// ```
/// use framevault_common::locale::default_locale_chain;
///
/// assert_eq!(default_locale_chain("zh-TW"), vec!["zh-TW", "zh-CN", "en"]);
/// assert_eq!(default_locale_chain("en"), vec!["en"]);
/// ```
pub fn default_locale_chain(primary: &str) -> Vec<String> {
    let mut chain: Vec<String> = vec![primary.to_string()];
    for related in related_locales(primary) {
        chain.push(related.to_string());
    }
    chain.push(FALLBACK_LOCALE.to_string());
    dedup_preserving_order(chain)
}

/// Locales related to `primary` by language family, tried before English.
fn related_locales(primary: &str) -> &'static [&'static str] {
    match primary {
        "zh-TW" | "zh-HK" => &["zh-CN"],
        "zh-CN" => &["zh-TW"],
        "pt-BR" => &["pt-PT"],
        "pt-PT" => &["pt-BR"],
        _ => &[],
    }
}

fn dedup_preserving_order(locales: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(locales.len());
    for locale in locales {
        if !locale.is_empty() && !out.contains(&locale) {
            out.push(locale);
        }
    }
    out
}

/// Normalize a caller-supplied chain, substituting the default chain when the
/// list is empty or contains only blank entries.
pub fn normalize_chain(locales: &[String], primary: &str) -> Vec<String> {
    let cleaned = dedup_preserving_order(locales.to_vec());
    if cleaned.is_empty() {
        default_locale_chain(primary)
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_for_traditional_chinese() {
        assert_eq!(default_locale_chain("zh-TW"), vec!["zh-TW", "zh-CN", "en"]);
    }

    #[test]
    fn chain_for_english_collapses() {
        assert_eq!(default_locale_chain("en"), vec!["en"]);
    }

    #[test]
    fn chain_for_unrelated_language() {
        assert_eq!(default_locale_chain("ja"), vec!["ja", "en"]);
    }

    #[test]
    fn normalize_empty_substitutes_default() {
        assert_eq!(normalize_chain(&[], "zh-TW"), vec!["zh-TW", "zh-CN", "en"]);
        let blanks = vec![String::new()];
        assert_eq!(normalize_chain(&blanks, "ja"), vec!["ja", "en"]);
    }

    #[test]
    fn normalize_keeps_explicit_chain() {
        let chain = vec!["ko".to_string(), "en".to_string()];
        assert_eq!(normalize_chain(&chain, "zh-TW"), vec!["ko", "en"]);
    }

    #[test]
    fn normalize_drops_duplicates() {
        let chain = vec!["en".to_string(), "en".to_string(), "ja".to_string()];
        assert_eq!(normalize_chain(&chain, "en"), vec!["en", "ja"]);
    }
}
