use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::form::Localize;

mod generated {
    include!(concat!(env!("OUT_DIR"), "/formwork_i18n_generated.rs"));
}

#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub enum Locale {
    #[default]
    System,
    Tag(String),
}

impl From<String> for Locale {
    fn from(value: String) -> Self {
        if value.trim().eq_ignore_ascii_case("system") {
            return Self::System;
        }
        Self::Tag(value.trim().to_string())
    }
}

impl From<&str> for Locale {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

/// Message catalog plus the active locale. Clones share the locale, and
/// every locale switch is broadcast on [`I18nManager::locale_changes`].
#[derive(Clone)]
pub struct I18nManager {
    catalog: Arc<I18nCatalog>,
    locale: Arc<watch::Sender<Locale>>,
}

impl Default for I18nManager {
    fn default() -> Self {
        Self::new()
    }
}

impl I18nManager {
    pub fn new() -> Self {
        Self {
            catalog: Arc::new(I18nCatalog::load()),
            locale: Arc::new(watch::channel(Locale::System).0),
        }
    }

    pub fn locale(&self) -> Locale {
        self.locale.borrow().clone()
    }

    pub fn set_locale(&self, locale: impl Into<Locale>) {
        self.locale.send_replace(locale.into());
    }

    /// Locales set after this call. The current one is not replayed.
    pub fn locale_changes(&self) -> WatchStream<Locale> {
        WatchStream::from_changes(self.locale.subscribe())
    }

    pub fn default_locale(&self) -> &'static str {
        self.catalog.default_locale
    }

    pub fn resolved_locale(&self) -> &'static str {
        self.catalog
            .resolve_locale(self.requested_locale().as_deref())
    }

    pub fn available_locales(&self) -> Vec<&'static str> {
        let mut locales = self.catalog.locales.keys().copied().collect::<Vec<_>>();
        locales.sort_unstable();
        locales
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    pub fn t(&self, key: &str) -> String {
        self.lookup(key).unwrap_or(key).to_string()
    }

    pub fn t_with(&self, key: &str, params: &[(&str, &str)]) -> String {
        let raw = self.lookup(key).unwrap_or(key);
        if params.is_empty() {
            return raw.to_string();
        }
        format_template(raw, params)
    }

    fn requested_locale(&self) -> Option<String> {
        match self.locale() {
            Locale::System => sys_locale::get_locale(),
            Locale::Tag(tag) => Some(tag),
        }
    }

    fn lookup(&self, key: &str) -> Option<&'static str> {
        let resolved = self.resolved_locale();
        self.catalog
            .lookup(resolved, key)
            .or_else(|| self.catalog.lookup(self.catalog.default_locale, key))
    }
}

impl Localize for I18nManager {
    fn translate(&self, key: &str, params: &[(&str, &str)]) -> String {
        self.t_with(key, params)
    }
}

struct I18nCatalog {
    default_locale: &'static str,
    locales: HashMap<&'static str, HashMap<&'static str, &'static str>>,
    normalized_locale_lookup: HashMap<String, &'static str>,
    language_lookup: HashMap<String, &'static str>,
}

impl I18nCatalog {
    fn load() -> Self {
        let mut locales = HashMap::new();
        let mut normalized_locale_lookup = HashMap::new();
        let mut language_lookup = HashMap::new();
        let mut ambiguous_languages = HashSet::new();

        for (locale, entries) in generated::LOCALES.iter().copied() {
            let normalized = normalize_locale_tag(locale);
            normalized_locale_lookup.insert(normalized.clone(), locale);

            let language = normalized.split('-').next().unwrap_or_default().to_string();
            if let Some(existing) = language_lookup.get(&language) {
                if *existing != locale {
                    ambiguous_languages.insert(language.clone());
                }
            } else {
                language_lookup.insert(language, locale);
            }

            locales.insert(locale, entries.iter().copied().collect::<HashMap<_, _>>());
        }

        for language in ambiguous_languages {
            language_lookup.remove(&language);
        }

        if !locales.contains_key(generated::DEFAULT_LOCALE) {
            locales.insert(generated::DEFAULT_LOCALE, HashMap::new());
            let normalized = normalize_locale_tag(generated::DEFAULT_LOCALE);
            let language = normalized.split('-').next().unwrap_or_default().to_string();
            normalized_locale_lookup.insert(normalized, generated::DEFAULT_LOCALE);
            language_lookup
                .entry(language)
                .or_insert(generated::DEFAULT_LOCALE);
        }

        Self {
            default_locale: generated::DEFAULT_LOCALE,
            locales,
            normalized_locale_lookup,
            language_lookup,
        }
    }

    fn resolve_locale(&self, requested: Option<&str>) -> &'static str {
        let Some(requested) = requested else {
            return self.default_locale;
        };

        let normalized = normalize_locale_tag(requested);
        if let Some(locale) = self.normalized_locale_lookup.get(&normalized) {
            return locale;
        }

        let language = normalized.split('-').next().unwrap_or_default();
        if let Some(locale) = self.language_lookup.get(language) {
            return locale;
        }

        self.default_locale
    }

    fn lookup(&self, locale: &'static str, key: &str) -> Option<&'static str> {
        self.locales
            .get(locale)
            .and_then(|entries| entries.get(key).copied())
    }
}

fn normalize_locale_tag(tag: &str) -> String {
    let trimmed = tag.trim();
    let without_encoding = trimmed.split('.').next().unwrap_or(trimmed);
    let without_variant = without_encoding
        .split('@')
        .next()
        .unwrap_or(without_encoding);
    without_variant
        .replace('_', "-")
        .split('-')
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

/// Replaces `{name}` tokens. Unknown tokens and unclosed braces are kept.
fn format_template(template: &str, params: &[(&str, &str)]) -> String {
    let values = params.iter().copied().collect::<HashMap<&str, &str>>();
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        output.push_str(&rest[..open]);
        let after_open = &rest[open + 1..];
        let Some(close) = after_open.find('}') else {
            output.push_str(&rest[open..]);
            return output;
        };
        let token = &after_open[..close];
        match values.get(token) {
            Some(value) => output.push_str(value),
            None => output.push_str(&rest[open..open + close + 2]),
        }
        rest = &after_open[close + 1..];
    }

    output.push_str(rest);
    output
}

#[cfg(test)]
mod tests {
    use super::{I18nManager, Locale, format_template};
    use crate::form::{ErrorDisplay, ErrorSet, params, render};
    use futures::{FutureExt, StreamExt};
    use tokio::sync::watch;
    use tokio_stream::wrappers::WatchStream;

    #[test]
    fn missing_translation_shows_key() {
        let i18n = I18nManager::new();
        i18n.set_locale("de-CH");
        assert_eq!(i18n.t("validation.unheardOf"), "validation.unheardOf");
    }

    #[test]
    fn missing_locale_entry_falls_back_to_default_locale() {
        let i18n = I18nManager::new();
        i18n.set_locale("de-CH");
        assert_eq!(i18n.t("demo.onlyEnglish"), "Only in English");
    }

    #[test]
    fn supports_locale_tag_normalization() {
        let i18n = I18nManager::new();
        i18n.set_locale("de_CH.UTF-8");
        assert_eq!(i18n.resolved_locale(), "de-CH");
        assert_eq!(i18n.t("common.confirm"), "Bestätigen");
    }

    #[test]
    fn falls_back_by_language_then_default() {
        let i18n = I18nManager::new();
        i18n.set_locale("fr");
        assert_eq!(i18n.resolved_locale(), "fr-CH");
        i18n.set_locale("ja-JP");
        assert_eq!(i18n.resolved_locale(), i18n.default_locale());
    }

    #[test]
    fn supports_placeholder_interpolation() {
        let i18n = I18nManager::new();
        i18n.set_locale("en-US");
        assert_eq!(
            i18n.t_with("validation.minLength", &[("requiredLength", "8")]),
            "Enter at least 8 characters"
        );
    }

    #[test]
    fn template_keeps_unknown_tokens_and_unclosed_braces() {
        assert_eq!(format_template("a {x} b {y}", &[("x", "1")]), "a 1 b {y}");
        assert_eq!(format_template("tail {open", &[("open", "1")]), "tail {open");
        assert_eq!(format_template("{x}{x}", &[("x", "ab")]), "abab");
    }

    #[test]
    fn locale_changes_only_report_new_locales() {
        let i18n = I18nManager::new();
        i18n.set_locale("en-US");
        let mut changes = i18n.locale_changes();
        assert_eq!(changes.next().now_or_never(), None);
        i18n.set_locale("it-CH");
        assert_eq!(
            changes.next().now_or_never(),
            Some(Some(Locale::Tag("it-CH".to_string())))
        );
    }

    #[test]
    fn renders_field_errors_in_the_active_language() {
        let i18n = I18nManager::new();
        let errors = ErrorSet::single("validation", params([("message", "Kaputt")]));
        i18n.set_locale("de-CH");
        assert_eq!(render(&errors, &i18n), "Kaputt");

        let required = ErrorSet::single("required", Default::default());
        assert_eq!(render(&required, &i18n), "Dieses Feld ist erforderlich");
        i18n.set_locale("en-US");
        assert_eq!(render(&required, &i18n), "This field is required");
    }

    #[test]
    fn error_display_follows_locale_switches() {
        let i18n = I18nManager::new();
        i18n.set_locale("en-US");
        let (_errors, errors_rx) = watch::channel(ErrorSet::single("required", Default::default()));
        let mut display = ErrorDisplay::new(
            WatchStream::new(errors_rx),
            i18n.locale_changes(),
            i18n.clone(),
        );
        assert_eq!(
            display.next().now_or_never(),
            Some(Some("This field is required".to_string()))
        );

        i18n.set_locale("de-CH");
        assert_eq!(
            display.next().now_or_never(),
            Some(Some("Dieses Feld ist erforderlich".to_string()))
        );
    }
}
