/// Primary language by ISO 3166-1 alpha-2 country code.
const COUNTRY_LANGUAGES: &[(&str, &str)] = &[
    ("AR", "es"),
    ("AT", "de"),
    ("BE", "fr"),
    ("BR", "pt"),
    ("CH", "de"),
    ("CL", "es"),
    ("CN", "zh"),
    ("CO", "es"),
    ("CZ", "cs"),
    ("DE", "de"),
    ("DK", "da"),
    ("EG", "ar"),
    ("ES", "es"),
    ("FI", "fi"),
    ("FR", "fr"),
    ("GR", "el"),
    ("HK", "zh"),
    ("HU", "hu"),
    ("ID", "id"),
    ("IL", "he"),
    ("IT", "it"),
    ("JP", "ja"),
    ("KR", "ko"),
    ("MA", "fr"),
    ("MX", "es"),
    ("NL", "nl"),
    ("NO", "no"),
    ("PE", "es"),
    ("PL", "pl"),
    ("PT", "pt"),
    ("RO", "ro"),
    ("RU", "ru"),
    ("SA", "ar"),
    ("SE", "sv"),
    ("TH", "th"),
    ("TR", "tr"),
    ("TW", "zh"),
    ("UA", "uk"),
    ("VN", "vi"),
];

const FALLBACK_LANG: &str = "en";

pub fn country_language(country_code: &str) -> Option<&'static str> {
    let upper = country_code.trim().to_ascii_uppercase();
    COUNTRY_LANGUAGES
        .iter()
        .find(|(cc, _)| *cc == upper)
        .map(|(_, lang)| *lang)
}

/// Reduce a language tag to its primary subtag (`"pt-BR"` → `"pt"`).
///
/// Returns `None` unless the subtag is 2-3 ASCII letters, so the result is
/// safe to interpolate into a host name such as `{lang}.wikipedia.org`.
pub fn normalize_lang(raw: &str) -> Option<String> {
    let primary = raw.trim().split(['-', '_']).next()?;
    let valid = (2..=3).contains(&primary.len())
        && primary.chars().all(|c| c.is_ascii_alphabetic());
    valid.then(|| primary.to_ascii_lowercase())
}

/// Ordered language fallback list: requested language, the country's
/// language, then English. Duplicates and invalid tags are dropped.
pub fn language_chain(lang: Option<&str>, country_code: Option<&str>) -> Vec<String> {
    let candidates = [
        lang.and_then(normalize_lang),
        country_code.and_then(country_language).map(str::to_string),
        Some(FALLBACK_LANG.to_string()),
    ];

    let mut chain: Vec<String> = Vec::with_capacity(candidates.len());
    for lang in candidates.into_iter().flatten() {
        if !chain.contains(&lang) {
            chain.push(lang);
        }
    }
    chain
}
