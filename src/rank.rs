//! Cross-source deduplication and trust ranking.

use std::collections::HashMap;

use url::Url;

use crate::config::TrustWeights;
use crate::sources::{Citation, SourceType};

/// Host suffixes treated as government-operated.
const GOV_SUFFIXES: &[&str] = &["gov", "gc.ca", "go.jp"];

/// Canonical form used as the deduplication key: parsed, fragment removed.
pub fn normalize_url(raw: &str) -> String {
    let raw = raw.trim();
    match Url::parse(raw) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.into()
        }
        Err(_) => raw.split('#').next().unwrap_or_default().to_string(),
    }
}

/// `.gov`, `.gc.ca`, `.go.jp`, and `gov.<cc>` hosts such as `gov.uk`.
pub fn is_gov_host(host: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    if GOV_SUFFIXES
        .iter()
        .any(|suffix| host == *suffix || host.ends_with(&format!(".{suffix}")))
    {
        return true;
    }
    let labels: Vec<&str> = host.split('.').collect();
    matches!(labels.as_slice(), [.., "gov", cc] if cc.len() == 2)
}

fn has_gov_host(raw: &str) -> bool {
    Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(is_gov_host))
        .unwrap_or(false)
}

/// Trust score for one citation.
///
/// Only the catch-all category honours a score already present on the citation.
pub fn trust_score(citation: &Citation, weights: &TrustWeights) -> u32 {
    if citation.source_type == SourceType::Official || has_gov_host(&citation.url) {
        return weights.official;
    }
    match citation.source_type {
        SourceType::Gov => weights.gov,
        SourceType::Wikivoyage => weights.wikivoyage,
        SourceType::Wikipedia => weights.wikipedia,
        SourceType::Wikidata => weights.wikidata,
        SourceType::Official | SourceType::Poi => citation.score.unwrap_or(weights.other),
    }
}

/// Deduplicate by normalized URL, score, sort by descending score, keep `limit`.
///
/// A duplicate keeps the position of its first occurrence; if the later copy
/// scores higher it replaces the earlier one in that position. Equal scores
/// keep insertion order, so ranking an already-ranked list is a no-op.
pub fn rank(citations: Vec<Citation>, limit: usize, weights: &TrustWeights) -> Vec<Citation> {
    let mut ranked: Vec<Citation> = Vec::with_capacity(citations.len());
    let mut seen: HashMap<String, usize> = HashMap::new();

    for mut citation in citations {
        citation.score = Some(trust_score(&citation, weights));
        let key = normalize_url(&citation.url);
        match seen.get(&key) {
            Some(&i) => {
                if citation.score > ranked[i].score {
                    ranked[i] = citation;
                }
            }
            None => {
                seen.insert(key, ranked.len());
                ranked.push(citation);
            }
        }
    }

    ranked.sort_by(|a, b| b.score.cmp(&a.score));
    ranked.truncate(limit);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::SourceType::{Gov, Official, Poi, Wikidata, Wikipedia, Wikivoyage};

    const VOYAGE: &str = "https://en.wikivoyage.org/wiki/Kyoto";
    const WIKI: &str = "https://en.wikipedia.org/wiki/Kyoto";

    fn cite(url: &str, source_type: SourceType) -> Citation {
        Citation::new(url, url, source_type)
    }

    fn urls(citations: &[Citation]) -> Vec<&str> {
        citations.iter().map(|c| c.url.as_str()).collect()
    }

    fn w() -> TrustWeights {
        TrustWeights::default()
    }

    #[test]
    fn normalize_strips_fragment_and_canonicalizes() {
        assert_eq!(
            normalize_url("HTTPS://EN.Wikipedia.org/wiki/Kyoto#History"),
            WIKI
        );
        assert_eq!(
            normalize_url("https://kyoto.travel"),
            "https://kyoto.travel/"
        );
        assert_eq!(normalize_url("not a url#frag"), "not a url");
    }

    #[test]
    fn gov_hosts_are_detected() {
        assert!(is_gov_host("www.nps.gov"));
        assert!(is_gov_host("travel.gc.ca"));
        assert!(is_gov_host("www.mofa.go.jp"));
        assert!(is_gov_host("www.gov.uk"));
        assert!(!is_gov_host("governance.com"));
        assert!(!is_gov_host("kyoto.travel"));
    }

    #[test]
    fn scores_follow_trust_table() {
        let table = [
            (cite("https://kyoto.travel/", Official), 100),
            (cite("https://www.nps.gov/yose/", Poi), 100),
            (cite("https://example.org/visa", Gov), 95),
            (cite(VOYAGE, Wikivoyage), 90),
            (cite(WIKI, Wikipedia), 85),
            (cite("https://www.wikidata.org/wiki/Q1", Wikidata), 80),
            (cite("https://opentripmap.com/en/card/N1", Poi), 60),
        ];
        for (citation, expected) in table {
            assert_eq!(trust_score(&citation, &w()), expected, "{}", citation.url);
        }
    }

    #[test]
    fn catch_all_respects_existing_score() {
        let mut poi = cite("https://opentripmap.com/en/card/N1", Poi);
        poi.score = Some(70);
        assert_eq!(trust_score(&poi, &w()), 70);

        let mut wiki = cite(WIKI, Wikipedia);
        wiki.score = Some(1);
        assert_eq!(trust_score(&wiki, &w()), 85);
    }

    #[test]
    fn ranks_wikivoyage_above_wikipedia() {
        let input = vec![cite(WIKI, Wikipedia), cite(VOYAGE, Wikivoyage)];

        let ranked = rank(input, 3, &w());

        assert_eq!(urls(&ranked), [VOYAGE, WIKI]);
        assert_eq!(ranked[0].score, Some(90));
        assert_eq!(ranked[1].score, Some(85));
    }

    #[test]
    fn duplicates_by_fragment_collapse() {
        let climate = format!("{WIKI}#Climate");
        let upper_host = "https://EN.wikipedia.org/wiki/Kyoto#History";
        let input = vec![
            cite(&climate, Wikipedia),
            cite(WIKI, Wikipedia),
            cite(upper_host, Wikipedia),
        ];

        let ranked = rank(input, 10, &w());

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].url, climate);
    }

    #[test]
    fn higher_scoring_duplicate_replaces_earlier_copy() {
        let input = vec![
            cite("https://kyoto.travel/", Poi),
            cite(VOYAGE, Wikivoyage),
            cite("https://kyoto.travel", Official),
        ];

        let ranked = rank(input, 10, &w());

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].source_type, Official);
        assert_eq!(ranked[0].score, Some(100));
    }

    #[test]
    fn truncates_to_limit_and_keeps_all_when_under() {
        let input: Vec<_> = (0..6)
            .map(|i| cite(&format!("https://example.org/{i}"), Poi))
            .collect();

        assert_eq!(rank(input.clone(), 4, &w()).len(), 4);
        assert_eq!(rank(input.clone(), 6, &w()).len(), 6);
        assert_eq!(rank(input, 10, &w()).len(), 6);
    }

    #[test]
    fn equal_scores_keep_insertion_order() {
        let input = vec![
            cite("https://b.example/", Poi),
            cite("https://a.example/", Poi),
            cite("https://c.example/", Poi),
        ];

        let ranked = rank(input, 10, &w());

        assert_eq!(
            urls(&ranked),
            [
                "https://b.example/",
                "https://a.example/",
                "https://c.example/"
            ]
        );
    }

    #[test]
    fn ranking_is_idempotent() {
        let input = vec![
            cite("https://opentripmap.com/en/card/N1", Poi),
            cite(WIKI, Wikipedia),
            cite("https://kyoto.travel/#top", Official),
            cite("https://www.city.kyoto.lg.jp/", Official),
            cite("https://kyoto.travel/", Poi),
            cite(VOYAGE, Wikivoyage),
        ];

        let once = rank(input, 5, &w());
        let twice = rank(once.clone(), 5, &w());
        assert_eq!(once, twice);
    }

    #[test]
    fn custom_weights_change_order() {
        let weights = TrustWeights {
            wikipedia: 99,
            ..TrustWeights::default()
        };
        let input = vec![cite(VOYAGE, Wikivoyage), cite(WIKI, Wikipedia)];

        let ranked = rank(input, 5, &weights);

        assert_eq!(ranked[0].source_type, Wikipedia);
    }
}
