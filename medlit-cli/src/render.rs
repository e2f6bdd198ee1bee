//! Plain-text rendering of pipeline output.

use medlit_core::cache::CacheStats;
use medlit_core::pipeline::SearchTrace;
use medlit_core::{QueryAnalysis, RankedResultSet, Strategy};
use std::fmt::Write;

pub fn results(set: &RankedResultSet) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Strategy: {} (tier {})",
        set.strategy_used, set.fallback_tier_reached
    );
    if set.results.is_empty() {
        let _ = writeln!(out, "No results.");
        return out;
    }
    for (i, r) in set.results.iter().enumerate() {
        let year = r.record.year.map(|y| y.to_string()).unwrap_or_else(|| "n.d.".into());
        let _ = writeln!(out, "\n{:>2}. {}", i + 1, r.record.title);
        let _ = writeln!(
            out,
            "    {} ({}) · {} · {} citations{}",
            r.record.journal,
            year,
            r.record.source_name,
            r.record.citation_count,
            if r.record.is_open_access { " · open access" } else { "" }
        );
        let _ = writeln!(out, "    {}", r.rationale);
        if let Some(grade) = &r.grade {
            let _ = writeln!(out, "    GRADE certainty: {}", grade.overall);
        }
        if r.emergency {
            let _ = writeln!(out, "    (emergency fallback result)");
        }
        if !r.record.url.is_empty() {
            let _ = writeln!(out, "    {}", r.record.url);
        }
    }

    let i = &set.insights;
    let _ = writeln!(
        out,
        "\n{} results · {} high confidence · {} recent · {} open access · {:.1} avg citations",
        i.total_results,
        i.high_confidence_count,
        i.recent_count,
        i.open_access_count,
        i.average_citation_count
    );
    let sources: Vec<String> = i
        .source_breakdown
        .iter()
        .map(|(name, n)| format!("{name}: {n}"))
        .collect();
    let _ = writeln!(out, "Sources: {}", sources.join(", "));
    out
}

pub fn analysis(a: &QueryAnalysis) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Query type:  {}", a.query_type);
    let _ = writeln!(out, "Domain:      {}", a.domain);
    let _ = writeln!(out, "Complexity:  {:?}", a.complexity);
    if let Some(p) = a.population_focus {
        let _ = writeln!(out, "Population:  {p:?}");
    }
    if let Some(e) = a.evidence_focus {
        let _ = writeln!(out, "Evidence:    {e:?}");
    }
    if !a.concepts.is_empty() {
        let _ = writeln!(out, "Concepts:    {}", a.concepts.join(", "));
    }
    if !a.mesh_headings.is_empty() {
        let _ = writeln!(out, "MeSH:        {}", a.mesh_headings.join(", "));
    }
    out
}

pub fn strategy(s: &Strategy) -> String {
    let mut out = String::new();
    for (i, tier) in s.tiers.iter().enumerate() {
        let _ = writeln!(
            out,
            "\nTier {}: {} (threshold {:.0})",
            i + 1,
            tier.name,
            tier.relevance_threshold
        );
        let _ = writeln!(out, "  sources: {}", tier.sources.join(", "));
        for variant in &tier.query_variants {
            let _ = writeln!(out, "  query:   {variant}");
        }
    }
    out
}

pub fn trace(t: &SearchTrace) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\nTrace {}", t.request_id);
    for step in &t.transitions {
        let tier = step
            .tier
            .map(|n| format!("tier {n}"))
            .unwrap_or_else(|| "request".into());
        match step.mean_score {
            Some(mean) => {
                let _ = writeln!(
                    out,
                    "  {tier:<8} {:?} ({} records, mean {mean:.1})",
                    step.state, step.records
                );
            }
            None => {
                let _ = writeln!(out, "  {tier:<8} {:?}", step.state);
            }
        }
    }
    out
}

pub fn cache_stats(stats: &CacheStats) -> String {
    format!(
        "  term cache: {} entries, {} hits, {} misses\n",
        stats.entries, stats.hits, stats.misses
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use medlit_core::strategy::SearchTier;
    use medlit_core::{EMERGENCY_STRATEGY, QueryAnalysis};

    #[test]
    fn test_empty_results() {
        let text = results(&RankedResultSet::empty_emergency(4));
        assert!(text.contains(EMERGENCY_STRATEGY));
        assert!(text.contains("tier 4"));
        assert!(text.contains("No results."));
    }

    #[test]
    fn test_strategy_lists_tiers() {
        let s = Strategy {
            tiers: vec![SearchTier {
                name: "High-Precision Search".into(),
                sources: vec!["pubmed".into()],
                query_variants: vec!["\"Asthma\"[MeSH Terms]".into()],
                relevance_threshold: 85.0,
            }],
        };
        let text = strategy(&s);
        assert!(text.contains("Tier 1: High-Precision Search (threshold 85)"));
        assert!(text.contains("sources: pubmed"));
    }

    #[test]
    fn test_cache_stats_line() {
        let stats = CacheStats {
            entries: 12,
            hits: 30,
            misses: 12,
        };
        assert_eq!(
            cache_stats(&stats),
            "  term cache: 12 entries, 30 hits, 12 misses\n"
        );
    }

    #[test]
    fn test_analysis_omits_empty_sections() {
        let text = analysis(&QueryAnalysis::general());
        assert!(text.contains("Query type:  general"));
        assert!(!text.contains("MeSH"));
    }
}
