//! Default-value contract for the configuration tree.
//!
//! An empty TOML document must deserialize into a fully working local
//! config; these tests pin the defaults other crates rely on.

use ah_domain::config::{HubConfig, ProviderKind};

#[test]
fn empty_toml_yields_defaults() {
    let cfg: HubConfig = toml::from_str("").unwrap();
    assert_eq!(cfg.llm.default_provider, "claude");
    assert_eq!(cfg.llm.providers.len(), 2);
    assert_eq!(cfg.memory.context_token_budget, 3000);
    assert_eq!(cfg.memory.flush_interval_secs, 30);
    assert_eq!(cfg.memory.index_ttl_secs, 300);
    assert_eq!(cfg.orchestration.max_concurrency, 5);
    assert_eq!(cfg.orchestration.subagent_timeout_secs, 300);
    assert_eq!(cfg.orchestration.max_agent_turns, 20);
}

#[test]
fn flush_interval_default_bounds_data_loss() {
    let cfg = HubConfig::default();
    assert!(cfg.memory.flush_interval_secs <= 60);
}

#[test]
fn tier_thresholds_defaults() {
    let cfg = HubConfig::default();
    let t = &cfg.memory.tiers;
    assert_eq!(t.demotion_utility, 0.15);
    assert_eq!(t.promotion_utility, 0.70);
    assert_eq!(t.min_loads_for_demotion, 50);
    assert_eq!(t.min_refs_for_promotion, 20);
    assert_eq!(t.grace_period_hours, 48);
    assert_eq!(t.min_age_days, 7);
    assert_eq!(t.ghost_ratio, 10.0);
}

#[test]
fn provider_defaults_cover_both_kinds() {
    let cfg = HubConfig::default();
    let kinds: Vec<ProviderKind> = cfg.llm.providers.iter().map(|p| p.kind).collect();
    assert!(kinds.contains(&ProviderKind::ClaudeCli));
    assert!(kinds.contains(&ProviderKind::Gemini));
}

#[test]
fn partial_toml_overrides_single_section() {
    let cfg: HubConfig = toml::from_str(
        r#"
        [memory]
        context_token_budget = 2000

        [orchestration]
        max_concurrency = 8
        "#,
    )
    .unwrap();
    assert_eq!(cfg.memory.context_token_budget, 2000);
    assert_eq!(cfg.orchestration.max_concurrency, 8);
    // Untouched sections keep defaults
    assert_eq!(cfg.memory.flush_interval_secs, 30);
    assert_eq!(cfg.llm.default_provider, "claude");
}
