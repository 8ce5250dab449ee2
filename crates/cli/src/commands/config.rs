use basketry_core::config::AppConfig;

/// Effective configuration as a JSON document; the run/maintenance commands
/// consume the same values, so this is the source of truth for operators.
pub fn run(config: &AppConfig) -> String {
    let payload = serde_json::json!({
        "database": {
            "url": config.database.url,
            "max_connections": config.database.max_connections,
            "timeout_secs": config.database.timeout_secs,
        },
        "engine": {
            "window_days": config.engine.window_days,
            "min_support": config.engine.min_support,
            "recency_weighting": config.engine.recency_weighting,
            "cross_category_boost": config.engine.cross_category_boost,
            "same_brand_penalty": config.engine.same_brand_penalty,
            "per_product_cap": config.engine.per_product_cap,
            "max_pairs": config.engine.max_pairs,
            "direct_max_line_items": config.engine.direct_max_line_items,
            "single_pass_max_line_items": config.engine.single_pass_max_line_items,
            "write_batch_size": config.engine.write_batch_size,
            "batch_retry_limit": config.engine.batch_retry_limit,
            "stale_max_age_days": config.engine.stale_max_age_days,
            "reapply_rules_after_batches": config.engine.reapply_rules_after_batches,
            "force_strategy": config.engine.force_strategy,
        },
        "logging": {
            "level": config.logging.level,
            "format": config.logging.format,
        },
    });

    serde_json::to_string_pretty(&payload).unwrap_or_else(|error| {
        format!("{{\"error\":\"failed to serialize configuration: {error}\"}}")
    })
}
