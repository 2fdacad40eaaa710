use std::env;
use std::fs;
use std::path::Path;

use jisfast_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let weights = &config.routing.weights;
    let pricing = &config.pricing;
    let settings = vec![
        setting("database.url", config.database.url.clone(), &["JISFAST_DATABASE_URL"]),
        setting(
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["JISFAST_DATABASE_MAX_CONNECTIONS"],
        ),
        setting(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["JISFAST_DATABASE_TIMEOUT_SECS"],
        ),
        setting(
            "logging.level",
            config.logging.level.clone(),
            &["JISFAST_LOGGING_LEVEL", "JISFAST_LOG_LEVEL"],
        ),
        setting(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["JISFAST_LOGGING_FORMAT", "JISFAST_LOG_FORMAT"],
        ),
        setting("routing.enabled", config.routing.enabled.to_string(), &["JISFAST_ROUTING_ENABLED"]),
        setting(
            "routing.strategy",
            config.routing.strategy.as_str().to_string(),
            &["JISFAST_ROUTING_STRATEGY"],
        ),
        setting("routing.weights.cost", weights.cost.to_string(), &["JISFAST_ROUTING_WEIGHT_COST"]),
        setting("routing.weights.lead", weights.lead.to_string(), &["JISFAST_ROUTING_WEIGHT_LEAD"]),
        setting(
            "routing.weights.availability",
            weights.availability.to_string(),
            &["JISFAST_ROUTING_WEIGHT_AVAILABILITY"],
        ),
        setting("routing.weights.match", weights.matching.to_string(), &["JISFAST_ROUTING_WEIGHT_MATCH"]),
        setting("pricing.fee_rate", pricing.fee_rate.to_string(), &["JISFAST_PRICING_FEE_RATE"]),
        setting(
            "pricing.fixed_fee_cents",
            pricing.fixed_fee_cents.to_string(),
            &["JISFAST_PRICING_FIXED_FEE_CENTS"],
        ),
        setting(
            "pricing.handling_small_cents",
            pricing.handling_small_cents.to_string(),
            &["JISFAST_PRICING_HANDLING_SMALL_CENTS"],
        ),
        setting(
            "pricing.handling_standard_cents",
            pricing.handling_standard_cents.to_string(),
            &["JISFAST_PRICING_HANDLING_STANDARD_CENTS"],
        ),
        setting(
            "pricing.cost_basis_window_days",
            pricing.cost_basis_window_days.to_string(),
            &["JISFAST_PRICING_COST_BASIS_WINDOW_DAYS"],
        ),
        setting(
            "pricing.reprice_limit",
            pricing.reprice_limit.to_string(),
            &["JISFAST_PRICING_REPRICE_LIMIT"],
        ),
        setting(
            "pricing.default_rule.target_margin",
            pricing.default_rule.target_margin.to_string(),
            &["JISFAST_PRICING_TARGET_MARGIN"],
        ),
        setting(
            "pricing.default_rule.rounding",
            pricing.default_rule.rounding.as_str().to_string(),
            &["JISFAST_PRICING_ROUNDING"],
        ),
        setting(
            "pricing.default_rule.max_weekly_change",
            pricing.default_rule.max_weekly_change.to_string(),
            &["JISFAST_PRICING_MAX_WEEKLY_CHANGE"],
        ),
        setting(
            "shipping.extra_band_surcharge_cents",
            config.shipping.extra_band_surcharge_cents.to_string(),
            &["JISFAST_SHIPPING_EXTRA_BAND_SURCHARGE_CENTS"],
        ),
    ];

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(
        settings
            .into_iter()
            .map(|entry| render_line(entry.key, &entry.value, source(entry.key, entry.env_keys))),
    );
    lines.join("\n")
}

struct Setting {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

fn setting(key: &'static str, value: String, env_keys: &'static [&'static str]) -> Setting {
    Setting { key, value, env_keys }
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
