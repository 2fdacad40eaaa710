use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pricing::{
    DefaultRuleSettings, FeeSchedule, RepriceSettings, RoundingStrategy, DEFAULT_REPRICE_LIMIT,
    MAX_REPRICE_LIMIT,
};
use crate::procurement::{RoutingConfig, RoutingStrategy, RoutingWeights};
use crate::shipping::DEFAULT_EXTRA_BAND_SURCHARGE_CENTS;

pub const DEFAULT_CONFIG_FILE: &str = "jisfast.toml";
pub const NESTED_CONFIG_FILE: &str = "config/jisfast.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub routing: RoutingConfig,
    pub pricing: PricingConfig,
    pub shipping: ShippingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PricingConfig {
    pub fee_rate: Decimal,
    pub fixed_fee_cents: i64,
    pub handling_small_cents: i64,
    pub handling_standard_cents: i64,
    pub cost_basis_window_days: u32,
    pub reprice_limit: u32,
    pub default_rule: DefaultRuleSettings,
}

impl PricingConfig {
    pub fn reprice_settings(&self) -> RepriceSettings {
        RepriceSettings {
            fees: FeeSchedule { fee_rate: self.fee_rate, fixed_fee_cents: self.fixed_fee_cents },
            handling_small_cents: self.handling_small_cents,
            handling_standard_cents: self.handling_standard_cents,
            cost_basis_window_days: self.cost_basis_window_days,
            default_rule: self.default_rule.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShippingConfig {
    pub extra_band_surcharge_cents: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub routing_enabled: Option<bool>,
    pub routing_strategy: Option<RoutingStrategy>,
    pub reprice_limit: Option<u32>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://jisfast.db?mode=rwc".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            routing: RoutingConfig::default(),
            pricing: PricingConfig {
                fee_rate: FeeSchedule::default().fee_rate,
                fixed_fee_cents: FeeSchedule::default().fixed_fee_cents,
                handling_small_cents: 150,
                handling_standard_cents: 250,
                cost_basis_window_days: 30,
                reprice_limit: DEFAULT_REPRICE_LIMIT,
                default_rule: DefaultRuleSettings::default(),
            },
            shipping: ShippingConfig {
                extra_band_surcharge_cents: DEFAULT_EXTRA_BAND_SURCHARGE_CENTS,
            },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        if let Some(routing) = patch.routing {
            if let Some(enabled) = routing.enabled {
                self.routing.enabled = enabled;
            }
            if let Some(strategy) = routing.strategy {
                self.routing.strategy = strategy;
            }
            if let Some(weights) = routing.weights {
                let current = &mut self.routing.weights;
                current.cost = weights.cost.unwrap_or(current.cost);
                current.lead = weights.lead.unwrap_or(current.lead);
                current.availability = weights.availability.unwrap_or(current.availability);
                current.matching = weights.matching.unwrap_or(current.matching);
            }
        }

        if let Some(pricing) = patch.pricing {
            if let Some(fee_rate) = pricing.fee_rate {
                self.pricing.fee_rate = fee_rate;
            }
            if let Some(fixed_fee_cents) = pricing.fixed_fee_cents {
                self.pricing.fixed_fee_cents = fixed_fee_cents;
            }
            if let Some(handling_small_cents) = pricing.handling_small_cents {
                self.pricing.handling_small_cents = handling_small_cents;
            }
            if let Some(handling_standard_cents) = pricing.handling_standard_cents {
                self.pricing.handling_standard_cents = handling_standard_cents;
            }
            if let Some(cost_basis_window_days) = pricing.cost_basis_window_days {
                self.pricing.cost_basis_window_days = cost_basis_window_days;
            }
            if let Some(reprice_limit) = pricing.reprice_limit {
                self.pricing.reprice_limit = reprice_limit;
            }
            if let Some(rule) = pricing.default_rule {
                let current = &mut self.pricing.default_rule;
                if let Some(target_margin) = rule.target_margin {
                    current.target_margin = target_margin;
                }
                if let Some(rounding) = rule.rounding {
                    current.rounding = rounding;
                }
                if let Some(max_weekly_change) = rule.max_weekly_change {
                    current.max_weekly_change = max_weekly_change;
                }
                if let Some(min_price_cents) = rule.min_price_cents {
                    current.min_price_cents = Some(min_price_cents);
                }
                if let Some(max_price_cents) = rule.max_price_cents {
                    current.max_price_cents = Some(max_price_cents);
                }
            }
        }

        if let Some(shipping) = patch.shipping {
            if let Some(surcharge) = shipping.extra_band_surcharge_cents {
                self.shipping.extra_band_surcharge_cents = surcharge;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("JISFAST_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("JISFAST_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_env("JISFAST_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("JISFAST_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("JISFAST_DATABASE_TIMEOUT_SECS", &value)?;
        }

        let log_level = read_env("JISFAST_LOGGING_LEVEL").or_else(|| read_env("JISFAST_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("JISFAST_LOGGING_FORMAT").or_else(|| read_env("JISFAST_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        if let Some(value) = read_env("JISFAST_ROUTING_ENABLED") {
            self.routing.enabled = parse_env("JISFAST_ROUTING_ENABLED", &value)?;
        }
        if let Some(value) = read_env("JISFAST_ROUTING_STRATEGY") {
            self.routing.strategy = parse_env("JISFAST_ROUTING_STRATEGY", &value)?;
        }
        let weights = &mut self.routing.weights;
        for (key, slot) in [
            ("JISFAST_ROUTING_WEIGHT_COST", &mut weights.cost),
            ("JISFAST_ROUTING_WEIGHT_LEAD", &mut weights.lead),
            ("JISFAST_ROUTING_WEIGHT_AVAILABILITY", &mut weights.availability),
            ("JISFAST_ROUTING_WEIGHT_MATCH", &mut weights.matching),
        ] {
            if let Some(value) = read_env(key) {
                *slot = parse_env(key, &value)?;
            }
        }

        if let Some(value) = read_env("JISFAST_PRICING_FEE_RATE") {
            self.pricing.fee_rate = parse_env("JISFAST_PRICING_FEE_RATE", &value)?;
        }
        if let Some(value) = read_env("JISFAST_PRICING_FIXED_FEE_CENTS") {
            self.pricing.fixed_fee_cents = parse_env("JISFAST_PRICING_FIXED_FEE_CENTS", &value)?;
        }
        if let Some(value) = read_env("JISFAST_PRICING_HANDLING_SMALL_CENTS") {
            self.pricing.handling_small_cents =
                parse_env("JISFAST_PRICING_HANDLING_SMALL_CENTS", &value)?;
        }
        if let Some(value) = read_env("JISFAST_PRICING_HANDLING_STANDARD_CENTS") {
            self.pricing.handling_standard_cents =
                parse_env("JISFAST_PRICING_HANDLING_STANDARD_CENTS", &value)?;
        }
        if let Some(value) = read_env("JISFAST_PRICING_COST_BASIS_WINDOW_DAYS") {
            self.pricing.cost_basis_window_days =
                parse_env("JISFAST_PRICING_COST_BASIS_WINDOW_DAYS", &value)?;
        }
        if let Some(value) = read_env("JISFAST_PRICING_REPRICE_LIMIT") {
            self.pricing.reprice_limit = parse_env("JISFAST_PRICING_REPRICE_LIMIT", &value)?;
        }
        if let Some(value) = read_env("JISFAST_PRICING_TARGET_MARGIN") {
            self.pricing.default_rule.target_margin =
                parse_env("JISFAST_PRICING_TARGET_MARGIN", &value)?;
        }
        if let Some(value) = read_env("JISFAST_PRICING_ROUNDING") {
            self.pricing.default_rule.rounding = parse_env("JISFAST_PRICING_ROUNDING", &value)?;
        }
        if let Some(value) = read_env("JISFAST_PRICING_MAX_WEEKLY_CHANGE") {
            self.pricing.default_rule.max_weekly_change =
                parse_env("JISFAST_PRICING_MAX_WEEKLY_CHANGE", &value)?;
        }

        if let Some(value) = read_env("JISFAST_SHIPPING_EXTRA_BAND_SURCHARGE_CENTS") {
            self.shipping.extra_band_surcharge_cents =
                parse_env("JISFAST_SHIPPING_EXTRA_BAND_SURCHARGE_CENTS", &value)?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(enabled) = overrides.routing_enabled {
            self.routing.enabled = enabled;
        }
        if let Some(strategy) = overrides.routing_strategy {
            self.routing.strategy = strategy;
        }
        if let Some(reprice_limit) = overrides.reprice_limit {
            self.pricing.reprice_limit = reprice_limit;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_logging(&self.logging)?;
        validate_routing(&self.routing)?;
        validate_pricing(&self.pricing)?;
        validate_shipping(&self.shipping)?;
        Ok(())
    }
}

/// Path of the config file `load` would read, if any.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from(NESTED_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_routing(routing: &RoutingConfig) -> Result<(), ConfigError> {
    let weights: &RoutingWeights = &routing.weights;
    for (key, value) in [
        ("routing.weights.cost", weights.cost),
        ("routing.weights.lead", weights.lead),
        ("routing.weights.availability", weights.availability),
        ("routing.weights.match", weights.matching),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(ConfigError::Validation(format!(
                "{key} must be a finite, non-negative number"
            )));
        }
    }
    Ok(())
}

fn validate_pricing(pricing: &PricingConfig) -> Result<(), ConfigError> {
    if pricing.fee_rate < Decimal::ZERO || pricing.fee_rate >= Decimal::ONE {
        return Err(ConfigError::Validation("pricing.fee_rate must be in range [0, 1)".to_string()));
    }

    for (key, value) in [
        ("pricing.fixed_fee_cents", pricing.fixed_fee_cents),
        ("pricing.handling_small_cents", pricing.handling_small_cents),
        ("pricing.handling_standard_cents", pricing.handling_standard_cents),
    ] {
        if value < 0 {
            return Err(ConfigError::Validation(format!("{key} must not be negative")));
        }
    }

    if pricing.cost_basis_window_days == 0 {
        return Err(ConfigError::Validation(
            "pricing.cost_basis_window_days must be greater than zero".to_string(),
        ));
    }

    if pricing.reprice_limit == 0 || pricing.reprice_limit > MAX_REPRICE_LIMIT {
        return Err(ConfigError::Validation(format!(
            "pricing.reprice_limit must be in range 1..={MAX_REPRICE_LIMIT}"
        )));
    }

    let rule = &pricing.default_rule;
    if rule.target_margin < Decimal::ZERO || rule.target_margin > Decimal::new(95, 2) {
        return Err(ConfigError::Validation(
            "pricing.default_rule.target_margin must be in range [0, 0.95]".to_string(),
        ));
    }
    if rule.max_weekly_change < Decimal::ZERO || rule.max_weekly_change > Decimal::ONE {
        return Err(ConfigError::Validation(
            "pricing.default_rule.max_weekly_change must be in range [0, 1]".to_string(),
        ));
    }
    if rule.min_price_cents.is_some_and(|min| min < 0) {
        return Err(ConfigError::Validation(
            "pricing.default_rule.min_price_cents must not be negative".to_string(),
        ));
    }
    if let (Some(min), Some(max)) = (rule.min_price_cents, rule.max_price_cents) {
        if max < min {
            return Err(ConfigError::Validation(
                "pricing.default_rule.max_price_cents must not be below min_price_cents"
                    .to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_shipping(shipping: &ShippingConfig) -> Result<(), ConfigError> {
    if shipping.extra_band_surcharge_cents < 0 {
        return Err(ConfigError::Validation(
            "shipping.extra_band_surcharge_cents must not be negative".to_string(),
        ));
    }
    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    logging: Option<LoggingPatch>,
    routing: Option<RoutingPatch>,
    pricing: Option<PricingPatch>,
    shipping: Option<ShippingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct RoutingPatch {
    enabled: Option<bool>,
    strategy: Option<RoutingStrategy>,
    weights: Option<WeightsPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct WeightsPatch {
    cost: Option<f64>,
    lead: Option<f64>,
    availability: Option<f64>,
    #[serde(rename = "match")]
    matching: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct PricingPatch {
    fee_rate: Option<Decimal>,
    fixed_fee_cents: Option<i64>,
    handling_small_cents: Option<i64>,
    handling_standard_cents: Option<i64>,
    cost_basis_window_days: Option<u32>,
    reprice_limit: Option<u32>,
    default_rule: Option<DefaultRulePatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DefaultRulePatch {
    target_margin: Option<Decimal>,
    rounding: Option<RoundingStrategy>,
    max_weekly_change: Option<Decimal>,
    min_price_cents: Option<i64>,
    max_price_cents: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct ShippingPatch {
    extra_band_surcharge_cents: Option<i64>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use rust_decimal::Decimal;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
    use crate::pricing::RoundingStrategy;
    use crate::procurement::RoutingStrategy;

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_match_documented_values() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.pricing.fee_rate == Decimal::new(35, 3), "fee rate should default to 3.5%")?;
        ensure(config.pricing.fixed_fee_cents == 30, "fixed fee should default to 30 cents")?;
        ensure(config.pricing.handling_small_cents == 150, "small handling should be 150 cents")?;
        ensure(config.pricing.reprice_limit == 100, "reprice limit should default to 100")?;
        ensure(
            config.routing.strategy == RoutingStrategy::Balanced,
            "routing strategy should default to BALANCED",
        )?;
        ensure(
            config.shipping.extra_band_surcharge_cents == 500,
            "extra band surcharge should default to 500 cents",
        )?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_JISFAST_DB_URL", "sqlite://interpolated.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("jisfast.toml");
            fs::write(
                &path,
                r#"
[database]
url = "${TEST_JISFAST_DB_URL}"

[routing]
strategy = "CHEAPEST"

[routing.weights]
match = 0.5

[pricing]
fee_rate = "0.04"

[pricing.default_rule]
rounding = "USD_0_49"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://interpolated.db",
                "database url should be interpolated from environment",
            )?;
            ensure(
                config.routing.strategy == RoutingStrategy::Cheapest,
                "routing strategy should come from file",
            )?;
            ensure(config.routing.weights.matching == 0.5, "match weight should come from file")?;
            ensure(config.routing.weights.cost == 0.4, "unset weights should keep defaults")?;
            ensure(config.pricing.fee_rate == Decimal::new(4, 2), "fee rate should come from file")?;
            ensure(
                config.pricing.default_rule.rounding == RoundingStrategy::Usd049,
                "default rule rounding should come from file",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_JISFAST_DB_URL"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("JISFAST_LOG_LEVEL", "warn");
        env::set_var("JISFAST_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["JISFAST_LOG_LEVEL", "JISFAST_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("JISFAST_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("JISFAST_ROUTING_STRATEGY", "fastest");
        env::set_var("JISFAST_PRICING_REPRICE_LIMIT", "250");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("jisfast.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[routing]
strategy = "CHEAPEST"

[pricing]
reprice_limit = 50

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.routing.strategy == RoutingStrategy::Fastest,
                "env routing strategy should win over file",
            )?;
            ensure(config.pricing.reprice_limit == 250, "env reprice limit should win over file")?;
            Ok(())
        })();

        clear_vars(&[
            "JISFAST_DATABASE_URL",
            "JISFAST_ROUTING_STRATEGY",
            "JISFAST_PRICING_REPRICE_LIMIT",
        ]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("JISFAST_PRICING_REPRICE_LIMIT", "900");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("pricing.reprice_limit")
            );
            ensure(has_message, "validation failure should mention pricing.reprice_limit")
        })();

        clear_vars(&["JISFAST_PRICING_REPRICE_LIMIT"]);
        result
    }

    #[test]
    fn malformed_env_values_are_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("JISFAST_ROUTING_WEIGHT_COST", "heavy");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected env override failure".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(
                    error,
                    ConfigError::InvalidEnvOverride { ref key, .. }
                        if key == "JISFAST_ROUTING_WEIGHT_COST"
                ),
                "invalid weight should name the env key",
            )
        })();

        clear_vars(&["JISFAST_ROUTING_WEIGHT_COST"]);
        result
    }

    #[test]
    fn negative_weights_fail_validation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("JISFAST_ROUTING_WEIGHT_LEAD", "-0.5");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected validation failure".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(
                    error,
                    ConfigError::Validation(ref message) if message.contains("routing.weights.lead")
                ),
                "validation failure should mention routing.weights.lead",
            )
        })();

        clear_vars(&["JISFAST_ROUTING_WEIGHT_LEAD"]);
        result
    }

    #[test]
    fn pricing_config_maps_to_reprice_settings() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;
        let settings = config.pricing.reprice_settings();

        ensure(settings.fees.fixed_fee_cents == 30, "fixed fee should carry over")?;
        ensure(settings.handling_standard_cents == 250, "standard handling should carry over")?;
        ensure(settings.cost_basis_window_days == 30, "cost basis window should carry over")
    }
}
