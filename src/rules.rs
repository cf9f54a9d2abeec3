//! Правила корректировки стоимости и сроков доставки.
//!
//! Правила провайдера применяются строго в сохранённом порядке и
//! накапливаются: каждое следующее работает с уже изменённым значением.
//! Правило `fix_*` заменяет текущее значение, поэтому последнее из них
//! отменяет всё, что было применено до него.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{config::Providers, currency::CurrencyConverter};

/// Наибольшее значение правила сроков в днях
pub const MAX_RULE_DAYS: u32 = 365;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleError {
    #[error("неизвестная схема правила: {0}")]
    UnknownScheme(String),

    #[error("схема {scheme} не поддерживает единицу измерения {measure:?}")]
    InvalidMeasure { scheme: String, measure: String },

    #[error("неизвестная база процента: {0:?}")]
    InvalidBasis(String),

    #[error("недопустимое значение правила {scheme}: {value}")]
    InvalidValue { scheme: String, value: f64 },
}

/// База, от которой считается процент
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PercentBasis {
    /// Текущая (уже скорректированная) стоимость доставки
    Shipping,
    /// Исходная стоимость от агрегатора
    Origin,
    /// Сумма заказа
    Order,
}

impl PercentBasis {
    fn parse(value: &str) -> Result<Self, RuleError> {
        match value {
            "shipping" => Ok(Self::Shipping),
            "origin" => Ok(Self::Origin),
            "order" => Ok(Self::Order),
            other => Err(RuleError::InvalidBasis(other.to_string())),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Shipping => "shipping",
            Self::Origin => "origin",
            Self::Order => "order",
        }
    }
}

/// Величина изменения стоимости
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Adjustment {
    Percent { value: f64, basis: PercentBasis },
    /// Фиксированная сумма в валюте магазина
    FlatFee(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rule {
    IncreaseCost(Adjustment),
    DecreaseCost(Adjustment),
    /// Фиксированная стоимость в валюте магазина
    FixCost(f64),
    IncreaseMinTime(u32),
    DecreaseMinTime(u32),
    FixMinTime(u32),
    IncreaseMaxTime(u32),
    DecreaseMaxTime(u32),
    FixMaxTime(u32),
}

/// Всё, что нужно правилам стоимости помимо текущего значения
pub struct CostContext<'a> {
    pub currency: &'a CurrencyConverter,
    pub order_total: f64,
}

impl Rule {
    fn delta(adjustment: &Adjustment, original: f64, running: f64, ctx: &CostContext) -> f64 {
        match adjustment {
            Adjustment::Percent { value, basis } => {
                let base = match basis {
                    PercentBasis::Shipping => running,
                    PercentBasis::Origin => original,
                    PercentBasis::Order => ctx.order_total,
                };
                base * value / 100.
            }
            Adjustment::FlatFee(_) => 0.,
        }
    }

    /// Применение правила к стоимости; правила сроков её не меняют
    pub fn apply_cost(&self, original: f64, running: f64, ctx: &CostContext) -> f64 {
        match self {
            Rule::IncreaseCost(Adjustment::FlatFee(fee)) => {
                ctx.currency.from_display(ctx.currency.to_display(running) + fee)
            }
            Rule::IncreaseCost(adjustment) => running + Self::delta(adjustment, original, running, ctx),
            Rule::DecreaseCost(Adjustment::FlatFee(fee)) => {
                ctx.currency
                    .from_display(ctx.currency.to_display(running) - fee)
                    .max(0.)
            }
            Rule::DecreaseCost(adjustment) => {
                (running - Self::delta(adjustment, original, running, ctx)).max(0.)
            }
            Rule::FixCost(value) => ctx.currency.from_display(*value),
            _ => running,
        }
    }

    /// Применение правила к минимальному сроку
    pub fn apply_min_time(&self, running: u32) -> u32 {
        match self {
            Rule::IncreaseMinTime(days) => running.saturating_add(*days),
            Rule::DecreaseMinTime(days) => running.saturating_sub(*days),
            Rule::FixMinTime(days) => *days,
            _ => running,
        }
    }

    /// Применение правила к максимальному сроку
    pub fn apply_max_time(&self, running: u32) -> u32 {
        match self {
            Rule::IncreaseMaxTime(days) => running.saturating_add(*days),
            Rule::DecreaseMaxTime(days) => running.saturating_sub(*days),
            Rule::FixMaxTime(days) => *days,
            _ => running,
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            Rule::IncreaseCost(_) => "increase_cost",
            Rule::DecreaseCost(_) => "decrease_cost",
            Rule::FixCost(_) => "fix_cost",
            Rule::IncreaseMinTime(_) => "increase_min_time",
            Rule::DecreaseMinTime(_) => "decrease_min_time",
            Rule::FixMinTime(_) => "fix_min_time",
            Rule::IncreaseMaxTime(_) => "increase_max_time",
            Rule::DecreaseMaxTime(_) => "decrease_max_time",
            Rule::FixMaxTime(_) => "fix_max_time",
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            Rule::IncreaseCost(a) | Rule::DecreaseCost(a) => match a {
                Adjustment::Percent { value, .. } | Adjustment::FlatFee(value) => *value,
            },
            Rule::FixCost(v) => *v,
            Rule::IncreaseMinTime(d)
            | Rule::DecreaseMinTime(d)
            | Rule::FixMinTime(d)
            | Rule::IncreaseMaxTime(d)
            | Rule::DecreaseMaxTime(d)
            | Rule::FixMaxTime(d) => *d as f64,
        }
    }
}

/// Правило в том виде, в котором оно хранится в настройках
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawRule {
    pub scheme: String,
    pub value: f64,
    pub measure: String,
    pub percent: Option<String>,
    pub description: String,
}

/// Правило провайдера вместе с описанием
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRule", into = "RawRule")]
pub struct RuleEntry {
    pub rule: Rule,
    pub description: String,
}

impl RuleEntry {
    pub fn new(rule: Rule) -> Self {
        Self {
            rule,
            description: String::new(),
        }
    }
}

impl TryFrom<RawRule> for RuleEntry {
    type Error = RuleError;

    fn try_from(raw: RawRule) -> Result<Self, Self::Error> {
        let scheme = raw.scheme.trim().trim_start_matches("scheme_").to_string();
        let value = raw.value;
        if !value.is_finite() || value < 0. {
            return Err(RuleError::InvalidValue { scheme, value });
        }

        let invalid_measure = || RuleError::InvalidMeasure {
            scheme: scheme.clone(),
            measure: raw.measure.clone(),
        };

        let adjustment = || -> Result<Adjustment, RuleError> {
            match raw.measure.as_str() {
                "percent" => {
                    let basis = raw.percent.as_deref().unwrap_or_default();
                    Ok(Adjustment::Percent {
                        value,
                        basis: PercentBasis::parse(basis)?,
                    })
                }
                "flatfee" => Ok(Adjustment::FlatFee(value)),
                _ => Err(invalid_measure()),
            }
        };

        let days = || -> Result<u32, RuleError> {
            if raw.measure != "day" {
                return Err(invalid_measure());
            }
            if value.fract() != 0. || value > f64::from(MAX_RULE_DAYS) {
                return Err(RuleError::InvalidValue {
                    scheme: scheme.clone(),
                    value,
                });
            }
            Ok(value as u32)
        };

        let rule = match scheme.as_str() {
            "increase_cost" => Rule::IncreaseCost(adjustment()?),
            "decrease_cost" => Rule::DecreaseCost(adjustment()?),
            "fix_cost" => match raw.measure.as_str() {
                "currency" | "flatfee" => Rule::FixCost(value),
                _ => return Err(invalid_measure()),
            },
            "increase_min_time" => Rule::IncreaseMinTime(days()?),
            "decrease_min_time" => Rule::DecreaseMinTime(days()?),
            "fix_min_time" => Rule::FixMinTime(days()?),
            "increase_max_time" => Rule::IncreaseMaxTime(days()?),
            "decrease_max_time" => Rule::DecreaseMaxTime(days()?),
            "fix_max_time" => Rule::FixMaxTime(days()?),
            _ => return Err(RuleError::UnknownScheme(raw.scheme)),
        };

        Ok(Self {
            rule,
            description: raw.description,
        })
    }
}

impl From<RuleEntry> for RawRule {
    fn from(entry: RuleEntry) -> Self {
        let (measure, percent) = match entry.rule {
            Rule::IncreaseCost(Adjustment::Percent { basis, .. })
            | Rule::DecreaseCost(Adjustment::Percent { basis, .. }) => {
                ("percent", Some(basis.as_str().to_string()))
            }
            Rule::IncreaseCost(_) | Rule::DecreaseCost(_) | Rule::FixCost(_) => ("flatfee", None),
            _ => ("day", None),
        };
        Self {
            scheme: entry.rule.scheme().to_string(),
            value: entry.rule.value(),
            measure: measure.to_string(),
            percent,
            description: entry.description,
        }
    }
}

/// Движок правил для набора провайдеров
pub struct RuleEngine<'a> {
    providers: &'a Providers,
    ctx: CostContext<'a>,
}

impl<'a> RuleEngine<'a> {
    pub fn new(providers: &'a Providers, currency: &'a CurrencyConverter, order_total: f64) -> Self {
        Self {
            providers,
            ctx: CostContext {
                currency,
                order_total,
            },
        }
    }

    fn rules(&self, provider_key: &str) -> impl Iterator<Item = &Rule> {
        self.providers
            .get(provider_key)
            .into_iter()
            .flat_map(|p| p.rules.iter().map(|entry| &entry.rule))
    }

    /// Стоимость после применения правил провайдера
    pub fn apply_cost(&self, provider_key: &str, base: f64) -> f64 {
        self.rules(provider_key)
            .fold(base, |running, rule| rule.apply_cost(base, running, &self.ctx))
            .max(0.)
    }

    /// Минимальный срок после применения правил провайдера
    pub fn apply_min_time(&self, provider_key: &str, base_days: u32) -> u32 {
        self.rules(provider_key)
            .fold(base_days, |running, rule| rule.apply_min_time(running))
    }

    /// Максимальный срок после применения правил провайдера
    pub fn apply_max_time(&self, provider_key: &str, base_days: u32) -> u32 {
        self.rules(provider_key)
            .fold(base_days, |running, rule| rule.apply_max_time(running))
    }
}
