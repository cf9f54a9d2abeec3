use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Валюта, в которой агрегатор возвращает стоимость доставки
pub const CARRIER_CURRENCY: &str = "RUB";

/// Настройки валют магазина
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurrencySettings {
    /// Основная валюта магазина, в ней выражены курсы
    pub primary: String,
    /// Валюта отображения (витрины)
    pub display: String,
    /// Курс: сколько единиц основной валюты в одной единице валюты
    pub rates: BTreeMap<String, f64>,
    /// Количество знаков после запятой при округлении
    pub precision: u32,
}

impl Default for CurrencySettings {
    fn default() -> Self {
        Self {
            primary: CARRIER_CURRENCY.to_string(),
            display: CARRIER_CURRENCY.to_string(),
            rates: BTreeMap::new(),
            precision: 2,
        }
    }
}

/// Конвертер стоимости между валютой перевозчика и валютой магазина
#[derive(Debug, Clone, Default)]
pub struct CurrencyConverter {
    settings: CurrencySettings,
}

impl CurrencyConverter {
    pub fn new(settings: CurrencySettings) -> Self {
        Self { settings }
    }

    pub fn display_currency(&self) -> &str {
        &self.settings.display
    }

    /// Пересчёт суммы из одной валюты в другую через основную валюту
    pub fn convert(&self, amount: f64, from: &str, to: &str) -> f64 {
        let mut converted = amount;
        if from != to {
            if from != self.settings.primary {
                match self.settings.rates.get(from) {
                    Some(rate) => converted *= rate,
                    None => tracing::warn!(currency = from, "курс валюты не задан"),
                }
            }
            if to != self.settings.primary {
                match self.settings.rates.get(to).filter(|r| **r > 0.) {
                    Some(rate) => converted /= rate,
                    None => tracing::warn!(currency = to, "курс валюты не задан"),
                }
            }
        }
        self.round(converted)
    }

    /// Из валюты перевозчика в валюту отображения
    pub fn to_display(&self, amount: f64) -> f64 {
        self.convert(amount, CARRIER_CURRENCY, &self.settings.display)
    }

    /// Из валюты отображения в валюту перевозчика
    pub fn from_display(&self, amount: f64) -> f64 {
        self.convert(amount, &self.settings.display, CARRIER_CURRENCY)
    }

    /// Строка стоимости в валюте отображения, например `1100.00 RUB`
    pub fn format_display(&self, amount: f64) -> String {
        format!(
            "{:.*} {}",
            self.settings.precision as usize,
            self.to_display(amount),
            self.settings.display
        )
    }

    fn round(&self, amount: f64) -> f64 {
        let factor = 10f64.powi(self.settings.precision as i32);
        (amount * factor).round() / factor
    }
}
