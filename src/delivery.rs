use chrono::{Duration, NaiveDateTime, format::{Item, StrftimeItems}};
use serde::{Deserialize, Serialize};

use crate::{calendar::WorkCalendar, config::DEFAULT_DATE_FORMAT, rules::RuleEngine};

/// Формат полной даты доставки
pub const FULL_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Срок доставки: дни от ближайшего рабочего дня и даты для вывода
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryWindow {
    /// Минимальный и максимальный срок в днях
    pub days: [u32; 2],
    /// Даты в формате магазина, одинаковые схлопываются
    pub est_delivery: Vec<String>,
    /// Даты в формате `%Y-%m-%d %H:%M:%S`
    pub delivery_date: Vec<String>,
}

pub struct WindowCalculator {
    base: NaiveDateTime,
    date_format: String,
}

impl WindowCalculator {
    /// Отсчёт ведётся от ближайшего к `now` рабочего дня
    pub fn new(calendar: &WorkCalendar, date_format: &str, now: NaiveDateTime) -> Self {
        let date_format = if is_valid_format(date_format) {
            date_format.to_string()
        } else {
            tracing::warn!(date_format, "некорректный формат даты, используется формат по умолчанию");
            DEFAULT_DATE_FORMAT.to_string()
        };
        Self {
            base: calendar.nearest_working_day(now),
            date_format,
        }
    }

    pub fn base(&self) -> NaiveDateTime {
        self.base
    }

    /// Сроки провайдера после правил, по возрастанию
    pub fn days(engine: &RuleEngine, provider_key: &str, days_min: u32, days_max: u32) -> [u32; 2] {
        let mut days = [
            engine.apply_min_time(provider_key, days_min),
            engine.apply_max_time(provider_key, days_max),
        ];
        days.sort_unstable();
        days
    }

    /// Даты доставки; `None`, если срок выходит за пределы календаря
    pub fn window(&self, days: [u32; 2]) -> Option<DeliveryWindow> {
        let [min, max] = days.map(|d| self.base.checked_add_signed(Duration::days(i64::from(d))));
        let dates = [min?, max?];
        Some(DeliveryWindow {
            days,
            est_delivery: unique(dates.iter().map(|d| d.format(&self.date_format).to_string())),
            delivery_date: unique(dates.iter().map(|d| d.format(FULL_DATETIME_FORMAT).to_string())),
        })
    }
}

fn is_valid_format(format: &str) -> bool {
    !format.is_empty() && StrftimeItems::new(format).all(|item| !matches!(item, Item::Error))
}

fn unique(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut result: Vec<String> = Vec::with_capacity(2);
    for value in values {
        if !result.contains(&value) {
            result.push(value);
        }
    }
    result
}
