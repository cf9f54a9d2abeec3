mod converter;

pub use converter::*;

use serde::{Deserialize, Serialize};

/// Подпись типа доставки Почтой России
pub const POST_LABEL: &str = "Почта";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryKind {
    /// До двери
    #[default]
    Door,
    /// Почтой
    Post,
    /// До пункта выдачи
    Pickup,
}

/// Вариант доставки
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rate {
    /// `tariff-{id}` или `tariff-{id}_point-{pointId}`
    pub id: String,
    /// Стоимость в валюте перевозчика после правил
    pub rate: f64,
    pub currency: String,
    pub provider_key: String,
    /// Части названия по порядку
    pub name: Vec<String>,
    pub comment: RateComment,
    /// Ожидаемая дата доставки (одна или две)
    pub est_delivery: Vec<String>,
    /// Полная дата и время доставки (одна или две)
    pub delivery_date: Vec<String>,
    /// Срок в днях после правил
    pub days: [u32; 2],
    pub kind: DeliveryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub point: Option<PointData>,
}

impl Rate {
    pub fn name_string(&self) -> String {
        self.name.join(" | ")
    }

    pub fn est_delivery_string(&self) -> String {
        self.est_delivery.join(" - ")
    }
}

/// Пункт выдачи, к которому относится вариант
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointData {
    pub id: u64,
    #[serde(rename = "type")]
    pub point_type: Option<u32>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub name: String,
    /// Адрес пункта
    pub description: String,
    /// Как добраться
    pub way: Option<String>,
    pub schedule: Option<String>,
}

/// Подробности варианта доставки
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateComment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub tariff: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub point: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub point_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub point_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub point_iml_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timetable: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_card: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fitting_room: Option<bool>,
}

fn flag_label(flag: bool) -> String {
    if flag { "Есть" } else { "Нет" }.to_string()
}

impl RateComment {
    /// Заполненные поля с заголовками в порядке вывода
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let tariff = Some(self.tariff.clone());
        let text = [
            ("Тип доставки", &self.delivery_type),
            ("Провайдер", &self.provider),
            ("Тариф", &tariff),
            ("Пункт выдачи", &self.point),
            ("Тип пункта выдачи", &self.point_type),
            ("Код пункта выдачи", &self.point_code),
            ("Адрес", &self.address),
            ("Телефон", &self.phone),
            ("Время работы", &self.timetable),
            ("Описание", &self.description),
        ];
        let flags = [
            ("Оплата наличными", self.payment),
            ("Оплата картой", self.payment_card),
            ("Примерочная", self.fitting_room),
        ];

        text.into_iter()
            .filter_map(|(title, value)| {
                value
                    .as_ref()
                    .filter(|v| !v.is_empty())
                    .map(|v| (title, v.clone()))
            })
            .chain(
                flags
                    .into_iter()
                    .filter_map(|(title, value)| value.map(|v| (title, flag_label(v)))),
            )
            .collect()
    }

    /// Строки вида `Заголовок: значение`
    pub fn to_lines(&self) -> String {
        self.fields()
            .into_iter()
            .map(|(title, value)| format!("{title}: {value}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
