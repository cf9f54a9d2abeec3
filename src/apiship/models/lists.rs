use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Ответ справочника: постраничный `{rows, meta}` или просто массив
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListPayload<T> {
    Page(Page<T>),
    Rows(Vec<T>),
}

impl<T> ListPayload<T> {
    /// Строки и общее количество записей, если оно известно
    pub fn into_parts(self) -> (Vec<T>, Option<u64>) {
        match self {
            Self::Page(page) => (page.rows, Some(page.meta.total)),
            Self::Rows(rows) => (rows, None),
        }
    }

    pub fn into_rows(self) -> Vec<T> {
        self.into_parts().0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub rows: Vec<T>,
    #[serde(default)]
    pub meta: Meta,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Meta {
    pub total: u64,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Провайдер (служба доставки)
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderInfo {
    pub key: String,
    pub name: String,
    pub description: Option<String>,
}

/// Элемент простого справочника: тип доставки, тип приёма
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListItem {
    pub id: u32,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointType {
    pub id: u32,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TariffInfo {
    pub id: u64,
    #[serde(rename = "providerKey")]
    pub provider_key: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "weightMin")]
    pub weight_min: Option<f64>,
    #[serde(rename = "weightMax")]
    pub weight_max: Option<f64>,
}

/// Страница тарифов провайдера
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct TariffPage {
    pub items: Vec<TariffInfo>,
    pub pages: u64,
}

/// Пункт выдачи
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Point {
    pub id: u64,
    pub provider_key: String,
    #[serde(rename = "type")]
    pub point_type: Option<u32>,
    #[serde(deserialize_with = "flag")]
    pub cod: bool,
    #[serde(deserialize_with = "flag")]
    pub payment_card: bool,
    pub name: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub code: Option<String>,
    pub post_index: Option<String>,
    pub country_code: Option<String>,
    pub region: Option<String>,
    pub region_type: Option<String>,
    pub area: Option<String>,
    pub city: Option<String>,
    pub city_type: Option<String>,
    pub street: Option<String>,
    pub street_type: Option<String>,
    pub house: Option<String>,
    pub block: Option<String>,
    pub office: Option<String>,
    pub url: Option<String>,
    pub phone: Option<String>,
    pub timetable: Option<String>,
    #[serde(deserialize_with = "flag")]
    pub fitting_room: bool,
    pub description: Option<String>,
}

/// Поля пункта выдачи, запрашиваемые у агрегатора
pub const POINT_FIELDS: [&str; 26] = [
    "id",
    "providerKey",
    "type",
    "cod",
    "paymentCard",
    "name",
    "lat",
    "lng",
    "code",
    "postIndex",
    "countryCode",
    "region",
    "regionType",
    "area",
    "city",
    "cityType",
    "street",
    "streetType",
    "house",
    "block",
    "office",
    "url",
    "phone",
    "timetable",
    "fittingRoom",
    "description",
];

/// Флаг агрегатора может прийти как bool, 0/1 или строка
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n == 1.),
        Value::String(s) => matches!(s.trim(), "1" | "true"),
        _ => false,
    })
}
