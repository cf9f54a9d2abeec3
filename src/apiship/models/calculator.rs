use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::address::CarrierAddress;

/// Тело запроса `calculator`. Равенство по значению служит
/// отпечатком запроса для кэша сессии.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatorRequest {
    pub from: CarrierAddress,
    pub to: CarrierAddress,
    pub weight: u64,
    pub length: u64,
    pub width: u64,
    pub height: u64,
    pub assessed_cost: f64,
    pub provider_keys: Vec<String>,
    pub delivery_types: Vec<u32>,
    pub pickup_types: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickup_date: Option<String>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalculatorResponse {
    #[serde(rename = "deliveryToDoor")]
    pub delivery_to_door: Vec<ProviderOffer>,

    #[serde(rename = "deliveryToPoint")]
    pub delivery_to_point: Vec<ProviderOffer>,
}

/// Предложения одного провайдера
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderOffer {
    #[serde(rename = "providerKey")]
    pub provider_key: String,
    /// Тарифы, которые не удалось разобрать, пропускаются
    #[serde(deserialize_with = "lenient_tariffs")]
    pub tariffs: Vec<TariffOffer>,
}

fn lenient_tariffs<'de, D>(deserializer: D) -> Result<Vec<TariffOffer>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<TariffOffer>(value) {
            Ok(tariff) => Some(tariff),
            Err(err) => {
                tracing::warn!(error = %err, "тариф в ответе calculator не распознан, пропущен");
                None
            }
        })
        .collect())
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TariffOffer {
    #[serde(rename = "tariffProviderId")]
    pub tariff_provider_id: Option<String>,

    #[serde(rename = "tariffId")]
    pub tariff_id: u64,

    #[serde(rename = "tariffName")]
    pub tariff_name: String,

    #[serde(rename = "deliveryCost")]
    pub delivery_cost: f64,

    #[serde(rename = "daysMin")]
    pub days_min: u32,

    #[serde(rename = "daysMax")]
    pub days_max: u32,

    #[serde(rename = "deliveryTypes")]
    pub delivery_types: Vec<u32>,

    #[serde(rename = "pointIds")]
    pub point_ids: Vec<u64>,
}
