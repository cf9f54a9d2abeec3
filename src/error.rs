use crate::apiship::error::ApishipError;
use serde_json::Error as SerdeJsonError;
use std::io::Error as StdIoError;
use std::result::Result as StdResult;
use thiserror::Error as ThisError;
use toml::de::Error as TomlDeError;
use toml::ser::Error as TomlSerError;

pub type Result<T> = StdResult<T, Error>;

#[derive(ThisError, Debug)]
pub enum Error {
    #[error("StdIoError: {0:?}")]
    StdIo(#[from] StdIoError),

    #[error("ApishipError: {0:?}")]
    Apiship(#[from] ApishipError),

    #[error("TomlDeError: {0:?}")]
    TomlDe(#[from] TomlDeError),

    #[error("TomlSerError: {0:?}")]
    TomlSer(#[from] TomlSerError),

    #[error("SerdeJsonError: {0:?}")]
    SerdeJson(#[from] SerdeJsonError),

    #[error("{0}")]
    Settings(#[from] SettingsError),

    #[error("{0}")]
    Custom(String),
}

/// Ошибки проверки настроек
#[derive(ThisError, Debug, Clone, PartialEq)]
pub enum SettingsError {
    #[error("Выберите тестовый режим или введите корректные логин и пароль")]
    MissingCredentials,

    #[error("Введите адрес отправки")]
    MissingDispatchAddress,

    #[error("Вес должен быть больше нуля и содержать только целое число")]
    InvalidWeight,

    #[error("Вес и габариты должны быть больше нуля и содержать только целые числа")]
    InvalidDimensions,

    #[error("Выберите хотя бы одного провайдера")]
    NoProviders,

    #[error("Выберите хотя бы один тип доставки")]
    NoDeliveryTypes,

    #[error("Выберите хотя бы один тип приёма")]
    NoPickupTypes,

    #[error("Выберите хотя бы один тариф провайдера \"{0}\"")]
    NoTariffs(String),

    #[error("Значение правила провайдера \"{0}\" должно быть положительным целым или дробным числом")]
    InvalidRuleValue(String),
}
