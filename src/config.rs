use crate::{
    address::{DeliveryRegion, GeographySettings, LocalAddress, StaticGeography},
    apiship::{ApiMode, client::COURIER_DELIVERY_TYPE, models::ListItem},
    calendar::{Schedule, WorkCalendar},
    currency::{CurrencyConverter, CurrencySettings},
    error::{Result, SettingsError},
    rules::RuleEntry,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::Path};

pub const CONFIG_PATH: &str = "Config.toml";

/// Формат даты доставки для отображения по умолчанию
pub const DEFAULT_DATE_FORMAT: &str = "%d.%m.%Y";

pub fn init_if_not() -> Result<bool> {
    if fs::metadata(CONFIG_PATH).is_ok() {
        return Ok(false);
    }
    fs::write(CONFIG_PATH, DEFAULT_CONFIG_STR.as_bytes())?;
    Ok(true)
}

/// Чтение конфигурации из файла
pub fn load(path: impl AsRef<Path>) -> Result<Config> {
    let buf = fs::read_to_string(path)?;
    Config::from_toml(&buf)
}

/// Запись конфигурации в файл (комментарии не сохраняются)
pub fn save(path: impl AsRef<Path>, config: &Config) -> Result<()> {
    let buf = toml::to_string_pretty(config)?;
    fs::write(path, buf)?;
    Ok(())
}

/// Провайдеры по ключу
pub type Providers = BTreeMap<String, ProviderSettings>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Идентификатор экземпляра, входит в ключи кэша
    pub instance_id: String,
    pub launch_options: LaunchOptions,
    pub credentials: Credentials,
    pub dispatch_address: LocalAddress,
    pub delivery_address: DeliveryRegion,
    pub weight: WeightSettings,
    pub weight_and_dimensions: Vec<DimensionTier>,
    pub providers: Providers,
    pub delivery_types: Vec<ListItem>,
    pub pickup_types: Vec<ListItem>,
    pub sort_by: Option<SortBy>,
    /// Формат даты доставки в стиле strftime
    pub date_format: String,
    pub currency: CurrencySettings,
    /// Расписания витрин по идентификатору витрины
    pub schedules: BTreeMap<String, Schedule>,
    pub geography: GeographySettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            instance_id: "calcapiship".to_string(),
            launch_options: LaunchOptions::default(),
            credentials: Credentials::default(),
            dispatch_address: LocalAddress::default(),
            delivery_address: DeliveryRegion::default(),
            weight: WeightSettings::default(),
            weight_and_dimensions: vec![DimensionTier {
                weight: 500,
                length: 15,
                width: 10,
                height: 5,
            }],
            providers: Providers::new(),
            delivery_types: Vec::new(),
            pickup_types: Vec::new(),
            sort_by: None,
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            currency: CurrencySettings::default(),
            schedules: BTreeMap::new(),
            geography: GeographySettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchOptions {
    pub test_mode: bool,
    pub unsafe_mode: bool,
    /// Явный адрес API вместо адреса режима
    pub base_url: Option<String>,
    pub log_level: String,
    pub verbose: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            test_mode: false,
            unsafe_mode: false,
            base_url: None,
            log_level: "info".to_string(),
            verbose: true,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Вес заказа по умолчанию
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightSettings {
    /// Вес в граммах
    pub weight: u64,
    /// Всегда использовать этот вес, даже если известен вес заказа
    pub force: bool,
}

impl Default for WeightSettings {
    fn default() -> Self {
        Self {
            weight: 500,
            force: false,
        }
    }
}

/// Габариты отправления (см) для заказов до указанного веса (г)
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionTier {
    pub weight: u64,
    pub length: u64,
    pub width: u64,
    pub height: u64,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub name: String,
    /// Выбранные тарифы
    pub tariffs: Vec<u64>,
    /// Правила в порядке применения
    pub rules: Vec<RuleEntry>,
}

/// Сортировка вариантов доставки
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    Name,
    Rate,
}

impl Config {
    /// Разбор TOML; уровни габаритов упорядочиваются по весу
    pub fn from_toml(buf: &str) -> Result<Self> {
        let mut config = toml::from_str::<Config>(buf)?;
        config.weight_and_dimensions.sort_by_key(|t| t.weight);
        Ok(config)
    }

    pub fn api_mode(&self) -> ApiMode {
        ApiMode::from_flags(self.launch_options.test_mode, self.launch_options.unsafe_mode)
    }

    pub fn currency_converter(&self) -> CurrencyConverter {
        CurrencyConverter::new(self.currency.clone())
    }

    pub fn geography(&self) -> StaticGeography {
        StaticGeography::new(&self.geography)
    }

    /// Рабочий календарь витрины; без расписания выходные суббота и воскресенье
    pub fn calendar_for(&self, storefront: Option<&str>) -> WorkCalendar {
        storefront
            .and_then(|s| self.schedules.get(s))
            .map(WorkCalendar::resolve)
            .unwrap_or_default()
    }

    pub fn provider_keys(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    pub fn delivery_type(&self, id: u32) -> Option<&ListItem> {
        self.delivery_types.iter().find(|t| t.id == id)
    }

    /// Включена ли доставка курьером до двери
    pub fn courier_enabled(&self) -> bool {
        self.delivery_type(COURIER_DELIVERY_TYPE).is_some()
    }

    /// Проверка настроек перед сохранением
    pub fn validate(&self) -> std::result::Result<(), SettingsError> {
        let credentials = &self.credentials;
        if !self.launch_options.test_mode
            && (credentials.username.is_empty() || credentials.password.is_empty())
        {
            return Err(SettingsError::MissingCredentials);
        }

        if !self.dispatch_address.is_complete() {
            return Err(SettingsError::MissingDispatchAddress);
        }

        if self.weight.weight == 0 {
            return Err(SettingsError::InvalidWeight);
        }

        if self
            .weight_and_dimensions
            .iter()
            .any(|t| t.weight == 0 || t.length == 0 || t.width == 0 || t.height == 0)
        {
            return Err(SettingsError::InvalidDimensions);
        }

        if self.providers.is_empty() {
            return Err(SettingsError::NoProviders);
        }
        if self.delivery_types.is_empty() {
            return Err(SettingsError::NoDeliveryTypes);
        }
        if self.pickup_types.is_empty() {
            return Err(SettingsError::NoPickupTypes);
        }

        for (key, provider) in &self.providers {
            let name = if provider.name.is_empty() {
                key.clone()
            } else {
                provider.name.clone()
            };
            if provider.tariffs.is_empty() {
                return Err(SettingsError::NoTariffs(name));
            }
            if provider.rules.iter().any(|r| r.rule.value() <= 0.) {
                return Err(SettingsError::InvalidRuleValue(name));
            }
        }

        Ok(())
    }
}

const DEFAULT_CONFIG_STR: &str = r##"
# Идентификатор экземпляра (входит в ключи кэша)
instance_id = "calcapiship"
# Сортировка вариантов доставки: "name" или "rate". Без значения порядок ответа API
# sort_by = "rate"
# Формат даты доставки (strftime)
date_format = "%d.%m.%Y"

# Параметры запуска
[launch_options]
test_mode = true # Тестовый режим api.dev.apiship.ru, логин и пароль test/test (true/false)
unsafe_mode = false # Доступ к API по HTTP через порт 11987 (true/false)
log_level = "info" # Уровень журнала: error, warn, info, debug, trace
verbose = true # Вывод подробностей расчёта в консоль (true/false)

# Учётные данные ApiShip
[credentials]
username = ""
password = ""

# Адрес отправки (страна ISO3, код региона, город, улица)
[dispatch_address]
country = "rus"
region = "77"
city = "Москва"
street = ""

# Регион доставки (ограничение адреса получателя)
[delivery_address]
country = ""
region = []
city = "" # Один или несколько городов через запятую

# Вес заказа в граммах, если вес товаров неизвестен
[weight]
weight = 500
force = false # Всегда использовать этот вес (true/false)

# Габариты отправления (см) в зависимости от веса заказа (г)
[[weight_and_dimensions]]
weight = 500
length = 15
width = 10
height = 5

# Провайдеры: выбранные тарифы и правила
# [providers.cdek]
# name = "СДЭК"
# tariffs = [1, 2]
#
# [[providers.cdek.rules]]
# scheme = "increase_cost" # increase/decrease/fix _ cost/min_time/max_time
# value = 10
# measure = "percent" # percent, flatfee (стоимость); currency (fix_cost); day (сроки)
# percent = "shipping" # shipping, origin, order
# description = "Наценка"

# Типы доставки
# [[delivery_types]]
# id = 1
# name = "Курьер"

# Типы приёма
# [[pickup_types]]
# id = 1
# name = "От двери"

# Валюты магазина
[currency]
primary = "RUB"
display = "RUB"
precision = 2

[currency.rates]
# USD = 90.0

# Расписания витрин: выходные по дням недели (0 = воскресенье) и исключения по датам
# [schedules.default]
# weekends = [0, 6]
#
# [schedules.default.dates."2025-01-08"]
# weekend = true

# Дополнительные страны и регионы
[geography]
regions = [
    { country = "rus", code = "77", name = "Москва" },
    { country = "rus", code = "78", name = "Санкт-Петербург" },
    { country = "rus", code = "50", name = "Московская область" },
]
"##;
