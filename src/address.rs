use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Адрес в формате магазина: страна ISO3, код региона, город, улица
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalAddress {
    pub country: String,
    pub region: String,
    pub city: String,
    pub street: String,
}

impl LocalAddress {
    pub fn is_empty(&self) -> bool {
        self.country.trim().is_empty()
            && self.region.trim().is_empty()
            && self.city.trim().is_empty()
            && self.street.trim().is_empty()
    }

    pub fn is_complete(&self) -> bool {
        !self.country.trim().is_empty()
            && !self.region.trim().is_empty()
            && !self.city.trim().is_empty()
            && !self.street.trim().is_empty()
    }
}

/// Адрес в формате агрегатора
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarrierAddress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub address_string: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Country {
    pub iso3: String,
    pub iso2: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// ISO3 код страны
    pub country: String,
    pub code: String,
    pub name: String,
}

/// Справочник стран и регионов
pub trait Geography: Send + Sync {
    fn country(&self, iso3: &str) -> Option<Country>;
    fn region_name(&self, country_iso3: &str, code: &str) -> Option<String>;
}

/// Дополнительные страны и регионы из конфигурации
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeographySettings {
    pub countries: Vec<Country>,
    pub regions: Vec<Region>,
}

const BUILTIN_COUNTRIES: [(&str, &str, &str); 8] = [
    ("rus", "RU", "Россия"),
    ("blr", "BY", "Беларусь"),
    ("kaz", "KZ", "Казахстан"),
    ("arm", "AM", "Армения"),
    ("kgz", "KG", "Киргизия"),
    ("uzb", "UZ", "Узбекистан"),
    ("tjk", "TJ", "Таджикистан"),
    ("aze", "AZ", "Азербайджан"),
];

/// Справочник в памяти: встроенные страны плюс записи из конфигурации
#[derive(Debug, Clone)]
pub struct StaticGeography {
    countries: BTreeMap<String, Country>,
    regions: BTreeMap<(String, String), String>,
}

impl StaticGeography {
    pub fn new(settings: &GeographySettings) -> Self {
        let mut countries = BUILTIN_COUNTRIES
            .iter()
            .map(|(iso3, iso2, name)| {
                (
                    iso3.to_string(),
                    Country {
                        iso3: iso3.to_string(),
                        iso2: iso2.to_string(),
                        name: name.to_string(),
                    },
                )
            })
            .collect::<BTreeMap<_, _>>();

        for country in &settings.countries {
            countries.insert(country.iso3.to_lowercase(), country.clone());
        }

        let regions = settings
            .regions
            .iter()
            .map(|r| ((r.country.to_lowercase(), r.code.clone()), r.name.clone()))
            .collect();

        Self { countries, regions }
    }
}

impl Default for StaticGeography {
    fn default() -> Self {
        Self::new(&GeographySettings::default())
    }
}

impl Geography for StaticGeography {
    fn country(&self, iso3: &str) -> Option<Country> {
        self.countries.get(&iso3.trim().to_lowercase()).cloned()
    }

    fn region_name(&self, country_iso3: &str, code: &str) -> Option<String> {
        self.regions
            .get(&(country_iso3.trim().to_lowercase(), code.trim().to_string()))
            .cloned()
    }
}

/// Нормализация названия города под поиск агрегатора
pub fn normalize_city(city: &str) -> String {
    let lowered = city.trim().to_lowercase();
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .replace(" - ", "-")
        .replace(['.', '\u{a0}', '\u{2007}', '\u{202f}'], "")
        .trim()
        .to_string()
}

/// Преобразование адреса магазина в адрес агрегатора
pub fn normalize(address: &LocalAddress, geography: &dyn Geography) -> CarrierAddress {
    let mut parts = Vec::with_capacity(4);

    let country = geography.country(&address.country);
    let country_code = country
        .as_ref()
        .filter(|c| !c.iso2.is_empty())
        .map(|c| c.iso2.to_uppercase());
    if let Some(name) = country.as_ref().map(|c| c.name.clone()).filter(|n| !n.is_empty()) {
        parts.push(name);
    }

    let region = geography
        .region_name(&address.country, &address.region)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| address.region.clone());
    parts.push(region.clone());

    let city = normalize_city(&address.city);
    if city.to_lowercase() != region.to_lowercase() {
        parts.push(city.clone());
    }

    if !address.street.trim().is_empty() {
        parts.push(address.street.clone());
    }

    CarrierAddress {
        country_code,
        region,
        city,
        address_string: parts.join(", "),
    }
}

/// Регион доставки, которым ограничен способ доставки
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryRegion {
    pub country: String,
    pub region: Vec<String>,
    /// Один или несколько городов через запятую
    pub city: String,
}

/// Разрешённый адрес доставки
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct AllowedAddress {
    pub country: Option<String>,
    pub regions: Vec<String>,
    pub cities: Vec<String>,
}

impl DeliveryRegion {
    pub fn allowed(&self) -> AllowedAddress {
        let country = Some(self.country.trim().to_string()).filter(|c| !c.is_empty());
        let regions = self
            .region
            .iter()
            .filter(|r| !r.trim().is_empty())
            .cloned()
            .collect();
        let cities = self
            .city
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        AllowedAddress {
            country,
            regions,
            cities,
        }
    }
}

impl AllowedAddress {
    /// Попадает ли адрес в регион доставки; пустые ограничения пропускают всё
    pub fn contains(&self, address: &LocalAddress) -> bool {
        if let Some(country) = &self.country
            && !country.eq_ignore_ascii_case(address.country.trim())
        {
            return false;
        }
        if !self.regions.is_empty() && !self.regions.iter().any(|r| r.trim() == address.region.trim()) {
            return false;
        }
        if self.cities.is_empty() {
            return true;
        }
        let city = normalize_city(&address.city);
        self.cities.iter().any(|c| normalize_city(c) == city)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressField {
    Country,
    Region,
    City,
    Street,
}

impl AddressField {
    pub fn title(&self) -> &'static str {
        match self {
            Self::Country => "Страна",
            Self::Region => "Регион",
            Self::City => "Город",
            Self::Street => "Улица",
        }
    }
}

/// Поля адреса, которые нужны для расчёта. Улица нужна только
/// для доставки до двери или почтой.
pub fn requested_fields(street_required: bool) -> Vec<AddressField> {
    let mut fields = vec![AddressField::Country, AddressField::Region, AddressField::City];
    if street_required {
        fields.push(AddressField::Street);
    }
    fields
}
