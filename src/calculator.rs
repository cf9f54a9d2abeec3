//! Расчёт вариантов доставки для заказа.
//!
//! Порядок: проверка настроек, проверка адреса, вес и габариты,
//! дата отгрузки, кэш сессии, токен, запрос `calculator`, преобразование
//! предложений, сортировка и сохранение результата в кэш.

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    address::{self, AddressField, AllowedAddress, LocalAddress, StaticGeography},
    apiship::{Client, TokenManager, TokenStore, models::CalculatorRequest},
    cache::{CacheStore, DirectoryCache, SessionCache},
    calendar::WorkCalendar,
    config::{Config, DimensionTier, WeightSettings},
    currency::CurrencyConverter,
    delivery::WindowCalculator,
    rates::{self, DeliveryKind, Rate, RateComment, RateConverter},
    rules::RuleEngine,
};

pub const FAILURE_MESSAGE: &str = "Что-то пошло не так";
pub const NO_OPTIONS_MESSAGE: &str = "Нет подходящих вариантов";
pub const INCOMPLETE_ADDRESS_MESSAGE: &str = "Введите адрес доставки";

/// Заказ, для которого считается доставка
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Order {
    pub address: LocalAddress,
    /// Сумма заказа в валюте магазина
    pub total_price: f64,
    /// Вес заказа (г), если известен вес товаров
    pub total_weight: Option<f64>,
    pub total_length: Option<f64>,
    pub total_width: Option<f64>,
    pub total_height: Option<f64>,
    /// Плановая дата отгрузки
    pub departure_datetime: Option<NaiveDateTime>,
    /// Витрина, чьё расписание задаёт рабочие дни
    pub storefront: Option<String>,
}

/// Откуда пришёл запрос расчёта
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Env {
    Frontend {
        checkout_version: u8,
        /// В запросе есть параметры строки запроса
        has_query: bool,
    },
    Backend,
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub session_id: String,
    pub env: Env,
}

impl RequestContext {
    pub fn backend(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            env: Env::Backend,
        }
    }

    pub fn is_frontend(&self) -> bool {
        matches!(self.env, Env::Frontend { .. })
    }
}

/// Результат расчёта
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum Outcome {
    Rates(Vec<Rate>),
    /// Не хватает полей адреса доставки
    IncompleteAddress(Vec<AddressField>),
    NoSuitableOptions,
    /// Настройки не позволяют выполнить расчёт
    Failed,
}

impl Outcome {
    /// Сообщение для покупателя, если вариантов нет
    pub fn message(&self) -> Option<String> {
        match self {
            Self::Rates(_) => None,
            Self::IncompleteAddress(fields) => Some(format!(
                "{}: {}",
                INCOMPLETE_ADDRESS_MESSAGE,
                fields.iter().map(AddressField::title).collect::<Vec<_>>().join("; ")
            )),
            Self::NoSuitableOptions => Some(NO_OPTIONS_MESSAGE.to_string()),
            Self::Failed => Some(FAILURE_MESSAGE.to_string()),
        }
    }
}

/// Сводка по последнему расчёту сессии
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Summary {
    Ok { data: SummaryData },
    Fail { errors: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryData {
    pub address: String,
    pub rates: Vec<RateSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateSummary {
    pub id: String,
    #[serde(flatten)]
    pub comment: RateComment,
    /// Стоимость в валюте отображения, строкой
    pub delivery_cost: String,
    pub delivery_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_key: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub point_type: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    /// Минимальный срок в днях
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<u32>,
}

/// Вес отправления (г): из настроек либо вес заказа, если он известен
/// и настройки этого не запрещают. Нулевой вес заменяется на 1.
pub fn resolve_weight(settings: &WeightSettings, order_weight: Option<f64>) -> u64 {
    let order_weight = order_weight.map(f64::ceil).filter(|w| *w > 0.);
    let weight = match order_weight {
        Some(w) if !settings.force => w as u64,
        _ => settings.weight,
    };
    weight.max(1)
}

/// Габариты (см): размеры заказа, а если хоть один неизвестен, то первый
/// уровень, вес которого не меньше веса отправления
pub fn resolve_dimensions(tiers: &[DimensionTier], weight: u64, order: &Order) -> (u64, u64, u64) {
    let side = |v: Option<f64>| v.map(f64::ceil).filter(|v| *v > 0.).map_or(0, |v| v as u64);
    let dims = (
        side(order.total_length),
        side(order.total_width),
        side(order.total_height),
    );
    if dims.0 > 0 && dims.1 > 0 && dims.2 > 0 {
        return dims;
    }
    tiers
        .iter()
        .find(|t| weight <= t.weight)
        .map_or(dims, |t| (t.length, t.width, t.height))
}

type Clock = Box<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Калькулятор доставки
pub struct Calculator<S: TokenStore> {
    config: Config,
    client: Client,
    tokens: TokenManager<S>,
    cache: Arc<dyn CacheStore>,
    geography: StaticGeography,
    currency: CurrencyConverter,
    clock: Clock,
}

impl<S: TokenStore> Calculator<S> {
    pub fn new(config: Config, client: Client, tokens: TokenManager<S>, cache: Arc<dyn CacheStore>) -> Self {
        let geography = config.geography();
        let currency = config.currency_converter();
        Self {
            config,
            client,
            tokens,
            cache,
            geography,
            currency,
            clock: Box::new(|| Local::now().naive_local()),
        }
    }

    /// Подмена текущего времени
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDateTime + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn session(&self, session_id: &str) -> SessionCache<'_> {
        SessionCache::new(self.cache.as_ref(), session_id, &self.config.instance_id)
    }

    /// Причина, по которой настройки не позволяют считать доставку
    fn misconfiguration(&self) -> Option<&'static str> {
        let config = &self.config;
        if config.dispatch_address.is_empty() {
            Some("не задан адрес отправки")
        } else if config.weight.weight == 0 {
            Some("не задан вес")
        } else if config.weight_and_dimensions.is_empty() {
            Some("не заданы вес и габариты")
        } else if config.providers.is_empty() {
            Some("не выбран ни один провайдер")
        } else if config.delivery_types.is_empty() {
            Some("не выбран ни один тип доставки")
        } else if config.pickup_types.is_empty() {
            Some("не выбран ни один тип приёма")
        } else {
            None
        }
    }

    /// Регион, которым ограничена доставка
    pub fn allowed_address(&self) -> AllowedAddress {
        self.config.delivery_address.allowed()
    }

    /// Поля адреса, которые нужно запросить у покупателя для способа доставки
    pub fn requested_fields(&self, kind: Option<DeliveryKind>) -> Vec<AddressField> {
        let street = matches!(kind, Some(DeliveryKind::Door | DeliveryKind::Post))
            || self.config.courier_enabled();
        address::requested_fields(street)
    }

    fn missing_address_fields(&self, address: &LocalAddress, ctx: &RequestContext) -> Vec<AddressField> {
        let mut missing = Vec::new();
        if address.country.trim().is_empty() {
            missing.push(AddressField::Country);
        }
        if address.region.trim().is_empty() {
            missing.push(AddressField::Region);
        }
        if address.city.trim().is_empty() {
            missing.push(AddressField::City);
        }
        if let Env::Frontend {
            checkout_version,
            has_query,
        } = ctx.env
            && checkout_version != 2
            && has_query
            && self.config.courier_enabled()
            && address.street.trim().is_empty()
        {
            missing.push(AddressField::Street);
        }
        missing
    }

    /// Дата отгрузки `YYYY-MM-DD`: прошедшая заменяется текущей,
    /// затем переносится на ближайший рабочий день
    fn pickup_date(&self, order: &Order, calendar: &WorkCalendar, now: NaiveDateTime) -> Option<String> {
        let departure = order.departure_datetime?.max(now);
        Some(calendar.nearest_working_day(departure).format("%Y-%m-%d").to_string())
    }

    /// Параметры запроса к `calculator`
    pub fn build_request(&self, order: &Order, calendar: &WorkCalendar, now: NaiveDateTime) -> CalculatorRequest {
        let weight = resolve_weight(&self.config.weight, order.total_weight);
        let (length, width, height) = resolve_dimensions(&self.config.weight_and_dimensions, weight, order);

        CalculatorRequest {
            from: address::normalize(&self.config.dispatch_address, &self.geography),
            to: address::normalize(&order.address, &self.geography),
            weight,
            length,
            width,
            height,
            assessed_cost: order.total_price,
            provider_keys: self.config.provider_keys(),
            delivery_types: self.config.delivery_types.iter().map(|t| t.id).collect(),
            pickup_types: self.config.pickup_types.iter().map(|t| t.id).collect(),
            pickup_date: self.pickup_date(order, calendar, now),
        }
    }

    /// Расчёт вариантов доставки заказа
    pub async fn calculate(&self, order: &Order, ctx: &RequestContext) -> Outcome {
        let session = self.session(&ctx.session_id);

        if let Some(reason) = self.misconfiguration() {
            tracing::error!(target: "calcapiship::calculate", session = %ctx.session_id, reason, "расчёт невозможен");
            session.set_error(true);
            return Outcome::Failed;
        }

        let missing = self.missing_address_fields(&order.address, ctx);
        if !missing.is_empty() {
            session.set_error(true);
            return Outcome::IncompleteAddress(missing);
        }

        if !self.allowed_address().contains(&order.address) {
            tracing::debug!(target: "calcapiship::calculate", session = %ctx.session_id, "адрес вне региона доставки");
            session.set_error(true);
            return Outcome::NoSuitableOptions;
        }

        let now = (self.clock)();
        let calendar = self.config.calendar_for(order.storefront.as_deref());
        let params = self.build_request(order, &calendar, now);
        let providers = &self.config.providers;

        let rates = match session.lookup(providers, &params) {
            Some(rates) => {
                tracing::debug!(target: "calcapiship::calculate", session = %ctx.session_id, "варианты из кэша");
                rates
            }
            None => {
                session.invalidate();
                session.store_request(providers, &params);
                let rates = self.fetch_rates(&session, order, ctx, &params, &calendar, now).await;
                session.store_rates(&rates);
                rates
            }
        };

        if rates.is_empty() {
            session.set_error(true);
            return Outcome::NoSuitableOptions;
        }
        session.set_error(false);
        Outcome::Rates(rates)
    }

    async fn fetch_rates(
        &self,
        session: &SessionCache<'_>,
        order: &Order,
        ctx: &RequestContext,
        params: &CalculatorRequest,
        calendar: &WorkCalendar,
        now: NaiveDateTime,
    ) -> Vec<Rate> {
        let Some(token) = self.tokens.get_token(&self.client, false).await else {
            tracing::warn!(target: "calcapiship::calculate", "нет токена ApiShip, расчёт пропущен");
            return Vec::new();
        };
        let client = self.client.clone().with_token(Some(token));

        let Some(response) = client.calculator(params).await else {
            return Vec::new();
        };

        let engine = RuleEngine::new(&self.config.providers, &self.currency, order.total_price);
        let window = WindowCalculator::new(calendar, &self.config.date_format, now);
        let converter = RateConverter::new(
            &self.config.providers,
            &self.config.delivery_types,
            &engine,
            &window,
            ctx.is_frontend(),
        );

        let mut rates = Vec::new();
        if !response.delivery_to_door.is_empty() {
            let door = converter.door_rates(&response.delivery_to_door);
            session.store_rates_to_door(&door);
            rates.extend(door);
        }

        if !response.delivery_to_point.is_empty() {
            let directory = DirectoryCache::new(self.cache.as_ref(), &self.config.instance_id);
            let points = directory
                .points(
                    &client,
                    &params.provider_keys,
                    params.to.country_code.as_deref(),
                    &params.to.city,
                )
                .await;
            let point_types = directory.point_types(&client).await;
            let point = converter.point_rates(&response.delivery_to_point, &points, &point_types);
            session.store_rates_to_point(&point);
            rates.extend(point);
        }

        if let Some(sort_by) = self.config.sort_by {
            rates::sort_rates(&mut rates, sort_by);
        }

        tracing::info!(
            target: "calcapiship::calculate",
            session = %ctx.session_id,
            count = rates.len(),
            "получены варианты доставки"
        );
        rates
    }

    /// Сводка по последнему расчёту сессии
    pub fn summary(&self, session_id: &str) -> Summary {
        let session = self.session(session_id);
        let no_options = || Summary::Fail {
            errors: vec![NO_OPTIONS_MESSAGE.to_string()],
        };

        if session.error().unwrap_or(false) {
            return no_options();
        }
        let Some(params) = session.params() else {
            return no_options();
        };

        let mut address = params.to.city.clone();
        if !params.to.address_string.is_empty() {
            address.push(' ');
            address.push_str(&params.to.address_string);
        }

        let rates = session
            .rates_to_door()
            .into_iter()
            .chain(session.rates_to_point())
            .map(|rate| self.rate_summary(rate))
            .collect::<Vec<_>>();

        if rates.is_empty() {
            return no_options();
        }
        Summary::Ok {
            data: SummaryData { address, rates },
        }
    }

    fn rate_summary(&self, rate: Rate) -> RateSummary {
        let pickup = rate.kind == DeliveryKind::Pickup;
        let point = rate.point.as_ref().filter(|_| pickup);
        RateSummary {
            delivery_cost: self.currency.format_display(rate.rate),
            delivery_time: rate.est_delivery_string(),
            cost: pickup.then_some(rate.rate),
            provider_key: pickup.then(|| rate.provider_key.clone()),
            point_type: point.and_then(|p| p.point_type),
            lat: point.and_then(|p| p.lat),
            lng: point.and_then(|p| p.lng),
            time: pickup.then_some(rate.days[0]),
            id: rate.id,
            comment: rate.comment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiers() -> Vec<DimensionTier> {
        vec![
            DimensionTier {
                weight: 500,
                length: 15,
                width: 10,
                height: 5,
            },
            DimensionTier {
                weight: 3000,
                length: 30,
                width: 20,
                height: 15,
            },
        ]
    }

    #[test]
    fn weight_from_order_unless_forced() {
        let settings = WeightSettings {
            weight: 500,
            force: false,
        };
        assert_eq!(resolve_weight(&settings, Some(1234.2)), 1235);
        assert_eq!(resolve_weight(&settings, None), 500);
        assert_eq!(resolve_weight(&settings, Some(0.)), 500);

        let forced = WeightSettings {
            weight: 500,
            force: true,
        };
        assert_eq!(resolve_weight(&forced, Some(1234.)), 500);

        let zero = WeightSettings {
            weight: 0,
            force: true,
        };
        assert_eq!(resolve_weight(&zero, None), 1);
    }

    #[test]
    fn dimensions_from_first_fitting_tier() {
        let order = Order::default();
        assert_eq!(resolve_dimensions(&tiers(), 2000, &order), (30, 20, 15));
        assert_eq!(resolve_dimensions(&tiers(), 500, &order), (15, 10, 5));
        assert_eq!(resolve_dimensions(&tiers(), 5000, &order), (0, 0, 0));
    }

    #[test]
    fn order_dimensions_win_when_complete() {
        let order = Order {
            total_length: Some(10.2),
            total_width: Some(11.),
            total_height: Some(12.),
            ..Default::default()
        };
        assert_eq!(resolve_dimensions(&tiers(), 2000, &order), (11, 11, 12));

        let partial = Order {
            total_length: Some(10.),
            ..Default::default()
        };
        assert_eq!(resolve_dimensions(&tiers(), 2000, &partial), (30, 20, 15));
    }

    #[test]
    fn outcome_messages() {
        assert_eq!(
            Outcome::IncompleteAddress(vec![AddressField::Region, AddressField::Street]).message(),
            Some("Введите адрес доставки: Регион; Улица".to_string())
        );
        assert_eq!(Outcome::Failed.message().as_deref(), Some(FAILURE_MESSAGE));
        assert_eq!(Outcome::Rates(vec![]).message(), None);
    }
}
