use reqwest::Method;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use std::time::Duration;

use super::{
    error::{ApishipError, Result},
    models::{
        CalculatorRequest, CalculatorResponse, ListItem, ListPayload, POINT_FIELDS, Point,
        PointType, ProviderInfo, TariffInfo, TariffPage, Token,
    },
};

pub const STANDARD_URL: &str = "https://api.apiship.ru/v1/";
pub const TEST_URL: &str = "http://api.dev.apiship.ru/v1/";
pub const UNSAFE_URL: &str = "http://api.apiship.ru:11987/v1/";

/// Размер страницы справочника пунктов выдачи
pub const POINTS_PAGE_LIMIT: u64 = 1000;
/// Размер страницы справочника тарифов
pub const TARIFFS_PAGE_LIMIT: u64 = 10;

/// Ключ провайдера Почты России
pub const RUSSIAN_POST_KEY: &str = "rupost";
/// Идентификатор типа доставки «до двери»
pub const COURIER_DELIVERY_TYPE: u32 = 1;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Режим работы с API
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ApiMode {
    #[default]
    Standard,
    /// Тестовый контур с учётными данными test/test
    Test,
    /// Доступ по HTTP через нестандартный порт
    Unsafe,
}

impl ApiMode {
    /// Тестовый режим имеет приоритет над небезопасным
    pub fn from_flags(test_mode: bool, unsafe_mode: bool) -> Self {
        match (test_mode, unsafe_mode) {
            (true, _) => Self::Test,
            (false, true) => Self::Unsafe,
            (false, false) => Self::Standard,
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            Self::Standard => STANDARD_URL,
            Self::Test => TEST_URL,
            Self::Unsafe => UNSAFE_URL,
        }
    }
}

/// HTTP-клиент для взаимодействия с ApiShip
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    token: Option<Token>,
}

impl Client {
    /// Создание клиента для выбранного режима
    pub fn new(mode: ApiMode) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http,
            base_url: mode.base_url().to_string(),
            token: None,
        })
    }

    /// Подмена адреса API (зеркало, тестовый сервер)
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        let mut base_url = base_url.trim().to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        self.base_url = base_url;
        self
    }

    pub fn with_token(mut self, token: Option<Token>) -> Self {
        self.token = token;
        self
    }

    pub fn set_token(&mut self, token: Option<Token>) {
        self.token = token;
    }

    pub fn token(&self) -> Option<&Token> {
        self.token.as_ref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Выполнение запроса: GET передаёт параметры строкой запроса,
    /// остальные методы телом JSON
    async fn execute<T, P>(&self, endpoint: &str, method: Method, params: &P) -> Result<T>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        let is_login = endpoint == "login";
        let token = match (&self.token, is_login) {
            (_, true) => None,
            (Some(token), false) if !token.access_token.is_empty() => Some(token),
            _ => return Err(ApishipError::Unauthorized),
        };

        let url = format!("{}{}", self.base_url, endpoint);
        let mut builder = self.http.request(method.clone(), &url);
        builder = if method == Method::GET {
            builder.query(params)
        } else {
            builder.json(params)
        };
        if let Some(token) = token {
            builder = builder.bearer_auth(&token.access_token);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApishipError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let parsed = serde_json::from_str::<T>(&body)?;
        Ok(parsed)
    }

    /// Отправка запроса. Любая ошибка пишется в журнал запросов
    /// и превращается в отсутствие данных.
    pub async fn send_request<T, P>(&self, endpoint: &str, method: Method, params: &P) -> Option<T>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        match self.execute(endpoint, method, params).await {
            Ok(parsed) => Some(parsed),
            Err(ApishipError::Unauthorized) => {
                tracing::debug!(
                    target: "calcapiship::request",
                    endpoint,
                    "запрос пропущен: нет токена"
                );
                None
            }
            Err(err) => {
                let params = if endpoint == "login" {
                    "***".to_string()
                } else {
                    serde_json::to_string(params).unwrap_or_default()
                };
                tracing::error!(
                    target: "calcapiship::request",
                    url = %format!("{}{}", self.base_url, endpoint),
                    %params,
                    error = %err,
                    "ошибка запроса к ApiShip"
                );
                None
            }
        }
    }

    /// Получение токена по логину и паролю
    pub async fn login(&self, login: &str, password: &str) -> Option<Token> {
        let payload = json!({
            "login": login,
            "password": password,
        });
        let response: Value = self.send_request("login", Method::POST, &payload).await?;

        if response.get("code").is_some_and(|c| !c.is_null()) {
            tracing::warn!(
                target: "calcapiship::request",
                code = %response["code"],
                message = %response["message"],
                "вход в ApiShip отклонён"
            );
            return None;
        }

        match serde_json::from_value::<Token>(response) {
            Ok(token) if !token.access_token.is_empty() => Some(token),
            Ok(_) => None,
            Err(err) => {
                tracing::error!(target: "calcapiship::request", error = %err, "ответ login не распознан");
                None
            }
        }
    }

    /// Расчёт стоимости и сроков доставки
    pub async fn calculator(&self, params: &CalculatorRequest) -> Option<CalculatorResponse> {
        self.send_request("calculator", Method::POST, params).await
    }

    async fn list<T: DeserializeOwned>(&self, endpoint: &str) -> Vec<T> {
        self.send_request::<ListPayload<T>, _>(endpoint, Method::GET, &[] as &[(&str, &str)])
            .await
            .map(ListPayload::into_rows)
            .unwrap_or_default()
    }

    /// Список провайдеров
    pub async fn providers(&self) -> Vec<ProviderInfo> {
        self.list("lists/providers").await
    }

    /// Список типов доставки. Тип 1 подписывается как «Курьер»
    pub async fn delivery_types(&self) -> Vec<ListItem> {
        let mut types: Vec<ListItem> = self.list("lists/deliveryTypes").await;
        for item in types.iter_mut() {
            if item.id == COURIER_DELIVERY_TYPE {
                item.name = "Курьер".to_string();
            }
        }
        types
    }

    /// Список типов приёма отправлений
    pub async fn pickup_types(&self) -> Vec<ListItem> {
        self.list("lists/pickupTypes").await
    }

    /// Список типов пунктов выдачи
    pub async fn point_types(&self) -> Vec<PointType> {
        self.list("lists/pointTypes").await
    }

    /// Пункты выдачи провайдеров в городе. Страницы, которые не удалось
    /// получить, пропускаются.
    pub async fn points(
        &self,
        provider_keys: &[String],
        country_code: Option<&str>,
        city: &str,
    ) -> Vec<Point> {
        let mut filter = Vec::with_capacity(3);
        if !provider_keys.is_empty() {
            let keys = serde_json::to_string(provider_keys).unwrap_or_default();
            filter.push(format!("providerKey={keys}"));
        }
        if let Some(code) = country_code.filter(|c| !c.is_empty()) {
            filter.push(format!("countryCode={code}"));
        }
        if !city.is_empty() {
            filter.push(format!("city={city}"));
        }
        let filter = filter.join(";");
        let fields = POINT_FIELDS.join(",");

        let page = |offset: u64| {
            vec![
                ("fields", fields.clone()),
                ("filter", filter.clone()),
                ("limit", POINTS_PAGE_LIMIT.to_string()),
                ("offset", offset.to_string()),
            ]
        };

        let Some(first) = self
            .send_request::<ListPayload<Point>, _>("lists/points", Method::GET, &page(0))
            .await
        else {
            return Vec::new();
        };
        let (mut points, total) = first.into_parts();

        let pages = total.unwrap_or_default().div_ceil(POINTS_PAGE_LIMIT);
        for i in 2..=pages {
            let offset = (i - 1) * POINTS_PAGE_LIMIT;
            if let Some(next) = self
                .send_request::<ListPayload<Point>, _>("lists/points", Method::GET, &page(offset))
                .await
            {
                points.extend(next.into_rows());
            }
        }

        points
    }

    /// Страница тарифов провайдера (нумерация с 1)
    pub async fn tariffs(&self, provider_key: &str, page: u64) -> Option<TariffPage> {
        if provider_key.is_empty() {
            return None;
        }
        let offset = page.saturating_sub(1) * TARIFFS_PAGE_LIMIT;
        let query = [
            ("filter", format!("providerKey={provider_key}")),
            ("limit", TARIFFS_PAGE_LIMIT.to_string()),
            ("offset", offset.to_string()),
        ];
        let payload = self
            .send_request::<ListPayload<TariffInfo>, _>("lists/tariffs", Method::GET, &query)
            .await?;
        let (items, total) = payload.into_parts();

        Some(TariffPage {
            items,
            pages: total.unwrap_or_default().div_ceil(TARIFFS_PAGE_LIMIT),
        })
    }
}
