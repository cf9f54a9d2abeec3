use std::sync::Arc;

use calcapiship::{
    Calculator, Env, Order, Outcome, RequestContext, Summary,
    address::{AddressField, LocalAddress},
    apiship::{ApiMode, Client, MemoryTokenStore, TokenManager, models::Token},
    cache::{CacheStore, MemoryStore},
    config::Config,
    rates::DeliveryKind,
};
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{Value, json};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, method, path},
};

const CONFIG: &str = r#"
instance_id = "shop"
date_format = "%d.%m.%Y"

[launch_options]
test_mode = false

[credentials]
username = "user"
password = "secret"

[dispatch_address]
country = "rus"
region = "77"
city = "Москва"
street = "Тверская, 1"

[weight]
weight = 500

[[weight_and_dimensions]]
weight = 2000
length = 30
width = 20
height = 15

[[weight_and_dimensions]]
weight = 500
length = 15
width = 10
height = 5

[[delivery_types]]
id = 1
name = "Курьер"

[[delivery_types]]
id = 2
name = "Самовывоз"

[[pickup_types]]
id = 1
name = "От двери"

[providers.cdek]
name = "СДЭК"
tariffs = [1, 5]

[[providers.cdek.rules]]
scheme = "increase_cost"
value = 10.0
measure = "percent"
percent = "shipping"

[[providers.cdek.rules]]
scheme = "fix_cost"
value = 500.0
measure = "currency"

[providers.dpd]
name = "DPD"
tariffs = [7]
"#;

fn monday() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 6, 9)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap()
}

fn config() -> Config {
    Config::from_toml(CONFIG).unwrap()
}

fn token() -> Token {
    Token {
        access_token: "stored".into(),
        expires: "2099-01-01T00:00:00Z".into(),
    }
}

fn calculator(server: &MockServer, config: Config, store: Arc<dyn CacheStore>) -> Calculator<MemoryTokenStore> {
    let client = Client::new(ApiMode::Standard)
        .unwrap()
        .with_base_url(&server.uri());
    let tokens = TokenManager::new(
        MemoryTokenStore::new(Some(token())),
        config.credentials.clone(),
        config.launch_options.test_mode,
    );
    Calculator::new(config, client, tokens, store).with_clock(monday)
}

fn order() -> Order {
    Order {
        address: LocalAddress {
            country: "rus".into(),
            region: "78".into(),
            city: "г. Санкт-Петербург".into(),
            street: "Невский, 10".into(),
        },
        total_price: 1000.,
        ..Default::default()
    }
}

fn door_response() -> Value {
    json!({
        "deliveryToDoor": [
            {
                "providerKey": "cdek",
                "tariffs": [
                    {"tariffId": 1, "tariffName": "Экспресс", "deliveryCost": 400.0,
                     "daysMin": 2, "daysMax": 4, "deliveryTypes": [1]},
                    {"tariffId": 2, "tariffName": "Не выбран", "deliveryCost": 100.0,
                     "daysMin": 1, "daysMax": 1, "deliveryTypes": [1]}
                ]
            },
            {
                "providerKey": "dpd",
                "tariffs": [
                    {"tariffId": 7, "tariffName": "Classic", "deliveryCost": 350.5,
                     "daysMin": 3, "daysMax": 3, "deliveryTypes": [1]}
                ]
            }
        ],
        "deliveryToPoint": []
    })
}

async fn mount_calculator(server: &MockServer, body: Value, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/calculator"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(expected)
        .mount(server)
        .await;
}

fn rates(outcome: Outcome) -> Vec<calcapiship::rates::Rate> {
    match outcome {
        Outcome::Rates(rates) => rates,
        other => panic!("ожидались варианты, получено {other:?}"),
    }
}

#[tokio::test]
async fn door_rates_apply_rules_and_dates() {
    let server = MockServer::start().await;
    mount_calculator(&server, door_response(), 1).await;

    let calculator = calculator(&server, config(), Arc::new(MemoryStore::new()));
    let rates = rates(calculator.calculate(&order(), &RequestContext::backend("s1")).await);

    assert_eq!(rates.len(), 2);
    let cdek = rates.iter().find(|r| r.provider_key == "cdek").unwrap();
    assert_eq!(cdek.id, "tariff-1");
    assert_eq!(cdek.rate, 500.);
    assert_eq!(cdek.kind, DeliveryKind::Door);
    assert_eq!(cdek.est_delivery, vec!["11.06.2025", "13.06.2025"]);

    let dpd = rates.iter().find(|r| r.provider_key == "dpd").unwrap();
    assert_eq!(dpd.rate, 350.5);
    assert_eq!(dpd.est_delivery, vec!["12.06.2025"]);
}

#[tokio::test]
async fn repeated_request_is_served_from_cache() {
    let server = MockServer::start().await;
    mount_calculator(&server, door_response(), 1).await;

    let calculator = calculator(&server, config(), Arc::new(MemoryStore::new()));
    let ctx = RequestContext::backend("s2");
    let first = calculator.calculate(&order(), &ctx).await;
    let second = calculator.calculate(&order(), &ctx).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn provider_change_recomputes() {
    let server = MockServer::start().await;
    mount_calculator(&server, door_response(), 2).await;
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let ctx = RequestContext::backend("s3");

    let first = calculator(&server, config(), store.clone());
    assert_eq!(rates(first.calculate(&order(), &ctx).await).len(), 2);

    let mut changed = config();
    if let Some(cdek) = changed.providers.get_mut("cdek") {
        cdek.tariffs.push(2);
    }
    let second = calculator(&server, changed, store);
    assert_eq!(rates(second.calculate(&order(), &ctx).await).len(), 3);
}

#[tokio::test]
async fn missing_credentials_skip_http() {
    let server = MockServer::start().await;
    let mut config = config();
    config.credentials.password.clear();

    let client = Client::new(ApiMode::Standard)
        .unwrap()
        .with_base_url(&server.uri());
    let tokens = TokenManager::new(MemoryTokenStore::default(), config.credentials.clone(), false);
    let calculator = Calculator::new(config, client, tokens, Arc::new(MemoryStore::new()));

    let outcome = calculator.calculate(&order(), &RequestContext::backend("s4")).await;
    assert_eq!(outcome, Outcome::NoSuitableOptions);
    assert_eq!(server.received_requests().await.unwrap().len(), 0);
}

#[tokio::test]
async fn misconfiguration_fails() {
    let server = MockServer::start().await;
    let mut config = config();
    config.providers.clear();

    let calculator = calculator(&server, config, Arc::new(MemoryStore::new()));
    let outcome = calculator.calculate(&order(), &RequestContext::backend("s5")).await;
    assert_eq!(outcome, Outcome::Failed);
    assert_eq!(calculator.summary("s5"), Summary::Fail {
        errors: vec!["Нет подходящих вариантов".into()]
    });
}

#[tokio::test]
async fn storefront_asks_for_street() {
    let server = MockServer::start().await;
    let calculator = calculator(&server, config(), Arc::new(MemoryStore::new()));

    let mut order = order();
    order.address.street.clear();
    let ctx = RequestContext {
        session_id: "s6".into(),
        env: Env::Frontend {
            checkout_version: 1,
            has_query: true,
        },
    };
    let outcome = calculator.calculate(&order, &ctx).await;
    assert_eq!(outcome, Outcome::IncompleteAddress(vec![AddressField::Street]));
    assert_eq!(server.received_requests().await.unwrap().len(), 0);
}

#[tokio::test]
async fn heavy_order_uses_matching_tier() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/calculator"))
        .and(body_partial_json(json!({
            "weight": 1500, "length": 30, "width": 20, "height": 15
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(door_response()))
        .expect(1)
        .mount(&server)
        .await;

    let calculator = calculator(&server, config(), Arc::new(MemoryStore::new()));
    let mut order = order();
    order.total_weight = Some(1500.);
    let outcome = calculator.calculate(&order, &RequestContext::backend("s7")).await;
    assert!(matches!(outcome, Outcome::Rates(_)));
}

#[tokio::test]
async fn point_rates_and_summary() {
    let server = MockServer::start().await;
    mount_calculator(
        &server,
        json!({
            "deliveryToDoor": [],
            "deliveryToPoint": [{
                "providerKey": "cdek",
                "tariffs": [{"tariffId": 5, "tariffName": "Склад-склад", "deliveryCost": 200.0,
                             "daysMin": 1, "daysMax": 2, "deliveryTypes": [2],
                             "pointIds": [10, 11]}]
            }]
        }),
        1,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/lists/points"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rows": [{
                "id": 10, "providerKey": "cdek", "type": 1, "name": "ПВЗ на Невском",
                "lat": 59.93, "lng": 30.33, "city": "Санкт-Петербург",
                "street": "Невский", "house": "10", "cod": 1, "paymentCard": "1"
            }],
            "meta": {"total": 1, "limit": 1000, "offset": 0}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/lists/pointTypes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "name": "pvz", "description": "Пункт выдачи"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let calculator = calculator(&server, config(), Arc::new(MemoryStore::new()));
    let rates = rates(calculator.calculate(&order(), &RequestContext::backend("s8")).await);

    assert_eq!(rates.len(), 1);
    let rate = &rates[0];
    assert_eq!(rate.id, "tariff-5_point-10");
    assert_eq!(rate.kind, DeliveryKind::Pickup);
    assert_eq!(rate.rate, 500.);
    assert_eq!(rate.comment.point_type.as_deref(), Some("Пункт выдачи"));
    assert_eq!(rate.point.as_ref().map(|p| p.id), Some(10));

    let Summary::Ok { data } = calculator.summary("s8") else {
        panic!("ожидалась сводка");
    };
    assert_eq!(data.rates.len(), 1);
    assert_eq!(data.rates[0].provider_key.as_deref(), Some("cdek"));
    assert_eq!(data.rates[0].time, Some(1));
    assert_eq!(data.rates[0].lat, Some(59.93));
}

#[tokio::test]
async fn address_outside_delivery_region_is_refused() {
    let server = MockServer::start().await;
    let mut config = config();
    config.delivery_address.country = "rus".into();
    config.delivery_address.region = vec!["77".into()];

    let calculator = calculator(&server, config, Arc::new(MemoryStore::new()));
    let outcome = calculator.calculate(&order(), &RequestContext::backend("s9")).await;
    assert_eq!(outcome, Outcome::NoSuitableOptions);
    assert_eq!(server.received_requests().await.unwrap().len(), 0);

    assert_eq!(
        calculator.requested_fields(Some(DeliveryKind::Pickup)),
        vec![AddressField::Country, AddressField::Region, AddressField::City, AddressField::Street]
    );
}
