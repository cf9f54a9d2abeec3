use std::{cmp::Ordering, collections::HashMap};

use crate::{
    apiship::{
        client::RUSSIAN_POST_KEY,
        models::{ListItem, Point, PointType, ProviderOffer, TariffOffer},
    },
    config::{Providers, SortBy},
    currency::CARRIER_CURRENCY,
    delivery::WindowCalculator,
    rules::RuleEngine,
};

use super::{DeliveryKind, POST_LABEL, PointData, Rate, RateComment};

const DPD_KEY: &str = "dpd";
const IML_KEY: &str = "iml";

/// Преобразование предложений агрегатора в варианты доставки
pub struct RateConverter<'a> {
    providers: &'a Providers,
    delivery_types: &'a [ListItem],
    engine: &'a RuleEngine<'a>,
    window: &'a WindowCalculator,
    /// Расчёт для витрины: в названии не показывается тариф
    frontend: bool,
}

impl<'a> RateConverter<'a> {
    pub fn new(
        providers: &'a Providers,
        delivery_types: &'a [ListItem],
        engine: &'a RuleEngine<'a>,
        window: &'a WindowCalculator,
        frontend: bool,
    ) -> Self {
        Self {
            providers,
            delivery_types,
            engine,
            window,
            frontend,
        }
    }

    fn is_selected(&self, provider_key: &str, tariff_id: u64) -> bool {
        self.providers
            .get(provider_key)
            .is_some_and(|p| p.tariffs.contains(&tariff_id))
    }

    /// Вариант по тарифу; тариф со сроком за пределами календаря пропускается
    fn rate(&self, id: String, provider_key: &str, tariff: &TariffOffer, comment: RateComment) -> Option<Rate> {
        let days = WindowCalculator::days(self.engine, provider_key, tariff.days_min, tariff.days_max);
        let Some(window) = self.window.window(days) else {
            tracing::warn!(
                provider_key,
                tariff_id = tariff.tariff_id,
                days_min = days[0],
                days_max = days[1],
                "недопустимый срок доставки, тариф пропущен"
            );
            return None;
        };
        Some(Rate {
            id,
            rate: self.engine.apply_cost(provider_key, tariff.delivery_cost),
            currency: CARRIER_CURRENCY.to_string(),
            provider_key: provider_key.to_string(),
            name: self.name(&comment),
            comment,
            est_delivery: window.est_delivery,
            delivery_date: window.delivery_date,
            days: window.days,
            kind: DeliveryKind::Door,
            point: None,
        })
    }

    /// Варианты доставки до двери (почтой для Почты России)
    pub fn door_rates(&self, offers: &[ProviderOffer]) -> Vec<Rate> {
        let mut rates = Vec::new();
        for offer in offers {
            let key = offer.provider_key.as_str();
            for tariff in offer.tariffs.iter().filter(|t| self.is_selected(key, t.tariff_id)) {
                let comment = self.comment(key, tariff, None);
                let Some(mut rate) = self.rate(format!("tariff-{}", tariff.tariff_id), key, tariff, comment) else {
                    continue;
                };
                if key == RUSSIAN_POST_KEY {
                    rate.kind = DeliveryKind::Post;
                }
                upsert(&mut rates, rate);
            }
        }
        rates
    }

    /// Варианты доставки до пунктов выдачи. Пункты, которых нет
    /// в справочнике, пропускаются.
    pub fn point_rates(
        &self,
        offers: &[ProviderOffer],
        points: &[Point],
        point_types: &[PointType],
    ) -> Vec<Rate> {
        let mut index: HashMap<u64, &Point> = HashMap::with_capacity(points.len());
        for point in points {
            index.entry(point.id).or_insert(point);
        }

        let mut rates = Vec::new();
        for offer in offers {
            let key = offer.provider_key.as_str();
            for tariff in offer.tariffs.iter().filter(|t| self.is_selected(key, t.tariff_id)) {
                for point_id in &tariff.point_ids {
                    let Some(&point) = index.get(point_id) else {
                        continue;
                    };
                    let comment = self.comment(key, tariff, Some((point, point_types)));
                    let id = format!("tariff-{}_point-{}", tariff.tariff_id, point_id);
                    let Some(mut rate) = self.rate(id, key, tariff, comment) else {
                        continue;
                    };
                    rate.kind = DeliveryKind::Pickup;
                    rate.point = Some(PointData {
                        id: point.id,
                        point_type: point.point_type,
                        lat: point.lat,
                        lng: point.lng,
                        name: rate.name_string(),
                        description: point_address(point),
                        way: point.description.clone(),
                        schedule: point.timetable.clone(),
                    });
                    upsert(&mut rates, rate);
                }
            }
        }
        rates
    }

    /// Подробности варианта: тип доставки, провайдер, тариф и данные пункта
    pub fn comment(
        &self,
        provider_key: &str,
        tariff: &TariffOffer,
        point: Option<(&Point, &[PointType])>,
    ) -> RateComment {
        let mut comment = RateComment {
            delivery_type: tariff.delivery_types.first().and_then(|id| {
                self.delivery_types
                    .iter()
                    .find(|t| t.id == *id)
                    .map(|t| t.name.clone())
            }),
            provider: self
                .providers
                .get(provider_key)
                .map(|p| p.name.clone())
                .filter(|n| !n.is_empty()),
            tariff: tariff.tariff_name.clone(),
            ..Default::default()
        };
        if provider_key == RUSSIAN_POST_KEY {
            comment.delivery_type = Some(POST_LABEL.to_string());
        }

        let Some((point, point_types)) = point else {
            return comment;
        };

        let name = point.name.clone().unwrap_or_default();
        comment.point = Some(match provider_key {
            DPD_KEY => format!("{} - {}", name, point_street(point)),
            IML_KEY => point_street(point),
            _ => name,
        });
        comment.point_type = point.point_type.and_then(|id| {
            point_types
                .iter()
                .find(|t| t.id == id)
                .and_then(|t| t.description.clone())
        });
        comment.point_code = point.code.clone();
        if provider_key == IML_KEY {
            comment.point_iml_id = point
                .url
                .as_deref()
                .map(|url| url.chars().filter(char::is_ascii_digit).collect());
        }
        comment.address = Some(point_address(point));
        comment.phone = point
            .phone
            .clone()
            .filter(|p| !p.is_empty() && p != "null");
        comment.timetable = point.timetable.clone();
        comment.description = point.description.clone();
        comment.payment = Some(point.cod);
        comment.payment_card = Some(point.payment_card);
        comment.fitting_room = Some(point.fitting_room);

        comment
    }

    /// Части названия варианта по приоритету полей
    pub fn name(&self, comment: &RateComment) -> Vec<String> {
        let post = comment.delivery_type.as_deref() == Some(POST_LABEL);
        let fields = match (self.frontend, post) {
            (true, true) => vec![comment.provider.clone(), Some(comment.tariff.clone())],
            (true, false) => vec![
                comment.delivery_type.clone(),
                comment.provider.clone(),
                comment.point.clone(),
            ],
            (false, _) => vec![
                comment.delivery_type.clone(),
                comment.provider.clone(),
                comment.point.clone(),
                Some(comment.tariff.clone()),
            ],
        };
        fields
            .into_iter()
            .flatten()
            .filter(|v| !v.is_empty())
            .collect()
    }
}

/// Вариант с тем же идентификатором заменяется на месте
fn upsert(rates: &mut Vec<Rate>, rate: Rate) {
    match rates.iter_mut().find(|r| r.id == rate.id) {
        Some(existing) => *existing = rate,
        None => rates.push(rate),
    }
}

fn join_unique<'a>(parts: impl IntoIterator<Item = &'a str>, separator: &str) -> String {
    let mut unique: Vec<&str> = Vec::new();
    for part in parts.into_iter().map(str::trim) {
        if !part.is_empty() && !unique.contains(&part) {
            unique.push(part);
        }
    }
    unique.join(separator)
}

fn typed(kind: &Option<String>, value: &Option<String>) -> String {
    join_unique([kind.as_deref().unwrap_or_default(), value.as_deref().unwrap_or_default()], " ")
}

/// Улица, дом, корпус и офис пункта через пробел
pub fn point_street(point: &Point) -> String {
    let street = typed(&point.street_type, &point.street);
    join_unique(
        [
            street.as_str(),
            point.house.as_deref().unwrap_or_default(),
            point.block.as_deref().unwrap_or_default(),
            point.office.as_deref().unwrap_or_default(),
        ],
        " ",
    )
}

/// Полный адрес пункта через запятую
pub fn point_address(point: &Point) -> String {
    let street = typed(&point.street_type, &point.street);
    let city = typed(&point.city_type, &point.city);
    let region = typed(&point.region_type, &point.region);
    join_unique(
        [
            street.as_str(),
            point.house.as_deref().unwrap_or_default(),
            point.block.as_deref().unwrap_or_default(),
            point.office.as_deref().unwrap_or_default(),
            city.as_str(),
            point.area.as_deref().unwrap_or_default(),
            region.as_str(),
            point.country_code.as_deref().unwrap_or_default(),
            point.post_index.as_deref().unwrap_or_default(),
        ],
        ", ",
    )
}

/// Устойчивая сортировка вариантов
pub fn sort_rates(rates: &mut [Rate], sort_by: SortBy) {
    match sort_by {
        SortBy::Name => rates.sort_by_key(|r| r.name_string()),
        SortBy::Rate => rates.sort_by(|a, b| a.rate.partial_cmp(&b.rate).unwrap_or(Ordering::Equal)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        calendar::WorkCalendar,
        config::ProviderSettings,
        currency::CurrencyConverter,
        rules::{Adjustment, PercentBasis, Rule, RuleEntry},
    };
    use chrono::NaiveDate;

    fn providers() -> Providers {
        let mut providers = Providers::new();
        providers.insert(
            "cdek".into(),
            ProviderSettings {
                name: "СДЭК".into(),
                tariffs: vec![1, 2],
                rules: vec![RuleEntry::new(Rule::IncreaseCost(Adjustment::Percent {
                    value: 10.,
                    basis: PercentBasis::Shipping,
                }))],
            },
        );
        providers.insert(
            "rupost".into(),
            ProviderSettings {
                name: "Почта России".into(),
                tariffs: vec![5],
                rules: vec![],
            },
        );
        providers.insert(
            "dpd".into(),
            ProviderSettings {
                name: "DPD".into(),
                tariffs: vec![9],
                rules: vec![],
            },
        );
        providers.insert(
            "iml".into(),
            ProviderSettings {
                name: "IML".into(),
                tariffs: vec![4],
                rules: vec![],
            },
        );
        providers
    }

    fn delivery_types() -> Vec<ListItem> {
        vec![
            ListItem {
                id: 1,
                name: "Курьер".into(),
                description: None,
            },
            ListItem {
                id: 2,
                name: "Самовывоз".into(),
                description: None,
            },
        ]
    }

    fn tariff(id: u64, cost: f64, delivery_type: u32, point_ids: Vec<u64>) -> TariffOffer {
        TariffOffer {
            tariff_id: id,
            tariff_name: format!("Тариф {id}"),
            delivery_cost: cost,
            days_min: 2,
            days_max: 4,
            delivery_types: vec![delivery_type],
            point_ids,
            ..Default::default()
        }
    }

    fn offer(key: &str, tariffs: Vec<TariffOffer>) -> ProviderOffer {
        ProviderOffer {
            provider_key: key.into(),
            tariffs,
        }
    }

    fn window() -> WindowCalculator {
        let now = NaiveDate::from_ymd_opt(2025, 6, 9)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        WindowCalculator::new(&WorkCalendar::default(), "%d.%m.%Y", now)
    }

    fn with_converter(frontend: bool, f: impl FnOnce(&RateConverter)) {
        let providers = providers();
        let delivery_types = delivery_types();
        let currency = CurrencyConverter::default();
        let engine = RuleEngine::new(&providers, &currency, 0.);
        let window = window();
        let converter = RateConverter::new(&providers, &delivery_types, &engine, &window, frontend);
        f(&converter);
    }

    fn point(id: u64) -> Point {
        Point {
            id,
            name: Some("Пункт на Ленина".into()),
            point_type: Some(1),
            street_type: Some("ул".into()),
            street: Some("Ленина".into()),
            house: Some("5".into()),
            city_type: Some("г".into()),
            city: Some("Москва".into()),
            region: Some("Москва".into()),
            country_code: Some("RU".into()),
            post_index: Some("101000".into()),
            url: Some("https://iml.ru/status/pvz/12-34".into()),
            phone: Some("null".into()),
            cod: true,
            lat: Some(55.75),
            lng: Some(37.61),
            ..Default::default()
        }
    }

    #[test]
    fn tariff_with_huge_days_is_skipped() {
        let huge: TariffOffer = serde_json::from_str(
            r#"{"tariffId":2,"tariffName":"Медленный","deliveryCost":100.0,
                "daysMin":1,"daysMax":100000000,"deliveryTypes":[1]}"#,
        )
        .unwrap();
        with_converter(false, |converter| {
            let rates = converter.door_rates(&[offer("cdek", vec![tariff(1, 1000., 1, vec![]), huge])]);
            assert_eq!(rates.len(), 1);
            assert_eq!(rates[0].id, "tariff-1");
        });
    }

    #[test]
    fn door_rates_keep_selected_tariffs_and_apply_rules() {
        with_converter(false, |converter| {
            let rates = converter.door_rates(&[
                offer("cdek", vec![tariff(1, 1000., 1, vec![]), tariff(3, 10., 1, vec![])]),
                offer("rupost", vec![tariff(5, 300., 1, vec![])]),
                offer("unknown", vec![tariff(1, 1., 1, vec![])]),
            ]);
            assert_eq!(rates.len(), 2);

            assert_eq!(rates[0].id, "tariff-1");
            assert_eq!(rates[0].rate, 1100.);
            assert_eq!(rates[0].kind, DeliveryKind::Door);
            assert_eq!(rates[0].name, vec!["Курьер", "СДЭК", "Тариф 1"]);
            assert_eq!(rates[0].est_delivery, vec!["11.06.2025", "13.06.2025"]);
            assert_eq!(rates[0].currency, "RUB");

            assert_eq!(rates[1].kind, DeliveryKind::Post);
            assert_eq!(rates[1].comment.delivery_type.as_deref(), Some(POST_LABEL));
        });
    }

    #[test]
    fn frontend_names() {
        with_converter(true, |converter| {
            let rates = converter.door_rates(&[
                offer("cdek", vec![tariff(1, 1000., 1, vec![])]),
                offer("rupost", vec![tariff(5, 300., 1, vec![])]),
            ]);
            assert_eq!(rates[0].name, vec!["Курьер", "СДЭК"]);
            assert_eq!(rates[1].name, vec!["Почта России", "Тариф 5"]);
        });
    }

    #[test]
    fn point_rates_resolve_points() {
        let point_types = vec![PointType {
            id: 1,
            name: "ПВЗ".into(),
            description: Some("Пункт выдачи заказов".into()),
        }];
        with_converter(false, |converter| {
            let rates = converter.point_rates(
                &[offer("cdek", vec![tariff(2, 200., 2, vec![7, 8])])],
                &[point(7)],
                &point_types,
            );
            assert_eq!(rates.len(), 1);
            let rate = &rates[0];
            assert_eq!(rate.id, "tariff-2_point-7");
            assert_eq!(rate.kind, DeliveryKind::Pickup);
            assert_eq!(rate.comment.point.as_deref(), Some("Пункт на Ленина"));
            assert_eq!(rate.comment.point_type.as_deref(), Some("Пункт выдачи заказов"));
            assert_eq!(
                rate.comment.address.as_deref(),
                Some("ул Ленина, 5, г Москва, Москва, RU, 101000")
            );
            assert_eq!(rate.comment.phone, None);
            assert_eq!(rate.comment.payment, Some(true));
            let data = rate.point.as_ref().unwrap();
            assert_eq!(data.lat, Some(55.75));
            assert_eq!(data.name, "Самовывоз | СДЭК | Пункт на Ленина | Тариф 2");
            assert_eq!(rate.days, [2, 4]);
        });
    }

    #[test]
    fn provider_specific_point_names() {
        let point = point(1);
        let no_types: &[PointType] = &[];
        with_converter(false, |converter| {
            let dpd = converter.comment("dpd", &tariff(9, 1., 2, vec![]), Some((&point, no_types)));
            assert_eq!(dpd.point.as_deref(), Some("Пункт на Ленина - ул Ленина 5"));
            assert_eq!(dpd.point_iml_id, None);

            let iml = converter.comment("iml", &tariff(4, 1., 2, vec![]), Some((&point, no_types)));
            assert_eq!(iml.point.as_deref(), Some("ул Ленина 5"));
            assert_eq!(iml.point_iml_id.as_deref(), Some("1234"));
        });
    }

    #[test]
    fn sorting_is_stable() {
        let rate = |id: &str, cost: f64, name: &str| Rate {
            id: id.into(),
            rate: cost,
            name: vec![name.into()],
            ..Default::default()
        };
        let mut rates = vec![rate("a", 300., "Б"), rate("b", 100., "В"), rate("c", 100., "А")];
        sort_rates(&mut rates, SortBy::Rate);
        assert_eq!(rates.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), ["b", "c", "a"]);
        sort_rates(&mut rates, SortBy::Name);
        assert_eq!(rates.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), ["c", "a", "b"]);
    }
}
