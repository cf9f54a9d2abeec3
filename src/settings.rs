use serde::Serialize;

use crate::{
    apiship::{Client, TokenManager, TokenStore, models::ListItem},
    config::Config,
    error::Result,
};

/// Что удалось обновить при синхронизации
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub token: bool,
    pub providers: usize,
    pub delivery_types: usize,
    pub pickup_types: usize,
}

/// Проверка настроек и подтягивание названий из справочников ApiShip
pub struct SettingsSync<'a, S: TokenStore> {
    client: &'a Client,
    tokens: &'a TokenManager<S>,
}

impl<'a, S: TokenStore> SettingsSync<'a, S> {
    pub fn new(client: &'a Client, tokens: &'a TokenManager<S>) -> Self {
        Self { client, tokens }
    }

    /// Проверяет настройки, обновляет токен и названия провайдеров,
    /// типов доставки и типов приёма
    pub async fn sync(&self, config: &mut Config) -> Result<SyncReport> {
        config.validate()?;

        let mut report = SyncReport::default();
        let Some(token) = self.tokens.get_token(self.client, true).await else {
            tracing::warn!("не удалось получить токен ApiShip, названия не обновлены");
            return Ok(report);
        };
        report.token = true;
        let client = self.client.clone().with_token(Some(token));

        for info in client.providers().await {
            if let Some(provider) = config.providers.get_mut(&info.key) {
                provider.name = info.name;
                report.providers += 1;
            }
        }

        report.delivery_types = refresh(&mut config.delivery_types, client.delivery_types().await);
        report.pickup_types = refresh(&mut config.pickup_types, client.pickup_types().await);

        tracing::info!(
            providers = report.providers,
            delivery_types = report.delivery_types,
            pickup_types = report.pickup_types,
            "настройки синхронизированы"
        );
        Ok(report)
    }
}

/// Замена выбранных элементов их версией из справочника
fn refresh(selected: &mut [ListItem], upstream: Vec<ListItem>) -> usize {
    let mut updated = 0;
    for item in selected.iter_mut() {
        if let Some(fresh) = upstream.iter().find(|u| u.id == item.id) {
            *item = fresh.clone();
            updated += 1;
        }
    }
    updated
}
