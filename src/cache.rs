//! Кэш ответов: хранилище ключ-значение с временем жизни записей.
//!
//! Записи сессии (`session_*`) живут 30 минут, справочники (`cache_*`)
//! 12 часов. Фоновая очистка удаляет просроченные записи.

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::task::JoinHandle;

use crate::{
    apiship::{
        Client,
        models::{CalculatorRequest, Point, PointType},
    },
    config::Providers,
    error::Result,
    rates::Rate,
};

/// Время жизни записей сессии
pub const SESSION_TTL: Duration = Duration::from_secs(30 * 60);
/// Время жизни справочников
pub const DIRECTORY_TTL: Duration = Duration::from_secs(12 * 60 * 60);
/// Предельный возраст записей, помеченных одновременно как `cache` и `session`
pub const STALE_AFTER: Duration = Duration::from_secs(24 * 60 * 60);

pub const CACHE_PATH: &str = "Cache.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub value: Value,
    /// Unix-время записи в секундах
    pub created: i64,
    /// Время жизни в секундах
    pub ttl: u64,
}

impl Entry {
    fn age(&self, now: i64) -> u64 {
        now.saturating_sub(self.created).max(0) as u64
    }

    fn is_expired(&self, now: i64) -> bool {
        self.age(now) > self.ttl
    }

    fn is_stale(&self, key: &str, now: i64) -> bool {
        if self.is_expired(now) {
            return true;
        }
        key.contains("cache") && key.contains("session") && self.age(now) > STALE_AFTER.as_secs()
    }
}

/// Хранилище кэша
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value, ttl: Duration);
    fn delete(&self, key: &str);
    /// Удаление просроченных записей; возвращает число удалённых
    fn sweep(&self) -> usize;
}

/// Хранилище в памяти процесса
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get_at(&self, key: &str, now: i64) -> Option<Value> {
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    pub fn set_at(&self, key: &str, value: Value, ttl: Duration, now: i64) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                created: now,
                ttl: ttl.as_secs(),
            },
        );
    }

    pub fn sweep_at(&self, now: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, entry| !entry.is_stale(key, now));
        before.saturating_sub(self.entries.len())
    }

    fn snapshot(&self) -> BTreeMap<String, Entry> {
        self.entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.get_at(key, Utc::now().timestamp())
    }

    fn set(&self, key: &str, value: Value, ttl: Duration) {
        self.set_at(key, value, ttl, Utc::now().timestamp());
    }

    fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    fn sweep(&self) -> usize {
        self.sweep_at(Utc::now().timestamp())
    }
}

/// Хранилище в JSON-файле: кэш переживает перезапуск процесса
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    memory: MemoryStore,
}

impl FileStore {
    /// Открытие файла кэша; отсутствующий или повреждённый файл даёт пустой кэш
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let memory = MemoryStore::new();
        if let Ok(buf) = fs::read_to_string(&path) {
            match serde_json::from_str::<BTreeMap<String, Entry>>(&buf) {
                Ok(entries) => {
                    for (key, entry) in entries {
                        memory.entries.insert(key, entry);
                    }
                }
                Err(err) => tracing::warn!(path = %path.display(), error = %err, "файл кэша повреждён"),
            }
        }
        Self { path, memory }
    }

    fn persist(&self) -> Result<()> {
        let buf = serde_json::to_string(&self.memory.snapshot())?;
        fs::write(&self.path, buf)?;
        Ok(())
    }

    fn persist_or_warn(&self) {
        if let Err(err) = self.persist() {
            tracing::warn!(path = %self.path.display(), error = %err, "не удалось записать кэш");
        }
    }
}

impl CacheStore for FileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.memory.get(key)
    }

    fn set(&self, key: &str, value: Value, ttl: Duration) {
        self.memory.set(key, value, ttl);
        self.persist_or_warn();
    }

    fn delete(&self, key: &str) {
        self.memory.delete(key);
        self.persist_or_warn();
    }

    fn sweep(&self) -> usize {
        let removed = self.memory.sweep();
        if removed > 0 {
            self.persist_or_warn();
        }
        removed
    }
}

fn read<T: DeserializeOwned>(store: &dyn CacheStore, key: &str) -> Option<T> {
    serde_json::from_value(store.get(key)?).ok()
}

fn write<T: Serialize + ?Sized>(store: &dyn CacheStore, key: &str, value: &T, ttl: Duration) {
    match serde_json::to_value(value) {
        Ok(value) => store.set(key, value, ttl),
        Err(err) => tracing::warn!(key, error = %err, "значение не записано в кэш"),
    }
}

/// Записи одной сессии покупателя
pub struct SessionCache<'a> {
    store: &'a dyn CacheStore,
    prefix: String,
}

impl<'a> SessionCache<'a> {
    const ERROR: &'static str = "error";
    const PROVIDERS: &'static str = "providers";
    const PARAMS: &'static str = "params";
    const RATES_TO_DOOR: &'static str = "rates_to_door";
    const RATES_TO_POINT: &'static str = "rates_to_point";
    const RATES: &'static str = "rates";

    pub fn new(store: &'a dyn CacheStore, session_id: &str, instance_id: &str) -> Self {
        Self {
            store,
            prefix: format!("session_{session_id}_{instance_id}_"),
        }
    }

    fn key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Признак того, что последний расчёт не дал вариантов
    pub fn error(&self) -> Option<bool> {
        read(self.store, &self.key(Self::ERROR))
    }

    pub fn set_error(&self, error: bool) {
        write(self.store, &self.key(Self::ERROR), &error, SESSION_TTL);
    }

    /// Сохранённые варианты, если они получены для тех же провайдеров и параметров
    pub fn lookup(&self, providers: &Providers, params: &CalculatorRequest) -> Option<Vec<Rate>> {
        let rates = self.rates().filter(|r| !r.is_empty())?;
        let cached_providers = read::<Providers>(self.store, &self.key(Self::PROVIDERS))?;
        let cached_params = read::<CalculatorRequest>(self.store, &self.key(Self::PARAMS))?;
        (cached_providers == *providers && cached_params == *params).then_some(rates)
    }

    /// Удаление всего, кроме признака ошибки
    pub fn invalidate(&self) {
        for name in [
            Self::PROVIDERS,
            Self::PARAMS,
            Self::RATES_TO_DOOR,
            Self::RATES_TO_POINT,
            Self::RATES,
        ] {
            self.store.delete(&self.key(name));
        }
    }

    pub fn store_request(&self, providers: &Providers, params: &CalculatorRequest) {
        write(self.store, &self.key(Self::PROVIDERS), providers, SESSION_TTL);
        write(self.store, &self.key(Self::PARAMS), params, SESSION_TTL);
    }

    pub fn params(&self) -> Option<CalculatorRequest> {
        read(self.store, &self.key(Self::PARAMS))
    }

    pub fn store_rates_to_door(&self, rates: &[Rate]) {
        write(self.store, &self.key(Self::RATES_TO_DOOR), rates, SESSION_TTL);
    }

    pub fn rates_to_door(&self) -> Vec<Rate> {
        read(self.store, &self.key(Self::RATES_TO_DOOR)).unwrap_or_default()
    }

    pub fn store_rates_to_point(&self, rates: &[Rate]) {
        write(self.store, &self.key(Self::RATES_TO_POINT), rates, SESSION_TTL);
    }

    pub fn rates_to_point(&self) -> Vec<Rate> {
        read(self.store, &self.key(Self::RATES_TO_POINT)).unwrap_or_default()
    }

    pub fn store_rates(&self, rates: &[Rate]) {
        write(self.store, &self.key(Self::RATES), rates, SESSION_TTL);
    }

    pub fn rates(&self) -> Option<Vec<Rate>> {
        read(self.store, &self.key(Self::RATES))
    }
}

/// Долгоживущий кэш справочников: типы и пункты выдачи
pub struct DirectoryCache<'a> {
    store: &'a dyn CacheStore,
    prefix: String,
}

impl<'a> DirectoryCache<'a> {
    pub fn new(store: &'a dyn CacheStore, instance_id: &str) -> Self {
        Self {
            store,
            prefix: format!("cache_{instance_id}_"),
        }
    }

    /// Типы пунктов выдачи из кэша или из API. Пустой ответ не кэшируется.
    pub async fn point_types(&self, client: &Client) -> Vec<PointType> {
        let key = format!("{}point_types", self.prefix);
        if let Some(cached) = read::<Vec<PointType>>(self.store, &key) {
            return cached;
        }
        let fetched = client.point_types().await;
        if !fetched.is_empty() {
            write(self.store, &key, &fetched, DIRECTORY_TTL);
        }
        fetched
    }

    /// Пункты выдачи провайдеров в городе из кэша или из API
    pub async fn points(
        &self,
        client: &Client,
        provider_keys: &[String],
        country_code: Option<&str>,
        city: &str,
    ) -> Vec<Point> {
        let keys = serde_json::to_string(provider_keys).unwrap_or_default();
        let key = format!(
            "{}points{}{}{}",
            self.prefix,
            keys,
            country_code.unwrap_or_default(),
            city
        );
        if let Some(cached) = read::<Vec<Point>>(self.store, &key) {
            return cached;
        }
        let fetched = client.points(provider_keys, country_code, city).await;
        if !fetched.is_empty() {
            write(self.store, &key, &fetched, DIRECTORY_TTL);
        }
        fetched
    }
}

/// Периодическая очистка кэша в фоне
pub fn spawn_sweeper(store: Arc<dyn CacheStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = store.sweep();
            if removed > 0 {
                tracing::debug!(removed, "очистка кэша");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderSettings;
    use serde_json::json;

    #[test]
    fn expired_entries_disappear() {
        let store = MemoryStore::new();
        store.set_at("session_a", json!(1), Duration::from_secs(60), 1_000);
        assert_eq!(store.get_at("session_a", 1_060), Some(json!(1)));
        assert_eq!(store.get_at("session_a", 1_061), None);
        assert!(store.is_empty());
    }

    #[test]
    fn sweep_removes_expired_and_stale() {
        let store = MemoryStore::new();
        let day = STALE_AFTER.as_secs() as i64;
        store.set_at("session_x_error", json!(true), SESSION_TTL, 0);
        store.set_at("cache_x_point_types", json!([]), DIRECTORY_TTL, 0);
        store.set_at("cache_session_mixed", json!(1), Duration::from_secs(10 * day as u64), 0);
        store.set_at("cache_fresh", json!(1), DIRECTORY_TTL, day);

        assert_eq!(store.sweep_at(day + 1), 3);
        assert_eq!(store.len(), 1);
        assert!(store.get_at("cache_fresh", day + 1).is_some());
    }

    fn providers() -> Providers {
        let mut providers = Providers::new();
        providers.insert(
            "cdek".into(),
            ProviderSettings {
                name: "СДЭК".into(),
                tariffs: vec![1],
                rules: vec![],
            },
        );
        providers
    }

    fn rate() -> Rate {
        Rate {
            id: "tariff-1".into(),
            rate: 100.,
            ..Default::default()
        }
    }

    #[test]
    fn session_lookup_requires_same_request() {
        let store = MemoryStore::new();
        let session = SessionCache::new(&store, "s1", "calcapiship");
        let params = CalculatorRequest {
            weight: 1000,
            ..Default::default()
        };

        assert!(session.lookup(&providers(), &params).is_none());

        session.store_request(&providers(), &params);
        session.store_rates(&[rate()]);
        assert_eq!(session.lookup(&providers(), &params).map(|r| r.len()), Some(1));

        let heavier = CalculatorRequest {
            weight: 2000,
            ..params.clone()
        };
        assert!(session.lookup(&providers(), &heavier).is_none());

        let mut changed = providers();
        changed.get_mut("cdek").unwrap().tariffs.push(2);
        assert!(session.lookup(&changed, &params).is_none());

        session.set_error(false);
        session.invalidate();
        assert!(session.rates().is_none());
        assert_eq!(session.error(), Some(false));
    }

    #[test]
    fn sessions_do_not_share_entries() {
        let store = MemoryStore::new();
        SessionCache::new(&store, "a", "i").store_rates(&[rate()]);
        assert!(SessionCache::new(&store, "b", "i").rates().is_none());
        assert!(SessionCache::new(&store, "a", "other").rates().is_none());
    }

    #[test]
    fn file_store_survives_reopen() {
        let path = std::env::temp_dir().join(format!("calcapiship-cache-{}.json", std::process::id()));
        {
            let store = FileStore::open(&path);
            store.set("session_k", json!({"a": 1}), SESSION_TTL);
        }
        let store = FileStore::open(&path);
        assert_eq!(store.get("session_k"), Some(json!({"a": 1})));
        store.delete("session_k");
        assert!(FileStore::open(&path).get("session_k").is_none());
        let _ = fs::remove_file(&path);
    }
}
