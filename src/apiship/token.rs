use std::{
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
};

use crate::{config::Credentials, error::Result};

use super::{Client, models::Token};

pub const TOKEN_PATH: &str = "Token.toml";

/// Учётные данные тестового контура
const TEST_LOGIN: &str = "test";
const TEST_PASSWORD: &str = "test";

/// Хранилище токена между запусками
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<Token>;
    fn save(&self, token: &Token) -> Result<()>;
}

/// Токен в TOML-файле рядом с конфигурацией
#[derive(Debug, Clone)]
pub struct TomlTokenStore {
    path: PathBuf,
}

impl TomlTokenStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl Default for TomlTokenStore {
    fn default() -> Self {
        Self::new(TOKEN_PATH)
    }
}

impl TokenStore for TomlTokenStore {
    fn load(&self) -> Option<Token> {
        let buf = fs::read_to_string(&self.path).ok()?;
        toml::from_str(&buf).ok()
    }

    fn save(&self, token: &Token) -> Result<()> {
        let buf = toml::to_string(token)?;
        fs::write(&self.path, buf)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<Token>>,
}

impl MemoryTokenStore {
    pub fn new(token: Option<Token>) -> Self {
        Self {
            token: RwLock::new(token),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<Token> {
        self.token.read().ok().and_then(|t| t.clone())
    }

    fn save(&self, token: &Token) -> Result<()> {
        if let Ok(mut guard) = self.token.write() {
            *guard = Some(token.clone());
        }
        Ok(())
    }
}

/// Получение и обновление токена доступа
pub struct TokenManager<S: TokenStore> {
    store: S,
    credentials: Credentials,
    test_mode: bool,
}

impl<S: TokenStore> TokenManager<S> {
    pub fn new(store: S, credentials: Credentials, test_mode: bool) -> Self {
        Self {
            store,
            credentials,
            test_mode,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Действующий токен. Новый запрашивается при `force`, при отсутствии
    /// сохранённого или по истечении его срока. Без логина и пароля
    /// запрос не отправляется.
    pub async fn get_token(&self, client: &Client, force: bool) -> Option<Token> {
        if !force
            && let Some(token) = self.store.load().filter(|t| !t.is_expired())
        {
            return Some(token);
        }

        let (login, password) = if self.test_mode {
            (TEST_LOGIN, TEST_PASSWORD)
        } else {
            (
                self.credentials.username.as_str(),
                self.credentials.password.as_str(),
            )
        };
        if login.is_empty() || password.is_empty() {
            tracing::debug!("учётные данные ApiShip не заданы");
            return None;
        }

        let token = client.login(login, password).await?;
        if let Err(err) = self.store.save(&token) {
            tracing::warn!(error = %err, "не удалось сохранить токен");
        }
        tracing::info!(expires = %token.expires, "получен новый токен ApiShip");
        Some(token)
    }
}
