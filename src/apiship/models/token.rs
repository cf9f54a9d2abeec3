use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Токен доступа к API и срок его действия
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Token {
    pub access_token: String,
    pub expires: String,
}

impl Token {
    /// Момент истечения токена, если строку удалось разобрать
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let expires = self.expires.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(expires) {
            return Some(dt.with_timezone(&Utc));
        }
        ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(expires, fmt).ok())
            .map(|dt| dt.and_utc())
    }

    /// Пустой, неразборчивый или просроченный токен считается истёкшим
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        if self.access_token.is_empty() {
            return true;
        }
        self.expires_at().is_none_or(|expires| expires < now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}
