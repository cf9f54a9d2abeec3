use reqwest::Error as ReqwestError;
use serde_json::Error as SerdeJsonError;
use std::result::Result as StdResult;
use thiserror::Error;

pub type Result<T> = StdResult<T, ApishipError>;

#[derive(Error, Debug)]
pub enum ApishipError {
    #[error("ReqwestError: {0:?}")]
    Reqwest(#[from] ReqwestError),

    #[error("SerdeJsonError: {0:?}")]
    SerdeJson(#[from] SerdeJsonError),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("токен доступа отсутствует")]
    Unauthorized,
}
