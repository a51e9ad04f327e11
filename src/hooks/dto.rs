use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::issuer::{PasswordCopy, SubjectSchema, Theme};

#[derive(Debug, Deserialize)]
pub struct SendCodeRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct UiConfigResponse<'a> {
    pub theme: &'a Theme,
    pub copy: &'a PasswordCopy,
    pub subjects: &'a SubjectSchema,
}

#[derive(Debug, Deserialize)]
pub struct KeyRequest {
    pub key: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetRequest {
    pub key: Vec<String>,
    pub value: Value,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expiry: Option<OffsetDateTime>,
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    #[serde(default)]
    pub prefix: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct GetResponse {
    pub value: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ScanEntry {
    pub key: Vec<String>,
    pub value: Value,
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub entries: Vec<ScanEntry>,
}

pub fn segments(key: &[String]) -> Vec<&str> {
    key.iter().map(String::as_str).collect()
}
