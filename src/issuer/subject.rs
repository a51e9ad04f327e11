use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::IssuerError;

pub const USER_SUBJECT: &str = "user";

/// Claims handed back to the issuer after a successful login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    #[serde(rename = "type")]
    pub kind: String,
    pub properties: Value,
}

/// Subject kinds the issuer may mint, each with its required string properties.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct SubjectSchema {
    kinds: BTreeMap<String, Vec<String>>,
}

impl SubjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subject(mut self, kind: &str, string_fields: &[&str]) -> Self {
        self.kinds.insert(
            kind.to_string(),
            string_fields.iter().map(|f| f.to_string()).collect(),
        );
        self
    }

    /// `user: { id: string }`
    pub fn users() -> Self {
        Self::new().with_subject(USER_SUBJECT, &["id"])
    }

    pub fn validate(&self, kind: &str, properties: &Value) -> Result<(), IssuerError> {
        let fields = self
            .kinds
            .get(kind)
            .ok_or_else(|| IssuerError::InvalidSubject(format!("unknown subject type `{kind}`")))?;
        let object = properties.as_object().ok_or_else(|| {
            IssuerError::InvalidSubject(format!("properties of `{kind}` must be an object"))
        })?;
        for field in fields {
            match object.get(field) {
                Some(Value::String(_)) => {}
                Some(_) => {
                    return Err(IssuerError::InvalidSubject(format!(
                        "`{kind}.{field}` must be a string"
                    )))
                }
                None => {
                    return Err(IssuerError::InvalidSubject(format!(
                        "`{kind}.{field}` is required"
                    )))
                }
            }
        }
        Ok(())
    }
}

/// Passed to the success hook; mints subjects checked against the schema.
pub struct SuccessContext<'a> {
    schema: &'a SubjectSchema,
}

impl<'a> SuccessContext<'a> {
    pub fn new(schema: &'a SubjectSchema) -> Self {
        Self { schema }
    }

    pub fn subject(&self, kind: &str, properties: Value) -> Result<Subject, IssuerError> {
        self.schema.validate(kind, &properties)?;
        Ok(Subject {
            kind: kind.to_string(),
            properties,
        })
    }
}
