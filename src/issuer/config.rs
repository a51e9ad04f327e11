use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::{
    storage::KvStorage,
    subject::{Subject, SubjectSchema, SuccessContext, USER_SUBJECT},
    IssuerError,
};
use crate::{email::CodeSender, users::UserDirectory};

/// What a provider reports once the user has proven control of an address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessValue {
    pub provider: String,
    pub email: String,
}

/// Turns a successful provider result into the subject the issuer will mint.
#[async_trait]
pub trait SuccessHandler: Send + Sync {
    async fn success(
        &self,
        ctx: &SuccessContext<'_>,
        value: &SuccessValue,
    ) -> Result<Subject, IssuerError>;
}

/// Resolves `user` subjects through the user directory.
pub struct DirectorySuccess {
    directory: Arc<dyn UserDirectory>,
}

impl DirectorySuccess {
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl SuccessHandler for DirectorySuccess {
    async fn success(
        &self,
        ctx: &SuccessContext<'_>,
        value: &SuccessValue,
    ) -> Result<Subject, IssuerError> {
        let id = self.directory.get_or_create(&value.email).await?;
        ctx.subject(USER_SUBJECT, json!({ "id": id.to_string() }))
    }
}

/// Strings shown by the password UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PasswordCopy {
    pub input_code: String,
}

impl Default for PasswordCopy {
    fn default() -> Self {
        Self {
            input_code: "Ingresa tu código".into(),
        }
    }
}

pub struct PasswordUi {
    pub send_code: Arc<dyn CodeSender>,
    pub copy: PasswordCopy,
}

pub struct PasswordProvider {
    pub ui: PasswordUi,
}

pub struct Providers {
    pub password: PasswordProvider,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Logo {
    pub dark: String,
    pub light: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Theme {
    pub title: String,
    pub primary: String,
    pub favicon: String,
    pub logo: Logo,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            title: "myAuth".into(),
            primary: "#0051c3".into(),
            favicon: "https://workers.cloudflare.com//favicon.ico".into(),
            logo: Logo {
                dark: "https://imagedelivery.net/wSMYJvS3Xw-n339CbDyDIA/db1e5c92-d3a6-4ea9-3e72-155844211f00/public".into(),
                light: "https://imagedelivery.net/wSMYJvS3Xw-n339CbDyDIA/fa5a3023-7da9-466b-98a7-4ce01ee6c700/public".into(),
            },
        }
    }
}

/// Everything the issuer is handed for a request. Built once at startup.
pub struct IssuerConfig {
    pub storage: Arc<dyn KvStorage>,
    pub subjects: SubjectSchema,
    pub providers: Providers,
    pub theme: Theme,
    pub success: Arc<dyn SuccessHandler>,
}

impl IssuerConfig {
    pub fn new(
        storage: Arc<dyn KvStorage>,
        directory: Arc<dyn UserDirectory>,
        sender: Arc<dyn CodeSender>,
    ) -> Self {
        Self {
            storage,
            subjects: SubjectSchema::users(),
            providers: Providers {
                password: PasswordProvider {
                    ui: PasswordUi {
                        send_code: sender,
                        copy: PasswordCopy::default(),
                    },
                },
            },
            theme: Theme::default(),
            success: Arc::new(DirectorySuccess::new(directory)),
        }
    }

    /// Password provider hook: deliver a freshly generated code.
    pub async fn send_code(&self, email: &str, code: &str) -> Result<(), IssuerError> {
        self.providers
            .password
            .ui
            .send_code
            .send_code(email, code)
            .await?;
        Ok(())
    }

    /// Success hook: map the provider result to a subject.
    pub async fn success(&self, value: &SuccessValue) -> Result<Subject, IssuerError> {
        let ctx = SuccessContext::new(&self.subjects);
        let subject = self.success.success(&ctx, value).await?;
        debug!(provider = %value.provider, kind = %subject.kind, "subject resolved");
        Ok(subject)
    }
}
