use serde::Serialize;

pub(crate) const CODE_SUBJECT: &str = "Tu código de verificación";

/// Request body for the Resend `/emails` endpoint.
#[derive(Debug, Serialize)]
pub(crate) struct ResendEmail<'a> {
    pub from: &'a str,
    pub to: &'a str,
    pub subject: &'a str,
    pub text: String,
    pub html: String,
}

impl<'a> ResendEmail<'a> {
    pub(crate) fn verification_code(from: &'a str, to: &'a str, code: &str) -> Self {
        Self {
            from,
            to,
            subject: CODE_SUBJECT,
            text: format!("Código: {code}\nVálido por 5 minutos"),
            html: format!("<p>Código: <strong>{code}</strong></p>"),
        }
    }
}
