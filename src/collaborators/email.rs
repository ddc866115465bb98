

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{CollaboratorError, EmailRequest, EmailResponse, EmailService};

pub const ORDER_EMAIL_SUBJECT: &str = "Your Grocery Order Confirmation";


pub fn format_order_email<S: AsRef<str>>(order_id: &str, items: impl IntoIterator<Item = S>) -> String {
    let items: Vec<String> = items
        .into_iter()
        .map(|item| format!("- {}", item.as_ref()))
        .collect();

    format!(
        "Your grocery order has been placed!\n\n\
         Order ID: {order_id}\n\n\
         Items ordered:\n{}\n\n\
         Your items will be delivered soon. Happy cooking!",
        items.join("\n")
    )
}

#[derive(Debug, Serialize)]
struct OutgoingEmail<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct SendReceipt {
    #[serde(default)]
    id: Option<String>,
}


/// Sends through a JSON email API (`POST {from, to, subject, text}` with a bearer key).
pub struct HttpEmailService {
    endpoint: String,
    api_key: String,
    from: String,
    client: Client,
}

impl HttpEmailService {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        from: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CollaboratorError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(CollaboratorError::NotConfigured("email API key is empty".to_string()));
        }

        let endpoint = endpoint.into();
        info!("HTTP email service initialized (endpoint={})", endpoint);
        Ok(Self {
            endpoint,
            api_key,
            from: from.into(),
            client: Client::builder().timeout(timeout).build()?,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EmailService for HttpEmailService {
    async fn send(&self, request: &EmailRequest) -> Result<EmailResponse, CollaboratorError> {
        let body = OutgoingEmail {
            from: &self.from,
            to: [&request.to],
            subject: ORDER_EMAIL_SUBJECT,
            text: &request.summary,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(CollaboratorError::NotConfigured(format!(
                "email API refused the credentials ({status})"
            )));
        }
        if status.is_client_error() {
            let detail = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Rejected(format!(
                "{status}: {}",
                crate::safe_truncate(&detail, 200)
            )));
        }
        if !status.is_success() {
            return Err(CollaboratorError::Unavailable(format!("email API returned {status}")));
        }

        let receipt = response.json::<SendReceipt>().await.unwrap_or_else(|e| {
            warn!("Email API answered without a readable receipt: {}", e);
            SendReceipt::default()
        });

        info!("Confirmation email for order {} sent to {}", request.order_id, request.to);
        Ok(EmailResponse {
            sent: true,
            message_id: receipt.id,
        })
    }
}


/// Stand-in used when no email credentials are configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredEmailService;

#[async_trait]
impl EmailService for UnconfiguredEmailService {
    async fn send(&self, _request: &EmailRequest) -> Result<EmailResponse, CollaboratorError> {
        Err(CollaboratorError::NotConfigured(
            "no email API key; set MISE_EMAIL_API_KEY to send confirmations".to_string(),
        ))
    }

    fn is_configured(&self) -> bool {
        false
    }
}
