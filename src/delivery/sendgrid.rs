//! SendGrid v3 `mail/send` backed [`Mailer`].

use std::fmt;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, instrument};
use url::Url;

use crate::http::{HttpTimeouts, build_http_client};
use crate::user_agent::default_api_user_agent;

use super::{DeliveryError, Mailer, OutgoingMail};

/// Default API base URL.
const DEFAULT_BASE_URL: &str = "https://api.sendgrid.com";

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    personalizations: [Personalization<'a>; 1],
    from: Address<'a>,
    subject: &'a str,
    content: [Content<'a>; 1],
    attachments: [AttachmentBody<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Personalization<'a> {
    to: [Address<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Address<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    value: &'a str,
}

#[derive(Debug, Serialize)]
struct AttachmentBody<'a> {
    content: String,
    #[serde(rename = "type")]
    kind: &'a str,
    filename: &'a str,
    disposition: &'a str,
}

/// Sends mail through the SendGrid HTTP API.
#[derive(Clone)]
pub struct SendGridMailer {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl fmt::Debug for SendGridMailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendGridMailer")
            .field("endpoint", &self.endpoint.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl SendGridMailer {
    /// Creates a mailer for the public API. A missing key is reported on send.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] if the HTTP client cannot be built.
    pub fn new(api_key: Option<String>, timeouts: HttpTimeouts) -> Result<Self, DeliveryError> {
        Self::with_base_url(DEFAULT_BASE_URL, api_key, timeouts)
    }

    /// Creates a mailer with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] if the URL is invalid or the HTTP client
    /// cannot be built.
    pub fn with_base_url(
        base_url: &str,
        api_key: Option<String>,
        timeouts: HttpTimeouts,
    ) -> Result<Self, DeliveryError> {
        let endpoint = Url::parse(base_url)
            .and_then(|base| base.join("/v3/mail/send"))
            .map_err(|_| DeliveryError::InvalidUrl {
                url: base_url.to_string(),
            })?;
        let client = build_http_client("sendgrid", default_api_user_agent(), timeouts)
            .map_err(DeliveryError::network)?;
        Ok(Self {
            client,
            endpoint,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        })
    }
}

#[async_trait]
impl Mailer for SendGridMailer {
    #[instrument(skip(self, mail), fields(to = %mail.to, file = %mail.attachment.file_name))]
    async fn send(&self, mail: &OutgoingMail) -> Result<(), DeliveryError> {
        let api_key = self.api_key.as_deref().ok_or(DeliveryError::MissingApiKey)?;
        let request = SendRequest {
            personalizations: [Personalization {
                to: [Address { email: &mail.to }],
            }],
            from: Address { email: &mail.from },
            subject: &mail.subject,
            content: [Content {
                kind: "text/html",
                value: &mail.html_body,
            }],
            attachments: [AttachmentBody {
                content: STANDARD.encode(&mail.attachment.content),
                kind: mail.attachment.mime_type,
                filename: &mail.attachment.file_name,
                disposition: "attachment",
            }],
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(DeliveryError::network)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::http_status(status.as_u16(), &body));
        }
        debug!(status = status.as_u16(), "Mail accepted");
        Ok(())
    }
}
