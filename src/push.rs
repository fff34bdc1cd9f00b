use crate::domain::{DeliveryToken, EventType};
use serde::Serialize;
use snafu::{ResultExt, Snafu};
use std::env;
use tracing::{trace, trace_span, warn, Instrument};
use url::Url;

#[derive(Debug, Clone)]
pub struct Config {
    token: String,
    send_url: Url,
}

impl Config {
    /// The gateway is optional: with no `PUSH_GATEWAY_TOKEN` the server
    /// runs with browser push disabled and only persists notifications.
    pub fn from_environment() -> Result<Option<Self>> {
        let token = match env::var("PUSH_GATEWAY_TOKEN") {
            Ok(token) => token,
            Err(env::VarError::NotPresent) => return Ok(None),
            Err(e) => return Err(e).context(UnreadableApiTokenSnafu),
        };

        let send_url = env::var("PUSH_GATEWAY_URL").context(UnknownSendUrlSnafu)?;
        let send_url = Url::parse(&send_url).context(InvalidSendUrlSnafu { url: send_url })?;

        Ok(Some(Self { token, send_url }))
    }

    pub fn into_client(self) -> Client {
        Client {
            client: crate::reqwest_client(),
            config: self,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Client {
    client: reqwest::Client,
    config: Config,
}

#[derive(Debug)]
pub struct Message {
    pub device: DeliveryToken,
    pub title: String,
    pub body: String,
    pub event: EventType,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

impl Client {
    /// Best-effort delivery: each failed send is logged and counted, never
    /// propagated. The persisted notification is the source of truth.
    pub async fn notify(&self, messages: Vec<Message>) -> DeliveryReport {
        let Self { client, config } = self;
        let s = trace_span!("notify", count = messages.len());

        #[derive(Debug, Serialize)]
        struct SendParams<'a> {
            token: &'a str,
            device: &'a DeliveryToken,
            title: &'a str,
            message: &'a str,
            #[serde(rename = "type")]
            event: EventType,
        }

        async {
            trace!("Performing notifications");

            let mut report = DeliveryReport::default();

            for m in &messages {
                let params = SendParams {
                    token: &config.token,
                    device: &m.device,
                    title: &m.title,
                    message: &m.body,
                    event: m.event,
                };

                let outcome = client
                    .post(config.send_url.clone())
                    .json(&params)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .context(UnableToSendNotificationSnafu);

                match outcome {
                    Ok(_) => report.delivered += 1,
                    Err(e) => {
                        report.failed += 1;
                        warn!("Push delivery failed: {}", e);
                    }
                }
            }

            report
        }
        .instrument(s)
        .await
    }
}

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("PUSH_GATEWAY_TOKEN is unreadable"))]
    UnreadableApiToken { source: env::VarError },

    #[snafu(display("PUSH_GATEWAY_URL must be set when the gateway token is"))]
    UnknownSendUrl { source: env::VarError },

    #[snafu(display("PUSH_GATEWAY_URL is invalid"))]
    InvalidSendUrl {
        source: url::ParseError,
        url: String,
    },

    UnableToSendNotification { source: reqwest::Error },
}

type Result<T, E = Error> = std::result::Result<T, E>;
