use crate::{
    domain::{DeliveryToken, Notification, Subscription, SubscriptionKind, SubscriptionUpdate, User},
    GlobalApiConfig,
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use std::{env, future::Future, time::Duration};
use url::Url;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct Config {
    pub poll_interval: Duration,
    pub device_token: Option<DeliveryToken>,
    username: String,
    password: String,
    sessions_url: Url,
    notifications_url: Url,
    subscriptions_url: Url,
    subscription_url: Url,
    token_url: Url,
}

impl Config {
    pub fn from_environment() -> Result<Self> {
        let server = env::var("MCM_SERVER_URL").context(UnknownServerUrlSnafu)?;
        let server = Url::parse(&server).context(InvalidServerUrlSnafu { url: server })?;

        let username = env::var("MCM_USERNAME").unwrap_or_else(|_| String::from("user"));
        let password = env::var("MCM_PASSWORD").unwrap_or_else(|_| String::from("MCM alerts"));

        let poll_interval = match env::var("MCM_POLL_INTERVAL_SECS") {
            Ok(interval) => {
                let secs = interval
                    .parse()
                    .context(InvalidPollIntervalSnafu { interval })?;
                Duration::from_secs(secs)
            }
            Err(_) => DEFAULT_POLL_INTERVAL,
        };

        let device_token = env::var("MCM_DEVICE_TOKEN").ok().map(DeliveryToken);

        let join = |path: &str| -> Result<Url> {
            server
                .join(path)
                .context(UnableToBuildEndpointSnafu { path: path.to_owned() })
        };

        let sessions_url = join("sessions")?;
        let notifications_url = join("notifications")?;
        let subscriptions_url = join("subscriptions")?;
        let subscription_url = join("subscriptions/site_monitoring")?;
        let token_url = join("subscriptions/token")?;

        Ok(Self {
            poll_interval,
            device_token,
            username,
            password,
            sessions_url,
            notifications_url,
            subscriptions_url,
            subscription_url,
            token_url,
        })
    }
}

/// A typed client for the server's own HTTP surface. The session cookie
/// lives in the jar, so one login call covers everything after it.
#[derive(Debug, Clone)]
pub struct Client {
    client: reqwest::Client,
    config: GlobalApiConfig,
}

impl Client {
    pub fn new(config: GlobalApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .gzip(true)
            .build()
            .context(UnableToBuildClientSnafu)?;

        Ok(Self { client, config })
    }

    pub async fn login(&self) -> Result<User> {
        let Self { client, config } = self;

        #[derive(Debug, Serialize)]
        struct LoginParams<'a> {
            username: &'a str,
            password: &'a str,
        }

        #[derive(Debug, Deserialize)]
        struct LoginReply {
            user: User,
        }

        let params = LoginParams {
            username: &config.username,
            password: &config.password,
        };

        let resp = client
            .post(config.sessions_url.clone())
            .json(&params)
            .send()
            .await
            .context(RequestFailedSnafu)?;
        let resp = check(resp)?;

        let reply: LoginReply = resp.json().await.context(MalformedResponseSnafu)?;
        Ok(reply.user)
    }

    /// The single most recent notification, or `None` when the history is
    /// empty.
    pub async fn latest_notification(&self) -> Result<Option<Notification>> {
        let Self { client, config } = self;

        let resp = client
            .get(config.notifications_url.clone())
            .query(&[("limit", "1")])
            .send()
            .await
            .context(RequestFailedSnafu)?;
        let resp = check(resp)?;

        let mut notifications: Vec<Notification> =
            resp.json().await.context(MalformedResponseSnafu)?;
        Ok(notifications.pop())
    }

    pub async fn subscription(&self) -> Result<Option<Subscription>> {
        let Self { client, config } = self;

        let resp = client
            .get(config.subscription_url.clone())
            .send()
            .await
            .context(RequestFailedSnafu)?;
        let resp = check(resp)?;

        resp.json().await.context(MalformedResponseSnafu)
    }

    pub async fn update_subscription(&self, update: SubscriptionUpdate) -> Result<Subscription> {
        let Self { client, config } = self;

        let resp = client
            .post(config.subscriptions_url.clone())
            .json(&update)
            .send()
            .await
            .context(RequestFailedSnafu)?;
        let resp = check(resp)?;

        resp.json().await.context(MalformedResponseSnafu)
    }

    pub async fn register_token(&self, token: DeliveryToken) -> Result<()> {
        let Self { client, config } = self;

        #[derive(Debug, Serialize)]
        struct TokenParams<'a> {
            #[serde(rename = "type")]
            kind: SubscriptionKind,
            token: &'a DeliveryToken,
        }

        let params = TokenParams {
            kind: SubscriptionKind::SiteMonitoring,
            token: &token,
        };

        let resp = client
            .post(config.token_url.clone())
            .json(&params)
            .send()
            .await
            .context(RequestFailedSnafu)?;
        check(resp)?;

        Ok(())
    }
}

fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
    match resp.status() {
        reqwest::StatusCode::UNAUTHORIZED => UnauthorizedSnafu.fail(),
        status if !status.is_success() => UnexpectedStatusSnafu {
            status: status.as_u16(),
        }
        .fail(),
        _ => Ok(resp),
    }
}

impl crate::watch::Source for Client {
    fn latest(&mut self) -> impl Future<Output = Result<Option<Notification>>> + Send {
        self.latest_notification()
    }
}

impl crate::panel::SubscriptionApi for Client {
    fn subscription(&mut self) -> impl Future<Output = Result<Option<Subscription>>> + Send {
        Client::subscription(self)
    }

    fn update_subscription(
        &mut self,
        update: SubscriptionUpdate,
    ) -> impl Future<Output = Result<Subscription>> + Send {
        Client::update_subscription(self, update)
    }

    fn register_token(&mut self, token: DeliveryToken) -> impl Future<Output = Result<()>> + Send {
        Client::register_token(self, token)
    }
}

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("MCM_SERVER_URL must be set"))]
    UnknownServerUrl { source: env::VarError },

    #[snafu(display("MCM_SERVER_URL is invalid"))]
    InvalidServerUrl {
        source: url::ParseError,
        url: String,
    },

    #[snafu(display("MCM_POLL_INTERVAL_SECS is invalid"))]
    InvalidPollInterval {
        source: std::num::ParseIntError,
        interval: String,
    },

    #[snafu(display("Unable to build the {} endpoint", path))]
    UnableToBuildEndpoint {
        source: url::ParseError,
        path: String,
    },

    UnableToBuildClient { source: reqwest::Error },

    RequestFailed { source: reqwest::Error },

    #[snafu(display("The session expired or the credentials were rejected"))]
    Unauthorized,

    #[snafu(display("The server answered with status {}", status))]
    UnexpectedStatus { status: u16 },

    MalformedResponse { source: reqwest::Error },
}

type Result<T, E = Error> = std::result::Result<T, E>;
