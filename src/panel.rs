use crate::{
    api,
    domain::{DeliveryToken, Subscription, SubscriptionKind, SubscriptionUpdate},
};
use snafu::{ResultExt, Snafu};
use std::future::Future;
use tracing::info;

/// The outcome of asking the push capability for a delivery token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Permission {
    Granted(DeliveryToken),
    Denied,
}

/// The awaited permission/registration capability. The notifier's
/// implementation answers from configuration; a browser would prompt.
pub trait PushRegistrar: Send {
    fn request_permission(&mut self) -> impl Future<Output = Permission> + Send;
}

/// Answers permission requests with the device token configured at
/// startup, or denies when there is none.
#[derive(Debug, Clone)]
pub struct ConfiguredRegistrar {
    token: Option<DeliveryToken>,
}

impl ConfiguredRegistrar {
    pub fn new(token: Option<DeliveryToken>) -> Self {
        Self { token }
    }
}

impl PushRegistrar for ConfiguredRegistrar {
    async fn request_permission(&mut self) -> Permission {
        match &self.token {
            Some(token) => Permission::Granted(token.clone()),
            None => Permission::Denied,
        }
    }
}

/// The server operations the panel needs; implemented by [`api::Client`]
/// and mocked in tests.
pub trait SubscriptionApi: Send {
    fn subscription(
        &mut self,
    ) -> impl Future<Output = Result<Option<Subscription>, api::Error>> + Send;

    fn update_subscription(
        &mut self,
        update: SubscriptionUpdate,
    ) -> impl Future<Output = Result<Subscription, api::Error>> + Send;

    fn register_token(
        &mut self,
        token: DeliveryToken,
    ) -> impl Future<Output = Result<(), api::Error>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Sound,
    Browser,
    Email,
}

/// Subscription preference management. Every mutation reads the current
/// preferences, overlays the one changed field, and persists the full set.
/// Two toggles in flight at once therefore resolve last-write-wins; that
/// race is accepted here rather than hidden.
pub struct Panel<A, R> {
    api: A,
    registrar: R,
}

impl<A: SubscriptionApi, R: PushRegistrar> Panel<A, R> {
    pub fn new(api: A, registrar: R) -> Self {
        Self { api, registrar }
    }

    /// Turning the subscription on requires a delivery token; a denied
    /// permission request aborts before anything is persisted.
    pub async fn set_enabled(&mut self, enabled: bool) -> Result<Subscription> {
        let current = self
            .api
            .subscription()
            .await
            .context(UnableToFetchPreferencesSnafu)?;

        let mut token = current.as_ref().and_then(|s| s.token.clone());
        let mut newly_granted = None;

        if enabled && token.is_none() {
            match self.registrar.request_permission().await {
                Permission::Granted(t) => {
                    token = Some(t.clone());
                    newly_granted = Some(t);
                }
                Permission::Denied => return PermissionDeniedSnafu.fail(),
            }
        }

        if !enabled {
            // Disabling also forgets the device; re-enabling must go
            // through the permission request again.
            token = None;
        }

        let update = SubscriptionUpdate {
            kind: SubscriptionKind::SiteMonitoring,
            enabled,
            channels: current.as_ref().map(|s| s.channels).unwrap_or_default(),
            token,
        };

        let saved = self
            .api
            .update_subscription(update)
            .await
            .context(UnableToPersistPreferencesSnafu)?;

        if let Some(token) = newly_granted {
            self.api
                .register_token(token)
                .await
                .context(UnableToRegisterTokenSnafu)?;
            info!("Registered a new delivery token");
        }

        Ok(saved)
    }

    pub async fn set_channel(&mut self, channel: Channel, value: bool) -> Result<Subscription> {
        let current = self
            .api
            .subscription()
            .await
            .context(UnableToFetchPreferencesSnafu)?;

        let mut channels = current.as_ref().map(|s| s.channels).unwrap_or_default();
        match channel {
            Channel::Sound => channels.sound = value,
            Channel::Browser => channels.browser = value,
            Channel::Email => channels.email = value,
        }

        let update = SubscriptionUpdate {
            kind: SubscriptionKind::SiteMonitoring,
            enabled: current.as_ref().map(|s| s.enabled).unwrap_or(false),
            channels,
            token: current.and_then(|s| s.token),
        };

        self.api
            .update_subscription(update)
            .await
            .context(UnableToPersistPreferencesSnafu)
    }
}

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Notification permission was denied"))]
    PermissionDenied,

    UnableToFetchPreferences { source: api::Error },

    UnableToPersistPreferences { source: api::Error },

    UnableToRegisterToken { source: api::Error },
}

type Result<T, E = Error> = std::result::Result<T, E>;
