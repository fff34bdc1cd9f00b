use crate::{
    database::StoreHandle,
    domain::{
        NewNotification, NewUser, SubscriptionKind, TriggerReceipt, TriggerRequest, User, UserId,
    },
    push,
    session::{SessionId, SessionStore},
    GlobalConfig,
};
use snafu::{ResultExt, Snafu};
use tracing::{info, trace_span, warn, Instrument};

/// One-time startup work: make sure the seed account exists so the login
/// endpoint has someone to authenticate.
#[derive(Debug)]
pub struct BootFlow {
    config: GlobalConfig,
    store: StoreHandle,
}

impl BootFlow {
    pub fn new(config: GlobalConfig, store: StoreHandle) -> Self {
        Self { config, store }
    }

    pub async fn boot(&mut self) -> Result<()> {
        let Self { config, store } = self;

        let existing = store
            .user_by_username(&config.seed_username)
            .await
            .context(UnableToQuerySeedUserSnafu)?;

        if existing.is_none() {
            let user = store
                .create_user(NewUser {
                    id: UserId(config.seed_username.clone()),
                    username: config.seed_username.clone(),
                    email: config.seed_email.clone(),
                    first_name: config.seed_first_name.clone(),
                    last_name: config.seed_last_name.clone(),
                })
                .await
                .context(UnableToCreateSeedUserSnafu)?;
            info!("Created seed user {}", user.username);
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LoginFlow {
    config: GlobalConfig,
    store: StoreHandle,
    sessions: SessionStore,
}

impl LoginFlow {
    pub fn new(config: GlobalConfig, store: StoreHandle, sessions: SessionStore) -> Self {
        Self {
            config,
            store,
            sessions,
        }
    }

    /// `None` is the expected bad-credentials outcome, not an error.
    pub async fn login(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<Option<(SessionId, User)>> {
        let Self {
            config,
            store,
            sessions,
        } = self;

        if username != config.seed_username || password != config.seed_password {
            return Ok(None);
        }

        let user = store
            .user_by_username(username)
            .await
            .context(UnableToQueryUserSnafu)?;

        Ok(user.map(|user| {
            let sid = sessions.create(user.clone());
            (sid, user)
        }))
    }
}

#[derive(Debug, Clone)]
pub struct TriggerFlow {
    store: StoreHandle,
    push: Option<push::Client>,
}

impl TriggerFlow {
    pub fn new(store: StoreHandle, push: Option<push::Client>) -> Self {
        Self { store, push }
    }

    /// Fans one monitoring event out into one persisted notification per
    /// active subscriber, then attempts best-effort push delivery.
    pub async fn trigger(&mut self, request: TriggerRequest) -> Result<TriggerReceipt> {
        let Self { store, push } = self;

        let s = trace_span!(
            "trigger",
            event = request.event.as_str(),
            site = request.site.as_deref().unwrap_or(""),
        );

        async move {
            let subscribers = store
                .active_subscribers(SubscriptionKind::SiteMonitoring)
                .await
                .context(UnableToResolveSubscribersSnafu)?;

            if subscribers.is_empty() {
                info!("Notification triggered but no subscribers are active");
                return Ok(TriggerReceipt {
                    subscriber_count: 0,
                    notifications_created: 0,
                });
            }

            info!(
                "Notification triggered: {} - {} ({}); fanning out to {} subscribers",
                request.title,
                request.message,
                request.event.as_str(),
                subscribers.len(),
            );

            let mut created = 0;
            let mut outbound = Vec::new();

            for subscriber in &subscribers {
                let notification = NewNotification {
                    user_id: subscriber.user_id.clone(),
                    title: request.title.clone(),
                    message: request.message.clone(),
                    event: request.event,
                };

                // Each subscriber's record stands alone; one failed insert
                // must not starve the rest of the fan-out.
                match store.create_notification(notification).await {
                    Ok(_) => {
                        created += 1;

                        if subscriber.channels.browser {
                            if let Some(device) = &subscriber.token {
                                outbound.push(push::Message {
                                    device: device.clone(),
                                    title: request.title.clone(),
                                    body: request.message.clone(),
                                    event: request.event,
                                });
                            }
                        }
                    }
                    Err(e) => {
                        warn!(
                            "Skipping notification for {}: {}",
                            subscriber.user_id.0, e
                        );
                    }
                }
            }

            if let Some(push) = push {
                if !outbound.is_empty() {
                    let report = push.notify(outbound).await;
                    if report.failed > 0 {
                        warn!(
                            "{} of {} push deliveries failed",
                            report.failed,
                            report.delivered + report.failed,
                        );
                    }
                }
            }

            Ok(TriggerReceipt {
                subscriber_count: subscribers.len(),
                notifications_created: created,
            })
        }
        .instrument(s)
        .await
    }
}

#[derive(Debug, Snafu)]
pub enum Error {
    UnableToQuerySeedUser { source: crate::database::Error },

    UnableToCreateSeedUser { source: crate::database::Error },

    UnableToQueryUser { source: crate::database::Error },

    UnableToResolveSubscribers { source: crate::database::Error },
}

type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        database::{memory::MemoryStore, spawn, StoreHandle},
        domain::{ChannelPrefs, SubscriptionUpdate},
    };

    async fn subscribe(store: &mut StoreHandle, user: &str, enabled: bool) {
        store
            .upsert_subscription(
                &UserId(user.to_owned()),
                SubscriptionUpdate {
                    kind: SubscriptionKind::SiteMonitoring,
                    enabled,
                    channels: ChannelPrefs::default(),
                    token: None,
                },
            )
            .await
            .expect("upsert should succeed");
    }

    fn request() -> TriggerRequest {
        TriggerRequest {
            event: crate::domain::EventType::SiteDown,
            title: String::from("Site Down Alert"),
            message: String::from("example.com is not responding"),
            site: Some(String::from("example.com")),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fan_out_creates_one_row_per_enabled_subscriber() {
        let (mut store, _task) = spawn(MemoryStore::new());

        for user in ["alice", "bob", "carol"] {
            subscribe(&mut store, user, true).await;
        }
        for user in ["dan", "erin"] {
            subscribe(&mut store, user, false).await;
        }

        let mut flow = TriggerFlow::new(store.clone(), None);
        let receipt = flow.trigger(request()).await.expect("trigger should succeed");

        assert_eq!(receipt.subscriber_count, 3);
        assert_eq!(receipt.notifications_created, 3);

        for user in ["alice", "bob", "carol"] {
            let listed = store
                .recent_notifications(&UserId(user.to_owned()), 10)
                .await
                .expect("list should succeed");
            assert_eq!(listed.len(), 1, "{} should have exactly one row", user);
            assert_eq!(listed[0].title, "Site Down Alert");
        }
        for user in ["dan", "erin"] {
            let listed = store
                .recent_notifications(&UserId(user.to_owned()), 10)
                .await
                .expect("list should succeed");
            assert!(listed.is_empty(), "{} is disabled and got a row", user);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_fan_out_is_a_zero_count_success() {
        let (store, _task) = spawn(MemoryStore::new());

        let mut flow = TriggerFlow::new(store, None);
        let receipt = flow.trigger(request()).await.expect("trigger should succeed");

        assert_eq!(receipt.subscriber_count, 0);
        assert_eq!(receipt.notifications_created, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn one_failing_subscriber_does_not_abort_the_rest() {
        let (mut store, _task) = spawn(MemoryStore::new().failing_notifications_for("bob"));

        for user in ["alice", "bob", "carol"] {
            subscribe(&mut store, user, true).await;
        }

        let mut flow = TriggerFlow::new(store.clone(), None);
        let receipt = flow.trigger(request()).await.expect("trigger should succeed");

        assert_eq!(receipt.subscriber_count, 3);
        assert_eq!(receipt.notifications_created, 2);

        for user in ["alice", "carol"] {
            let listed = store
                .recent_notifications(&UserId(user.to_owned()), 10)
                .await
                .expect("list should succeed");
            assert_eq!(listed.len(), 1);
        }
        let listed = store
            .recent_notifications(&UserId(String::from("bob")), 10)
            .await
            .expect("list should succeed");
        assert!(listed.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn boot_seeds_the_default_user_once() {
        let config: GlobalConfig = Box::leak(Box::new(crate::web::test_config()));
        let (store, _task) = spawn(MemoryStore::new());

        let mut boot = BootFlow::new(config, store.clone());
        boot.boot().await.expect("first boot should succeed");
        boot.boot().await.expect("second boot should succeed");

        let mut store = store;
        let user = store
            .user_by_username(&config.seed_username)
            .await
            .expect("query should succeed")
            .expect("seed user should exist");
        assert_eq!(user.id.0, config.seed_username);
    }
}
