use crate::domain::{
    DeliveryToken, EventType, NewNotification, NewUser, Notification, NotificationId,
    NotificationStatus, Subscription, SubscriptionKind, SubscriptionUpdate, User, UserId,
};
use chrono::{DateTime, Utc};
use diesel::{pg::upsert::excluded, prelude::*};
use futures::{
    channel::{mpsc, oneshot},
    SinkExt, StreamExt,
};
use snafu::{OptionExt, ResultExt, Snafu};
use tracing::{trace, trace_span};

mod models;
mod schema;

/// The storage operations the rest of the system is written against. The
/// production implementation is [`Database`]; tests run the same actor over
/// an in-memory store.
pub trait Store: Send + 'static {
    fn user_by_username(&self, username: &str) -> Result<Option<User>>;

    fn create_user(&self, user: NewUser) -> Result<User>;

    fn subscription(&self, user: &UserId, kind: SubscriptionKind) -> Result<Option<Subscription>>;

    fn upsert_subscription(
        &self,
        user: &UserId,
        update: SubscriptionUpdate,
    ) -> Result<Subscription>;

    fn set_delivery_token(
        &self,
        user: &UserId,
        kind: SubscriptionKind,
        token: DeliveryToken,
    ) -> Result<()>;

    fn active_subscribers(&self, kind: SubscriptionKind) -> Result<Vec<Subscription>>;

    fn create_notification(&self, notification: NewNotification) -> Result<Notification>;

    fn recent_notifications(&self, user: &UserId, limit: i64) -> Result<Vec<Notification>>;

    fn notification_count_since(&self, user: &UserId, since: DateTime<Utc>) -> Result<i64>;

    fn mark_notification_read(&self, user: &UserId, id: NotificationId) -> Result<()>;
}

pub struct Database {
    conn: diesel::PgConnection,
}

impl Database {
    pub fn new(conn: diesel::PgConnection) -> Self {
        Self { conn }
    }
}

impl Store for Database {
    fn user_by_username(&self, username: &str) -> Result<Option<User>> {
        use schema::users;

        let Self { conn } = self;

        let row = users::table
            .filter(users::username.eq(username))
            .first::<models::UserRow>(conn)
            .optional()
            .context(UnableToQueryUserSnafu)?;

        Ok(row.map(user_from_row))
    }

    fn create_user(&self, user: NewUser) -> Result<User> {
        use schema::users::dsl;

        let Self { conn } = self;

        let row = models::NewUserRow {
            id: user.id.0,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
        };

        let row = diesel::insert_into(dsl::users)
            .values(&row)
            .get_result::<models::UserRow>(conn)
            .context(UnableToInsertUserSnafu)?;

        Ok(user_from_row(row))
    }

    fn subscription(&self, user: &UserId, kind: SubscriptionKind) -> Result<Option<Subscription>> {
        use schema::subscriptions as s;

        let Self { conn } = self;

        let row = s::table
            .filter(s::user_id.eq(&user.0))
            .filter(s::kind.eq(kind.as_str()))
            .first::<models::SubscriptionRow>(conn)
            .optional()
            .context(UnableToQuerySubscriptionSnafu)?;

        row.map(subscription_from_row).transpose()
    }

    fn upsert_subscription(
        &self,
        user: &UserId,
        update: SubscriptionUpdate,
    ) -> Result<Subscription> {
        use schema::subscriptions::dsl;

        let Self { conn } = self;

        let now = Utc::now();
        let row = models::NewSubscriptionRow {
            user_id: user.0.clone(),
            kind: update.kind.as_str().to_owned(),
            enabled: update.enabled,
            enable_sound: update.channels.sound,
            enable_browser: update.channels.browser,
            enable_email: update.channels.email,
            delivery_token: update.token.map(|t| t.0),
            created_at: now,
            updated_at: now,
        };

        // The unique index on (user_id, kind) makes this a single atomic
        // statement; two concurrent first-time enables cannot race into
        // duplicate rows.
        let row = diesel::insert_into(dsl::subscriptions)
            .values(&row)
            .on_conflict((dsl::user_id, dsl::kind))
            .do_update()
            .set((
                dsl::enabled.eq(excluded(dsl::enabled)),
                dsl::enable_sound.eq(excluded(dsl::enable_sound)),
                dsl::enable_browser.eq(excluded(dsl::enable_browser)),
                dsl::enable_email.eq(excluded(dsl::enable_email)),
                dsl::delivery_token.eq(excluded(dsl::delivery_token)),
                dsl::updated_at.eq(excluded(dsl::updated_at)),
            ))
            .get_result::<models::SubscriptionRow>(conn)
            .context(UnableToUpsertSubscriptionSnafu)?;

        subscription_from_row(row)
    }

    fn set_delivery_token(
        &self,
        user: &UserId,
        kind: SubscriptionKind,
        token: DeliveryToken,
    ) -> Result<()> {
        use schema::subscriptions::dsl;

        let Self { conn } = self;

        let count = diesel::update(
            dsl::subscriptions
                .filter(dsl::user_id.eq(&user.0))
                .filter(dsl::kind.eq(kind.as_str())),
        )
        .set((
            dsl::delivery_token.eq(Some(token.0)),
            dsl::updated_at.eq(Utc::now()),
        ))
        .execute(conn)
        .context(UnableToUpdateDeliveryTokenSnafu)?;

        trace!("Updated the delivery token on {} rows", count);

        Ok(())
    }

    fn active_subscribers(&self, kind: SubscriptionKind) -> Result<Vec<Subscription>> {
        use schema::subscriptions as s;

        let Self { conn } = self;

        let rows = s::table
            .filter(s::kind.eq(kind.as_str()))
            .filter(s::enabled.eq(true))
            .log_query()
            .load::<models::SubscriptionRow>(conn)
            .context(UnableToQuerySubscribersSnafu)?;

        rows.into_iter().map(subscription_from_row).collect()
    }

    fn create_notification(&self, notification: NewNotification) -> Result<Notification> {
        use schema::notifications as n;

        let s = trace_span!("create_notification", user_id = %notification.user_id.0);
        let _s = s.enter();

        let Self { conn } = self;

        let row = models::NewNotificationRow {
            user_id: notification.user_id.0,
            title: notification.title,
            message: notification.message,
            kind: notification.event.as_str().to_owned(),
            status: NotificationStatus::Unread.as_str().to_owned(),
        };

        let row = diesel::insert_into(n::table)
            .values(&row)
            .log_query()
            .get_result::<models::NotificationRow>(conn)
            .context(UnableToInsertNotificationSnafu)?;

        notification_from_row(row)
    }

    fn recent_notifications(&self, user: &UserId, limit: i64) -> Result<Vec<Notification>> {
        use schema::notifications as n;

        let Self { conn } = self;

        // Newest first by id; ids are serial, so this is also creation
        // order even when a fan-out burst lands inside one timestamp tick.
        let rows = n::table
            .filter(n::user_id.eq(&user.0))
            .order(n::id.desc())
            .limit(limit)
            .load::<models::NotificationRow>(conn)
            .context(UnableToQueryNotificationsSnafu)?;

        rows.into_iter().map(notification_from_row).collect()
    }

    fn notification_count_since(&self, user: &UserId, since: DateTime<Utc>) -> Result<i64> {
        use schema::notifications as n;

        let Self { conn } = self;

        n::table
            .filter(n::user_id.eq(&user.0))
            .filter(n::created_at.ge(since))
            .count()
            .get_result(conn)
            .context(UnableToCountNotificationsSnafu)
    }

    fn mark_notification_read(&self, user: &UserId, id: NotificationId) -> Result<()> {
        use schema::notifications as n;

        let Self { conn } = self;

        // Zero matched rows is fine: the flip is idempotent and scoped to
        // the owning user.
        let count = diesel::update(
            n::table
                .filter(n::id.eq(id.0))
                .filter(n::user_id.eq(&user.0)),
        )
        .set(n::status.eq(NotificationStatus::Read.as_str()))
        .execute(conn)
        .context(UnableToUpdateNotificationSnafu)?;

        trace!("Marked {} rows as read", count);

        Ok(())
    }
}

fn user_from_row(row: models::UserRow) -> User {
    User {
        id: UserId(row.id),
        username: row.username,
        email: row.email,
        first_name: row.first_name,
        last_name: row.last_name,
        created_at: row.created_at,
    }
}

fn subscription_from_row(row: models::SubscriptionRow) -> Result<Subscription> {
    let kind = SubscriptionKind::parse(&row.kind).context(UnrecognizedSubscriptionKindSnafu {
        value: row.kind.clone(),
    })?;

    Ok(Subscription {
        user_id: UserId(row.user_id),
        kind,
        enabled: row.enabled,
        channels: crate::domain::ChannelPrefs {
            sound: row.enable_sound,
            browser: row.enable_browser,
            email: row.enable_email,
        },
        token: row.delivery_token.map(DeliveryToken),
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn notification_from_row(row: models::NotificationRow) -> Result<Notification> {
    let event = EventType::parse(&row.kind).context(UnrecognizedEventTypeSnafu {
        value: row.kind.clone(),
    })?;
    let status = NotificationStatus::parse(&row.status).context(UnrecognizedStatusSnafu {
        value: row.status.clone(),
    })?;

    Ok(Notification {
        id: NotificationId(row.id),
        user_id: UserId(row.user_id),
        title: row.title,
        message: row.message,
        event,
        status,
        created_at: row.created_at,
    })
}

trait LogQuery {
    fn log_query(self) -> Self;
}

impl<T> LogQuery for T
where
    for<'a> diesel::query_builder::DebugQuery<'a, T, diesel::pg::Pg>: std::fmt::Display,
{
    fn log_query(self) -> Self {
        trace!("Query: {}", diesel::debug_query::<diesel::pg::Pg, _>(&self));
        self
    }
}

#[derive(Debug, Snafu)]
pub enum Error {
    UnableToQueryUser { source: diesel::result::Error },

    UnableToInsertUser { source: diesel::result::Error },

    UnableToQuerySubscription { source: diesel::result::Error },

    UnableToUpsertSubscription { source: diesel::result::Error },

    UnableToUpdateDeliveryToken { source: diesel::result::Error },

    UnableToQuerySubscribers { source: diesel::result::Error },

    UnableToInsertNotification { source: diesel::result::Error },

    UnableToQueryNotifications { source: diesel::result::Error },

    UnableToCountNotifications { source: diesel::result::Error },

    UnableToUpdateNotification { source: diesel::result::Error },

    #[snafu(display("Stored subscription kind {:?} is not recognized", value))]
    UnrecognizedSubscriptionKind { value: String },

    #[snafu(display("Stored event type {:?} is not recognized", value))]
    UnrecognizedEventType { value: String },

    #[snafu(display("Stored notification status {:?} is not recognized", value))]
    UnrecognizedStatus { value: String },
}

type Result<T, E = Error> = std::result::Result<T, E>;

// The hand-expanded command-channel actor; the storage work itself is
// blocking, so it runs on its own task and everyone else talks to it
// through the handle.
// https://draft.ryhl.io/blog/actors-with-tokio/

pub fn spawn<S: Store>(store: S) -> (StoreHandle, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(10);
    let child = tokio::spawn(store_task(store, rx));
    (StoreHandle(tx), child)
}

#[derive(Debug, Clone)]
pub struct StoreHandle(mpsc::Sender<StoreCommand>);

impl StoreHandle {
    pub async fn user_by_username(&mut self, username: &str) -> Result<Option<User>> {
        let (tx, rx) = oneshot::channel();

        // Ignore send errors here and below. If the send fails, so does
        // the rx.await; there's no reason to check for the same failure
        // twice.
        let _ = self
            .0
            .send(StoreCommand::UserByUsername(tx, username.to_owned()))
            .await;
        rx.await.expect("Actor error - task gone")
    }

    pub async fn create_user(&mut self, user: NewUser) -> Result<User> {
        let (tx, rx) = oneshot::channel();

        let _ = self.0.send(StoreCommand::CreateUser(tx, user)).await;
        rx.await.expect("Actor error - task gone")
    }

    pub async fn subscription(
        &mut self,
        user: &UserId,
        kind: SubscriptionKind,
    ) -> Result<Option<Subscription>> {
        let (tx, rx) = oneshot::channel();

        let _ = self
            .0
            .send(StoreCommand::Subscription(tx, user.clone(), kind))
            .await;
        rx.await.expect("Actor error - task gone")
    }

    pub async fn upsert_subscription(
        &mut self,
        user: &UserId,
        update: SubscriptionUpdate,
    ) -> Result<Subscription> {
        let (tx, rx) = oneshot::channel();

        let _ = self
            .0
            .send(StoreCommand::UpsertSubscription(tx, user.clone(), update))
            .await;
        rx.await.expect("Actor error - task gone")
    }

    pub async fn set_delivery_token(
        &mut self,
        user: &UserId,
        kind: SubscriptionKind,
        token: DeliveryToken,
    ) -> Result<()> {
        let (tx, rx) = oneshot::channel();

        let _ = self
            .0
            .send(StoreCommand::SetDeliveryToken(tx, user.clone(), kind, token))
            .await;
        rx.await.expect("Actor error - task gone")
    }

    pub async fn active_subscribers(
        &mut self,
        kind: SubscriptionKind,
    ) -> Result<Vec<Subscription>> {
        let (tx, rx) = oneshot::channel();

        let _ = self.0.send(StoreCommand::ActiveSubscribers(tx, kind)).await;
        rx.await.expect("Actor error - task gone")
    }

    pub async fn create_notification(
        &mut self,
        notification: NewNotification,
    ) -> Result<Notification> {
        let (tx, rx) = oneshot::channel();

        let _ = self
            .0
            .send(StoreCommand::CreateNotification(tx, notification))
            .await;
        rx.await.expect("Actor error - task gone")
    }

    pub async fn recent_notifications(
        &mut self,
        user: &UserId,
        limit: i64,
    ) -> Result<Vec<Notification>> {
        let (tx, rx) = oneshot::channel();

        let _ = self
            .0
            .send(StoreCommand::RecentNotifications(tx, user.clone(), limit))
            .await;
        rx.await.expect("Actor error - task gone")
    }

    pub async fn notification_count_since(
        &mut self,
        user: &UserId,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let (tx, rx) = oneshot::channel();

        let _ = self
            .0
            .send(StoreCommand::NotificationCountSince(tx, user.clone(), since))
            .await;
        rx.await.expect("Actor error - task gone")
    }

    pub async fn mark_notification_read(
        &mut self,
        user: &UserId,
        id: NotificationId,
    ) -> Result<()> {
        let (tx, rx) = oneshot::channel();

        let _ = self
            .0
            .send(StoreCommand::MarkNotificationRead(tx, user.clone(), id))
            .await;
        rx.await.expect("Actor error - task gone")
    }
}

#[derive(Debug)]
enum StoreCommand {
    UserByUsername(oneshot::Sender<Result<Option<User>>>, String),

    CreateUser(oneshot::Sender<Result<User>>, NewUser),

    Subscription(
        oneshot::Sender<Result<Option<Subscription>>>,
        UserId,
        SubscriptionKind,
    ),

    UpsertSubscription(
        oneshot::Sender<Result<Subscription>>,
        UserId,
        SubscriptionUpdate,
    ),

    SetDeliveryToken(
        oneshot::Sender<Result<()>>,
        UserId,
        SubscriptionKind,
        DeliveryToken,
    ),

    ActiveSubscribers(oneshot::Sender<Result<Vec<Subscription>>>, SubscriptionKind),

    CreateNotification(oneshot::Sender<Result<Notification>>, NewNotification),

    RecentNotifications(oneshot::Sender<Result<Vec<Notification>>>, UserId, i64),

    NotificationCountSince(oneshot::Sender<Result<i64>>, UserId, DateTime<Utc>),

    MarkNotificationRead(oneshot::Sender<Result<()>>, UserId, NotificationId),
}

async fn store_task<S: Store>(store: S, mut rx: mpsc::Receiver<StoreCommand>) {
    while let Some(cmd) = rx.next().await {
        // If we couldn't respond, that's OK; the requester is gone.
        match cmd {
            StoreCommand::UserByUsername(reply, username) => {
                let retval = tokio::task::block_in_place(|| store.user_by_username(&username));
                let _ = reply.send(retval);
            }

            StoreCommand::CreateUser(reply, user) => {
                let retval = tokio::task::block_in_place(|| store.create_user(user));
                let _ = reply.send(retval);
            }

            StoreCommand::Subscription(reply, user, kind) => {
                let retval = tokio::task::block_in_place(|| store.subscription(&user, kind));
                let _ = reply.send(retval);
            }

            StoreCommand::UpsertSubscription(reply, user, update) => {
                let retval =
                    tokio::task::block_in_place(|| store.upsert_subscription(&user, update));
                let _ = reply.send(retval);
            }

            StoreCommand::SetDeliveryToken(reply, user, kind, token) => {
                let retval =
                    tokio::task::block_in_place(|| store.set_delivery_token(&user, kind, token));
                let _ = reply.send(retval);
            }

            StoreCommand::ActiveSubscribers(reply, kind) => {
                let retval = tokio::task::block_in_place(|| store.active_subscribers(kind));
                let _ = reply.send(retval);
            }

            StoreCommand::CreateNotification(reply, notification) => {
                let retval = tokio::task::block_in_place(|| store.create_notification(notification));
                let _ = reply.send(retval);
            }

            StoreCommand::RecentNotifications(reply, user, limit) => {
                let retval =
                    tokio::task::block_in_place(|| store.recent_notifications(&user, limit));
                let _ = reply.send(retval);
            }

            StoreCommand::NotificationCountSince(reply, user, since) => {
                let retval =
                    tokio::task::block_in_place(|| store.notification_count_since(&user, since));
                let _ = reply.send(retval);
            }

            StoreCommand::MarkNotificationRead(reply, user, id) => {
                let retval =
                    tokio::task::block_in_place(|| store.mark_notification_read(&user, id));
                let _ = reply.send(retval);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use super::{Result, Store, UnableToInsertNotificationSnafu};
    use crate::domain::{
        DeliveryToken, NewNotification, NewUser, Notification, NotificationId, NotificationStatus,
        Subscription, SubscriptionKind, SubscriptionUpdate, User, UserId,
    };
    use chrono::{DateTime, Utc};
    use parking_lot::Mutex;
    use snafu::ResultExt;
    use std::collections::HashSet;

    /// An in-memory [`Store`] with the same observable behavior as the
    /// Postgres one, plus per-user failure injection for exercising the
    /// fan-out's independence guarantee.
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        state: Mutex<State>,
        fail_notifications_for: HashSet<String>,
    }

    #[derive(Default)]
    struct State {
        users: Vec<User>,
        subscriptions: Vec<Subscription>,
        notifications: Vec<Notification>,
        next_notification_id: i32,
    }

    impl MemoryStore {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn failing_notifications_for(mut self, user: &str) -> Self {
            self.fail_notifications_for.insert(user.to_owned());
            self
        }
    }

    impl Store for MemoryStore {
        fn user_by_username(&self, username: &str) -> Result<Option<User>> {
            let state = self.state.lock();
            Ok(state.users.iter().find(|u| u.username == username).cloned())
        }

        fn create_user(&self, user: NewUser) -> Result<User> {
            let user = User {
                id: user.id,
                username: user.username,
                email: user.email,
                first_name: user.first_name,
                last_name: user.last_name,
                created_at: Utc::now(),
            };
            self.state.lock().users.push(user.clone());
            Ok(user)
        }

        fn subscription(
            &self,
            user: &UserId,
            kind: SubscriptionKind,
        ) -> Result<Option<Subscription>> {
            let state = self.state.lock();
            Ok(state
                .subscriptions
                .iter()
                .find(|s| &s.user_id == user && s.kind == kind)
                .cloned())
        }

        fn upsert_subscription(
            &self,
            user: &UserId,
            update: SubscriptionUpdate,
        ) -> Result<Subscription> {
            let mut state = self.state.lock();
            let now = Utc::now();

            let existing = state
                .subscriptions
                .iter_mut()
                .find(|s| &s.user_id == user && s.kind == update.kind);

            let subscription = match existing {
                Some(s) => {
                    s.enabled = update.enabled;
                    s.channels = update.channels;
                    s.token = update.token;
                    s.updated_at = now;
                    s.clone()
                }
                None => {
                    let s = Subscription {
                        user_id: user.clone(),
                        kind: update.kind,
                        enabled: update.enabled,
                        channels: update.channels,
                        token: update.token,
                        created_at: now,
                        updated_at: now,
                    };
                    state.subscriptions.push(s.clone());
                    s
                }
            };

            Ok(subscription)
        }

        fn set_delivery_token(
            &self,
            user: &UserId,
            kind: SubscriptionKind,
            token: DeliveryToken,
        ) -> Result<()> {
            let mut state = self.state.lock();
            if let Some(s) = state
                .subscriptions
                .iter_mut()
                .find(|s| &s.user_id == user && s.kind == kind)
            {
                s.token = Some(token);
                s.updated_at = Utc::now();
            }
            Ok(())
        }

        fn active_subscribers(&self, kind: SubscriptionKind) -> Result<Vec<Subscription>> {
            let state = self.state.lock();
            Ok(state
                .subscriptions
                .iter()
                .filter(|s| s.kind == kind && s.enabled)
                .cloned()
                .collect())
        }

        fn create_notification(&self, notification: NewNotification) -> Result<Notification> {
            if self.fail_notifications_for.contains(&notification.user_id.0) {
                return Err(diesel::result::Error::RollbackTransaction)
                    .context(UnableToInsertNotificationSnafu);
            }

            let mut state = self.state.lock();
            state.next_notification_id += 1;
            let notification = Notification {
                id: NotificationId(state.next_notification_id),
                user_id: notification.user_id,
                title: notification.title,
                message: notification.message,
                event: notification.event,
                status: NotificationStatus::Unread,
                created_at: Utc::now(),
            };
            state.notifications.push(notification.clone());
            Ok(notification)
        }

        fn recent_notifications(&self, user: &UserId, limit: i64) -> Result<Vec<Notification>> {
            let state = self.state.lock();
            let mut notifications: Vec<_> = state
                .notifications
                .iter()
                .filter(|n| &n.user_id == user)
                .cloned()
                .collect();
            notifications.sort_by(|a, b| b.id.cmp(&a.id));
            notifications.truncate(limit as usize);
            Ok(notifications)
        }

        fn notification_count_since(&self, user: &UserId, since: DateTime<Utc>) -> Result<i64> {
            let state = self.state.lock();
            Ok(state
                .notifications
                .iter()
                .filter(|n| &n.user_id == user && n.created_at >= since)
                .count() as i64)
        }

        fn mark_notification_read(&self, user: &UserId, id: NotificationId) -> Result<()> {
            let mut state = self.state.lock();
            if let Some(n) = state
                .notifications
                .iter_mut()
                .find(|n| n.id == id && &n.user_id == user)
            {
                n.status = NotificationStatus::Read;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use super::{memory::MemoryStore, spawn};
    use crate::domain::{
        ChannelPrefs, DeliveryToken, EventType, NewNotification, NotificationStatus,
        SubscriptionKind, SubscriptionUpdate, UserId,
    };
    use chrono::{Duration, Utc};

    fn update(enabled: bool) -> SubscriptionUpdate {
        SubscriptionUpdate {
            kind: SubscriptionKind::SiteMonitoring,
            enabled,
            channels: ChannelPrefs::default(),
            token: Some(DeliveryToken(String::from("device-1"))),
        }
    }

    fn new_notification(user: &str) -> NewNotification {
        NewNotification {
            user_id: UserId(user.to_owned()),
            title: String::from("Site Down Alert"),
            message: String::from("example.com is not responding"),
            event: EventType::SiteDown,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn upserting_the_same_preferences_twice_keeps_one_row() {
        let (mut store, _task) = spawn(MemoryStore::new());
        let user = UserId(String::from("user"));

        let first = store
            .upsert_subscription(&user, update(true))
            .await
            .expect("first upsert should succeed");
        let second = store
            .upsert_subscription(&user, update(true))
            .await
            .expect("second upsert should succeed");

        assert_eq!(first.created_at, second.created_at);
        assert_eq!(first.enabled, second.enabled);

        let active = store
            .active_subscribers(SubscriptionKind::SiteMonitoring)
            .await
            .expect("query should succeed");
        assert_eq!(active.len(), 1, "duplicate rows for one (user, kind)");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn upserts_update_in_place() {
        let (mut store, _task) = spawn(MemoryStore::new());
        let user = UserId(String::from("user"));

        let created = store
            .upsert_subscription(&user, update(true))
            .await
            .expect("upsert should succeed");
        let disabled = store
            .upsert_subscription(&user, update(false))
            .await
            .expect("upsert should succeed");

        assert_eq!(created.created_at, disabled.created_at);
        assert!(!disabled.enabled);

        let active = store
            .active_subscribers(SubscriptionKind::SiteMonitoring)
            .await
            .expect("query should succeed");
        assert!(active.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn marking_read_twice_is_idempotent() {
        let (mut store, _task) = spawn(MemoryStore::new());
        let user = UserId(String::from("user"));

        let n = store
            .create_notification(new_notification("user"))
            .await
            .expect("create should succeed");
        assert_eq!(n.status, NotificationStatus::Unread);

        store
            .mark_notification_read(&user, n.id)
            .await
            .expect("first read flip should succeed");
        store
            .mark_notification_read(&user, n.id)
            .await
            .expect("second read flip should succeed");

        let listed = store
            .recent_notifications(&user, 10)
            .await
            .expect("list should succeed");
        assert_eq!(listed[0].status, NotificationStatus::Read);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn marking_read_is_scoped_to_the_owner() {
        let (mut store, _task) = spawn(MemoryStore::new());

        let n = store
            .create_notification(new_notification("alice"))
            .await
            .expect("create should succeed");

        store
            .mark_notification_read(&UserId(String::from("mallory")), n.id)
            .await
            .expect("a miss is still a success");

        let listed = store
            .recent_notifications(&UserId(String::from("alice")), 10)
            .await
            .expect("list should succeed");
        assert_eq!(listed[0].status, NotificationStatus::Unread);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn recent_notifications_are_newest_first() {
        let (mut store, _task) = spawn(MemoryStore::new());
        let user = UserId(String::from("user"));

        for _ in 0..3 {
            store
                .create_notification(new_notification("user"))
                .await
                .expect("create should succeed");
        }

        let listed = store
            .recent_notifications(&user, 2)
            .await
            .expect("list should succeed");
        let ids: Vec<_> = listed.iter().map(|n| n.id.0).collect();
        assert_eq!(ids, [3, 2]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn counting_since_filters_by_creation_time() {
        let (mut store, _task) = spawn(MemoryStore::new());
        let user = UserId(String::from("user"));

        store
            .create_notification(new_notification("user"))
            .await
            .expect("create should succeed");

        let past = Utc::now() - Duration::hours(1);
        let future = Utc::now() + Duration::hours(1);

        assert_eq!(
            store
                .notification_count_since(&user, past)
                .await
                .expect("count should succeed"),
            1
        );
        assert_eq!(
            store
                .notification_count_since(&user, future)
                .await
                .expect("count should succeed"),
            0
        );
    }
}
