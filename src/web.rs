use crate::{
    database::StoreHandle,
    domain::{
        DeliveryToken, NotificationId, SubscriptionKind, SubscriptionUpdate, TriggerRequest, User,
    },
    flow::{LoginFlow, TriggerFlow},
    session::{self, SessionStore},
    GlobalConfig,
};
use chrono::{NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use std::convert::Infallible;
use tracing::{error, info};
use warp::{
    filters::BoxedFilter,
    http::{header, StatusCode},
    reply, Filter, Rejection, Reply,
};

const DEFAULT_LIST_LIMIT: i64 = 10;

pub async fn serve(
    config: GlobalConfig,
    sessions: SessionStore,
    login: LoginFlow,
    trigger: TriggerFlow,
    store: StoreHandle,
) {
    let routes = routes(config, sessions, login, trigger, store).recover(report_invalid);

    info!("Starting web server at {}", &config.listen_address);
    warp::serve(routes).run(config.listen_address).await
}

pub fn routes(
    config: GlobalConfig,
    sessions: SessionStore,
    login: LoginFlow,
    trigger: TriggerFlow,
    store: StoreHandle,
) -> BoxedFilter<(impl Reply,)> {
    session_routes(sessions.clone(), login)
        .or(user_routes(sessions.clone()))
        .or(subscription_routes(sessions.clone(), store.clone()))
        .or(notification_routes(sessions, store))
        .or(trigger_route(trigger))
        .or(site_routes(config))
        .boxed()
}

fn session_routes(sessions: SessionStore, login: LoginFlow) -> BoxedFilter<(impl Reply,)> {
    let create = warp::path!("sessions")
        .and(warp::post())
        .and(json_body())
        .and_then(move |params: LoginParams| {
            let mut flow = login.clone();
            async move {
                let outcome = flow
                    .login(&params.username, &params.password)
                    .await
                    .context(LoginFailedSnafu)?;

                match outcome {
                    Some((sid, user)) => {
                        let cookie = format!(
                            "{}={}; HttpOnly; Path=/; Max-Age={}",
                            session::COOKIE,
                            sid.0,
                            session::TTL.as_secs(),
                        );
                        let r = reply::json(&UserReply { user });
                        let r = reply::with_header(r, header::SET_COOKIE, cookie);
                        Ok::<_, Rejection>(r)
                    }
                    None => Err(Error::InvalidCredentials.into()),
                }
            }
        });

    let destroy = warp::path!("sessions")
        .and(warp::delete())
        .and(warp::cookie::optional::<String>(session::COOKIE))
        .and_then(move |sid: Option<String>| {
            let sessions = sessions.clone();
            async move {
                let sid = sid.ok_or(Error::Unauthorized)?;
                sessions.revoke(&sid);
                Ok::<_, Rejection>(reply::json(&OkReply { ok: true }))
            }
        });

    create.or(destroy).boxed()
}

fn user_routes(sessions: SessionStore) -> BoxedFilter<(impl Reply,)> {
    warp::path!("users" / "me")
        .and(warp::get())
        .and(authenticated(sessions))
        .map(|user: User| reply::json(&user))
        .boxed()
}

fn subscription_routes(sessions: SessionStore, store: StoreHandle) -> BoxedFilter<(impl Reply,)> {
    let fetch = {
        let store = store.clone();
        warp::path!("subscriptions" / SubscriptionKind)
            .and(warp::get())
            .and(authenticated(sessions.clone()))
            .and_then(move |kind: SubscriptionKind, user: User| {
                let mut store = store.clone();
                async move {
                    let subscription = store
                        .subscription(&user.id, kind)
                        .await
                        .context(StoreFailedSnafu)?;

                    // `null` when the user never subscribed.
                    Ok::<_, Rejection>(reply::json(&subscription))
                }
            })
    };

    let upsert = {
        let store = store.clone();
        warp::path!("subscriptions")
            .and(warp::post())
            .and(authenticated(sessions.clone()))
            .and(json_body())
            .and_then(move |user: User, update: SubscriptionUpdate| {
                let mut store = store.clone();
                async move {
                    let subscription = store
                        .upsert_subscription(&user.id, update)
                        .await
                        .context(StoreFailedSnafu)?;

                    Ok::<_, Rejection>(reply::json(&subscription))
                }
            })
    };

    let register_token = warp::path!("subscriptions" / "token")
        .and(warp::post())
        .and(authenticated(sessions))
        .and(json_body())
        .and_then(move |user: User, body: TokenBody| {
            let mut store = store.clone();
            async move {
                store
                    .set_delivery_token(&user.id, body.kind, body.token)
                    .await
                    .context(StoreFailedSnafu)?;

                Ok::<_, Rejection>(reply::json(&OkReply { ok: true }))
            }
        });

    fetch.or(register_token).or(upsert).boxed()
}

fn notification_routes(sessions: SessionStore, store: StoreHandle) -> BoxedFilter<(impl Reply,)> {
    let list = {
        let store = store.clone();
        warp::path!("notifications")
            .and(warp::get())
            .and(authenticated(sessions.clone()))
            .and(warp::query::<ListParams>())
            .and_then(move |user: User, params: ListParams| {
                let mut store = store.clone();
                async move {
                    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT);
                    let notifications = store
                        .recent_notifications(&user.id, limit)
                        .await
                        .context(StoreFailedSnafu)?;

                    Ok::<_, Rejection>(reply::json(&notifications))
                }
            })
    };

    let count_today = {
        let store = store.clone();
        warp::path!("notifications" / "count" / "today")
            .and(warp::get())
            .and(authenticated(sessions.clone()))
            .and_then(move |user: User| {
                let mut store = store.clone();
                async move {
                    // Everything created in the current UTC calendar day,
                    // not just rows stamped exactly at midnight.
                    let midnight = Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc();
                    let count = store
                        .notification_count_since(&user.id, midnight)
                        .await
                        .context(StoreFailedSnafu)?;

                    Ok::<_, Rejection>(reply::json(&CountReply { count }))
                }
            })
    };

    let mark_read = warp::path!("notifications" / i32 / "read")
        .and(warp::patch())
        .and(authenticated(sessions))
        .and_then(move |id: i32, user: User| {
            let mut store = store.clone();
            async move {
                store
                    .mark_notification_read(&user.id, NotificationId(id))
                    .await
                    .context(StoreFailedSnafu)?;

                Ok::<_, Rejection>(reply::json(&OkReply { ok: true }))
            }
        });

    list.or(count_today).or(mark_read).boxed()
}

fn trigger_route(trigger: TriggerFlow) -> BoxedFilter<(impl Reply,)> {
    // Deliberately unauthenticated: external monitoring probes post here.
    warp::path!("trigger")
        .and(warp::post())
        .and(json_body())
        .and_then(move |request: TriggerRequest| {
            let mut flow = trigger.clone();
            async move {
                let receipt = flow.trigger(request).await.context(TriggerFailedSnafu)?;
                Ok::<_, Rejection>(reply::json(&receipt))
            }
        })
        .boxed()
}

fn site_routes(config: GlobalConfig) -> BoxedFilter<(impl Reply,)> {
    let root = warp::path::end().and(warp::get()).map(move || {
        let trigger_uri = config
            .public_uri
            .join("trigger")
            .map(|u| u.to_string())
            .unwrap_or_else(|_| String::from("/trigger"));
        warp::reply::html(html::root(&trigger_uri).into_string())
    });

    let ping = warp::path!("ping").and(warp::get()).map(|| "OK");

    root.or(ping).boxed()
}

fn authenticated(
    sessions: SessionStore,
) -> impl Filter<Extract = (User,), Error = Rejection> + Clone {
    warp::cookie::optional::<String>(session::COOKIE).and_then(move |sid: Option<String>| {
        let sessions = sessions.clone();
        async move {
            sid.and_then(|sid| sessions.lookup(&sid))
                .ok_or_else(|| Rejection::from(Error::Unauthorized))
        }
    })
}

fn json_body<T: serde::de::DeserializeOwned + Send>(
) -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(16 * 1024).and(warp::body::json())
}

async fn report_invalid(r: Rejection) -> Result<impl Reply, Infallible> {
    let reply_with = |status: StatusCode, message: String| {
        Ok(reply::with_status(reply::json(&ErrorReply { message }), status))
    };

    if let Some(e) = r.find::<Error>() {
        use Error::*;
        match e {
            // Expected conditions, surfaced to the caller rather than
            // logged as faults.
            Unauthorized | InvalidCredentials => {
                reply_with(StatusCode::UNAUTHORIZED, e.to_string())
            }
            LoginFailed { .. } | TriggerFailed { .. } | StoreFailed { .. } => {
                error!("Unhandled web error: {}", e);
                reply_with(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    String::from("An internal error occurred"),
                )
            }
        }
    } else if let Some(e) = r.find::<warp::filters::body::BodyDeserializeError>() {
        reply_with(StatusCode::BAD_REQUEST, e.to_string())
    } else if r.is_not_found() {
        reply_with(StatusCode::NOT_FOUND, String::from("Not found"))
    } else if r.find::<warp::reject::MethodNotAllowed>().is_some() {
        reply_with(
            StatusCode::METHOD_NOT_ALLOWED,
            String::from("Method not allowed"),
        )
    } else {
        error!("Unhandled rejection: {:?}", r);
        reply_with(
            StatusCode::INTERNAL_SERVER_ERROR,
            String::from("An internal error occurred"),
        )
    }
}

#[derive(Debug, Deserialize)]
struct LoginParams {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct UserReply {
    user: User,
}

#[derive(Debug, Serialize)]
struct OkReply {
    ok: bool,
}

#[derive(Debug, Serialize)]
struct CountReply {
    count: i64,
}

#[derive(Debug, Serialize)]
struct ErrorReply {
    message: String,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    #[serde(rename = "type")]
    kind: SubscriptionKind,
    token: DeliveryToken,
}

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<i64>,
}

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("A session is required"))]
    Unauthorized,

    #[snafu(display("Invalid credentials"))]
    InvalidCredentials,

    #[snafu(display("Unable to log the user in"))]
    LoginFailed { source: crate::flow::Error },

    #[snafu(display("Unable to fan the trigger out"))]
    TriggerFailed { source: crate::flow::Error },

    #[snafu(display("The storage layer failed"))]
    StoreFailed { source: crate::database::Error },
}

impl warp::reject::Reject for Error {}

mod html {
    use maud::{html, Markup};

    const EXAMPLE_PAYLOAD: &str = r#"{
  "type": "site_down",
  "title": "Site Down Alert",
  "message": "example.com is not responding",
  "site": "example.com"
}"#;

    pub fn root(trigger_uri: &str) -> Markup {
        page(|| {
            html! {
                h1 { "MCM Alerts" }
                p { "Site up/down notifications for subscribed users." }
                p {
                    "Monitoring probes post events here; by design the "
                    "endpoint requires no authentication:"
                }
                pre { code { "POST " (trigger_uri) } }
                p { "Example payload:" }
                pre { code { (EXAMPLE_PAYLOAD) } }
            }
        })
    }

    fn page(body: impl FnOnce() -> Markup) -> Markup {
        html! {
            (maud::DOCTYPE)
                html {
                    head {
                        title { "MCM Alerts" }
                    }
                    body {
                        (body())
                        footer {
                            small { "build " (env!("VERGEN_GIT_SHA")) }
                        }
                    }
                }
        }
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> crate::Config {
    crate::Config {
        database_url: String::new(),
        public_uri: "http://localhost:8080/".parse().expect("static url"),
        listen_address: ([127, 0, 0, 1], 8080).into(),
        seed_username: String::from("user"),
        seed_password: String::from("MCM alerts"),
        seed_email: String::from("user@mcm-alerts.com"),
        seed_first_name: String::from("MCM"),
        seed_last_name: String::from("User"),
        caffeine_interval: None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        database::{memory::MemoryStore, spawn},
        domain::UserId,
        flow::BootFlow,
    };
    use serde_json::{json, Value};

    struct Server {
        config: GlobalConfig,
        sessions: SessionStore,
        store: StoreHandle,
    }

    impl Server {
        async fn start() -> Self {
            let config: GlobalConfig = Box::leak(Box::new(test_config()));
            let (store, _task) = spawn(MemoryStore::new());
            let sessions = SessionStore::new();

            BootFlow::new(config, store.clone())
                .boot()
                .await
                .expect("boot should succeed");

            Self {
                config,
                sessions,
                store,
            }
        }

        fn filter(&self) -> BoxedFilter<(impl Reply,)> {
            let login = LoginFlow::new(self.config, self.store.clone(), self.sessions.clone());
            let trigger = TriggerFlow::new(self.store.clone(), None);
            routes(
                self.config,
                self.sessions.clone(),
                login,
                trigger,
                self.store.clone(),
            )
        }

        /// Mints a session for the seed user directly; the HTTP login path
        /// has its own test.
        async fn session_cookie(&self) -> String {
            let mut store = self.store.clone();
            let user = store
                .user_by_username(&self.config.seed_username)
                .await
                .expect("query should succeed")
                .expect("the seed user should exist");
            let sid = self.sessions.create(user);
            format!("{}={}", session::COOKIE, sid.0)
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn logging_in_sets_a_cookie_that_grants_access() {
        let server = Server::start().await;
        let filter = server.filter().recover(report_invalid);

        let resp = warp::test::request()
            .method("POST")
            .path("/sessions")
            .json(&json!({"username": "user", "password": "MCM alerts"}))
            .reply(&filter)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let cookie = resp
            .headers()
            .get(header::SET_COOKIE)
            .expect("login should set a cookie")
            .to_str()
            .expect("cookie should be ascii")
            .to_owned();
        assert!(cookie.starts_with("sid="));
        let sid = cookie.split(';').next().expect("cookie pair").to_owned();

        let resp = warp::test::request()
            .method("GET")
            .path("/users/me")
            .header(header::COOKIE, sid)
            .reply(&filter)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = serde_json::from_slice(resp.body()).expect("valid json");
        assert_eq!(body["username"], "user");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn bad_credentials_are_rejected() {
        let server = Server::start().await;
        let filter = server.filter().recover(report_invalid);

        let resp = warp::test::request()
            .method("POST")
            .path("/sessions")
            .json(&json!({"username": "user", "password": "wrong"}))
            .reply(&filter)
            .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn protected_routes_require_a_session() {
        let server = Server::start().await;
        let filter = server.filter().recover(report_invalid);

        let resp = warp::test::request()
            .method("GET")
            .path("/notifications")
            .reply(&filter)
            .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn a_missing_subscription_reads_as_null() {
        let server = Server::start().await;
        let filter = server.filter().recover(report_invalid);
        let sid = server.session_cookie().await;

        let resp = warp::test::request()
            .method("GET")
            .path("/subscriptions/site_monitoring")
            .header(header::COOKIE, sid)
            .reply(&filter)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.body().as_ref(), b"null");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn a_malformed_trigger_has_no_partial_effect() {
        let server = Server::start().await;
        let filter = server.filter().recover(report_invalid);
        let sid = server.session_cookie().await;

        let resp = warp::test::request()
            .method("POST")
            .path("/subscriptions")
            .header(header::COOKIE, sid)
            .json(&json!({"type": "site_monitoring", "enabled": true}))
            .reply(&filter)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = warp::test::request()
            .method("POST")
            .path("/trigger")
            .json(&json!({"type": "meltdown", "title": "x", "message": "y"}))
            .reply(&filter)
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let mut store = server.store.clone();
        let listed = store
            .recent_notifications(&UserId(String::from("user")), 10)
            .await
            .expect("list should succeed");
        assert!(listed.is_empty(), "a rejected trigger created rows");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn a_trigger_reaches_the_subscriber_end_to_end() {
        let server = Server::start().await;
        let filter = server.filter().recover(report_invalid);
        let sid = server.session_cookie().await;

        let resp = warp::test::request()
            .method("POST")
            .path("/subscriptions")
            .header(header::COOKIE, sid.clone())
            .json(&json!({
                "type": "site_monitoring",
                "enabled": true,
                "enableSound": true,
                "enableBrowser": true,
                "enableEmail": false,
            }))
            .reply(&filter)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(resp.body()).expect("valid json");
        assert_eq!(body["enabled"], true);

        let resp = warp::test::request()
            .method("POST")
            .path("/trigger")
            .json(&json!({
                "type": "site_down",
                "title": "Site Down Alert",
                "message": "example.com is not responding",
                "site": "example.com",
            }))
            .reply(&filter)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(resp.body()).expect("valid json");
        assert_eq!(body["subscriberCount"], 1);
        assert_eq!(body["notificationsCreated"], 1);

        let resp = warp::test::request()
            .method("GET")
            .path("/notifications?limit=1")
            .header(header::COOKIE, sid.clone())
            .reply(&filter)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(resp.body()).expect("valid json");
        let listed = body.as_array().expect("an array");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["title"], "Site Down Alert");
        assert_eq!(listed[0]["status"], "unread");
        let id = listed[0]["id"].as_i64().expect("an id");

        let resp = warp::test::request()
            .method("GET")
            .path("/notifications/count/today")
            .header(header::COOKIE, sid.clone())
            .reply(&filter)
            .await;
        let body: Value = serde_json::from_slice(resp.body()).expect("valid json");
        assert_eq!(body["count"], 1);

        // Flipping to read is idempotent at the HTTP level too.
        for _ in 0..2 {
            let resp = warp::test::request()
                .method("PATCH")
                .path(&format!("/notifications/{}/read", id))
                .header(header::COOKIE, sid.clone())
                .reply(&filter)
                .await;
            assert_eq!(resp.status(), StatusCode::OK);
            let body: Value = serde_json::from_slice(resp.body()).expect("valid json");
            assert_eq!(body["ok"], true);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn logging_out_revokes_the_session() {
        let server = Server::start().await;
        let filter = server.filter().recover(report_invalid);
        let sid = server.session_cookie().await;

        let resp = warp::test::request()
            .method("DELETE")
            .path("/sessions")
            .header(header::COOKIE, sid.clone())
            .reply(&filter)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = warp::test::request()
            .method("GET")
            .path("/users/me")
            .header(header::COOKIE, sid)
            .reply(&filter)
            .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
