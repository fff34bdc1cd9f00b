#![deny(rust_2018_idioms)]

use diesel::{pg::PgConnection, prelude::*};
use mcm_alerts::{database, error, flow, push, session, web, Config, GlobalConfig};
use snafu::{ResultExt, Snafu};
use std::time::Duration;
use tracing::info;

fn main() {
    if let Err(e) = core() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[tokio::main]
async fn core() -> Result<()> {
    tracing_subscriber::fmt::init();
    dotenv::dotenv().ok();

    let config = Config::from_environment().context(UnableToConfigureSnafu)?;
    let config = &*Box::leak(Box::new(config));

    let push_config = push::Config::from_environment().context(UnableToConfigurePushSnafu)?;
    let push = push_config.map(push::Config::into_client);
    if push.is_none() {
        info!("Push gateway not configured; browser push delivery is disabled");
    }

    let database_url = &config.database_url;
    let conn =
        PgConnection::establish(database_url).context(UnableToConnectSnafu { database_url })?;

    let (store, store_task) = database::spawn(database::Database::new(conn));

    let sessions = session::SessionStore::new();

    let mut boot_flow = flow::BootFlow::new(config, store.clone());
    boot_flow.boot().await.context(UnableToBootSnafu)?;

    let login_flow = flow::LoginFlow::new(config, store.clone(), sessions.clone());
    let trigger_flow = flow::TriggerFlow::new(store.clone(), push);

    let web_ui = tokio::spawn(web::serve(
        config,
        sessions,
        login_flow,
        trigger_flow,
        store,
    ));

    let caffeine_task = async {
        match config.caffeine_interval {
            Some(interval) => tokio::spawn(caffeine(config, interval)).await,
            None => futures::future::pending().await,
        }
    };

    tokio::select! {
        web_ui = web_ui => {
            web_ui.context(WebUiFailedSnafu)
        }
        caffeine_task = caffeine_task => {
            caffeine_task.context(CaffeinePanickedSnafu)?.context(CaffeineFailedSnafu)?;
            CaffeineExitedSnafu.fail()
        }
        store_task = store_task => {
            store_task.context(DatabaseFailedSnafu)?;
            DatabaseExitedSnafu.fail()
        }
    }
}

/// Pings our own public URI so the hosting platform doesn't idle the dyno
/// out. Transient failures are tolerated up to the breaker's limit.
async fn caffeine(config: GlobalConfig, interval: Duration) -> Result<(), CaffeineError> {
    let client = reqwest::Client::new();
    let ping_url = config
        .public_uri
        .join("/ping")
        .context(UnableToBuildPingUrlSnafu)?;

    let mut breaker = error::Breaker::default();

    loop {
        let attempt = breaker.run(async {
            client
                .get(ping_url.clone())
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map(drop)
        });

        if let Some(attempt) = attempt.await.context(TooManyTransientFailuresSnafu)? {
            attempt.context(PingFailedSnafu)?;
        }

        tokio::time::sleep(interval).await;
    }
}

#[derive(Debug, Snafu)]
enum CaffeineError {
    #[snafu(display("Unable to build the ping URL"))]
    UnableToBuildPingUrl { source: url::ParseError },

    #[snafu(display("The keep-alive ping failed"))]
    PingFailed { source: reqwest::Error },

    #[snafu(display("Too many keep-alive pings failed in a row"))]
    TooManyTransientFailures { source: error::BreakerError },
}

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("Unable to configure application"))]
    UnableToConfigure { source: mcm_alerts::config::Error },

    #[snafu(display("Unable to configure the push gateway integration"))]
    UnableToConfigurePush { source: push::Error },

    #[snafu(display("Error connecting to {}", database_url))]
    UnableToConnect {
        source: diesel::ConnectionError,
        database_url: String,
    },

    #[snafu(display("Unable to run the startup work"))]
    UnableToBoot { source: flow::Error },

    #[snafu(display("The web UI failed"))]
    WebUiFailed { source: tokio::task::JoinError },

    #[snafu(display("The keep-alive task failed and never should"))]
    CaffeinePanicked { source: tokio::task::JoinError },

    #[snafu(display("The keep-alive task errored out"))]
    CaffeineFailed { source: CaffeineError },

    #[snafu(display("The keep-alive task exited and never should"))]
    CaffeineExited,

    #[snafu(display("The database exited and never should"))]
    DatabaseExited,

    #[snafu(display("The database failed and never should"))]
    DatabaseFailed { source: tokio::task::JoinError },
}

type Result<T, E = Error> = std::result::Result<T, E>;
