#![deny(rust_2018_idioms)]

use futures::FutureExt;
use mcm_alerts::{alert, api, panel, watch};
use snafu::{ResultExt, Snafu};
use tracing::{info, warn};

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

    let config = api::Config::from_environment().context(UnableToConfigureSnafu)?;
    let config = &*Box::leak(Box::new(config));

    let client = api::Client::new(config).context(UnableToBuildClientSnafu)?;

    let user = client.login().await.context(UnableToLogInSnafu)?;
    info!("Logged in as {}", user.username);

    let registrar = panel::ConfiguredRegistrar::new(config.device_token.clone());
    let mut panel = panel::Panel::new(client.clone(), registrar);
    match panel.set_enabled(true).await {
        Ok(_) => info!("Site monitoring subscription is active"),
        Err(panel::Error::PermissionDenied) => {
            warn!("No device token configured; browser push stays off, terminal alerts only")
        }
        Err(e) => return Err(e).context(UnableToEnableSubscriptionSnafu),
    }

    let slot = alert::Slot::new(alert::ConsolePresenter::new());
    let watcher = watch::Watcher::new(client, slot.clone(), config.poll_interval);

    let (work, work_handle) = watcher.run().remote_handle();
    tokio::spawn(work);
    info!(
        "Watching for notifications every {:?}; ctrl-c to stop",
        config.poll_interval,
    );

    tokio::signal::ctrl_c()
        .await
        .context(UnableToListenForShutdownSnafu)?;

    info!("Shutting down");
    // Tear both timers down as a unit: the poll loop dies with its
    // handle, and the slot cancels any in-flight dismiss.
    drop(work_handle);
    slot.shutdown();

    Ok(())
}

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("Unable to configure the notifier"))]
    UnableToConfigure { source: api::Error },

    #[snafu(display("Unable to build the API client"))]
    UnableToBuildClient { source: api::Error },

    #[snafu(display("Unable to log in"))]
    UnableToLogIn { source: api::Error },

    #[snafu(display("Unable to enable the site monitoring subscription"))]
    UnableToEnableSubscription { source: panel::Error },

    #[snafu(display("Unable to listen for ctrl-c"))]
    UnableToListenForShutdown { source: std::io::Error },
}

type Result<T, E = Error> = std::result::Result<T, E>;
