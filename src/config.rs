use snafu::{ResultExt, Snafu};
use std::{
    env,
    net::{IpAddr, SocketAddr},
    time::Duration,
};
use url::Url;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub public_uri: Url,
    pub listen_address: SocketAddr,
    pub seed_username: String,
    pub seed_password: String,
    pub seed_email: String,
    pub seed_first_name: String,
    pub seed_last_name: String,
    pub caffeine_interval: Option<Duration>,
}

impl Config {
    pub fn from_environment() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context(UnknownDatabaseUrlSnafu)?;
        let uri = env::var("WEB_PUBLIC_URI").context(UnknownWebPublicUriSnafu)?;
        let address = env::var("WEB_LISTEN_ADDRESS").context(UnknownWebListenAddressSnafu)?;
        let port = env::var("WEB_LISTEN_PORT").or_else(|_| env::var("PORT"));
        let port = port.context(UnknownWebListenPortSnafu)?;

        let public_uri = Url::parse(&uri).context(InvalidWebPublicUriSnafu { uri })?;
        let address: IpAddr = address
            .parse()
            .context(InvalidWebListenAddressSnafu { address })?;
        let port = port.parse().context(InvalidWebListenPortSnafu { port })?;
        let listen_address = (address, port).into();

        // The seed account mirrors the one the original deployment shipped
        // with; deployments override it via the environment.
        let seed_username = env::var("SEED_USERNAME").unwrap_or_else(|_| String::from("user"));
        let seed_password = env::var("SEED_PASSWORD").unwrap_or_else(|_| String::from("MCM alerts"));
        let seed_email =
            env::var("SEED_EMAIL").unwrap_or_else(|_| String::from("user@mcm-alerts.com"));
        let seed_first_name = env::var("SEED_FIRST_NAME").unwrap_or_else(|_| String::from("MCM"));
        let seed_last_name = env::var("SEED_LAST_NAME").unwrap_or_else(|_| String::from("User"));

        let caffeine_interval = match env::var("CAFFEINE_INTERVAL_SECS") {
            Ok(interval) => {
                let secs = interval
                    .parse()
                    .context(InvalidCaffeineIntervalSnafu { interval })?;
                Some(Duration::from_secs(secs))
            }
            Err(_) => None,
        };

        Ok(Self {
            database_url,
            public_uri,
            listen_address,
            seed_username,
            seed_password,
            seed_email,
            seed_first_name,
            seed_last_name,
            caffeine_interval,
        })
    }
}

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("DATABASE_URL must be set"))]
    UnknownDatabaseUrl { source: env::VarError },

    #[snafu(display("WEB_LISTEN_ADDRESS must be set"))]
    UnknownWebListenAddress { source: env::VarError },

    #[snafu(display("WEB_LISTEN_ADDRESS is invalid"))]
    InvalidWebListenAddress {
        source: std::net::AddrParseError,
        address: String,
    },

    #[snafu(display("WEB_LISTEN_PORT must be set"))]
    UnknownWebListenPort { source: env::VarError },

    #[snafu(display("WEB_LISTEN_PORT is invalid"))]
    InvalidWebListenPort {
        source: std::num::ParseIntError,
        port: String,
    },

    #[snafu(display("WEB_PUBLIC_URI must be set"))]
    UnknownWebPublicUri { source: env::VarError },

    #[snafu(display("WEB_PUBLIC_URI is invalid"))]
    InvalidWebPublicUri {
        source: url::ParseError,
        uri: String,
    },

    #[snafu(display("CAFFEINE_INTERVAL_SECS is invalid"))]
    InvalidCaffeineInterval {
        source: std::num::ParseIntError,
        interval: String,
    },
}

type Result<T, E = Error> = std::result::Result<T, E>;
