use crate::domain::User;
use parking_lot::Mutex;
use rand::{distributions::Alphanumeric, Rng, SeedableRng};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

pub const COOKIE: &str = "sid";
pub const TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const ID_LENGTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(pub String);

/// In-process session storage keyed by an opaque id. Sessions expire after
/// a fixed TTL and do not survive a server restart.
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<Mutex<HashMap<String, Entry>>>,
    ttl: Duration,
}

#[derive(Debug)]
struct Entry {
    user: User,
    expires_at: Instant,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::with_ttl(TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            inner: Default::default(),
            ttl,
        }
    }

    pub fn create(&self, user: User) -> SessionId {
        let rng = rand::rngs::StdRng::from_entropy();
        let id: String = rng
            .sample_iter(&Alphanumeric)
            .take(ID_LENGTH)
            .map(char::from)
            .collect();

        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.retain(|_, e| e.expires_at > now);
        inner.insert(
            id.clone(),
            Entry {
                user,
                expires_at: now + self.ttl,
            },
        );

        SessionId(id)
    }

    pub fn lookup(&self, id: &str) -> Option<User> {
        let mut inner = self.inner.lock();
        match inner.get(id) {
            Some(e) if e.expires_at > Instant::now() => Some(e.user.clone()),
            Some(_) => {
                inner.remove(id);
                None
            }
            None => None,
        }
    }

    pub fn revoke(&self, id: &str) {
        self.inner.lock().remove(id);
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
