use crate::domain::{Notification, NotificationId};
use futures::{future::RemoteHandle, FutureExt};
use parking_lot::Mutex;
use std::{
    io::{self, Write},
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::time;
use tracing::trace;

/// How long a raised alert stays on screen before it starts dismissing.
pub const VISIBLE_FOR: Duration = Duration::from_secs(5);
/// The dismiss transition; the slot frees up once it completes.
pub const DISMISS_AFTER: Duration = Duration::from_millis(300);

/// Where raised alerts become visible. The notifier renders to the
/// terminal; tests record every call.
pub trait Presenter: Send + 'static {
    fn show(&mut self, notification: &Notification);
    fn play_sound(&mut self);
    fn begin_dismiss(&mut self, id: NotificationId);
    fn clear(&mut self, id: NotificationId);
}

/// Single-slot alert presentation: at most one alert is ever visible, and
/// a newly raised one replaces whatever is on screen. Surfacing only the
/// newest event is the point; the history page has the rest.
pub struct Slot<P: Presenter> {
    inner: Arc<Mutex<Inner<P>>>,
}

impl<P: Presenter> Clone for Slot<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<P> {
    presenter: P,
    visible: Option<NotificationId>,
    // Dropping the handle cancels the pending dismiss timers.
    dismiss: Option<RemoteHandle<()>>,
    shut_down: bool,
}

impl<P: Presenter> Slot<P> {
    pub fn new(presenter: P) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                presenter,
                visible: None,
                dismiss: None,
                shut_down: false,
            })),
        }
    }

    /// Shows the alert, plays the sound cue once, and schedules the
    /// auto-dismiss. Replaces any alert already on screen.
    pub fn raise(&self, notification: Notification) {
        let mut inner = self.inner.lock();
        if inner.shut_down {
            return;
        }

        if let Some(prev) = inner.visible.take() {
            trace!(replaced = prev.0, "Replacing a visible alert");
            inner.presenter.clear(prev);
        }
        inner.dismiss = None;

        inner.presenter.show(&notification);
        inner.presenter.play_sound();

        let id = notification.id;
        inner.visible = Some(id);

        // The timer task holds only a weak reference; a torn-down slot
        // cannot be re-entered by a stale timer.
        let weak = Arc::downgrade(&self.inner);
        let (work, handle) = dismiss_later(weak, id).remote_handle();
        tokio::spawn(work);
        inner.dismiss = Some(handle);
    }

    /// Cancels the pending dismiss timer and empties the slot. Nothing is
    /// presented after this.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        inner.shut_down = true;
        inner.dismiss = None;
        if let Some(prev) = inner.visible.take() {
            inner.presenter.clear(prev);
        }
    }
}

async fn dismiss_later<P: Presenter>(slot: Weak<Mutex<Inner<P>>>, id: NotificationId) {
    time::sleep(VISIBLE_FOR).await;

    match slot.upgrade() {
        Some(inner) => {
            let mut inner = inner.lock();
            if inner.visible == Some(id) {
                inner.presenter.begin_dismiss(id);
            } else {
                return;
            }
        }
        None => return,
    }

    time::sleep(DISMISS_AFTER).await;

    if let Some(inner) = slot.upgrade() {
        let mut inner = inner.lock();
        if inner.visible == Some(id) {
            inner.visible = None;
            inner.presenter.clear(id);
        }
    }
}

/// Renders alerts as terminal output with the bell character standing in
/// for the sound cue.
#[derive(Debug, Default)]
pub struct ConsolePresenter;

impl ConsolePresenter {
    pub fn new() -> Self {
        Self
    }
}

impl Presenter for ConsolePresenter {
    fn show(&mut self, notification: &Notification) {
        println!(
            "\n== {} ==\n   {}\n   [{}] {}",
            notification.title,
            notification.message,
            notification.event.as_str(),
            notification.created_at.to_rfc3339(),
        );
    }

    fn play_sound(&mut self) {
        print!("\x07");
        let _ = io::stdout().flush();
    }

    fn begin_dismiss(&mut self, _id: NotificationId) {
        // A terminal line cannot fade out.
    }

    fn clear(&mut self, _id: NotificationId) {
        // Nor can it be unshown.
    }
}
