//! Thin wrapper around systemd sd_notify integration.
//!
//! All methods are no-ops when disabled or on non-Linux platforms, which
//! keeps the control loop free of `#[cfg]` conditionals.

#[derive(Debug, Clone, Copy)]
pub(crate) struct SystemdNotifier {
    enabled: bool,
}

impl SystemdNotifier {
    pub(crate) fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub(crate) fn disabled() -> Self {
        Self::new(false)
    }

    /// `READY=1`: the loop owns the instance lock.
    pub(crate) fn notify_ready(&self) {
        self.send(Message::Ready);
    }

    /// `STOPPING=1`: shutdown has begun.
    pub(crate) fn notify_stopping(&self) {
        self.send(Message::Stopping);
    }

    /// `STATUS=<msg>` followed by a `WATCHDOG=1` keepalive, sent once per round.
    pub(crate) fn notify_round(&self, msg: &str) {
        self.send(Message::Status(msg));
        self.send(Message::Watchdog);
    }

    fn send(&self, message: Message<'_>) {
        if !self.enabled {
            return;
        }
        message.deliver();
    }
}

#[derive(Debug, Clone, Copy)]
enum Message<'a> {
    Ready,
    Stopping,
    Status(&'a str),
    Watchdog,
}

impl Message<'_> {
    #[cfg(target_os = "linux")]
    fn deliver(self) {
        let state = match self {
            Message::Ready => sd_notify::NotifyState::Ready,
            Message::Stopping => sd_notify::NotifyState::Stopping,
            Message::Status(msg) => sd_notify::NotifyState::Status(msg),
            Message::Watchdog => sd_notify::NotifyState::Watchdog,
        };
        if let Err(e) = sd_notify::notify(false, &[state]) {
            tracing::debug!(error = %e, message = ?self, "sd_notify failed");
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn deliver(self) {}
}
