/// Upper bound on recorded toasts; visible persistent ones are never dropped.
pub const TOAST_HISTORY_LIMIT: usize = 20;

/// A notification shown over the host page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToastEntry {
    pub id: u64,
    pub message: String,
    pub ok: bool,
    /// Stays up until dismissed instead of fading out.
    pub persistent: bool,
    pub dismissed: bool,
}

/// Record of toasts raised by the injector, oldest first.
#[derive(Debug, Default)]
pub struct Toasts {
    next_id: u64,
    entries: Vec<ToastEntry>,
}

impl Toasts {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, message: impl Into<String>, ok: bool, persistent: bool) -> u64 {
        self.next_id += 1;
        self.entries.push(ToastEntry {
            id: self.next_id,
            message: message.into(),
            ok,
            persistent,
            dismissed: false,
        });
        self.prune();
        self.next_id
    }

    /// Drops the oldest settled toasts (transient or dismissed) past the limit.
    fn prune(&mut self) {
        let mut excess = self.entries.len().saturating_sub(TOAST_HISTORY_LIMIT);
        if excess == 0 {
            return;
        }
        self.entries.retain(|entry| {
            let settled = !entry.persistent || entry.dismissed;
            if excess > 0 && settled {
                excess -= 1;
                return false;
            }
            true
        });
    }

    pub fn show(&mut self, message: impl Into<String>, ok: bool) -> u64 {
        self.push(message, ok, false)
    }

    pub fn persistent(&mut self, message: impl Into<String>) -> u64 {
        self.push(message, true, true)
    }

    /// Returns false when the toast was unknown or already gone.
    pub fn dismiss(&mut self, id: u64) -> bool {
        match self.entries.iter_mut().find(|entry| entry.id == id) {
            Some(entry) if !entry.dismissed => {
                entry.dismissed = true;
                true
            }
            _ => false,
        }
    }

    pub fn entries(&self) -> &[ToastEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&ToastEntry> {
        self.entries.last()
    }

    /// Persistent toasts still on screen.
    pub fn visible_persistent(&self) -> impl Iterator<Item = &ToastEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.persistent && !entry.dismissed)
    }
}
