/// Handle returned by `on`. Calling [`unsubscribe`](Self::unsubscribe) is equivalent to `off`
/// with the same channel and listener. Dropping it leaves the listener registered.
pub struct Unsubscribe {
    channel: &'static str,
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Unsubscribe {
    pub(crate) fn new(channel: &'static str, remove: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            channel,
            remove: Some(Box::new(remove)),
        }
    }

    pub fn channel(&self) -> &'static str {
        self.channel
    }

    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }

    /// Tie the registration to a scope: the listener is removed when the guard drops.
    pub fn into_guard(self) -> ListenerGuard {
        ListenerGuard { inner: self }
    }
}

impl std::fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("channel", &self.channel)
            .finish()
    }
}

/// Removes its listener on drop. Mirrors a UI component's mount lifetime.
#[must_use = "the listener is removed as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ListenerGuard {
    inner: Unsubscribe,
}

impl ListenerGuard {
    pub fn channel(&self) -> &'static str {
        self.inner.channel
    }

    /// Keep the listener registered past the guard's lifetime.
    pub fn detach(mut self) -> Unsubscribe {
        Unsubscribe {
            channel: self.inner.channel,
            remove: self.inner.remove.take(),
        }
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(remove) = self.inner.remove.take() {
            remove();
        }
    }
}
