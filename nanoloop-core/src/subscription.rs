//! Topic prefix filters for SUB sockets.

use bytes::Bytes;

/// A subscription entry with topic prefix
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Topic prefix (empty = subscribe to all)
    pub prefix: Bytes,
}

impl Subscription {
    #[must_use]
    pub const fn new(prefix: Bytes) -> Self {
        Self { prefix }
    }

    /// Check if this subscription matches a given message
    #[must_use]
    pub fn matches(&self, msg: &[u8]) -> bool {
        msg.starts_with(&self.prefix)
    }
}

/// Set of prefix subscriptions.
///
/// Linear scan; subscriber tables stay small.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionSet {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            subscriptions: Vec::new(),
        }
    }

    /// Add a subscription. Duplicates are ignored.
    pub fn subscribe(&mut self, prefix: Bytes) {
        if !self.subscriptions.iter().any(|s| s.prefix == prefix) {
            self.subscriptions.push(Subscription::new(prefix));
        }
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&mut self, prefix: &[u8]) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.prefix != prefix);
        before != self.subscriptions.len()
    }

    /// Check if a message should be delivered.
    ///
    /// No subscriptions means nothing is delivered.
    #[must_use]
    pub fn matches(&self, msg: &[u8]) -> bool {
        self.subscriptions.iter().any(|s| s.matches(msg))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }
}
