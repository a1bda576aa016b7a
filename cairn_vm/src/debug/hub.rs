//! Process-wide debug channel binding.

use super::channel::Channel;
use super::listener::ListenerId;
use super::stats::DebugStats;
use super::suspension::Suspension;
use super::DebugError;
use crate::config::DebugConfig;
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

struct Binding {
    listener: ListenerId,
    channel: Channel<Suspension>,
}

/// Holder of the debug channel.
///
/// At most one listener is bound at a time and every breakpoint sends to the
/// bound channel. Unbinding closes the channel; rebinding creates a fresh one.
pub struct DebugHub {
    binding: Mutex<Option<Binding>>,
    config: DebugConfig,
    stats: DebugStats,
}

impl Default for DebugHub {
    fn default() -> Self {
        Self::new()
    }
}

impl DebugHub {
    /// Create an unbound hub with default settings.
    pub fn new() -> Self {
        Self::with_config(DebugConfig::default())
    }

    /// Create an unbound hub.
    pub fn with_config(config: DebugConfig) -> Self {
        Self {
            binding: Mutex::new(None),
            config,
            stats: DebugStats::new(),
        }
    }

    /// The process-wide hub, configured from the environment on first use.
    pub fn global() -> Arc<DebugHub> {
        static GLOBAL: OnceLock<Arc<DebugHub>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(DebugHub::with_config(DebugConfig::from_env()))))
    }

    /// Protocol settings.
    #[inline]
    pub fn config(&self) -> &DebugConfig {
        &self.config
    }

    /// Protocol counters.
    #[inline]
    pub fn stats(&self) -> &DebugStats {
        &self.stats
    }

    /// Whether a listener is bound.
    pub fn is_bound(&self) -> bool {
        self.binding.lock().is_some()
    }

    /// The bound listener, if any.
    pub fn bound_listener(&self) -> Option<ListenerId> {
        self.binding.lock().as_ref().map(|b| b.listener)
    }

    /// The channel breakpoints send to.
    pub fn debug_channel(&self) -> Result<Channel<Suspension>, DebugError> {
        self.binding
            .lock()
            .as_ref()
            .map(|b| b.channel.clone())
            .ok_or(DebugError::NoListener)
    }

    /// The channel, provided `listener` is the one bound.
    pub(crate) fn channel_for(&self, listener: ListenerId) -> Result<Channel<Suspension>, DebugError> {
        match self.binding.lock().as_ref() {
            Some(b) if b.listener == listener => Ok(b.channel.clone()),
            _ => Err(DebugError::NoListener),
        }
    }

    pub(crate) fn bind(&self, listener: ListenerId) -> Result<(), DebugError> {
        let mut binding = self.binding.lock();
        if binding.is_some() {
            return Err(DebugError::AlreadyRegistered);
        }
        *binding = Some(Binding {
            listener,
            channel: Channel::new(),
        });
        debug!(%listener, "debug listener bound");
        Ok(())
    }

    /// Tear down the binding if `listener` holds it.
    ///
    /// A suspension still sitting in the channel is dropped, which releases
    /// its task with [`DebugError::ChannelClosed`].
    pub(crate) fn unbind(&self, listener: ListenerId) -> bool {
        let binding = {
            let mut guard = self.binding.lock();
            match guard.as_ref() {
                Some(b) if b.listener == listener => guard.take(),
                _ => None,
            }
        };
        let Some(binding) = binding else {
            return false;
        };
        if let Some(pending) = binding.channel.close_and_drain() {
            warn!(
                task = %pending.task(),
                suspension = %pending.id(),
                "dropping undelivered breakpoint on listener teardown"
            );
        }
        debug!(%listener, "debug listener unbound");
        true
    }
}

impl std::fmt::Debug for DebugHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugHub")
            .field("listener", &self.bound_listener())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbound_hub_has_no_channel() {
        let hub = DebugHub::new();
        assert!(!hub.is_bound());
        assert_eq!(hub.debug_channel().unwrap_err(), DebugError::NoListener);
    }

    #[test]
    fn test_bind_is_exclusive() {
        let hub = DebugHub::new();
        let a = ListenerId::next();
        let b = ListenerId::next();
        hub.bind(a).unwrap();
        assert_eq!(hub.bind(b), Err(DebugError::AlreadyRegistered));
        assert_eq!(hub.bind(a), Err(DebugError::AlreadyRegistered));
        assert_eq!(hub.bound_listener(), Some(a));
    }

    #[test]
    fn test_unbind_only_by_owner() {
        let hub = DebugHub::new();
        let a = ListenerId::next();
        hub.bind(a).unwrap();
        assert!(!hub.unbind(ListenerId::next()));
        assert!(hub.is_bound());
        assert!(hub.unbind(a));
        assert!(!hub.is_bound());
        assert!(!hub.unbind(a));
    }

    #[test]
    fn test_unbind_closes_channel_and_rebind_is_fresh() {
        let hub = DebugHub::new();
        let a = ListenerId::next();
        hub.bind(a).unwrap();
        let old = hub.debug_channel().unwrap();
        hub.unbind(a);
        assert!(old.is_closed());

        let b = ListenerId::next();
        hub.bind(b).unwrap();
        let new = hub.debug_channel().unwrap();
        assert!(!new.is_closed());
        assert!(!new.same_channel(&old));
        assert_eq!(hub.channel_for(a).unwrap_err(), DebugError::NoListener);
        assert!(hub.channel_for(b).is_ok());
    }

    #[test]
    fn test_global_is_shared() {
        assert!(Arc::ptr_eq(&DebugHub::global(), &DebugHub::global()));
    }
}
