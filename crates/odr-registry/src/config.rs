use std::sync::Arc;

use odr_port::SessionFactory;

const DEFAULT_PREFETCH_PRIORITY: f32 = 0.5;

/// Construction-time configuration for [`crate::ResourceRegistry`].
///
/// The embedding application builds one of these at startup and hands it
/// to the registry; there is no ambient global configuration.
#[derive(Clone, Default)]
pub struct RegistryConfig {
    /// Platform session factory. Leaving this unset puts the registry in
    /// degraded mode: records are backed by a no-op session and every
    /// operation fails with a configuration error instead of downloading.
    pub factory: Option<Arc<dyn SessionFactory>>,
    /// Priority fraction forwarded to the port for prefetch downloads.
    pub prefetch_priority: Option<f32>,
}

impl RegistryConfig {
    pub fn new(factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            factory: Some(factory),
            prefetch_priority: None,
        }
    }

    /// Overlay tuning knobs from the environment
    /// (`ODR_PREFETCH_PRIORITY`, clamped to [0, 1]).
    pub fn from_env(mut self) -> Self {
        if let Some(value) = std::env::var("ODR_PREFETCH_PRIORITY")
            .ok()
            .and_then(|s| s.parse::<f32>().ok())
        {
            self.prefetch_priority = Some(value.clamp(0.0, 1.0));
        }
        self
    }

    pub(crate) fn prefetch_fraction(&self) -> f32 {
        self.prefetch_priority.unwrap_or(DEFAULT_PREFETCH_PRIORITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    struct EnvGuard {
        _lock: MutexGuard<'static, ()>,
        saved: Option<String>,
    }

    fn guard() -> EnvGuard {
        let lk = ENV_LOCK.get_or_init(|| Mutex::new(()));
        EnvGuard {
            _lock: lk.lock().expect("env lock"),
            saved: std::env::var("ODR_PREFETCH_PRIORITY").ok(),
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match self.saved.take() {
                Some(v) => std::env::set_var("ODR_PREFETCH_PRIORITY", v),
                None => std::env::remove_var("ODR_PREFETCH_PRIORITY"),
            }
        }
    }

    #[test]
    fn env_overlay_clamps_priority() {
        let _guard = guard();
        std::env::set_var("ODR_PREFETCH_PRIORITY", "0.25");
        assert_eq!(
            RegistryConfig::default().from_env().prefetch_fraction(),
            0.25
        );
        std::env::set_var("ODR_PREFETCH_PRIORITY", "7.5");
        assert_eq!(RegistryConfig::default().from_env().prefetch_fraction(), 1.0);
    }

    #[test]
    fn invalid_env_value_keeps_default() {
        let _guard = guard();
        std::env::set_var("ODR_PREFETCH_PRIORITY", "fast");
        assert_eq!(RegistryConfig::default().from_env().prefetch_fraction(), 0.5);
        std::env::remove_var("ODR_PREFETCH_PRIORITY");
        assert_eq!(RegistryConfig::default().from_env().prefetch_fraction(), 0.5);
    }
}
