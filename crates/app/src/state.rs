/// Steps of [`crate::Application::start`], in order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum StartupPhase {
    #[default]
    Uninitialized,
    ConfigLoading,
    MagdaConfig,
    PlainConfig,
    ParametersApplied,
    CorsProxyInitialized,
    ShareServiceInitialized,
    PersistedSettingsLoaded,
    Ready,
}

impl StartupPhase {
    pub fn is_ready(self) -> bool {
        self == StartupPhase::Ready
    }
}
