//! Recording options chosen when a tape is opened.

/// Which values a tape tracks without an explicit `watch` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum WatchPolicy {
    /// Variables are watched as soon as an operation reads them.
    #[default]
    Auto,
    /// Only values passed to `watch` are tracked.
    Manual,
}

/// Options for a recording interval.
///
/// The default is a non-persistent tape with [`WatchPolicy::Auto`].
///
/// # Example
///
/// ```
/// use gradtape::autodiff::{TapeOptions, WatchPolicy};
///
/// let opts = TapeOptions::new()
///     .with_persistent(true)
///     .with_watch_policy(WatchPolicy::Manual);
/// assert!(opts.persistent);
/// assert_eq!(opts.watch_policy, WatchPolicy::Manual);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TapeOptions {
    /// Keep recorded nodes after the first gradient query.
    pub persistent: bool,
    /// Watch policy for variables.
    pub watch_policy: WatchPolicy,
}

impl TapeOptions {
    /// Default options: non-persistent, auto-watch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Persistent tape with auto-watch.
    pub fn persistent_tape() -> Self {
        Self::new().with_persistent(true)
    }

    /// Set persistence.
    pub fn with_persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    /// Set the watch policy.
    pub fn with_watch_policy(mut self, watch_policy: WatchPolicy) -> Self {
        self.watch_policy = watch_policy;
        self
    }
}
