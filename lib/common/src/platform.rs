//! Process-wide platform detection.
//!
//! The host platform is resolved lazily on first access and cached for the
//! lifetime of the process. Concurrent first accesses compute it at most once.

use once_cell::sync::Lazy;
use std::fmt;
use tracing::debug;

/// Operating system family the process is running on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Linux,
    Macos,
    Windows,
    FreeBsd,
    Other(&'static str),
}

static PLATFORM: Lazy<Platform> = Lazy::new(|| {
    let platform = Platform::from_os(std::env::consts::OS);
    debug!(%platform, "Detected host platform");
    platform
});

/// Returns the cached host platform.
pub fn platform() -> Platform {
    *PLATFORM
}

impl Platform {
    /// Maps a [`std::env::consts::OS`] identifier to a platform.
    pub fn from_os(os: &'static str) -> Self {
        match os {
            "linux" => Platform::Linux,
            "macos" => Platform::Macos,
            "windows" => Platform::Windows,
            "freebsd" => Platform::FreeBsd,
            other => Platform::Other(other),
        }
    }

    /// Whether system-level samplers are available on this platform.
    pub fn supports_system_sampling(&self) -> bool {
        !matches!(self, Platform::Other(_))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Linux => write!(f, "linux"),
            Platform::Macos => write!(f, "macos"),
            Platform::Windows => write!(f, "windows"),
            Platform::FreeBsd => write!(f, "freebsd"),
            Platform::Other(os) => write!(f, "{}", os),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn maps_known_operating_systems() {
        assert_eq!(Platform::from_os("linux"), Platform::Linux);
        assert_eq!(Platform::from_os("macos"), Platform::Macos);
        assert_eq!(Platform::from_os("windows"), Platform::Windows);
        assert_eq!(Platform::from_os("freebsd"), Platform::FreeBsd);
        assert_eq!(Platform::from_os("haiku"), Platform::Other("haiku"));
    }

    #[test]
    fn unknown_platforms_do_not_support_system_sampling() {
        assert!(Platform::Linux.supports_system_sampling());
        assert!(!Platform::Other("haiku").supports_system_sampling());
    }

    #[test]
    fn concurrent_access_yields_one_value() {
        let handles = (0..8).map(|_| thread::spawn(platform)).collect::<Vec<_>>();
        let seen = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>();

        assert!(seen.iter().all(|p| *p == platform()));
        assert_eq!(platform().to_string(), std::env::consts::OS);
    }
}
