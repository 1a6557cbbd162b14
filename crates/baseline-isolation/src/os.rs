//! Operating-system applicability gate.
//!
//! Strategies that shell out to platform tools declare the OS families they
//! support. The host is classified from the upper-cased first token of its
//! platform string (`LINUX`, `DARWIN`, `WINDOWS`); anything else is
//! [`OsFamily::Other`].

use std::fmt;

/// Operating-system family of the host running the suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsFamily {
    /// Linux kernels.
    Linux,
    /// macOS and other Darwin kernels.
    Darwin,
    /// Microsoft Windows.
    Windows,
    /// Any platform not listed above.
    Other,
}

impl OsFamily {
    /// Classifies a platform string such as `Linux ci-host 6.1.0 x86_64`.
    #[must_use]
    pub fn from_host_string(host: &str) -> Self {
        let token = host
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        match token.as_str() {
            "LINUX" => Self::Linux,
            "DARWIN" => Self::Darwin,
            "WINDOWS" => Self::Windows,
            _ => Self::Other,
        }
    }

    /// Resolves the host family, preferring `host_override` when set.
    #[must_use]
    pub fn resolve(host_override: Option<&str>) -> Self {
        host_override.map_or_else(Self::detect, Self::from_host_string)
    }

    /// Detects the family of the running host.
    #[must_use]
    pub fn detect() -> Self {
        Self::from_host_string(&host_string())
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Linux => "LINUX",
            Self::Darwin => "DARWIN",
            Self::Windows => "WINDOWS",
            Self::Other => "OTHER",
        };
        f.write_str(label)
    }
}

/// Returns the platform string of the running host.
#[cfg(unix)]
#[must_use]
pub fn host_string() -> String {
    nix::sys::utsname::uname().map_or_else(
        |_| String::from(std::env::consts::OS),
        |uts| {
            format!(
                "{} {} {}",
                uts.sysname().to_string_lossy(),
                uts.release().to_string_lossy(),
                uts.machine().to_string_lossy()
            )
        },
    )
}

/// Returns the platform string of the running host.
#[cfg(windows)]
#[must_use]
pub fn host_string() -> String {
    String::from("WINDOWS")
}

/// Returns the platform string of the running host.
#[cfg(not(any(unix, windows)))]
#[must_use]
pub fn host_string() -> String {
    String::from(std::env::consts::OS)
}

/// Returns whether `os` is one of the `supported` families.
#[must_use]
pub fn is_supported(os: OsFamily, supported: &[OsFamily]) -> bool {
    supported.contains(&os)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Linux ci-host 6.1.0 x86_64", OsFamily::Linux)]
    #[case("LINUX x86_64", OsFamily::Linux)]
    #[case("Darwin mac.local 23.1.0", OsFamily::Darwin)]
    #[case("WINDOWS", OsFamily::Windows)]
    #[case("Windows NT BUILD 19045", OsFamily::Windows)]
    #[case("FreeBSD 14.0", OsFamily::Other)]
    #[case("", OsFamily::Other)]
    fn classifies_host_strings(#[case] host: &str, #[case] expected: OsFamily) {
        assert_eq!(OsFamily::from_host_string(host), expected);
    }

    #[rstest]
    #[case(OsFamily::Linux, true)]
    #[case(OsFamily::Darwin, true)]
    #[case(OsFamily::Windows, false)]
    #[case(OsFamily::Other, false)]
    fn unix_only_gate(#[case] os: OsFamily, #[case] expected: bool) {
        assert_eq!(
            is_supported(os, &[OsFamily::Linux, OsFamily::Darwin]),
            expected
        );
    }

    #[rstest]
    fn override_takes_precedence() {
        assert_eq!(OsFamily::resolve(Some("WINDOWS")), OsFamily::Windows);
    }

    #[cfg(target_os = "linux")]
    #[rstest]
    fn detects_linux_host() {
        assert_eq!(OsFamily::detect(), OsFamily::Linux);
    }
}
