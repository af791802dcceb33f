//! Host platform/arch detection, matching the `{platform}/{arch}` segments
//! the registry uses to key tarball URLs.

use std::fmt;

/// All platforms the registry publishes tarballs for.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Platform {
    Darwin,
    Linux,
    Windows,
}

impl Platform {
    pub fn current() -> Result<Self, crate::RelocationError> {
        let platform = match target_lexicon::HOST.operating_system {
            target_lexicon::OperatingSystem::Darwin | target_lexicon::OperatingSystem::MacOSX { .. } => {
                Platform::Darwin
            }
            target_lexicon::OperatingSystem::Linux => Platform::Linux,
            target_lexicon::OperatingSystem::Windows => Platform::Windows,
            unsupported => {
                return Err(crate::RelocationError::UnsupportedPlatform(format!(
                    "{unsupported:?}"
                )))
            }
        };
        Ok(platform)
    }

    pub fn is_macos(self) -> bool {
        matches!(self, Platform::Darwin)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Platform::Darwin => write!(f, "darwin"),
            Platform::Linux => write!(f, "linux"),
            Platform::Windows => write!(f, "windows"),
        }
    }
}

/// All architectures the registry publishes tarballs for.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Arch {
    X86_64,
    Aarch64,
}

impl Arch {
    pub fn current() -> Result<Self, crate::RelocationError> {
        let arch = match target_lexicon::HOST.architecture {
            target_lexicon::Architecture::X86_64 => Arch::X86_64,
            target_lexicon::Architecture::Aarch64(_) => Arch::Aarch64,
            unsupported => {
                return Err(crate::RelocationError::UnsupportedPlatform(format!(
                    "{unsupported}"
                )))
            }
        };
        Ok(arch)
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Arch::X86_64 => write!(f, "x86-64"),
            Arch::Aarch64 => write!(f, "aarch64"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_matches_registry_segments() {
        assert_eq!(Platform::Darwin.to_string(), "darwin");
        assert_eq!(Platform::Linux.to_string(), "linux");
        assert_eq!(Arch::X86_64.to_string(), "x86-64");
        assert_eq!(Arch::Aarch64.to_string(), "aarch64");
    }

    #[test]
    fn host_detection_does_not_panic() {
        let _ = Platform::current();
        let _ = Arch::current();
    }
}
