//! Detectable game entity
//!
//! An entry of the platform's detectable-applications list, mapping
//! executable signatures to an application identity.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::value_objects::Snowflake;

/// Operating system an executable signature applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "linux")]
    Linux,
    #[serde(rename = "win32")]
    Windows,
    #[serde(rename = "darwin")]
    MacOs,
}

impl Platform {
    /// Platform this binary was built for, if game detection supports it
    #[must_use]
    pub const fn current() -> Option<Self> {
        if cfg!(target_os = "linux") {
            Some(Self::Linux)
        } else if cfg!(target_os = "windows") {
            Some(Self::Windows)
        } else if cfg!(target_os = "macos") {
            Some(Self::MacOs)
        } else {
            None
        }
    }

    /// Whether executables listed for `executable_platform` can run on this platform.
    ///
    /// Linux also runs Windows executables through Wine/Proton.
    #[must_use]
    pub const fn runs(self, executable_platform: Platform) -> bool {
        match self {
            Self::Linux => matches!(executable_platform, Self::Linux | Self::Windows),
            Self::Windows => matches!(executable_platform, Self::Windows),
            Self::MacOs => matches!(executable_platform, Self::MacOs),
        }
    }

    /// Wire name used by the detectable-applications list
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Windows => "win32",
            Self::MacOs => "darwin",
        }
    }

    /// Parse a wire name
    #[must_use]
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "linux" => Some(Self::Linux),
            "win32" => Some(Self::Windows),
            "darwin" => Some(Self::MacOs),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized executable signature
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Executable {
    pub platform: Platform,
    /// Lowercase, `/`-separated, no leading separator
    pub name: String,
}

impl Executable {
    /// Create a signature, normalizing the name
    #[must_use]
    pub fn new(platform: Platform, name: &str) -> Self {
        Self {
            platform,
            name: Self::normalize(name),
        }
    }

    /// Normalize an executable name or path fragment for exact comparison
    #[must_use]
    pub fn normalize(name: &str) -> String {
        name.trim()
            .replace('\\', "/")
            .trim_start_matches('/')
            .to_lowercase()
    }
}

/// A game the detector can recognize
///
/// Immutable once loaded; the game database swaps whole sets on refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectableGame {
    pub id: Snowflake,
    pub name: String,
    #[serde(default)]
    pub executables: Vec<Executable>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl DetectableGame {
    /// Create a game without any executables
    #[must_use]
    pub fn new(id: Snowflake, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            executables: Vec::new(),
            aliases: Vec::new(),
        }
    }

    /// Add an executable signature (duplicates are ignored)
    #[must_use]
    pub fn with_executable(mut self, platform: Platform, name: &str) -> Self {
        let executable = Executable::new(platform, name);
        if !executable.name.is_empty() && !self.executables.contains(&executable) {
            self.executables.push(executable);
        }
        self
    }

    /// Add an alternative display name
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Executable signatures that can run on `platform`
    pub fn executables_for(&self, platform: Platform) -> impl Iterator<Item = &Executable> {
        self.executables
            .iter()
            .filter(move |exe| platform.runs(exe.platform))
    }
}
