use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatingSystem {
    Windows,
    Osx,
    Linux,
    Unknown,
}

impl OperatingSystem {
    pub fn current() -> Self {
        match std::env::consts::OS {
            "windows" => OperatingSystem::Windows,
            "macos" => OperatingSystem::Osx,
            "linux" => OperatingSystem::Linux,
            _ => OperatingSystem::Unknown,
        }
    }

    /// Name used by version manifests (`rules[].os.name`, `natives` keys).
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatingSystem::Windows => "windows",
            OperatingSystem::Osx => "osx",
            OperatingSystem::Linux => "linux",
            OperatingSystem::Unknown => "unknown",
        }
    }

    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "windows" => OperatingSystem::Windows,
            "osx" | "macos" => OperatingSystem::Osx,
            "linux" => OperatingSystem::Linux,
            _ => OperatingSystem::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86,
    X86_64,
    Arm32,
    Arm64,
    Unknown,
}

impl Arch {
    pub fn current() -> Self {
        match std::env::consts::ARCH {
            "x86" => Arch::X86,
            "x86_64" => Arch::X86_64,
            "arm" => Arch::Arm32,
            "aarch64" => Arch::Arm64,
            _ => Arch::Unknown,
        }
    }

    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "x86" | "i386" | "i686" => Arch::X86,
            "x86_64" | "x64" | "amd64" => Arch::X86_64,
            "arm" | "arm32" => Arch::Arm32,
            "arm64" | "aarch64" => Arch::Arm64,
            _ => Arch::Unknown,
        }
    }

    /// Value substituted for `${arch}` in native classifiers.
    pub fn bits(&self) -> &'static str {
        match self {
            Arch::X86 | Arch::Arm32 => "32",
            _ => "64",
        }
    }
}

/// The environment rules are evaluated against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: OperatingSystem,
    pub arch: Arch,
    pub os_version: String,
}

static CURRENT_PLATFORM: Lazy<Platform> = Lazy::new(|| {
    let os = OperatingSystem::current();
    // Linux reports the distribution release as its OS version; rules are
    // written against the kernel, like the JVM's `os.version`.
    let raw = match os {
        OperatingSystem::Linux => sysinfo::System::kernel_version(),
        _ => sysinfo::System::os_version(),
    };
    Platform {
        os,
        arch: Arch::current(),
        os_version: normalize_os_version(&raw.unwrap_or_default()),
    }
});

static VERSION_NUMBER: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(\d+)(?:\.(\d+))?").ok());

/// Reduce a host version string to the `major.minor` form manifest rules
/// match against: `10 (19045)` becomes `10.0`, `14.2.1` becomes `14.2`.
pub(crate) fn normalize_os_version(raw: &str) -> String {
    let Some(captures) = VERSION_NUMBER.as_ref().and_then(|re| re.captures(raw)) else {
        return raw.trim().to_string();
    };
    let major = captures.get(1).map_or("", |m| m.as_str());
    let minor = captures.get(2).map_or("0", |m| m.as_str());
    format!("{}.{}", major, minor)
}

impl Platform {
    pub fn new(os: OperatingSystem, arch: Arch, os_version: impl Into<String>) -> Self {
        Self {
            os,
            arch,
            os_version: os_version.into(),
        }
    }

    /// The host platform, detected once per process.
    pub fn current() -> &'static Platform {
        &CURRENT_PLATFORM
    }
}

/// Launcher feature flags referenced by `rules[].features`. Flags that were
/// never set read as false.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Features {
    flags: BTreeMap<String, bool>,
}

impl Features {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, enabled: bool) -> Self {
        self.flags.insert(name.into(), enabled);
        self
    }

    pub fn get(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Disallow,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsRestriction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Regular expression matched against the OS version string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
}

impl OsRestriction {
    fn matches(&self, platform: &Platform) -> bool {
        if let Some(name) = &self.name {
            if OperatingSystem::parse(name) != platform.os {
                return false;
            }
        }
        if let Some(arch) = &self.arch {
            if Arch::parse(arch) != platform.arch {
                return false;
            }
        }
        if let Some(expr) = &self.version {
            match Regex::new(expr) {
                Ok(re) => {
                    if !re.is_match(&platform.os_version) {
                        return false;
                    }
                }
                Err(e) => {
                    log::debug!("Ignoring rule with invalid OS version pattern {}: {}", expr, e);
                    return false;
                }
            }
        }
        true
    }
}

/// One entry of a manifest `rules` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityRule {
    pub action: RuleAction,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<OsRestriction>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<BTreeMap<String, bool>>,
}

impl CompatibilityRule {
    pub fn allow() -> Self {
        Self {
            action: RuleAction::Allow,
            os: None,
            features: None,
        }
    }

    pub fn disallow() -> Self {
        Self {
            action: RuleAction::Disallow,
            ..Self::allow()
        }
    }

    pub fn on_os(mut self, os: OsRestriction) -> Self {
        self.os = Some(os);
        self
    }

    pub fn when_feature(mut self, name: impl Into<String>, enabled: bool) -> Self {
        self.features
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), enabled);
        self
    }

    /// The rule's action if it applies to the environment, `None` otherwise.
    pub fn action_for(&self, platform: &Platform, features: &Features) -> Option<RuleAction> {
        if let Some(os) = &self.os {
            if !os.matches(platform) {
                return None;
            }
        }
        if let Some(required) = &self.features {
            if required.iter().any(|(name, value)| features.get(name) != *value) {
                return None;
            }
        }
        Some(self.action)
    }

    /// Combined verdict of a rule list: the last applicable rule wins, and
    /// when none applies the verdict is `Disallow`.
    pub fn evaluate(rules: &[CompatibilityRule], platform: &Platform, features: &Features) -> RuleAction {
        rules
            .iter()
            .filter_map(|rule| rule.action_for(platform, features))
            .last()
            .unwrap_or(RuleAction::Disallow)
    }

    /// Whether an optional rule list admits the environment. An absent list
    /// admits everything; a present one goes through [`evaluate`](Self::evaluate).
    pub fn applies(rules: Option<&[CompatibilityRule]>, platform: &Platform, features: &Features) -> bool {
        match rules {
            None => true,
            Some(rules) => Self::evaluate(rules, platform, features) == RuleAction::Allow,
        }
    }

    pub fn applies_to_current_environment(rules: Option<&[CompatibilityRule]>, features: &Features) -> bool {
        Self::applies(rules, Platform::current(), features)
    }
}
