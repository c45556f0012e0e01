use super::rules::{CompatibilityRule, Features, OsRestriction, Platform};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Argument value can be a single string or array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgumentValue {
    Single(String),
    Multiple(Vec<String>),
}

impl ArgumentValue {
    fn values(&self) -> Vec<&str> {
        match self {
            ArgumentValue::Single(value) => vec![value.as_str()],
            ArgumentValue::Multiple(values) => values.iter().map(String::as_str).collect(),
        }
    }
}

/// Argument that can be plain or guarded by rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Argument {
    Plain(String),
    Conditional {
        rules: Vec<CompatibilityRule>,
        value: ArgumentValue,
    },
}

impl Argument {
    pub fn plain(value: impl Into<String>) -> Self {
        Argument::Plain(value.into())
    }

    fn expand(&self, platform: &Platform, features: &Features, vars: &HashMap<String, String>) -> Vec<String> {
        match self {
            Argument::Plain(value) => vec![substitute(value, vars)],
            Argument::Conditional { rules, value } => {
                if CompatibilityRule::applies(Some(rules), platform, features) {
                    value.values().into_iter().map(|v| substitute(v, vars)).collect()
                } else {
                    Vec::new()
                }
            }
        }
    }

    fn is_plain(&self, text: &str) -> bool {
        matches!(self, Argument::Plain(value) if value == text)
    }
}

/// Modern (1.13+) `arguments` block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arguments {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub game: Vec<Argument>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jvm: Vec<Argument>,
}

/// JVM arguments used for versions that predate the `arguments` block.
pub static DEFAULT_JVM_ARGUMENTS: Lazy<Vec<Argument>> = Lazy::new(|| {
    let on = |name: &str| OsRestriction {
        name: Some(name.to_string()),
        ..Default::default()
    };
    vec![
        Argument::Conditional {
            rules: vec![CompatibilityRule::allow().on_os(on("osx"))],
            value: ArgumentValue::Single("-XstartOnFirstThread".to_string()),
        },
        Argument::Conditional {
            rules: vec![CompatibilityRule::allow().on_os(on("windows"))],
            value: ArgumentValue::Single(
                "-XX:HeapDumpPath=MojangTricksIntelDriversForPerformance_javaw.exe_minecraft.exe.heapdump"
                    .to_string(),
            ),
        },
        Argument::Conditional {
            rules: vec![CompatibilityRule::allow().on_os(OsRestriction {
                version: Some("^10\\.".to_string()),
                ..on("windows")
            })],
            value: ArgumentValue::Multiple(vec![
                "-Dos.name=Windows 10".to_string(),
                "-Dos.version=10.0".to_string(),
            ]),
        },
        Argument::plain("-Djava.library.path=${natives_directory}"),
        Argument::plain("-Dminecraft.launcher.brand=${launcher_name}"),
        Argument::plain("-Dminecraft.launcher.version=${launcher_version}"),
        Argument::plain("-cp"),
        Argument::plain("${classpath}"),
    ]
});

impl Arguments {
    /// Build a game argument list from a legacy `minecraftArguments` string.
    pub fn from_legacy(minecraft_arguments: &str) -> Self {
        Self {
            game: split_preserving_quotes(minecraft_arguments)
                .into_iter()
                .map(Argument::Plain)
                .collect(),
            jvm: Vec::new(),
        }
    }

    /// Concatenate child-first, like inherited libraries: the child's
    /// arguments come before the parent's. Nothing is deduplicated.
    pub fn merge(parent: Option<&Arguments>, child: Option<&Arguments>) -> Option<Arguments> {
        match (parent, child) {
            (None, None) => None,
            (Some(only), None) | (None, Some(only)) => Some(only.clone()),
            (Some(parent), Some(child)) => Some(Arguments {
                game: child.game.iter().chain(&parent.game).cloned().collect(),
                jvm: child.jvm.iter().chain(&parent.jvm).cloned().collect(),
            }),
        }
    }

    /// Append `--tweakClass <class>` unless the same tweaker is already listed.
    pub fn add_tweak_class(&mut self, class: &str) {
        if has_tweak_class(&self.game, class) {
            return;
        }
        self.game.push(Argument::plain("--tweakClass"));
        self.game.push(Argument::plain(class));
    }

    pub fn resolve_game(&self, platform: &Platform, features: &Features, vars: &HashMap<String, String>) -> Vec<String> {
        expand_all(&self.game, platform, features, vars)
    }

    pub fn resolve_jvm(&self, platform: &Platform, features: &Features, vars: &HashMap<String, String>) -> Vec<String> {
        expand_all(&self.jvm, platform, features, vars)
    }
}

fn has_tweak_class(arguments: &[Argument], class: &str) -> bool {
    arguments
        .windows(2)
        .any(|pair| pair[0].is_plain("--tweakClass") && pair[1].is_plain(class))
}

pub(crate) fn expand_all(
    arguments: &[Argument],
    platform: &Platform,
    features: &Features,
    vars: &HashMap<String, String>,
) -> Vec<String> {
    arguments
        .iter()
        .flat_map(|argument| argument.expand(platform, features, vars))
        .collect()
}

/// Replace `${name}` placeholders with values from `variables`. Unknown
/// placeholders are left untouched.
pub fn substitute(text: &str, variables: &HashMap<String, String>) -> String {
    let mut result = text.to_string();
    for (key, value) in variables {
        let placeholder = format!("${{{}}}", key);
        result = result.replace(&placeholder, value);
    }
    result
}

/// Whitespace split that keeps single- or double-quoted runs together.
pub(crate) fn split_preserving_quotes(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut buf = String::new();
    let mut in_double = false;
    let mut in_single = false;

    for c in s.chars() {
        match c {
            '"' if !in_single => in_double = !in_double,
            '\'' if !in_double => in_single = !in_single,
            c if c.is_whitespace() && !in_double && !in_single => {
                if !buf.is_empty() {
                    out.push(std::mem::take(&mut buf));
                }
            }
            c => buf.push(c),
        }
    }
    if !buf.is_empty() {
        out.push(buf);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::version::rules::{Arch, OperatingSystem};

    fn vars() -> HashMap<String, String> {
        HashMap::from([
            ("auth_player_name".to_string(), "Steve".to_string()),
            ("natives_directory".to_string(), "/tmp/natives".to_string()),
            ("classpath".to_string(), "a.jar:b.jar".to_string()),
        ])
    }

    #[test]
    fn legacy_arguments_split_on_whitespace() {
        let args = Arguments::from_legacy("--username ${auth_player_name}  --title \"My Game\"");
        assert_eq!(
            args.game,
            vec![
                Argument::plain("--username"),
                Argument::plain("${auth_player_name}"),
                Argument::plain("--title"),
                Argument::plain("My Game"),
            ]
        );
    }

    #[test]
    fn merge_puts_child_first() {
        let parent = Arguments {
            game: vec![Argument::plain("--username")],
            jvm: vec![Argument::plain("-Xss1M")],
        };
        let child = Arguments {
            game: vec![Argument::plain("--tweakClass")],
            jvm: Vec::new(),
        };
        let merged = Arguments::merge(Some(&parent), Some(&child)).unwrap();
        assert_eq!(merged.game, vec![Argument::plain("--tweakClass"), Argument::plain("--username")]);
        assert_eq!(merged.jvm, vec![Argument::plain("-Xss1M")]);
        assert_eq!(Arguments::merge(None, None), None);
    }

    #[test]
    fn conditional_arguments_follow_rules() {
        let args = Arguments {
            game: vec![
                Argument::plain("--username"),
                Argument::plain("${auth_player_name}"),
                Argument::Conditional {
                    rules: vec![CompatibilityRule::allow().when_feature("is_demo_user", true)],
                    value: ArgumentValue::Single("--demo".to_string()),
                },
            ],
            jvm: Vec::new(),
        };
        let linux = Platform::new(OperatingSystem::Linux, Arch::X86_64, "6.1");

        assert_eq!(
            args.resolve_game(&linux, &Features::new(), &vars()),
            vec!["--username", "Steve"]
        );
        assert_eq!(
            args.resolve_game(&linux, &Features::new().with("is_demo_user", true), &vars()),
            vec!["--username", "Steve", "--demo"]
        );
    }

    #[test]
    fn default_jvm_arguments_expand_per_platform() {
        let windows = Platform::new(OperatingSystem::Windows, Arch::X86_64, "10.0");
        let expanded = expand_all(&DEFAULT_JVM_ARGUMENTS, &windows, &Features::new(), &vars());
        assert!(expanded.contains(&"-Dos.name=Windows 10".to_string()));
        assert!(expanded.contains(&"-Djava.library.path=/tmp/natives".to_string()));
        assert!(!expanded.contains(&"-XstartOnFirstThread".to_string()));
        assert_eq!(expanded[expanded.len() - 2..], ["-cp".to_string(), "a.jar:b.jar".to_string()]);
    }

    #[test]
    fn tweak_class_is_added_once() {
        let mut args = Arguments::default();
        args.add_tweak_class("optifine.OptiFineTweaker");
        args.add_tweak_class("optifine.OptiFineTweaker");
        assert_eq!(args.game.len(), 2);
    }

    #[test]
    fn unknown_placeholders_are_kept() {
        assert_eq!(substitute("${version_name}", &vars()), "${version_name}");
    }
}
