use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::recipe::{regex_escape, CommandRecipe, CopyRecipe};
use crate::rule::Rules;

pub const CONFIG_FILE: &str = "kiln.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default, rename = "rule")]
    pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    #[serde(default)]
    pub default_targets: Vec<String>,
    #[serde(default = "default_shell")]
    pub shell: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default)]
    pub show_fresh: bool,
    #[serde(default = "default_true")]
    pub show_output: bool,
    #[serde(default = "default_true")]
    pub color: bool,
}

/// One `[[rule]]` entry. `pattern` is a regex; `target` is a literal name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy: Option<String>,
}

/// The global file may only override display settings, field by field.
#[derive(Debug, Clone, Default, Deserialize)]
struct GlobalConfig {
    #[serde(default)]
    display: DisplayOverrides,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DisplayOverrides {
    show_fresh: Option<bool>,
    show_output: Option<bool>,
    color: Option<bool>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            default_targets: Vec::new(),
            shell: default_shell(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            show_fresh: false,
            show_output: true,
            color: true,
        }
    }
}

fn default_shell() -> String {
    "sh".to_string()
}

fn default_true() -> bool {
    true
}

impl RuleConfig {
    /// The regex this entry registers under.
    pub fn pattern(&self) -> anyhow::Result<String> {
        match (&self.pattern, &self.target) {
            (Some(pattern), None) => Ok(pattern.clone()),
            (None, Some(target)) => Ok(regex_escape(target)),
            (Some(_), Some(_)) => bail!("rule sets both `pattern` and `target`"),
            (None, None) => bail!("rule needs a `pattern` or a `target`"),
        }
    }
}

impl Config {
    /// Reads `kiln.toml` from `dir`, or `explicit` when given, and applies the
    /// global display overrides.
    pub fn load(dir: &Path, explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path = match explicit {
            Some(path) => Self::expand_path(&path.to_string_lossy()),
            None => dir.join(CONFIG_FILE),
        };

        if !path.exists() {
            bail!(
                "No {} found at {}.\nRun 'kiln init' to create a new configuration.",
                CONFIG_FILE,
                path.display()
            );
        }

        let config = Self::load_from_file(&path)?;
        let global = Self::load_global(&Self::global_path())?;
        Ok(config.merge_with(global))
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn load_global(path: &Path) -> anyhow::Result<GlobalConfig> {
        if !path.exists() {
            return Ok(GlobalConfig::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn merge_with(mut self, global: GlobalConfig) -> Self {
        let overrides = global.display;
        if let Some(show_fresh) = overrides.show_fresh {
            self.display.show_fresh = show_fresh;
        }
        if let Some(show_output) = overrides.show_output {
            self.display.show_output = show_output;
        }
        if let Some(color) = overrides.color {
            self.display.color = color;
        }
        self
    }

    fn validate(&self) -> anyhow::Result<()> {
        for (index, rule) in self.rules.iter().enumerate() {
            let pattern = rule
                .pattern()
                .with_context(|| format!("Invalid rule #{}", index + 1))?;

            if rule.command.is_some() && rule.copy.is_some() {
                bail!("Rule '{}' sets both `command` and `copy`", pattern);
            }
            if rule.copy.is_some() && !rule.deps.is_empty() {
                bail!("Copy rule '{}' cannot declare extra `deps`", pattern);
            }
        }
        Ok(())
    }

    /// Builds the rule registry, in file order, running commands in `root`.
    pub fn to_rules(&self, root: &Path) -> anyhow::Result<Rules> {
        let mut rules = Rules::new();

        for rule in &self.rules {
            let pattern = rule.pattern()?;

            if let Some(source) = &rule.copy {
                rules
                    .register(&pattern, CopyRecipe::new(source.clone()).with_root(root))
                    .with_context(|| format!("Failed to register rule '{}'", pattern))?;
                continue;
            }

            let recipe = CommandRecipe::new(rule.deps.clone(), rule.command.clone())
                .with_shell(self.build.shell.clone())
                .with_workdir(root);
            rules
                .register(&pattern, recipe)
                .with_context(|| format!("Failed to register rule '{}'", pattern))?;
        }

        Ok(rules)
    }

    pub fn global_path() -> PathBuf {
        Self::expand_path("~/.config/kiln/kiln.toml")
    }

    pub fn expand_path(path: &str) -> PathBuf {
        let expanded = shellexpand::tilde(path);
        PathBuf::from(expanded.as_ref())
    }

    /// Starter configuration written by `kiln init`.
    pub fn starter() -> Self {
        Self {
            build: BuildConfig {
                default_targets: vec!["app".to_string()],
                shell: default_shell(),
            },
            display: DisplayConfig::default(),
            rules: vec![
                RuleConfig {
                    target: Some("app".to_string()),
                    deps: vec!["main.o".to_string()],
                    command: Some("cc {deps} -o {0}".to_string()),
                    ..RuleConfig::default()
                },
                RuleConfig {
                    pattern: Some(r"(.*)\.o".to_string()),
                    deps: vec!["{1}.c".to_string()],
                    command: Some("cc -c {1}.c -o {0}".to_string()),
                    ..RuleConfig::default()
                },
            ],
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[build]
default_targets = ["app"]

[display]
show_fresh = true

[[rule]]
pattern = '(.*)\.o'
deps = ["{1}.c"]
command = "cc -c {1}.c -o {0}"

[[rule]]
target = "app"
deps = ["main.o"]
command = "cc {deps} -o {0}"

[[rule]]
pattern = 'dist/(.*)'
copy = "{1}"
"#;

    #[test]
    fn test_parse_sample() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.build.default_targets, vec!["app"]);
        assert_eq!(config.build.shell, "sh");
        assert!(config.display.show_fresh);
        assert!(config.display.show_output);
        assert_eq!(config.rules.len(), 3);
        assert_eq!(config.rules[2].copy.as_deref(), Some("{1}"));
    }

    #[test]
    fn test_defaults_for_empty_file() {
        let config = Config::parse("").unwrap();
        assert!(config.rules.is_empty());
        assert!(config.build.default_targets.is_empty());
        assert!(!config.display.show_fresh);
        assert!(config.display.color);
    }

    #[test]
    fn test_rules_keep_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::parse(SAMPLE).unwrap();
        let rules = config.to_rules(dir.path()).unwrap();

        let patterns: Vec<&str> = rules.iter().map(|rule| rule.pattern()).collect();
        assert_eq!(patterns, vec![r"(.*)\.o", "app", "dist/(.*)"]);
        assert!(rules.dispatch("main.o").is_some());
        assert!(rules.dispatch("apps").is_none());
    }

    #[test]
    fn test_literal_target_is_escaped() {
        let rule = RuleConfig {
            target: Some("lib.a".to_string()),
            ..RuleConfig::default()
        };
        assert_eq!(rule.pattern().unwrap(), r"lib\.a");
    }

    #[test]
    fn test_command_and_copy_rejected() {
        let content = r#"
[[rule]]
pattern = "x"
command = "true"
copy = "y"
"#;
        let err = Config::parse(content).unwrap_err();
        assert!(err.to_string().contains("both `command` and `copy`"));
    }

    #[test]
    fn test_rule_without_pattern_rejected() {
        let content = r#"
[[rule]]
command = "true"
"#;
        assert!(Config::parse(content).is_err());
    }

    #[test]
    fn test_invalid_regex_fails_registration() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::parse("[[rule]]\npattern = \"(unclosed\"\n").unwrap();
        assert!(config.to_rules(dir.path()).is_err());
    }

    #[test]
    fn test_global_overrides_display_only() {
        let config = Config::parse(SAMPLE).unwrap();
        let global: GlobalConfig = toml::from_str("[display]\ncolor = false\n").unwrap();
        let merged = config.merge_with(global);

        assert!(!merged.display.color);
        assert!(merged.display.show_fresh);
        assert_eq!(merged.rules.len(), 3);
    }

    #[test]
    fn test_load_missing_project_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(dir.path(), None).unwrap_err();
        assert!(err.to_string().contains("kiln init"));
    }

    #[test]
    fn test_starter_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        Config::starter().save_to_file(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.build.default_targets, vec!["app"]);
        assert_eq!(loaded.rules.len(), 2);
        assert_eq!(loaded.rules[0].pattern().unwrap(), "app");
    }
}
