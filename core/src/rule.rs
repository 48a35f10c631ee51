use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::error::{BuildResult, RuleError};
use crate::job::Job;

/// Builder logic for the targets a rule matches.
#[async_trait]
pub trait Recipe: Send + Sync {
    async fn build(&self, job: Job) -> BuildResult<()>;

    /// Short label used when listing rules.
    fn describe(&self) -> String {
        "custom".to_string()
    }
}

/// Adapts an async closure into a [`Recipe`].
pub struct FnRecipe<F> {
    func: F,
}

pub fn recipe_fn<F, Fut>(func: F) -> FnRecipe<F>
where
    F: Fn(Job) -> Fut + Send + Sync,
    Fut: Future<Output = BuildResult<()>> + Send + 'static,
{
    FnRecipe { func }
}

#[async_trait]
impl<F, Fut> Recipe for FnRecipe<F>
where
    F: Fn(Job) -> Fut + Send + Sync,
    Fut: Future<Output = BuildResult<()>> + Send + 'static,
{
    async fn build(&self, job: Job) -> BuildResult<()> {
        (self.func)(job).await
    }
}

/// Capture groups of the rule pattern that selected a target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleMatch {
    groups: Vec<Option<String>>,
    named: HashMap<String, String>,
}

impl RuleMatch {
    fn from_captures(pattern: &Regex, captures: &regex::Captures<'_>) -> Self {
        let groups = captures
            .iter()
            .map(|group| group.map(|m| m.as_str().to_string()))
            .collect();

        let named = pattern
            .capture_names()
            .flatten()
            .filter_map(|name| {
                captures
                    .name(name)
                    .map(|m| (name.to_string(), m.as_str().to_string()))
            })
            .collect();

        Self { groups, named }
    }

    /// Group `index`; 0 is the whole target name.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.groups.get(index).and_then(|group| group.as_deref())
    }

    pub fn named(&self, name: &str) -> Option<&str> {
        self.named.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

pub struct Rule {
    source: String,
    pattern: Regex,
    recipe: Arc<dyn Recipe>,
}

impl Rule {
    pub fn pattern(&self) -> &str {
        &self.source
    }

    pub fn recipe(&self) -> &Arc<dyn Recipe> {
        &self.recipe
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("pattern", &self.source)
            .field("recipe", &self.recipe.describe())
            .finish()
    }
}

/// Ordered (pattern, recipe) table. The first pattern matching the whole
/// target name wins.
#[derive(Debug, Default)]
pub struct Rules {
    rules: Vec<Rule>,
}

impl Rules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `recipe` for names fully matching `pattern`. The pattern is
    /// anchored on both ends whether or not it already carries `^`/`$`.
    pub fn register<R>(&mut self, pattern: &str, recipe: R) -> Result<&mut Self, RuleError>
    where
        R: Recipe + 'static,
    {
        self.register_shared(pattern, Arc::new(recipe))
    }

    pub fn register_shared(
        &mut self,
        pattern: &str,
        recipe: Arc<dyn Recipe>,
    ) -> Result<&mut Self, RuleError> {
        let anchored = format!("^(?:{})$", pattern);
        let compiled = Regex::new(&anchored).map_err(|source| RuleError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;

        self.rules.push(Rule {
            source: pattern.to_string(),
            pattern: compiled,
            recipe,
        });
        Ok(self)
    }

    pub fn register_fn<F, Fut>(&mut self, pattern: &str, func: F) -> Result<&mut Self, RuleError>
    where
        F: Fn(Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BuildResult<()>> + Send + 'static,
    {
        self.register(pattern, recipe_fn(func))
    }

    /// Finds the first rule whose pattern matches `name`.
    pub fn dispatch(&self, name: &str) -> Option<(Arc<dyn Recipe>, RuleMatch)> {
        self.rules.iter().find_map(|rule| {
            rule.pattern.captures(name).map(|captures| {
                (
                    Arc::clone(&rule.recipe),
                    RuleMatch::from_captures(&rule.pattern, &captures),
                )
            })
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
