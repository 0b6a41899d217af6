//! Grouping of source metrics into output series.
//!
//! The catalog is built once from a discovery snapshot. Each metric name that
//! matches the pattern lands in exactly one [`Group`], the one keyed by its own
//! template expansion; everything else is left out and never fetched.

use crate::error::ConfigError;
use crate::template::Template;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A compiled pattern and the template that turns its matches into output keys.
#[derive(Debug, Clone)]
pub struct Grouping {
    pattern: Regex,
    template: Template,
}

impl Grouping {
    /// Compiles `pattern` and checks `template` against its groups.
    pub fn new(pattern: &str, template: &str) -> Result<Self, ConfigError> {
        let pattern = Regex::new(pattern)?;
        let template = Template::parse(template, &pattern)?;
        Ok(Self { pattern, template })
    }

    pub fn catalog<I, S>(&self, names: I) -> Catalog
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Catalog::build(names, &self.pattern, &self.template)
    }

    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    pub fn template(&self) -> &Template {
        &self.template
    }
}

/// Source metrics that share one output key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub key: String,
    pub members: BTreeSet<String>,
}

/// Output groups, plus a by-name index for routing samples.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    groups: BTreeMap<String, Group>,
    index: HashMap<String, String>,
}

impl Catalog {
    /// Partitions `names` by the key `template` produces for each match of `pattern`.
    pub fn build<I, S>(names: I, pattern: &Regex, template: &Template) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut catalog = Self::default();

        for name in names {
            let name = name.as_ref();
            let captures = match pattern.captures(name) {
                Some(captures) => captures,
                None => continue,
            };
            let key = template.expand(&captures);

            catalog
                .groups
                .entry(key.clone())
                .or_insert_with(|| Group {
                    key: key.clone(),
                    members: BTreeSet::new(),
                })
                .members
                .insert(name.to_string());
            catalog.index.insert(name.to_string(), key);
        }

        catalog
    }

    /// The metrics to fetch, sorted.
    pub fn source_metric_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.index.keys().cloned().collect();
        names.sort();
        names
    }

    /// The group a source metric routes to.
    pub fn group_of(&self, name: &str) -> Option<&Group> {
        self.index.get(name).and_then(|key| self.groups.get(key))
    }

    /// Groups in output-key order.
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
