//! Platform selection from `-os`, `-arch` and `-osarch` selector lists.
//!
//! Each list holds entries that are either positive (`linux`) or negated
//! (`!linux`). A pair listed in `-osarch` always wins over the OS and
//! architecture lists; every other candidate must pass both of those lists.
//! When nothing positive is given anywhere, the candidates start from the
//! full supported set and the negations are removed from it.

use crate::platform::Platform;
use ahash::AHashSet;
use anyhow::Result;
use std::hash::Hash;

/// A single selector entry, possibly negated with a leading `!`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector<T> {
    pub value: T,
    pub negated: bool,
}

impl<T> Selector<T> {
    pub fn include(value: T) -> Self {
        Selector {
            value,
            negated: false,
        }
    }

    pub fn exclude(value: T) -> Self {
        Selector {
            value,
            negated: true,
        }
    }
}

fn split_negation(raw: &str) -> (&str, bool) {
    match raw.strip_prefix('!') {
        Some(rest) => (rest, true),
        None => (raw, false),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformFilter {
    pub os: Vec<Selector<String>>,
    pub arch: Vec<Selector<String>>,
    pub osarch: Vec<Selector<Platform>>,
}

impl PlatformFilter {
    /// Adds every space-separated entry of an `-os` value.
    pub fn add_os(&mut self, value: &str) {
        push_words(&mut self.os, value);
    }

    /// Adds every space-separated entry of an `-arch` value.
    pub fn add_arch(&mut self, value: &str) {
        push_words(&mut self.arch, value);
    }

    /// Adds every space-separated `os/arch` entry of an `-osarch` value.
    pub fn add_osarch(&mut self, value: &str) -> Result<()> {
        for word in value.split_whitespace() {
            let (pair, negated) = split_negation(word);
            let platform = pair.parse::<Platform>()?;
            self.osarch.push(Selector {
                value: platform,
                negated,
            });
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.os.is_empty() && self.arch.is_empty() && self.osarch.is_empty()
    }

    /// Picks the platforms to build from `supported`, keeping its order and
    /// dropping duplicates. An empty result is not an error here.
    pub fn resolve(&self, supported: &[Platform]) -> Vec<Platform> {
        let pairs = Rules::collect(&self.osarch, |p| p);
        let oses = Rules::collect(&self.os, String::as_str);
        let arches = Rules::collect(&self.arch, String::as_str);

        // Positive pairs alone name the whole build set.
        let consider_unlisted = !pairs.has_includes() || oses.has_includes() || arches.has_includes();

        let mut seen: AHashSet<&Platform> = AHashSet::new();
        let mut result = Vec::new();
        for platform in supported {
            let selected = if pairs.include.contains(platform) {
                true
            } else if pairs.exclude.contains(platform) {
                false
            } else {
                consider_unlisted
                    && oses.passes(platform.os.as_str())
                    && arches.passes(platform.arch.as_str())
            };

            if selected && seen.insert(platform) {
                result.push(platform.clone());
            }
        }

        log::debug!(
            "Resolved {} of {} supported platforms",
            result.len(),
            supported.len()
        );
        result
    }
}

fn push_words(selectors: &mut Vec<Selector<String>>, value: &str) {
    for word in value.split_whitespace() {
        let (name, negated) = split_negation(word);
        if name.is_empty() {
            continue;
        }
        selectors.push(Selector {
            value: name.to_string(),
            negated,
        });
    }
}

struct Rules<'a, K: ?Sized> {
    include: AHashSet<&'a K>,
    exclude: AHashSet<&'a K>,
}

impl<'a, K: ?Sized + Eq + Hash> Rules<'a, K> {
    fn collect<T>(selectors: &'a [Selector<T>], key: impl Fn(&'a T) -> &'a K) -> Self {
        let mut rules = Rules {
            include: AHashSet::new(),
            exclude: AHashSet::new(),
        };
        for selector in selectors {
            if selector.negated {
                rules.exclude.insert(key(&selector.value));
            } else {
                rules.include.insert(key(&selector.value));
            }
        }
        rules
    }

    fn has_includes(&self) -> bool {
        !self.include.is_empty()
    }

    /// With no positive entries everything passes except the negated ones;
    /// otherwise only the positive entries pass, minus the negated ones.
    fn passes(&self, key: &K) -> bool {
        (self.include.is_empty() || self.include.contains(key)) && !self.exclude.contains(key)
    }
}
