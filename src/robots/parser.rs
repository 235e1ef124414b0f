//! Robots.txt rules compiler
//!
//! Turns robots.txt content into a list of allow/disallow rules for one
//! crawler identity and answers path queries with longest-match precedence.

use regex::Regex;

/// One compiled `Allow`/`Disallow` line
#[derive(Debug, Clone)]
pub struct RobotsRule {
    /// The pattern as written in robots.txt
    pub pattern: String,
    pub allow: bool,
    matcher: Regex,
}

impl RobotsRule {
    fn new(pattern: &str, allow: bool) -> Option<Self> {
        let (prefix, anchored) = match pattern.strip_suffix('$') {
            Some(prefix) => (prefix, true),
            None => (pattern, false),
        };
        let body = prefix
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let matcher =
            Regex::new(&format!("^{}{}", body, if anchored { "$" } else { "" })).ok()?;

        Some(Self {
            pattern: pattern.to_string(),
            allow,
            matcher,
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        self.matcher.is_match(path)
    }
}

/// Compiled rules for one origin
///
/// Immutable once built; an empty rule list allows everything.
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    rules: Vec<RobotsRule>,
}

impl RobotsRules {
    /// Rules that allow every path
    ///
    /// Used when robots.txt is absent or cannot be fetched.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Compiles robots.txt content for `identity`
    ///
    /// # Parsing Rules
    ///
    /// - Directive names are case-insensitive; `#` starts a comment
    /// - A group applies when a `User-agent` token is `*` or is contained in
    ///   `identity` (case-insensitive)
    /// - Consecutive `User-agent` lines share one group
    /// - `Allow`/`Disallow` values are prefix patterns where `*` matches any
    ///   characters and a trailing `$` anchors the end of the path
    /// - An empty or `*` `Disallow` value places no restriction
    ///
    /// # Example
    ///
    /// ```
    /// use sumi_harvest::robots::RobotsRules;
    ///
    /// let rules = RobotsRules::parse("User-agent: *\nDisallow: /private", "mybot");
    /// assert!(!rules.is_allowed("/private/page"));
    /// assert!(rules.is_allowed("/public"));
    /// ```
    pub fn parse(content: &str, identity: &str) -> Self {
        let identity = identity.to_lowercase();
        let mut rules = Vec::new();

        let mut group_applies = false;
        let mut in_agent_block = false;

        for line in content.lines() {
            let line = match line.find('#') {
                Some(idx) => &line[..idx],
                None => line,
            };

            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if !in_agent_block {
                        group_applies = false;
                        in_agent_block = true;
                    }
                    let agent = value.to_lowercase();
                    if agent == "*" || (!agent.is_empty() && identity.contains(&agent)) {
                        group_applies = true;
                    }
                }
                "allow" | "disallow" => {
                    in_agent_block = false;
                    if !group_applies {
                        continue;
                    }

                    let allow = key == "allow";
                    if value.is_empty() || (!allow && value == "*") {
                        continue;
                    }

                    if let Some(rule) = RobotsRule::new(value, allow) {
                        rules.push(rule);
                    }
                }
                _ => {
                    in_agent_block = false;
                }
            }
        }

        Self { rules }
    }

    pub fn rules(&self) -> &[RobotsRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Decides whether `path` (path plus query) may be fetched
    ///
    /// The matching rule with the longest pattern decides. No match, or an
    /// allow and a disallow of equal length, means allowed.
    pub fn is_allowed(&self, path: &str) -> bool {
        let mut best_allow: Option<usize> = None;
        let mut best_disallow: Option<usize> = None;

        for rule in self.rules.iter().filter(|r| r.matches(path)) {
            let len = rule.pattern.len();
            let best = if rule.allow {
                &mut best_allow
            } else {
                &mut best_disallow
            };
            if best.map_or(true, |current| len > current) {
                *best = Some(len);
            }
        }

        match (best_allow, best_disallow) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(allow), Some(disallow)) => allow >= disallow,
        }
    }
}
