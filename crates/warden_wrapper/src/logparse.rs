//! Sequential line pattern matching over the game server's console output.
//!
//! A [`LineMatcher`] holds registered rules. A rule is an ordered list of
//! one or more patterns plus a handler. Single-pattern rules fire on any
//! matching line. Multi-pattern rules carry state from line to line: the
//! first pattern must match some line, the second some *later* line (not
//! necessarily the next one; unrelated lines in between are ignored for
//! that rule), and so on. Once every pattern has matched in order, the
//! handler receives all matched lines together. Multiple rules and multiple
//! in-flight partial matches are tracked independently against the same
//! stream.
//!
//! Patterns are anchored: a rule pattern must match the whole line.

use std::sync::{Arc, OnceLock};

use regex::Regex;

/// One matched line with its capture groups materialized.
#[derive(Debug, Clone)]
pub struct LineMatch {
    line: String,
    groups: Vec<Option<String>>,
}

impl LineMatch {
    fn from_captures(captures: &regex::Captures<'_>, line: &str) -> Self {
        Self {
            line: line.to_string(),
            groups: captures
                .iter()
                .map(|group| group.map(|m| m.as_str().to_string()))
                .collect(),
        }
    }

    /// The whole matched line.
    pub fn line(&self) -> &str {
        &self.line
    }

    /// A capture group by index; group 0 is the whole line.
    pub fn group(&self, index: usize) -> Option<&str> {
        self.groups.get(index)?.as_deref()
    }
}

type RuleHandler = Box<dyn Fn(&[LineMatch]) + Send + Sync>;

struct Rule {
    patterns: Vec<Regex>,
    handler: RuleHandler,
}

struct Pending {
    rule: Arc<Rule>,
    matched: Vec<LineMatch>,
}

/// Matches registered rules against a stream of console lines.
pub struct LineMatcher {
    rules: Vec<Arc<Rule>>,
    pending: Vec<Pending>,
}

impl LineMatcher {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// Registers a rule from one or more patterns.
    ///
    /// Each pattern is compiled anchored (whole-line match).
    pub fn add_rule<F>(&mut self, patterns: &[&str], handler: F) -> Result<(), regex::Error>
    where
        F: Fn(&[LineMatch]) + Send + Sync + 'static,
    {
        assert!(!patterns.is_empty(), "a rule needs at least one pattern");
        let patterns = patterns
            .iter()
            .map(|pattern| Regex::new(&format!("^(?:{pattern})$")))
            .collect::<Result<Vec<_>, _>>()?;
        self.rules.push(Arc::new(Rule {
            patterns,
            handler: Box::new(handler),
        }));
        Ok(())
    }

    /// Feeds one line through every rule and every in-flight partial match.
    pub fn process(&mut self, line: &str) {
        let pending = std::mem::take(&mut self.pending);
        for partial in pending {
            self.advance(partial.rule, partial.matched, line);
        }
        let rules = self.rules.clone();
        for rule in rules {
            self.advance(rule, Vec::new(), line);
        }
    }

    fn advance(&mut self, rule: Arc<Rule>, mut matched: Vec<LineMatch>, line: &str) {
        let pattern = &rule.patterns[matched.len()];
        if let Some(captures) = pattern.captures(line) {
            matched.push(LineMatch::from_captures(&captures, line));
            if matched.len() == rule.patterns.len() {
                (rule.handler)(&matched);
            } else {
                self.pending.push(Pending { rule, matched });
            }
        } else if !matched.is_empty() {
            // Unrelated line; the partial match stays armed.
            self.pending.push(Pending { rule, matched });
        }
    }
}

impl Default for LineMatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Strips the `[time] [thread/level]: body` console frame, returning the
/// body, or `None` for lines that do not carry the frame.
pub fn parse_line(line: &str) -> Option<&str> {
    static FRAME: OnceLock<Regex> = OnceLock::new();
    let frame = FRAME.get_or_init(|| {
        Regex::new(r"^\[(.*)\] \[(.*)\]: (.*)$").expect("console frame pattern is valid")
    });
    frame
        .captures(line)
        .and_then(|captures| captures.get(3))
        .map(|body| {
            let range = body.range();
            &line[range]
        })
}
