//! Core rewrite loop
//!
//! Registers rewrite rules and sweeps the graph, offering every live node to
//! the rules in registration order. The first rule that rewrites a node ends
//! that node's turn.

use tracing::{debug, trace};

use crate::error::{GraphError, GraphResult};
use crate::graph::{Graph, NodeId};
use crate::pattern::{Matcher, PatternMatch, RecurrentMatch, RecurrentMatcher};

/// Rule over a single-shot pattern
///
/// Implementors keep their [`Matcher`] and the Label handles they need as
/// fields; the binding found at a candidate is passed to [`RewriteRule::rewrite`].
pub trait RewriteRule: Send + Sync {
    /// Rule name used in statistics and error messages
    fn name(&self) -> &str;

    /// Pattern this rule fires on
    fn matcher(&self) -> &Matcher;

    /// Rewrite the matched sub-graph
    ///
    /// Returns `Ok(false)` to decline the match without touching the graph.
    /// An error aborts the whole pass.
    fn rewrite(&self, graph: &mut Graph, m: &PatternMatch) -> GraphResult<bool>;
}

/// Rule over an unrolled recurrence
pub trait RecurrentRewriteRule: Send + Sync {
    /// Rule name used in statistics and error messages
    fn name(&self) -> &str;

    /// Recurrent pattern this rule fires on
    fn matcher(&self) -> &RecurrentMatcher;

    /// Rewrite the matched repetitions
    fn rewrite(&self, graph: &mut Graph, m: &RecurrentMatch) -> GraphResult<bool>;
}

/// Callback signature for ad-hoc rules
pub type RewriteCallback = Box<dyn Fn(&mut Graph, &PatternMatch) -> GraphResult<bool> + Send + Sync>;

/// Rule built from a matcher and a closure
pub struct CallbackRule {
    name: String,
    matcher: Matcher,
    callback: RewriteCallback,
}

impl CallbackRule {
    /// Create a rule from a matcher and a callback
    pub fn new<F>(name: impl Into<String>, matcher: Matcher, callback: F) -> Self
    where
        F: Fn(&mut Graph, &PatternMatch) -> GraphResult<bool> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            matcher,
            callback: Box::new(callback),
        }
    }
}

impl RewriteRule for CallbackRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    fn rewrite(&self, graph: &mut Graph, m: &PatternMatch) -> GraphResult<bool> {
        (self.callback)(graph, m)
    }
}

/// Rewrite configuration
#[derive(Debug, Clone)]
pub struct RewriteConfig {
    /// Maximum number of sweeps; a sweep that rewrites nothing stops early
    pub max_iterations: usize,
    /// Run [`Graph::validate`] after every applied rewrite
    pub validate_after_rewrite: bool,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1,
            validate_after_rewrite: false,
        }
    }
}

impl RewriteConfig {
    /// Set the sweep limit
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Enable or disable validation after each rewrite
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate_after_rewrite = validate;
        self
    }
}

/// Statistics from a rewrite run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RewriteStats {
    /// Live nodes offered to the rules
    pub candidates: usize,
    /// Successful pattern matches
    pub matches: usize,
    /// Matches the rule declined
    pub rejected: usize,
    /// Rewrites applied
    pub rewrites: usize,
    /// Sweeps performed
    pub iterations: usize,
    /// Rule name and candidate of each applied rewrite, in order
    pub applied: Vec<(String, NodeId)>,
}

impl RewriteStats {
    /// Accumulate another run's statistics
    pub fn merge(&mut self, other: RewriteStats) {
        self.candidates += other.candidates;
        self.matches += other.matches;
        self.rejected += other.rejected;
        self.rewrites += other.rewrites;
        self.iterations += other.iterations;
        self.applied.extend(other.applied);
    }

    /// Number of rewrites a given rule applied
    pub fn rewrites_by(&self, rule: &str) -> usize {
        self.applied.iter().filter(|(name, _)| name == rule).count()
    }
}

enum RegisteredRule {
    Single(Box<dyn RewriteRule>),
    Recurrent(Box<dyn RecurrentRewriteRule>),
}

impl RegisteredRule {
    fn name(&self) -> &str {
        match self {
            RegisteredRule::Single(rule) => rule.name(),
            RegisteredRule::Recurrent(rule) => rule.name(),
        }
    }

    /// `None` if the pattern did not match, otherwise whether the rule rewrote
    fn try_apply(&self, graph: &mut Graph, candidate: NodeId) -> GraphResult<Option<bool>> {
        match self {
            RegisteredRule::Single(rule) => match rule.matcher().match_node(graph, candidate) {
                Some(m) => rule.rewrite(graph, &m).map(Some),
                None => Ok(None),
            },
            RegisteredRule::Recurrent(rule) => match rule.matcher().match_node(graph, candidate) {
                Some(m) => rule.rewrite(graph, &m).map(Some),
                None => Ok(None),
            },
        }
    }
}

/// Rule registry and driver
///
/// # Example
///
/// ```
/// use fusion_ir::graph::Graph;
/// use fusion_ir::op::{Op, OpKind};
/// use fusion_ir::pattern::{Matcher, Pattern};
/// use fusion_ir::tensor::{ElementType, ValueType};
/// use fusion_ir::transform::GraphRewrite;
///
/// let mut graph = Graph::new();
/// let x = graph.add_parameter(ValueType::new(ElementType::F32, [4]));
/// let neg = graph.add_node(Op::Negative, &[x]).unwrap();
/// let negneg = graph.add_node(Op::Negative, &[neg]).unwrap();
/// let out = graph.add_node(Op::Exp, &[negneg]).unwrap();
/// graph.add_result(out).unwrap();
///
/// // Negative(Negative(x)) -> x
/// let mut p = Pattern::new();
/// let input = p.any();
/// let inner = p.op(OpKind::Negative, &[input]);
/// let root = p.op(OpKind::Negative, &[inner]);
///
/// let mut rewrite = GraphRewrite::new();
/// rewrite.add_matcher("double_negation", Matcher::new(p, root).unwrap(), move |g, m| {
///     g.replace(m.root(), m.require(input)?)
/// });
/// let stats = rewrite.run(&mut graph).unwrap();
/// assert_eq!(stats.rewrites, 1);
/// assert_eq!(graph.args(out).unwrap(), &[x]);
/// ```
#[derive(Default)]
pub struct GraphRewrite {
    rules: Vec<RegisteredRule>,
    config: RewriteConfig,
}

impl GraphRewrite {
    /// Create an empty driver with the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the driver
    pub fn with_config(mut self, config: RewriteConfig) -> Self {
        self.config = config;
        self
    }

    /// Current configuration
    pub fn config(&self) -> &RewriteConfig {
        &self.config
    }

    /// Register a rule; rules are tried in registration order
    pub fn add_rule<R: RewriteRule + 'static>(&mut self, rule: R) -> &mut Self {
        self.rules.push(RegisteredRule::Single(Box::new(rule)));
        self
    }

    /// Register a recurrent rule
    pub fn add_recurrent_rule<R: RecurrentRewriteRule + 'static>(&mut self, rule: R) -> &mut Self {
        self.rules.push(RegisteredRule::Recurrent(Box::new(rule)));
        self
    }

    /// Register a closure as a rule
    pub fn add_matcher<F>(&mut self, name: impl Into<String>, matcher: Matcher, callback: F) -> &mut Self
    where
        F: Fn(&mut Graph, &PatternMatch) -> GraphResult<bool> + Send + Sync + 'static,
    {
        self.add_rule(CallbackRule::new(name, matcher, callback))
    }

    /// Number of registered rules
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Registered rule names in order
    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Run over the graph, consumers before producers
    pub fn run(&self, graph: &mut Graph) -> GraphResult<RewriteStats> {
        self.run_with_order(graph, Graph::reverse_topological_order)
    }

    /// Run over the graph, visiting candidates in the order `order` returns
    ///
    /// The order is recomputed at the start of every sweep. Nodes released by
    /// an earlier rewrite in the same sweep are skipped.
    pub fn run_with_order<F>(&self, graph: &mut Graph, order: F) -> GraphResult<RewriteStats>
    where
        F: Fn(&Graph) -> Vec<NodeId>,
    {
        let mut stats = RewriteStats::default();
        if self.rules.is_empty() {
            return Ok(stats);
        }

        for _ in 0..self.config.max_iterations.max(1) {
            stats.iterations += 1;
            let rewrites_before = stats.rewrites;

            for candidate in order(graph) {
                if !graph.is_live(candidate) {
                    continue;
                }
                stats.candidates += 1;

                for rule in &self.rules {
                    let outcome = rule
                        .try_apply(graph, candidate)
                        .and_then(|applied| {
                            if applied == Some(true) && self.config.validate_after_rewrite {
                                graph.validate()?;
                            }
                            Ok(applied)
                        })
                        .map_err(|source| GraphError::RuleFailed {
                            rule: rule.name().to_string(),
                            node: graph.node_name(candidate),
                            source: Box::new(source),
                        })?;

                    match outcome {
                        None => continue,
                        Some(false) => {
                            stats.matches += 1;
                            stats.rejected += 1;
                            trace!(rule = rule.name(), node = %graph.node_name(candidate), "match declined");
                        }
                        Some(true) => {
                            stats.matches += 1;
                            stats.rewrites += 1;
                            stats.applied.push((rule.name().to_string(), candidate));
                            debug!(rule = rule.name(), node = %graph.node_name(candidate), "rewrite applied");
                            break;
                        }
                    }
                }
            }

            if stats.rewrites == rewrites_before {
                break;
            }
        }

        debug!(
            rules = self.rules.len(),
            iterations = stats.iterations,
            rewrites = stats.rewrites,
            "rewrite run finished"
        );
        Ok(stats)
    }
}
