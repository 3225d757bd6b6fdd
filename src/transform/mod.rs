//! Graph rewrite infrastructure
//!
//! - [`GraphRewrite`]: rule registry and sweep driver
//! - [`RewriteRule`] / [`RecurrentRewriteRule`]: rule objects holding a matcher
//!   and the Label handles their rewrite needs
//! - [`RewriteConfig`] / [`RewriteStats`]: run configuration and counters
//!
//! # Overview
//!
//! Rules mutate the graph only through [`Graph::add_node`](crate::graph::Graph::add_node),
//! [`Graph::replace`](crate::graph::Graph::replace) and
//! [`Graph::set_argument`](crate::graph::Graph::set_argument), so the user
//! index and types stay consistent after every rewrite. A rule declines a match
//! by returning `Ok(false)`; returning an error aborts the run.
//!
//! | Driver method | Purpose |
//! |---------------|---------|
//! | `add_rule()` | register a [`RewriteRule`] |
//! | `add_recurrent_rule()` | register a [`RecurrentRewriteRule`] |
//! | `add_matcher()` | register a closure over a [`Matcher`](crate::pattern::Matcher) |
//! | `run()` | sweep consumers before producers |
//! | `run_with_order()` | sweep in a caller-supplied order |

pub mod core;

pub use self::core::{
    CallbackRule, GraphRewrite, RecurrentRewriteRule, RewriteCallback, RewriteConfig, RewriteRule,
    RewriteStats,
};
