//! # Pattern Engine
//!
//! Evaluates declarative pattern definitions against a populated
//! [`ResourceGraph`](kubepattern_graph::ResourceGraph).
//!
//! ## Architecture
//!
//! ```text
//! definition text
//!     │
//!     ├──> lint   (structural gate, JSON-path error messages)
//!     ├──> parse  (PatternDocument -> PatternDefinition)
//!     │
//!     └──> analyze(definition, graph)
//!            ├─ Expand roles into candidates by kind
//!            ├─ ResourceFilter per role (JSONPath rules)
//!            ├─ Relationship scoping of leaders (veto / points)
//!            └─ Topology dispatch
//!                 ├─ SINGLE: one match per leader
//!                 └─ LEADER_FOLLOWER: pairs scored on common neighbours
//! ```

mod definition;
mod error;
mod filter;
mod lint;
mod matcher;
mod parse;
mod pattern_match;

pub use definition::{
    PatternDefinition, PatternMetadata, PatternType, RelationshipDefinition, Severity, Topology,
    Verdict,
};
pub use error::{EngineError, Result};
pub use filter::{
    compile_query, is_singular_query, stringify, FilterOperator, FilterRule, QueryLanguage,
    ResourceFilter,
};
pub use lint::{lint, lint_result};
pub use matcher::analyze;
pub use parse::{from_document, parse};
pub use pattern_match::{
    render_message, BoundResource, Confidence, PatternMatch, Score, COMMON_RELATIONSHIPS_CATEGORY,
    TOTAL_SCORE_CEILING,
};
