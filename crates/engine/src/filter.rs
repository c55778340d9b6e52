//! Declarative predicates over a resource's JSON form.

use kubepattern_graph::Resource;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_json_path::JsonPath;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Query language used by a [`FilterRule`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryLanguage {
    #[default]
    JsonPath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    Exists,
    NotExists,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    IsEmpty,
    ArraySizeEquals,
    ArraySizeGreaterThan,
    ArraySizeLessThan,
    ArraySizeGreaterOrEqual,
    ArraySizeLessOrEqual,
}

impl FilterOperator {
    pub const ALL: [FilterOperator; 14] = [
        FilterOperator::Equals,
        FilterOperator::NotEquals,
        FilterOperator::Exists,
        FilterOperator::NotExists,
        FilterOperator::GreaterThan,
        FilterOperator::GreaterOrEqual,
        FilterOperator::LessThan,
        FilterOperator::LessOrEqual,
        FilterOperator::IsEmpty,
        FilterOperator::ArraySizeEquals,
        FilterOperator::ArraySizeGreaterThan,
        FilterOperator::ArraySizeLessThan,
        FilterOperator::ArraySizeGreaterOrEqual,
        FilterOperator::ArraySizeLessOrEqual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Equals => "EQUALS",
            FilterOperator::NotEquals => "NOT_EQUALS",
            FilterOperator::Exists => "EXISTS",
            FilterOperator::NotExists => "NOT_EXISTS",
            FilterOperator::GreaterThan => "GREATER_THAN",
            FilterOperator::GreaterOrEqual => "GREATER_OR_EQUAL",
            FilterOperator::LessThan => "LESS_THAN",
            FilterOperator::LessOrEqual => "LESS_OR_EQUAL",
            FilterOperator::IsEmpty => "IS_EMPTY",
            FilterOperator::ArraySizeEquals => "ARRAY_SIZE_EQUALS",
            FilterOperator::ArraySizeGreaterThan => "ARRAY_SIZE_GREATER_THAN",
            FilterOperator::ArraySizeLessThan => "ARRAY_SIZE_LESS_THAN",
            FilterOperator::ArraySizeGreaterOrEqual => "ARRAY_SIZE_GREATER_OR_EQUAL",
            FilterOperator::ArraySizeLessOrEqual => "ARRAY_SIZE_LESS_OR_EQUAL",
        }
    }

    /// Operators that read `values[0]` as a number
    pub fn needs_operand(&self) -> bool {
        !matches!(
            self,
            FilterOperator::Exists | FilterOperator::NotExists | FilterOperator::IsEmpty
        )
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FilterOperator::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown filter operator '{s}'"))
    }
}

/// Render a JSON value the way operands are written: strings raw, the rest as JSON text.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse a query, accepting the shorthand without a leading `$`.
pub fn compile_query(query: &str) -> Result<JsonPath, String> {
    let query = query.trim();
    let normalized = if query.starts_with('$') {
        query.to_string()
    } else {
        format!("$.{}", query.trim_start_matches('.'))
    };
    JsonPath::parse(&normalized).map_err(|e| format!("invalid JSONPath '{query}': {e}"))
}

/// Whether a query addresses at most one node.
///
/// Wildcards, descendants, filters, slices and unions select a node list,
/// whose length is the collection size even when it holds one node or none.
pub fn is_singular_query(query: &str) -> bool {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut previous = None;
    for c in query.trim().chars() {
        if let Some(q) = quote {
            if c == q && previous != Some('\\') {
                quote = None;
            }
            previous = Some(c);
            continue;
        }
        match c {
            '\'' | '"' if depth > 0 => quote = Some(c),
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '*' => return false,
            '.' if previous == Some('.') => return false,
            '?' | ':' | ',' if depth > 0 => return false,
            _ => {}
        }
        previous = Some(c);
    }
    true
}

/// A single `(query, operator, values)` predicate
#[derive(Debug, Clone)]
pub struct FilterRule {
    query: String,
    operator: FilterOperator,
    values: Vec<String>,
    language: QueryLanguage,
    compiled: Option<JsonPath>,
    singular: bool,
}

impl FilterRule {
    pub fn new(query: impl Into<String>, operator: FilterOperator, values: Vec<String>) -> Self {
        let query = query.into();
        let compiled = match compile_query(&query) {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("{e}; rule will never match");
                None
            }
        };
        Self {
            singular: is_singular_query(&query),
            query,
            operator,
            values,
            language: QueryLanguage::JsonPath,
            compiled,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn operator(&self) -> FilterOperator {
        self.operator
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn language(&self) -> QueryLanguage {
        self.language
    }

    pub fn matches(&self, resource: &Resource) -> bool {
        self.matches_value(resource.object())
    }

    pub fn matches_value(&self, document: &Value) -> bool {
        let Some(path) = &self.compiled else {
            return false;
        };
        let nodes = path.query(document).all();

        match self.operator {
            FilterOperator::Equals => self.equals(&nodes),
            FilterOperator::NotEquals => !self.equals(&nodes),
            FilterOperator::Exists => !self.results(&nodes).is_empty(),
            FilterOperator::NotExists => self.results(&nodes).is_empty(),
            FilterOperator::GreaterThan => self.compare(&nodes, Ordering::is_gt),
            FilterOperator::GreaterOrEqual => self.compare(&nodes, Ordering::is_ge),
            FilterOperator::LessThan => self.compare(&nodes, Ordering::is_lt),
            FilterOperator::LessOrEqual => self.compare(&nodes, Ordering::is_le),
            FilterOperator::IsEmpty => self.is_empty(&nodes),
            FilterOperator::ArraySizeEquals => self.size(&nodes, Ordering::is_eq),
            FilterOperator::ArraySizeGreaterThan => self.size(&nodes, Ordering::is_gt),
            FilterOperator::ArraySizeLessThan => self.size(&nodes, Ordering::is_lt),
            FilterOperator::ArraySizeGreaterOrEqual => self.size(&nodes, Ordering::is_ge),
            FilterOperator::ArraySizeLessOrEqual => self.size(&nodes, Ordering::is_le),
        }
    }

    fn equals(&self, nodes: &[&Value]) -> bool {
        self.results(nodes)
            .into_iter()
            .filter(|v| !v.is_null())
            .any(|v| self.values.contains(&stringify(v)))
    }

    fn operand(&self) -> Option<f64> {
        let raw = self.values.first()?;
        match raw.trim().parse::<f64>() {
            Ok(n) => Some(n),
            Err(_) => {
                log::warn!(
                    "Non-numeric operand '{}' for {} on '{}'",
                    raw,
                    self.operator,
                    self.query
                );
                None
            }
        }
    }

    fn compare(&self, nodes: &[&Value], accept: fn(Ordering) -> bool) -> bool {
        let candidates = self.results(nodes);
        if candidates.is_empty() {
            return false;
        }
        let Some(target) = self.operand() else {
            return false;
        };

        candidates.into_iter().filter(|v| !v.is_null()).any(|v| {
            let number = match v {
                Value::Number(n) => n.as_f64(),
                other => stringify(other).trim().parse::<f64>().ok(),
            };
            match number.and_then(|n| n.partial_cmp(&target)) {
                Some(ordering) => accept(ordering),
                None => {
                    log::debug!("Skipping non-numeric value {} for '{}'", v, self.query);
                    false
                }
            }
        })
    }

    fn size(&self, nodes: &[&Value], accept: fn(Ordering) -> bool) -> bool {
        let size = if self.singular {
            match nodes {
                [Value::Array(items)] => items.len(),
                _ => return false,
            }
        } else {
            nodes.len()
        };
        let Some(target) = self.operand() else {
            return false;
        };
        if target.fract() != 0.0 {
            log::warn!("Array size operand {} for '{}' is not an integer", target, self.query);
            return false;
        }
        (size as f64).partial_cmp(&target).is_some_and(accept)
    }

    /// Values a rule compares against: the elements of a single addressed
    /// array, otherwise the matched nodes themselves.
    fn results<'a>(&self, nodes: &[&'a Value]) -> Vec<&'a Value> {
        if self.singular {
            if let [Value::Array(items)] = nodes {
                return items.iter().collect();
            }
        }
        nodes.to_vec()
    }

    fn is_empty(&self, nodes: &[&Value]) -> bool {
        if !self.singular {
            return nodes.is_empty();
        }
        match nodes {
            [] => true,
            [Value::Null] => true,
            [Value::String(s)] => s.is_empty(),
            [Value::Array(items)] => items.is_empty(),
            [Value::Object(map)] => map.is_empty(),
            _ => false,
        }
    }
}

/// `matchAll ∧ matchAny ∧ matchNone`, each vacuously true when empty
#[derive(Debug, Clone, Default)]
pub struct ResourceFilter {
    pub match_all: Vec<FilterRule>,
    pub match_any: Vec<FilterRule>,
    pub match_none: Vec<FilterRule>,
}

impl ResourceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_all(mut self, rule: FilterRule) -> Self {
        self.match_all.push(rule);
        self
    }

    pub fn with_any(mut self, rule: FilterRule) -> Self {
        self.match_any.push(rule);
        self
    }

    pub fn with_none(mut self, rule: FilterRule) -> Self {
        self.match_none.push(rule);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.match_all.is_empty() && self.match_any.is_empty() && self.match_none.is_empty()
    }

    pub fn apply(&self, resource: &Resource) -> bool {
        self.apply_value(resource.object())
    }

    pub fn apply_value(&self, document: &Value) -> bool {
        let all = self.match_all.iter().all(|r| r.matches_value(document));
        let any = self.match_any.is_empty()
            || self.match_any.iter().any(|r| r.matches_value(document));
        let none = !self.match_none.iter().any(|r| r.matches_value(document));
        all && any && none
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(query: &str, operator: FilterOperator, values: &[&str]) -> FilterRule {
        FilterRule::new(query, operator, values.iter().map(|v| v.to_string()).collect())
    }

    fn pod() -> Value {
        json!({
            "kind": "Pod",
            "metadata": {
                "name": "web",
                "labels": {"app": "web", "tier": "frontend"},
                "annotations": {}
            },
            "spec": {
                "replicas": 3,
                "hostNetwork": false,
                "containers": [
                    {"name": "app", "image": "nginx", "ports": [{"containerPort": 80}]},
                    {"name": "proxy", "image": "envoy", "ports": [{"containerPort": 9901}]}
                ],
                "volumes": [],
                "nodeName": ""
            }
        })
    }

    #[test]
    fn not_exists_on_missing_label() {
        let r = rule("$.metadata.labels.env", FilterOperator::NotExists, &[]);
        assert!(r.matches_value(&pod()));
        let r = rule("$.metadata.labels.env", FilterOperator::Exists, &[]);
        assert!(!r.matches_value(&pod()));
    }

    #[test]
    fn equals_intersects_result_set_with_operands() {
        let doc = pod();
        assert!(rule("$.spec.containers[*].image", FilterOperator::Equals, &["envoy", "istio"])
            .matches_value(&doc));
        assert!(!rule("$.spec.containers[*].image", FilterOperator::Equals, &["istio"])
            .matches_value(&doc));
        assert!(rule("$.spec.hostNetwork", FilterOperator::Equals, &["false"]).matches_value(&doc));
        assert!(rule("$.spec.replicas", FilterOperator::Equals, &["3"]).matches_value(&doc));
    }

    #[test]
    fn not_equals_is_negation_of_equals() {
        let doc = pod();
        for (query, values) in [
            ("$.metadata.labels.app", vec!["web"]),
            ("$.metadata.labels.app", vec!["api"]),
            ("$.metadata.labels.missing", vec!["x"]),
            ("$.spec.containers[*].name", vec!["proxy"]),
        ] {
            let eq = rule(query, FilterOperator::Equals, &values).matches_value(&doc);
            let ne = rule(query, FilterOperator::NotEquals, &values).matches_value(&doc);
            assert_ne!(eq, ne, "{query}");
        }
    }

    #[test]
    fn numeric_comparisons_skip_non_numeric_elements() {
        let doc = json!({"values": ["abc", 5, "7"]});
        assert!(rule("$.values", FilterOperator::GreaterThan, &["6"]).matches_value(&doc));
        assert!(rule("$.values", FilterOperator::GreaterOrEqual, &["7"]).matches_value(&doc));
        assert!(rule("$.values", FilterOperator::LessThan, &["6"]).matches_value(&doc));
        assert!(rule("$.values", FilterOperator::LessOrEqual, &["5"]).matches_value(&doc));
        assert!(!rule("$.values", FilterOperator::LessThan, &["5"]).matches_value(&doc));
        let port = "$.spec.containers[*].ports[*].containerPort";
        assert!(rule(port, FilterOperator::GreaterThan, &["9000"]).matches_value(&pod()));
    }

    #[test]
    fn malformed_operand_evaluates_false() {
        let doc = pod();
        assert!(!rule("$.spec.replicas", FilterOperator::GreaterThan, &["many"])
            .matches_value(&doc));
        assert!(!rule("$.spec.replicas", FilterOperator::GreaterThan, &[]).matches_value(&doc));
        assert!(!rule("$.spec.containers", FilterOperator::ArraySizeEquals, &["two"])
            .matches_value(&doc));
    }

    #[test]
    fn is_empty_covers_strings_collections_and_absence() {
        let doc = pod();
        assert!(rule("$.spec.volumes", FilterOperator::IsEmpty, &[]).matches_value(&doc));
        assert!(rule("$.spec.nodeName", FilterOperator::IsEmpty, &[]).matches_value(&doc));
        assert!(rule("$.metadata.annotations", FilterOperator::IsEmpty, &[]).matches_value(&doc));
        assert!(rule("$.spec.missing", FilterOperator::IsEmpty, &[]).matches_value(&doc));
        assert!(!rule("$.spec.containers", FilterOperator::IsEmpty, &[]).matches_value(&doc));
        assert!(!rule("$.metadata.name", FilterOperator::IsEmpty, &[]).matches_value(&doc));
    }

    #[test]
    fn array_size_operators() {
        let doc = pod();
        let size = |op, n: &str| rule("$.spec.containers", op, &[n]).matches_value(&doc);
        assert!(size(FilterOperator::ArraySizeEquals, "2"));
        assert!(size(FilterOperator::ArraySizeGreaterThan, "1"));
        assert!(!size(FilterOperator::ArraySizeGreaterThan, "2"));
        assert!(size(FilterOperator::ArraySizeLessThan, "3"));
        assert!(size(FilterOperator::ArraySizeGreaterOrEqual, "2"));
        assert!(size(FilterOperator::ArraySizeLessOrEqual, "2"));

        // several matched nodes count as a collection
        assert!(rule("$.spec.containers[*].name", FilterOperator::ArraySizeEquals, &["2"])
            .matches_value(&doc));
        // a scalar is not a collection
        assert!(!rule("$.metadata.name", FilterOperator::ArraySizeEquals, &["1"])
            .matches_value(&doc));
        assert!(!rule("$.spec.missing", FilterOperator::ArraySizeEquals, &["0"])
            .matches_value(&doc));
    }

    #[test]
    fn wildcard_sizes_count_matched_nodes() {
        let with_containers = |n: usize| {
            let containers: Vec<Value> = (0..n).map(|i| json!({"name": format!("c{i}")})).collect();
            json!({"spec": {"containers": containers}})
        };
        let names =
            |n: &str| rule("$.spec.containers[*].name", FilterOperator::ArraySizeEquals, &[n]);

        assert!(names("0").matches_value(&with_containers(0)));
        assert!(names("1").matches_value(&with_containers(1)));
        assert!(names("2").matches_value(&with_containers(2)));
        assert!(!names("2").matches_value(&with_containers(1)));
        assert!(rule("$.spec.containers[*].name", FilterOperator::ArraySizeLessThan, &["1"])
            .matches_value(&with_containers(0)));
    }

    #[test]
    fn wildcard_with_one_array_node_is_not_flattened() {
        let doc = json!({"spec": {"containers": [{"ports": [{"p": 80}, {"p": 443}]}]}});
        let ports = |op, n: &str| rule("$.spec.containers[*].ports", op, &[n]).matches_value(&doc);
        assert!(ports(FilterOperator::ArraySizeEquals, "1"));
        assert!(rule("$.spec.containers[0].ports", FilterOperator::ArraySizeEquals, &["2"])
            .matches_value(&doc));
        assert!(rule("$.spec.containers[*].name", FilterOperator::IsEmpty, &[])
            .matches_value(&doc));
    }

    #[test]
    fn singular_query_detection() {
        assert!(is_singular_query("$.spec.containers"));
        assert!(is_singular_query("$.metadata.labels['app.kubernetes.io/name']"));
        assert!(is_singular_query("$.spec.containers[0].name"));
        assert!(!is_singular_query("$.spec.containers[*].name"));
        assert!(!is_singular_query("$..image"));
        assert!(!is_singular_query("$.spec.containers[?@.name == 'app']"));
        assert!(!is_singular_query("$.spec.containers[0:2]"));
        assert!(!is_singular_query("$.spec.containers[0,1]"));
    }

    #[test]
    fn invalid_query_never_matches() {
        let r = rule("$.spec[", FilterOperator::NotExists, &[]);
        assert!(!r.matches_value(&pod()));
    }

    #[test]
    fn shorthand_query_without_root() {
        assert!(rule("metadata.labels.app", FilterOperator::Equals, &["web"])
            .matches_value(&pod()));
    }

    #[test]
    fn combinators_are_vacuously_true() {
        let doc = pod();
        assert!(ResourceFilter::new().apply_value(&doc));

        let filter = ResourceFilter::new()
            .with_all(rule("$.metadata.labels.app", FilterOperator::Equals, &["web"]))
            .with_any(rule("$.metadata.labels.tier", FilterOperator::Equals, &["backend"]))
            .with_any(rule("$.metadata.labels.tier", FilterOperator::Equals, &["frontend"]));
        assert!(filter.apply_value(&doc));

        let vetoed = filter.with_none(rule("$.spec.hostNetwork", FilterOperator::Exists, &[]));
        assert!(!vetoed.apply_value(&doc));
    }

    #[test]
    fn operator_names_round_trip() {
        for op in FilterOperator::ALL {
            assert_eq!(op.as_str().parse::<FilterOperator>().unwrap(), op);
        }
        assert!("BETWEEN".parse::<FilterOperator>().is_err());
    }
}
