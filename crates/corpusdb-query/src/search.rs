//! Annotation search specifications.
//!
//! A node search describes which annotations qualify a node as a query
//! operand: an exact key, an exact value, or a regular expression over
//! values. The executable form lives in
//! [`exec::nodesearch`](crate::exec::nodesearch).

use std::fmt;

/// One node search of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeSearchSpec {
    /// All nodes carrying `(ns?, name)` with exactly the given value.
    ExactValue {
        /// Optional namespace; `None` unions all namespaces with `name`.
        ns: Option<String>,
        /// The annotation name.
        name: String,
        /// The annotation value.
        val: String,
    },
    /// All nodes carrying the key `(ns?, name)`, with any value.
    ExactKey {
        /// Optional namespace; `None` unions all namespaces with `name`.
        ns: Option<String>,
        /// The annotation name.
        name: String,
    },
    /// All nodes whose `(ns?, name)` value fully matches a pattern.
    RegexValue {
        /// Optional namespace; `None` unions all namespaces with `name`.
        ns: Option<String>,
        /// The annotation name.
        name: String,
        /// The regular expression, matched against the complete value.
        pattern: String,
    },
}

impl NodeSearchSpec {
    /// Convenience constructor for an exact-value search.
    pub fn exact_value(
        ns: Option<&str>,
        name: impl Into<String>,
        val: impl Into<String>,
    ) -> Self {
        Self::ExactValue { ns: ns.map(str::to_string), name: name.into(), val: val.into() }
    }

    /// Convenience constructor for an exact-key search.
    pub fn exact_key(ns: Option<&str>, name: impl Into<String>) -> Self {
        Self::ExactKey { ns: ns.map(str::to_string), name: name.into() }
    }

    /// Convenience constructor for a regex-value search.
    pub fn regex_value(
        ns: Option<&str>,
        name: impl Into<String>,
        pattern: impl Into<String>,
    ) -> Self {
        Self::RegexValue { ns: ns.map(str::to_string), name: name.into(), pattern: pattern.into() }
    }
}

impl fmt::Display for NodeSearchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn qname(f: &mut fmt::Formatter<'_>, ns: &Option<String>, name: &str) -> fmt::Result {
            match ns {
                Some(ns) => write!(f, "{ns}:{name}"),
                None => write!(f, "{name}"),
            }
        }
        match self {
            Self::ExactValue { ns, name, val } => {
                qname(f, ns, name)?;
                write!(f, "=\"{val}\"")
            }
            Self::ExactKey { ns, name } => qname(f, ns, name),
            Self::RegexValue { ns, name, pattern } => {
                qname(f, ns, name)?;
                write!(f, "=/{pattern}/")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_forms() {
        assert_eq!(
            "pos=\"NN\"",
            NodeSearchSpec::exact_value(None, "pos", "NN").to_string()
        );
        assert_eq!("annis:tok", NodeSearchSpec::exact_key(Some("annis"), "tok").to_string());
        assert_eq!(
            "pos=/N.*/",
            NodeSearchSpec::regex_value(None, "pos", "N.*").to_string()
        );
    }
}
