//! Version constraint language: whitespace/comma-separated tokens of
//! `>=`, `>`, `<=`, `<`, `==`, or a bare version (exact match). All tokens
//! must hold for the constraint to be satisfied (`SPEC_FULL.md` §4.2).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Ge,
    Gt,
    Le,
    Lt,
    Eq,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Clause {
    op: Op,
    version: Vec<u64>,
}

/// A parsed, ready-to-evaluate version constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    clauses: Vec<Clause>,
}

/// Parse `major.minor.patch`-style dotted numeric tuples. Missing trailing
/// components are treated as 0. Non-numeric components are rejected.
fn parse_version(raw: &str) -> Option<Vec<u64>> {
    raw.split('.')
        .map(|part| part.trim().parse::<u64>().ok())
        .collect()
}

impl VersionConstraint {
    /// Parse a constraint string. Returns `None` on any malformed token or
    /// unparseable version component — callers treat this conservatively
    /// as "incompatible" (`SPEC_FULL.md` §4.2).
    pub fn parse(raw: &str) -> Option<Self> {
        let tokens: Vec<&str> = raw
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
            .collect();
        if tokens.is_empty() {
            return Some(Self { clauses: Vec::new() });
        }
        let mut clauses = Vec::with_capacity(tokens.len());
        for token in tokens {
            let (op, rest) = if let Some(r) = token.strip_prefix(">=") {
                (Op::Ge, r)
            } else if let Some(r) = token.strip_prefix("<=") {
                (Op::Le, r)
            } else if let Some(r) = token.strip_prefix("==") {
                (Op::Eq, r)
            } else if let Some(r) = token.strip_prefix('>') {
                (Op::Gt, r)
            } else if let Some(r) = token.strip_prefix('<') {
                (Op::Lt, r)
            } else {
                (Op::Eq, token)
            };
            let version = parse_version(rest)?;
            clauses.push(Clause { op, version });
        }
        Some(Self { clauses })
    }

    /// Whether `candidate` (a dotted version string) satisfies every clause.
    pub fn matches(&self, candidate: &str) -> bool {
        let Some(candidate) = parse_version(candidate) else {
            return false;
        };
        self.clauses.iter().all(|clause| {
            let ord = compare(&candidate, &clause.version);
            match clause.op {
                Op::Ge => ord != std::cmp::Ordering::Less,
                Op::Gt => ord == std::cmp::Ordering::Greater,
                Op::Le => ord != std::cmp::Ordering::Greater,
                Op::Lt => ord == std::cmp::Ordering::Less,
                Op::Eq => ord == std::cmp::Ordering::Equal,
            }
        })
    }
}

/// Compare two dotted version tuples, padding the shorter with zeros.
fn compare(a: &[u64], b: &[u64]) -> std::cmp::Ordering {
    let len = a.len().max(b.len());
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            std::cmp::Ordering::Equal => continue,
            other => return other,
        }
    }
    std::cmp::Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_version_is_exact_match() {
        let c = VersionConstraint::parse("1.2.0").unwrap();
        assert!(c.matches("1.2.0"));
        assert!(!c.matches("1.2.1"));
    }

    #[test]
    fn missing_components_treated_as_zero() {
        let c = VersionConstraint::parse("1.2").unwrap();
        assert!(c.matches("1.2.0"));
        assert!(!c.matches("1.2.1"));
    }

    #[test]
    fn ge_and_lt_combine_as_range() {
        let c = VersionConstraint::parse(">=1.0.0, <2.0.0").unwrap();
        assert!(c.matches("1.5.3"));
        assert!(!c.matches("2.0.0"));
        assert!(!c.matches("0.9.9"));
    }

    #[test]
    fn whitespace_separated_tokens_also_combine() {
        let c = VersionConstraint::parse(">=1.0.0 <=1.9.9").unwrap();
        assert!(c.matches("1.9.9"));
        assert!(!c.matches("2.0.0"));
    }

    #[test]
    fn non_numeric_component_fails_to_parse() {
        assert!(VersionConstraint::parse(">=1.x.0").is_none());
    }

    #[test]
    fn empty_constraint_matches_everything() {
        let c = VersionConstraint::parse("").unwrap();
        assert!(c.matches("0.0.1"));
    }
}
