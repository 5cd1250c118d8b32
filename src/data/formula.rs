//! Formula parsing for model specification.

use crate::error::{Result, SpmError};
use serde::{Deserialize, Serialize};

/// A term in a formula.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Term {
    /// Intercept term (constant).
    Intercept,
    /// Main effect of a single variable (factor or covariate).
    Main(String),
    /// Interaction between two or more variables.
    Interaction(Vec<String>),
}

impl Term {
    fn from_variables(mut variables: Vec<String>) -> Self {
        if variables.len() == 1 {
            Term::Main(variables.remove(0))
        } else {
            Term::Interaction(variables)
        }
    }

    /// Get the variable names involved in this term.
    pub fn variables(&self) -> Vec<&str> {
        match self {
            Term::Intercept => vec![],
            Term::Main(v) => vec![v.as_str()],
            Term::Interaction(vs) => vs.iter().map(|v| v.as_str()).collect(),
        }
    }

    /// Name used to address the term, e.g. `"A x B"` for an interaction.
    pub fn name(&self) -> String {
        self.to_string()
    }

    /// Whether `other` is marginal to (or the same as) this term.
    ///
    /// The intercept is only contained by itself.
    pub fn contains(&self, other: &Term) -> bool {
        match (self, other) {
            (Term::Intercept, Term::Intercept) => true,
            (_, Term::Intercept) | (Term::Intercept, _) => false,
            _ => {
                let mine = self.variables();
                other.variables().iter().all(|v| mine.contains(v))
            }
        }
    }

    fn same_variables(&self, other: &Term) -> bool {
        self.contains(other) && other.contains(self)
    }
}

impl std::fmt::Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Term::Intercept => write!(f, "intercept"),
            Term::Main(v) => write!(f, "{}", v),
            Term::Interaction(vs) => write!(f, "{}", vs.join(" x ")),
        }
    }
}

/// A parsed model formula.
///
/// Supports the usual factorial syntax (a leading `~` is optional):
/// - `A` - intercept + A
/// - `A + B` - intercept + A + B
/// - `A * B` - intercept + A + B + A x B
/// - `A % B` or `A:B` - intercept + the interaction only
///
/// Expansion is hierarchical: `A*B*Y` yields
/// `A, B, A x B, Y, A x Y, B x Y, A x B x Y`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Formula {
    /// Terms in the formula, intercept first.
    pub terms: Vec<Term>,
    /// Original formula string.
    pub formula_str: String,
}

impl Formula {
    /// Parse a formula string.
    ///
    /// # Examples
    /// ```
    /// use composable_spm::data::Formula;
    /// let f = Formula::parse("A*B").unwrap();
    /// assert_eq!(f.term_names(), vec!["intercept", "A", "B", "A x B"]);
    /// ```
    pub fn parse(formula: &str) -> Result<Self> {
        let formula_str = formula.to_string();
        let rhs = formula.trim();
        let rhs = rhs.strip_prefix('~').unwrap_or(rhs).trim();
        if rhs.is_empty() {
            return Err(SpmError::FormulaParse(
                "Formula right-hand side is empty".to_string(),
            ));
        }

        let mut terms = vec![Term::Intercept];
        for term_str in rhs.split('+').map(|s| s.trim()) {
            if term_str.is_empty() {
                return Err(SpmError::FormulaParse(format!(
                    "Empty term in formula '{}'",
                    formula
                )));
            }
            if term_str == "1" {
                continue;
            }
            if term_str == "0" || term_str == "-1" {
                return Err(SpmError::FormulaParse(
                    "Models without intercept are not supported".to_string(),
                ));
            }

            // Each '*' factor is itself a main effect or an interaction
            let mut expanded: Vec<Vec<String>> = Vec::new();
            for factor in term_str.split('*').map(|s| s.trim()) {
                let variables = parse_interaction(factor, term_str)?;
                let mut next = expanded.clone();
                next.push(variables.clone());
                for existing in &expanded {
                    let mut combined = existing.clone();
                    for v in &variables {
                        if !combined.contains(v) {
                            combined.push(v.clone());
                        }
                    }
                    next.push(combined);
                }
                expanded = next;
            }

            for variables in expanded {
                let term = Term::from_variables(variables);
                if !terms.iter().any(|t| t.same_variables(&term)) {
                    terms.push(term);
                }
            }
        }

        if terms.len() == 1 {
            return Err(SpmError::FormulaParse(
                "Formula must have at least one term besides the intercept".to_string(),
            ));
        }

        Ok(Self { terms, formula_str })
    }

    /// Get all variable names used in the formula, sorted.
    pub fn variables(&self) -> Vec<&str> {
        let mut vars: Vec<&str> = self.terms.iter().flat_map(|t| t.variables()).collect();
        vars.sort();
        vars.dedup();
        vars
    }

    /// Names of all terms, intercept first.
    pub fn term_names(&self) -> Vec<String> {
        self.terms.iter().map(|t| t.name()).collect()
    }
}

fn parse_interaction(factor: &str, term_str: &str) -> Result<Vec<String>> {
    let mut variables: Vec<String> = Vec::new();
    for name in factor.split(|c| c == '%' || c == ':').map(|s| s.trim()) {
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(SpmError::FormulaParse(format!(
                "Invalid term: '{}'",
                term_str
            )));
        }
        if variables.iter().any(|v| v == name) {
            return Err(SpmError::FormulaParse(format!(
                "Variable '{}' repeated in interaction '{}'",
                name, term_str
            )));
        }
        variables.push(name.to_string());
    }
    Ok(variables)
}

impl std::fmt::Display for Formula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let term_strs: Vec<String> = self
            .terms
            .iter()
            .filter(|t| **t != Term::Intercept)
            .map(|t| t.variables().join("%"))
            .collect();
        write!(f, "{}", term_strs.join(" + "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let f = Formula::parse("~ A").unwrap();
        assert_eq!(f.terms, vec![Term::Intercept, Term::Main("A".to_string())]);
    }

    #[test]
    fn test_parse_three_way_expansion() {
        let f = Formula::parse("A*B*Y").unwrap();
        assert_eq!(
            f.term_names(),
            vec!["intercept", "A", "B", "A x B", "Y", "A x Y", "B x Y", "A x B x Y"]
        );
    }

    #[test]
    fn test_parse_interaction_only() {
        let f = Formula::parse("A + B + A%B").unwrap();
        assert_eq!(f.term_names(), vec!["intercept", "A", "B", "A x B"]);
        let g = Formula::parse("A:B").unwrap();
        assert_eq!(
            g.terms[1],
            Term::Interaction(vec!["A".to_string(), "B".to_string()])
        );
    }

    #[test]
    fn test_duplicates_collapse() {
        let f = Formula::parse("A*B + B%A + A").unwrap();
        assert_eq!(f.terms.len(), 4);
    }

    #[test]
    fn test_contains() {
        let a = Term::Main("A".to_string());
        let ab = Term::Interaction(vec!["A".to_string(), "B".to_string()]);
        let b = Term::Main("B".to_string());
        assert!(ab.contains(&a));
        assert!(ab.contains(&b));
        assert!(!a.contains(&ab));
        assert!(a.contains(&a));
        assert!(!ab.contains(&Term::Intercept));
        assert!(Term::Intercept.contains(&Term::Intercept));
    }

    #[test]
    fn test_variables() {
        let f = Formula::parse("Y + A*B").unwrap();
        assert_eq!(f.variables(), vec!["A", "B", "Y"]);
    }

    #[test]
    fn test_invalid_formula() {
        assert!(Formula::parse("~").is_err());
        assert!(Formula::parse("A + ").is_err());
        assert!(Formula::parse("A%A").is_err());
        assert!(Formula::parse("0 + A").is_err());
        assert!(Formula::parse("1").is_err());
    }
}
