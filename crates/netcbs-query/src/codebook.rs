//! The POPNET codebook: contexts, relationship codes and their descriptions.
//!
//! The codebook is static reference data. It is built once on first access
//! and exposed read-only through [`Codebook::global`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;

use crate::error::QueryError;

/// Integer tag classifying the type of a link within a context.
pub type RelationCode = u32;

/// A relationship context: one POPNET network table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Context {
    /// Family relations (parents, siblings, partners, in-laws, ...).
    Family,
    /// People working at the same employer.
    Colleagues,
    /// Nearby addresses.
    Neighbors,
    /// Classmates at every level of education.
    Schoolmates,
    /// People sharing an address.
    Housemates,
}

impl Context {
    /// Every context, in codebook order.
    pub const ALL: [Context; 5] = [
        Context::Family,
        Context::Colleagues,
        Context::Neighbors,
        Context::Schoolmates,
        Context::Housemates,
    ];

    /// Name used in queries.
    pub fn name(self) -> &'static str {
        match self {
            Context::Family => "Family",
            Context::Colleagues => "Colleagues",
            Context::Neighbors => "Neighbors",
            Context::Schoolmates => "Schoolmates",
            Context::Housemates => "Housemates",
        }
    }

    /// Directory holding this context's versioned network tables.
    pub fn table_name(self) -> &'static str {
        match self {
            Context::Family => "FAMILIENETWERKTAB",
            Context::Colleagues => "COLLEGANETWERKTAB",
            Context::Neighbors => "BURENNETWERKTAB",
            Context::Schoolmates => "KLASGENOTENNETWERKTAB",
            Context::Housemates => "HUISGENOTENNETWERKTAB",
        }
    }

    /// Looks up a context by its query name (exact match).
    pub fn from_name(name: &str) -> Option<Context> {
        Context::ALL.into_iter().find(|c| c.name() == name)
    }

    /// Valid relationship codes for this context.
    pub fn codes(self) -> &'static BTreeSet<RelationCode> {
        Codebook::global().codes(self)
    }

    pub(crate) fn known_names() -> String {
        Context::ALL
            .iter()
            .map(|c| c.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Context {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Context::from_name(s.trim()).ok_or_else(|| QueryError::UnknownContext {
            name: s.trim().to_string(),
        })
    }
}

/// Code → description table.
pub const CODE_DESCRIPTIONS: &[(RelationCode, &str)] = &[
    (101, "Neighbor - 10 closest addresses"),
    (102, "Neighborhood acquaintance - 20 random neighbors within 200 meters"),
    (201, "Colleague"),
    (301, "Parent"),
    (302, "Co-parent"),
    (303, "Grandparent"),
    (304, "Child"),
    (305, "Grandchild"),
    (306, "Full sibling"),
    (307, "Half sibling"),
    (308, "Unknown sibling"),
    (309, "Cousin"),
    (310, "Nephew/Niece"),
    (311, "Aunt/Uncle"),
    (312, "Partner - married"),
    (313, "Partner - not married"),
    (314, "Parent-in-law"),
    (315, "Child-in-law"),
    (316, "Sibling-in-law"),
    (317, "Stepparent"),
    (318, "Stepchild"),
    (319, "Stepsibling"),
    (320, "Married full cousin"),
    (321, "Married cousin"),
    (322, "Married aunt/uncle"),
    (401, "Housemate"),
    (402, "Housemate - institution"),
    (501, "Classmate primary education"),
    (502, "Classmate special education"),
    (503, "Classmate secondary education"),
    (504, "Classmate vocational education"),
    (505, "Classmate higher professional education"),
    (506, "Classmate university education"),
];

/// Context → valid code table.
pub const CONTEXT_CODES: &[(Context, &[RelationCode])] = &[
    (
        Context::Family,
        &[
            301, 302, 303, 304, 305, 306, 307, 308, 309, 310, 311, 312, 313, 314, 315, 316, 317,
            318, 319, 320, 321, 322,
        ],
    ),
    (Context::Colleagues, &[201]),
    (Context::Neighbors, &[101, 102]),
    (Context::Schoolmates, &[501, 502, 503, 504, 505, 506]),
    (Context::Housemates, &[401, 402]),
];

static GLOBAL: Lazy<Codebook> = Lazy::new(Codebook::build);

/// Read-only lookup structure over [`CONTEXT_CODES`] and [`CODE_DESCRIPTIONS`].
#[derive(Debug)]
pub struct Codebook {
    by_context: BTreeMap<Context, BTreeSet<RelationCode>>,
    descriptions: BTreeMap<RelationCode, &'static str>,
}

impl Codebook {
    /// The process-wide codebook.
    pub fn global() -> &'static Codebook {
        &GLOBAL
    }

    fn build() -> Self {
        let by_context = CONTEXT_CODES
            .iter()
            .map(|(context, codes)| (*context, codes.iter().copied().collect()))
            .collect();
        let descriptions = CODE_DESCRIPTIONS.iter().copied().collect();
        Self {
            by_context,
            descriptions,
        }
    }

    /// Valid codes for a context.
    pub fn codes(&self, context: Context) -> &BTreeSet<RelationCode> {
        // Every context has an entry in CONTEXT_CODES.
        &self.by_context[&context]
    }

    /// Returns true if `code` is valid for `context`.
    pub fn contains(&self, context: Context, code: RelationCode) -> bool {
        self.codes(context).contains(&code)
    }

    /// Human-readable description of a code.
    pub fn describe(&self, code: RelationCode) -> Option<&'static str> {
        self.descriptions.get(&code).copied()
    }

    /// The context a code belongs to.
    pub fn context_of(&self, code: RelationCode) -> Option<Context> {
        self.by_context
            .iter()
            .find(|(_, codes)| codes.contains(&code))
            .map(|(context, _)| *context)
    }

    /// Iterates over all `(code, description)` pairs in code order.
    pub fn descriptions(&self) -> impl Iterator<Item = (RelationCode, &'static str)> + '_ {
        self.descriptions.iter().map(|(code, desc)| (*code, *desc))
    }
}

/// Shorthand for `Codebook::global().describe(code)`.
pub fn describe_code(code: RelationCode) -> Option<&'static str> {
    Codebook::global().describe(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_context_has_codes() {
        for context in Context::ALL {
            assert!(!context.codes().is_empty(), "{context} has no codes");
        }
    }

    #[test]
    fn test_family_codes_range() {
        let codes = Context::Family.codes();
        assert_eq!(codes.len(), 22);
        assert_eq!(codes.first(), Some(&301));
        assert_eq!(codes.last(), Some(&322));
    }

    #[test]
    fn test_every_code_has_description() {
        let book = Codebook::global();
        for (_, codes) in CONTEXT_CODES {
            for code in codes.iter() {
                assert!(book.describe(*code).is_some(), "code {code} undocumented");
            }
        }
        assert_eq!(book.descriptions().count(), CODE_DESCRIPTIONS.len());
    }

    #[test]
    fn test_context_of() {
        let book = Codebook::global();
        assert_eq!(book.context_of(201), Some(Context::Colleagues));
        assert_eq!(book.context_of(402), Some(Context::Housemates));
        assert_eq!(book.context_of(999), None);
    }

    #[test]
    fn test_describe_code() {
        assert_eq!(describe_code(301), Some("Parent"));
        assert_eq!(describe_code(101), Some("Neighbor - 10 closest addresses"));
        assert_eq!(describe_code(0), None);
    }

    #[test]
    fn test_context_from_str() {
        assert_eq!("Schoolmates".parse::<Context>(), Ok(Context::Schoolmates));
        assert_eq!(" Family ".parse::<Context>(), Ok(Context::Family));
        assert!(matches!(
            "family".parse::<Context>(),
            Err(QueryError::UnknownContext { .. })
        ));
    }

    #[test]
    fn test_table_names() {
        assert_eq!(Context::Family.table_name(), "FAMILIENETWERKTAB");
        assert_eq!(Context::Schoolmates.table_name(), "KLASGENOTENNETWERKTAB");
    }
}
