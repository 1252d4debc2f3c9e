//! First-table extraction.
//!
//! Finds the first table a statement reads from or writes to: the identifier
//! after the first `FROM`, `JOIN`, `INTO` or `UPDATE` keyword that is followed
//! by a plain table name. Derived tables (`FROM (SELECT ...)`) are skipped, so
//! the table of the subquery is found instead. Keywords inside string literals
//! are ignored.

use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_till1, take_while1},
    character::complete::{char, multispace1},
    combinator::opt,
    sequence::{delimited, preceded},
    IResult, Parser,
};

/// A possibly schema-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    /// Schema (database) qualifier, if the statement gave one.
    pub schema: Option<String>,
    /// Table name.
    pub table: String,
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{schema}.{}", self.table),
            None => write!(f, "{}", self.table),
        }
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn identifier(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(char('`'), take_till1(|c: char| c == '`'), char('`')),
        take_while1(is_identifier_char),
    ))
    .parse(input)
}

fn table_reference(input: &str) -> IResult<&str, TableRef> {
    let (input, _) = alt((
        tag_no_case("FROM"),
        tag_no_case("JOIN"),
        tag_no_case("INTO"),
        tag_no_case("UPDATE"),
    ))
    .parse(input)?;
    let (input, _) = multispace1.parse(input)?;
    let (input, first) = identifier.parse(input)?;
    let (input, second) = opt(preceded(char('.'), identifier)).parse(input)?;

    let table_ref = match second {
        Some(table) => TableRef {
            schema: Some(first.to_string()),
            table: table.to_string(),
        },
        None => TableRef {
            schema: None,
            table: first.to_string(),
        },
    };
    Ok((input, table_ref))
}

/// Returns the first table referenced by `sql`, if any.
///
/// # Example
///
/// ```
/// use shared::resolve::first_table;
///
/// let table = first_table("SELECT * FROM app.`user` u JOIN team t ON t.id = u.team_id").unwrap();
/// assert_eq!(table.schema.as_deref(), Some("app"));
/// assert_eq!(table.table, "user");
///
/// assert!(first_table("SELECT 1").is_none());
/// ```
#[must_use]
pub fn first_table(sql: &str) -> Option<TableRef> {
    let mut quote: Option<char> = None;
    let mut prev: Option<char> = None;

    for (idx, c) in sql.char_indices() {
        let at_word_start = prev.map_or(true, |p| !is_identifier_char(p) && p != '`');
        prev = Some(c);

        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        if c == '\'' || c == '"' {
            quote = Some(c);
            continue;
        }
        if !at_word_start || !c.is_ascii_alphabetic() {
            continue;
        }
        if let Ok((_, table_ref)) = table_reference(&sql[idx..]) {
            return Some(table_ref);
        }
    }
    None
}
