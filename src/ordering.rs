use crate::schema::Entity;

/// One `ORDER BY` term resolved against an entity's columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
    pub column: &'static str,
    pub descending: bool,
}

/// Resolve `?ordering=name,-id` against `entity`.
///
/// Unknown and write-only fields are dropped. When nothing valid remains the
/// default `-id` applies. `-id` is always appended as the final tie-breaker.
pub fn parse_ordering(entity: &Entity, raw: Option<&str>) -> Vec<OrderTerm> {
    let mut terms: Vec<OrderTerm> = Vec::new();
    for token in raw.unwrap_or_default().split(',') {
        let token = token.trim();
        let (name, descending) = match token.strip_prefix('-') {
            Some(rest) => (rest, true),
            None => (token, false),
        };
        let Some(field) = entity.field(name) else {
            continue;
        };
        if field.is_write_only() || terms.iter().any(|t| t.column == field.column) {
            continue;
        }
        terms.push(OrderTerm {
            column: field.column,
            descending,
        });
    }
    if !terms.iter().any(|t| t.column == "id") {
        terms.push(OrderTerm {
            column: "id",
            descending: true,
        });
    }
    terms
}

pub fn order_by_clause(terms: &[OrderTerm]) -> String {
    terms
        .iter()
        .map(|t| format!("{} {}", t.column, if t.descending { "DESC" } else { "ASC" }))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::entities::{CITY, EMPLOYEE};

    #[test]
    fn defaults_to_descending_id() {
        let terms = parse_ordering(&CITY, None);
        assert_eq!(
            terms,
            vec![OrderTerm {
                column: "id",
                descending: true
            }]
        );
        assert_eq!(order_by_clause(&terms), "id DESC");
    }

    #[test]
    fn maps_field_names_to_columns() {
        let terms = parse_ordering(&CITY, Some("-state,name"));
        assert_eq!(order_by_clause(&terms), "id_state DESC, name ASC, id DESC");
    }

    #[test]
    fn drops_unknown_and_write_only_terms() {
        let terms = parse_ordering(&EMPLOYEE, Some("password,bogus,,-salary"));
        assert_eq!(order_by_clause(&terms), "salary DESC, id DESC");
    }

    #[test]
    fn explicit_id_replaces_the_tie_breaker() {
        let terms = parse_ordering(&CITY, Some("id"));
        assert_eq!(order_by_clause(&terms), "id ASC");
    }
}
