//! Table names and a small filter builder for the REST backend.

use serde_json::Value;

/// Backend tables the client reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Agenda,
    AgendaSection,
    AgendaElement,
    AgendaMember,
    AgendaEditor,
    AgendaComment,
    CompletedElement,
    UrgentElement,
    Profile,
    ProfileComment,
    Reaction,
    UserCredit,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Agenda => "agendas",
            Table::AgendaSection => "agenda_sections",
            Table::AgendaElement => "agenda_elements",
            Table::AgendaMember => "agenda_members",
            Table::AgendaEditor => "agenda_editors",
            Table::AgendaComment => "agenda_comments",
            Table::CompletedElement => "completed_elements",
            Table::UrgentElement => "urgent_elements",
            Table::Profile => "profiles",
            Table::ProfileComment => "profile_comments",
            Table::Reaction => "reactions",
            Table::UserCredit => "user_credits",
        }
    }

    /// Columns that identify a row for upserts.
    pub fn conflict_columns(&self) -> &'static str {
        match self {
            Table::AgendaMember | Table::AgendaEditor => "agenda_id,user_id",
            Table::CompletedElement | Table::UrgentElement => "user_id,element_id",
            Table::UserCredit => "user_id",
            _ => "id",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, String),
    In(String, Vec<String>),
}

impl Filter {
    pub fn column(&self) -> &str {
        match self {
            Filter::Eq(col, _) | Filter::In(col, _) => col,
        }
    }

    /// Whether a JSON row satisfies this filter. Values compare as strings.
    pub fn matches(&self, row: &Value) -> bool {
        let cell = match row.get(self.column()) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => return false,
            Some(other) => other.to_string(),
        };
        match self {
            Filter::Eq(_, value) => &cell == value,
            Filter::In(_, values) => values.iter().any(|v| *v == cell),
        }
    }

    fn to_param(&self) -> (String, String) {
        match self {
            Filter::Eq(col, value) => (col.clone(), format!("eq.{}", value)),
            Filter::In(col, values) => {
                let quoted: Vec<String> = values
                    .iter()
                    .map(|v| format!("\"{}\"", v.replace('"', "\\\"")))
                    .collect();
                (col.clone(), format!("in.({})", quoted.join(",")))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// Column selection, filters and ordering for one request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    columns: Option<String>,
    filters: Vec<Filter>,
    order: Option<Order>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.columns = Some(columns.to_string());
        self
    }

    pub fn eq(mut self, column: &str, value: impl Into<String>) -> Self {
        self.filters.push(Filter::Eq(column.to_string(), value.into()));
        self
    }

    pub fn in_list<I, S>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters.push(Filter::In(
            column.to_string(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn ordering(&self) -> Option<&Order> {
        self.order.as_ref()
    }

    /// True when an `in` filter has no values, so no row can match.
    pub fn is_empty_match(&self) -> bool {
        self.filters
            .iter()
            .any(|f| matches!(f, Filter::In(_, values) if values.is_empty()))
    }

    pub fn matches(&self, row: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }

    /// Query string pairs in PostgREST syntax.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::with_capacity(self.filters.len() + 2);
        if let Some(ref columns) = self.columns {
            params.push(("select".to_string(), columns.clone()));
        }
        params.extend(self.filters.iter().map(Filter::to_param));
        if let Some(ref order) = self.order {
            let direction = if order.ascending { "asc" } else { "desc" };
            params.push((
                "order".to_string(),
                format!("{}.{}.nullslast", order.column, direction),
            ));
        }
        params
    }
}
