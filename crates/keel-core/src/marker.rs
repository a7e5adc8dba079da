use serde::{Deserialize, Serialize};

/// Table names whose presence means the schema already exists.
///
/// Order of first insertion is kept and duplicates are dropped. An empty set
/// disables schema probing entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct MarkerSet {
    tables: Vec<String>,
}

impl MarkerSet {
    pub fn new<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::default();
        for table in tables {
            set.insert(table);
        }
        set
    }

    /// Add a table name. Blank names are ignored.
    pub fn insert(&mut self, table: impl Into<String>) {
        let table = table.into().trim().to_string();
        if !table.is_empty() && !self.tables.contains(&table) {
            self.tables.push(table);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.iter().any(|t| t == table)
    }

    /// Like [`contains`](Self::contains), ignoring ASCII case when `fold_case` is set.
    pub fn matches(&self, table: &str, fold_case: bool) -> bool {
        self.tables.iter().any(|t| {
            if fold_case {
                t.eq_ignore_ascii_case(table)
            } else {
                t == table
            }
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(String::as_str)
    }

    /// Comma-separated list of single-quoted literals for an `IN (...)` clause.
    ///
    /// Only embedded quotes are escaped. Marker names come from trusted
    /// configuration, never from end users.
    pub fn quoted_list(&self) -> String {
        self.tables
            .iter()
            .map(|t| format!("'{}'", t.replace('\'', "''")))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl From<Vec<String>> for MarkerSet {
    fn from(tables: Vec<String>) -> Self {
        Self::new(tables)
    }
}

impl From<MarkerSet> for Vec<String> {
    fn from(set: MarkerSet) -> Self {
        set.tables
    }
}

impl<'a> FromIterator<&'a str> for MarkerSet {
    fn from_iter<T: IntoIterator<Item = &'a str>>(iter: T) -> Self {
        Self::new(iter)
    }
}
