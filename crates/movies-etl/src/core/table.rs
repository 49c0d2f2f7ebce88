//! The closed set of tables and the foreign keys between them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EtlError;

/// Column every foreign key points at.
pub const REFERENCED_COLUMN: &str = "id";

/// One of the five tables of the movies catalogue.
///
/// The same name identifies the source table, the target table and the
/// record schema used to validate its rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableName {
    FilmWork,
    Genre,
    Person,
    GenreFilmWork,
    PersonFilmWork,
}

impl TableName {
    /// Every table, each processed exactly once per run.
    pub const ALL: [TableName; 5] = [
        TableName::FilmWork,
        TableName::Genre,
        TableName::Person,
        TableName::GenreFilmWork,
        TableName::PersonFilmWork,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TableName::FilmWork => "film_work",
            TableName::Genre => "genre",
            TableName::Person => "person",
            TableName::GenreFilmWork => "genre_film_work",
            TableName::PersonFilmWork => "person_film_work",
        }
    }

    /// Many-to-many tables that carry foreign keys.
    pub fn is_link_table(&self) -> bool {
        matches!(self, TableName::GenreFilmWork | TableName::PersonFilmWork)
    }

    /// Foreign keys installed on this table after load, in installation order.
    ///
    /// The film-work reference always comes first and cascades on delete; the
    /// secondary reference does not.
    pub fn foreign_keys(&self) -> Vec<ForeignKeySpec> {
        let secondary = match self {
            TableName::GenreFilmWork => (TableName::Genre, "genre_id"),
            TableName::PersonFilmWork => (TableName::Person, "person_id"),
            _ => return Vec::new(),
        };

        vec![
            ForeignKeySpec::new(*self, TableName::FilmWork, "film_work_id", OnDelete::Cascade),
            ForeignKeySpec::new(*self, secondary.0, secondary.1, OnDelete::NoAction),
        ]
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TableName {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TableName::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| EtlError::Config(format!("Unknown table '{}'", s)))
    }
}

/// Referential action when the referenced row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDelete {
    Cascade,
    NoAction,
}

impl OnDelete {
    /// SQL clause appended to the constraint definition.
    pub fn as_sql(&self) -> &'static str {
        match self {
            OnDelete::Cascade => " ON DELETE CASCADE",
            OnDelete::NoAction => "",
        }
    }
}

/// A foreign key to install once every table has been loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKeySpec {
    /// Table receiving the constraint.
    pub table: TableName,
    /// Table whose `id` column is referenced.
    pub references: TableName,
    /// Constrained column on `table`.
    pub column: &'static str,
    /// Constraint name, derived from `column`.
    pub name: String,
    pub on_delete: OnDelete,
}

impl ForeignKeySpec {
    pub fn new(
        table: TableName,
        references: TableName,
        column: &'static str,
        on_delete: OnDelete,
    ) -> Self {
        Self {
            table,
            references,
            column,
            name: constraint_name(column),
            on_delete,
        }
    }
}

/// Constraint name for a foreign key on `column`.
pub fn constraint_name(column: &str) -> String {
    format!("fk_{}", column)
}

/// All foreign keys of the catalogue, in installation order.
pub fn foreign_key_plan() -> Vec<ForeignKeySpec> {
    TableName::ALL
        .iter()
        .flat_map(|t| t.foreign_keys())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_names_round_trip_through_str() {
        for table in TableName::ALL {
            assert_eq!(table.as_str().parse::<TableName>().unwrap(), table);
        }
        assert!("films".parse::<TableName>().is_err());
    }

    #[test]
    fn test_constraint_name() {
        assert_eq!(constraint_name("film_work_id"), "fk_film_work_id");
        assert_eq!(constraint_name("person_id"), "fk_person_id");
    }

    #[test]
    fn test_only_link_tables_have_foreign_keys() {
        assert!(TableName::FilmWork.foreign_keys().is_empty());
        assert!(TableName::Genre.foreign_keys().is_empty());
        assert!(TableName::Person.foreign_keys().is_empty());
        assert_eq!(TableName::GenreFilmWork.foreign_keys().len(), 2);
        assert_eq!(TableName::PersonFilmWork.foreign_keys().len(), 2);
    }

    #[test]
    fn test_foreign_key_plan_order() {
        let plan = foreign_key_plan();
        let summary: Vec<_> = plan
            .iter()
            .map(|fk| (fk.table, fk.references, fk.column, fk.on_delete))
            .collect();

        assert_eq!(
            summary,
            vec![
                (TableName::GenreFilmWork, TableName::FilmWork, "film_work_id", OnDelete::Cascade),
                (TableName::GenreFilmWork, TableName::Genre, "genre_id", OnDelete::NoAction),
                (TableName::PersonFilmWork, TableName::FilmWork, "film_work_id", OnDelete::Cascade),
                (TableName::PersonFilmWork, TableName::Person, "person_id", OnDelete::NoAction),
            ]
        );
        assert_eq!(plan[3].name, "fk_person_id");
    }

    #[test]
    fn test_table_name_serde() {
        let json = serde_json::to_string(&TableName::PersonFilmWork).unwrap();
        assert_eq!(json, "\"person_film_work\"");
    }
}
