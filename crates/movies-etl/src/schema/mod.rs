//! Record schemas: one typed shape per table.
//!
//! [`Record::from_raw`] validates a source row and normalises its values.
//! Optional columns may be absent or null; `film_work.rating` defaults to
//! `0.0` when the column is absent altogether.

pub mod fields;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::core::TableName;
use crate::error::ValidationError;
use crate::source::RawRow;
use fields::{boolean, date, float, text, timestamp, uuid, Fields};

/// Rating used when the source row has no rating column.
pub const DEFAULT_RATING: f64 = 0.0;

#[derive(Debug, Clone, PartialEq)]
pub struct FilmWork {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub creation_date: Option<NaiveDate>,
    pub certificate: Option<String>,
    pub file_path: Option<String>,
    pub rating: Option<f64>,
    pub r#type: Option<String>,
    pub subscription_required: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Genre {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub id: Uuid,
    pub full_name: String,
    pub birth_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenreFilmWork {
    pub id: Uuid,
    pub film_work_id: Uuid,
    pub genre_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersonFilmWork {
    pub id: Uuid,
    pub film_work_id: Uuid,
    pub person_id: Uuid,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

/// A validated row of one of the five tables.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    FilmWork(FilmWork),
    Genre(Genre),
    Person(Person),
    GenreFilmWork(GenreFilmWork),
    PersonFilmWork(PersonFilmWork),
}

impl Record {
    /// Validate a raw source row against the schema of `table`.
    pub fn from_raw(table: TableName, raw: &RawRow) -> Result<Record, ValidationError> {
        let f = Fields::new(table, raw);
        let record = match table {
            TableName::FilmWork => {
                let rating = if f.has("rating") {
                    f.optional("rating", float)?
                } else {
                    Some(DEFAULT_RATING)
                };
                Record::FilmWork(FilmWork {
                    id: f.required("id", uuid)?,
                    title: f.required("title", text)?,
                    description: f.optional("description", text)?,
                    creation_date: f.optional("creation_date", date)?,
                    certificate: f.optional("certificate", text)?,
                    file_path: f.optional("file_path", text)?,
                    rating,
                    r#type: f.optional("type", text)?,
                    subscription_required: f.required("subscription_required", boolean)?,
                    created_at: f.required("created_at", timestamp)?,
                    updated_at: f.required("updated_at", timestamp)?,
                })
            }
            TableName::Genre => Record::Genre(Genre {
                id: f.required("id", uuid)?,
                name: f.required("name", text)?,
                description: f.optional("description", text)?,
                created_at: f.required("created_at", timestamp)?,
                updated_at: f.required("updated_at", timestamp)?,
            }),
            TableName::Person => Record::Person(Person {
                id: f.required("id", uuid)?,
                full_name: f.required("full_name", text)?,
                birth_date: f.optional("birth_date", date)?,
                created_at: f.required("created_at", timestamp)?,
                updated_at: f.required("updated_at", timestamp)?,
            }),
            TableName::GenreFilmWork => Record::GenreFilmWork(GenreFilmWork {
                id: f.required("id", uuid)?,
                film_work_id: f.required("film_work_id", uuid)?,
                genre_id: f.required("genre_id", uuid)?,
                created_at: f.required("created_at", timestamp)?,
            }),
            TableName::PersonFilmWork => Record::PersonFilmWork(PersonFilmWork {
                id: f.required("id", uuid)?,
                film_work_id: f.required("film_work_id", uuid)?,
                person_id: f.required("person_id", uuid)?,
                role: f.required("role", text)?,
                created_at: f.required("created_at", timestamp)?,
            }),
        };
        Ok(record)
    }

    pub fn table(&self) -> TableName {
        match self {
            Record::FilmWork(_) => TableName::FilmWork,
            Record::Genre(_) => TableName::Genre,
            Record::Person(_) => TableName::Person,
            Record::GenreFilmWork(_) => TableName::GenreFilmWork,
            Record::PersonFilmWork(_) => TableName::PersonFilmWork,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Record::FilmWork(r) => r.id,
            Record::Genre(r) => r.id,
            Record::Person(r) => r.id,
            Record::GenreFilmWork(r) => r.id,
            Record::PersonFilmWork(r) => r.id,
        }
    }
}
