//! Record to row conversion.

use crate::core::Row;
use crate::schema::Record;

/// Convert validated records into rows the writer accepts.
///
/// Count and order are preserved; the column order of each row is the
/// column order of its target table.
pub fn transform(records: Vec<Record>) -> Vec<Row> {
    records.into_iter().map(to_row).collect()
}

/// Convert one record.
pub fn to_row(record: Record) -> Row {
    match record {
        Record::FilmWork(r) => Row::with_capacity(11)
            .with("id", r.id)
            .with("title", r.title)
            .with("description", r.description)
            .with("creation_date", r.creation_date)
            .with("certificate", r.certificate)
            .with("file_path", r.file_path)
            .with("rating", r.rating)
            .with("type", r.r#type)
            .with("subscription_required", r.subscription_required)
            .with("created_at", r.created_at)
            .with("updated_at", r.updated_at),
        Record::Genre(r) => Row::with_capacity(5)
            .with("id", r.id)
            .with("name", r.name)
            .with("description", r.description)
            .with("created_at", r.created_at)
            .with("updated_at", r.updated_at),
        Record::Person(r) => Row::with_capacity(5)
            .with("id", r.id)
            .with("full_name", r.full_name)
            .with("birth_date", r.birth_date)
            .with("created_at", r.created_at)
            .with("updated_at", r.updated_at),
        Record::GenreFilmWork(r) => Row::with_capacity(4)
            .with("id", r.id)
            .with("film_work_id", r.film_work_id)
            .with("genre_id", r.genre_id)
            .with("created_at", r.created_at),
        Record::PersonFilmWork(r) => Row::with_capacity(5)
            .with("id", r.id)
            .with("film_work_id", r.film_work_id)
            .with("person_id", r.person_id)
            .with("role", r.role)
            .with("created_at", r.created_at),
    }
}
