use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::Date;
use uuid::Uuid;

use crate::contacts::dto::ContactData;

/// Contact record. Every query below carries the owner predicate; a contact
/// id belonging to another user behaves exactly like a missing row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Contact {
    pub id: Uuid,
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub birthday: Date,
    pub note: Option<String>,
}

pub async fn create(db: &PgPool, user_id: Uuid, data: &ContactData) -> anyhow::Result<Contact> {
    let contact = sqlx::query_as::<_, Contact>(
        r#"
        INSERT INTO contacts (user_id, first_name, last_name, email, phone_number, birthday, note)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id, user_id, first_name, last_name, email, phone_number, birthday, note
        "#,
    )
    .bind(user_id)
    .bind(&data.first_name)
    .bind(&data.last_name)
    .bind(&data.email)
    .bind(&data.phone_number)
    .bind(data.birthday)
    .bind(&data.note)
    .fetch_one(db)
    .await?;
    Ok(contact)
}

pub async fn list_by_user(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<Contact>> {
    let rows = sqlx::query_as::<_, Contact>(
        r#"
        SELECT id, user_id, first_name, last_name, email, phone_number, birthday, note
        FROM contacts
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn get_by_id(
    db: &PgPool,
    user_id: Uuid,
    contact_id: Uuid,
) -> anyhow::Result<Option<Contact>> {
    let contact = sqlx::query_as::<_, Contact>(
        r#"
        SELECT id, user_id, first_name, last_name, email, phone_number, birthday, note
        FROM contacts
        WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(contact_id)
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    Ok(contact)
}

/// Full replacement: every field comes from the input struct. Returns None
/// when no row matches the (id, owner) pair.
pub async fn update(
    db: &PgPool,
    user_id: Uuid,
    contact_id: Uuid,
    data: &ContactData,
) -> anyhow::Result<Option<Contact>> {
    let contact = sqlx::query_as::<_, Contact>(
        r#"
        UPDATE contacts
        SET first_name = $3, last_name = $4, email = $5, phone_number = $6, birthday = $7, note = $8
        WHERE id = $1 AND user_id = $2
        RETURNING id, user_id, first_name, last_name, email, phone_number, birthday, note
        "#,
    )
    .bind(contact_id)
    .bind(user_id)
    .bind(&data.first_name)
    .bind(&data.last_name)
    .bind(&data.email)
    .bind(&data.phone_number)
    .bind(data.birthday)
    .bind(&data.note)
    .fetch_optional(db)
    .await?;
    Ok(contact)
}

/// Silent no-op when the (id, owner) pair does not match.
pub async fn delete(db: &PgPool, user_id: Uuid, contact_id: Uuid) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM contacts WHERE id = $1 AND user_id = $2")
        .bind(contact_id)
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(())
}

/// The query is lower-cased before matching; ILIKE takes care of the
/// stored side.
fn like_pattern(query: &str) -> String {
    format!("%{}%", query.to_lowercase())
}

/// Case-insensitive substring match on first name, last name or email.
pub async fn search(db: &PgPool, user_id: Uuid, query: &str) -> anyhow::Result<Vec<Contact>> {
    let pattern = like_pattern(query);
    let rows = sqlx::query_as::<_, Contact>(
        r#"
        SELECT id, user_id, first_name, last_name, email, phone_number, birthday, note
        FROM contacts
        WHERE user_id = $1
          AND (first_name ILIKE $2 OR last_name ILIKE $2 OR email ILIKE $2)
        "#,
    )
    .bind(user_id)
    .bind(pattern)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_pattern_is_lowercased_substring() {
        assert_eq!(like_pattern("Test"), "%test%");
        assert_eq!(like_pattern("ANNA"), "%anna%");
        assert_eq!(like_pattern(""), "%%");
    }
}
