use serde::{Deserialize, Serialize};
use time::Date;
use uuid::Uuid;

use crate::contacts::repo::Contact;

// ISO-8601 calendar date (`YYYY-MM-DD`) serde for `birthday`. `time`'s
// default `Date` serde expects a component struct, not a string; the
// crate enables `time`'s serde/formatting/parsing features for exactly
// this string form (`time::serde::iso8601` only covers `OffsetDateTime`).
time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// Fully-specified contact payload, used for both create and
/// full-replacement update. Every field is overwritten on update;
/// there are no partial-patch semantics.
#[derive(Debug, Clone, Deserialize)]
pub struct ContactData {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    #[serde(with = "iso_date")]
    pub birthday: Date,
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ContactResponse {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    #[serde(with = "iso_date")]
    pub birthday: Date,
    pub note: Option<String>,
}

impl From<Contact> for ContactResponse {
    fn from(c: Contact) -> Self {
        Self {
            id: c.id,
            first_name: c.first_name,
            last_name: c.last_name,
            email: c.email,
            phone_number: c.phone_number,
            birthday: c.birthday,
            note: c.note,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn contact_data_parses_iso_birthday() {
        let body = r#"{
            "first_name": "Test",
            "last_name": "User",
            "email": "test@example.com",
            "phone_number": "123456789",
            "birthday": "2024-04-23",
            "note": null
        }"#;
        let data: ContactData = serde_json::from_str(body).unwrap();
        assert_eq!(data.birthday, date!(2024 - 04 - 23));
        assert!(data.note.is_none());
    }

    #[test]
    fn contact_response_omits_owner() {
        let response = ContactResponse {
            id: Uuid::new_v4(),
            first_name: "Test".into(),
            last_name: "User".into(),
            email: "test@example.com".into(),
            phone_number: "123456789".into(),
            birthday: date!(1990 - 12 - 01),
            note: Some("met at a conference".into()),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("test@example.com"));
        assert!(!json.contains("user_id"));
    }
}
