use time::{Date, Duration};

use crate::contacts::repo::Contact;

/// Contacts whose birthday falls within [today, today + 7 days], inclusive
/// at both ends. The birthday's year (often a placeholder) is replaced with
/// the current year before comparing; a window reaching past December 31
/// does not wrap into January of the next year. A Feb 29 birthday projected
/// into a non-leap year fails date construction and propagates.
pub fn within_next_week(contacts: Vec<Contact>, today: Date) -> anyhow::Result<Vec<Contact>> {
    let horizon = today + Duration::days(7);
    let mut upcoming = Vec::new();
    for contact in contacts {
        let candidate =
            Date::from_calendar_date(today.year(), contact.birthday.month(), contact.birthday.day())?;
        if today <= candidate && candidate <= horizon {
            upcoming.push(contact);
        }
    }
    Ok(upcoming)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;
    use uuid::Uuid;

    fn contact(birthday: Date) -> Contact {
        Contact {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            first_name: "Test".into(),
            last_name: "User".into(),
            email: format!("{}@example.com", Uuid::new_v4()),
            phone_number: "123456789".into(),
            birthday,
            note: None,
        }
    }

    #[test]
    fn window_is_inclusive_at_both_ends() {
        let today = date!(2024 - 04 - 20);
        let contacts = vec![
            contact(date!(2024 - 04 - 20)),
            contact(date!(2024 - 04 - 27)),
            contact(date!(2024 - 04 - 28)),
        ];

        let upcoming = within_next_week(contacts, today).unwrap();

        assert_eq!(upcoming.len(), 2);
        assert_eq!(upcoming[0].birthday, date!(2024 - 04 - 20));
        assert_eq!(upcoming[1].birthday, date!(2024 - 04 - 27));
    }

    #[test]
    fn birthday_year_is_a_placeholder() {
        let today = date!(2024 - 04 - 20);
        let contacts = vec![contact(date!(1985 - 04 - 22)), contact(date!(1990 - 06 - 01))];

        let upcoming = within_next_week(contacts, today).unwrap();

        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].birthday, date!(1985 - 04 - 22));
    }

    #[test]
    fn yesterday_does_not_match() {
        let today = date!(2024 - 04 - 20);
        let upcoming =
            within_next_week(vec![contact(date!(1985 - 04 - 19))], today).unwrap();
        assert!(upcoming.is_empty());
    }

    #[test]
    fn december_window_does_not_wrap_into_january() {
        // Year substitution places a January anniversary in the past once
        // the window straddles New Year.
        let today = date!(2024 - 12 - 28);
        let contacts = vec![contact(date!(1991 - 01 - 02)), contact(date!(1991 - 12 - 30))];

        let upcoming = within_next_week(contacts, today).unwrap();

        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].birthday, date!(1991 - 12 - 30));
    }

    #[test]
    fn leap_day_in_a_non_leap_year_errors() {
        let today = date!(2023 - 02 - 25);
        let result = within_next_week(vec![contact(date!(2000 - 02 - 29))], today);
        assert!(result.is_err());
    }

    #[test]
    fn preserves_input_order() {
        let today = date!(2024 - 04 - 20);
        let contacts = vec![
            contact(date!(2024 - 04 - 25)),
            contact(date!(2024 - 04 - 21)),
            contact(date!(2024 - 04 - 23)),
        ];

        let upcoming = within_next_week(contacts.clone(), today).unwrap();

        let expected: Vec<Date> = contacts.iter().map(|c| c.birthday).collect();
        let got: Vec<Date> = upcoming.iter().map(|c| c.birthday).collect();
        assert_eq!(got, expected);
    }
}
