//! Map directory attributes to a display name.

use serde::{Deserialize, Serialize};

use crate::ldap::{Attributes, local_part};

const GIVEN_NAME: &str = "givenName";
const SURNAME: &str = "sn";
const DISPLAY_NAME: &str = "displayName";
const COMMON_NAME: &str = "cn";

/// Identity as stored locally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedIdentity {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// First value of `name`, matched case-insensitively. Blank values count as
/// missing.
fn first_value<'a>(attributes: &'a Attributes, name: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .and_then(|(_, value)| value.first())
        .filter(|value| !value.trim().is_empty())
}

fn split_full_name(name: &str) -> (String, String) {
    let mut parts = name.split_whitespace();
    let first = parts.next().unwrap_or_default().to_owned();
    let last = parts.collect::<Vec<_>>().join(" ");
    (first, last)
}

fn capitalize(segment: &str) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Derive first and last name, first match wins:
/// `givenName` + `sn`, then `displayName`, then `cn`, then the email
/// local-part (`john.smith` becomes John Smith).
pub fn normalize(attributes: &Attributes, email: &str) -> NormalizedIdentity {
    let (first_name, last_name) = if let (Some(given), Some(surname)) = (
        first_value(attributes, GIVEN_NAME),
        first_value(attributes, SURNAME),
    ) {
        (given.to_owned(), surname.to_owned())
    } else if let Some(name) = first_value(attributes, DISPLAY_NAME)
        .or_else(|| first_value(attributes, COMMON_NAME))
    {
        split_full_name(name)
    } else {
        let local = local_part(email);
        let mut segments = local.split('.');
        match (segments.next(), segments.next()) {
            (Some(first), Some(last)) => (capitalize(first), capitalize(last)),
            _ => (local.to_owned(), String::new()),
        }
    };

    NormalizedIdentity {
        first_name,
        last_name,
        email: email.to_owned(),
    }
}
