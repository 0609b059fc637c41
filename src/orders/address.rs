use serde::{Deserialize, Serialize};

/// A complete postal address stored on an order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub recipient: Option<String>,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: Option<String>,
    pub postal_code: String,
    pub country: String,
    pub phone: Option<String>,
}

/// Partial address as supplied by callers
///
/// Every field is optional. Missing, null or blank fields never overwrite an
/// existing value when merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressInput {
    pub recipient: Option<String>,
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
}

/// Trim a supplied value, treating blank strings as absent
fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl AddressInput {
    /// True when no field carries a usable value
    pub fn is_empty(&self) -> bool {
        [
            &self.recipient,
            &self.line1,
            &self.line2,
            &self.city,
            &self.state,
            &self.postal_code,
            &self.country,
            &self.phone,
        ]
        .iter()
        .all(|field| present(field).is_none())
    }
}

impl Address {
    /// Build a complete address from a partial one
    ///
    /// Returns `None` unless line1, city, postal code and country are all present.
    pub fn from_input(input: &AddressInput) -> Option<Address> {
        Some(Address {
            recipient: present(&input.recipient),
            line1: present(&input.line1)?,
            line2: present(&input.line2),
            city: present(&input.city)?,
            state: present(&input.state),
            postal_code: present(&input.postal_code)?,
            country: present(&input.country)?,
            phone: present(&input.phone),
        })
    }

    /// Merge a partial update into this address field by field
    pub fn merged_with(&self, update: &AddressInput) -> Address {
        Address {
            recipient: present(&update.recipient).or_else(|| self.recipient.clone()),
            line1: present(&update.line1).unwrap_or_else(|| self.line1.clone()),
            line2: present(&update.line2).or_else(|| self.line2.clone()),
            city: present(&update.city).unwrap_or_else(|| self.city.clone()),
            state: present(&update.state).or_else(|| self.state.clone()),
            postal_code: present(&update.postal_code).unwrap_or_else(|| self.postal_code.clone()),
            country: present(&update.country).unwrap_or_else(|| self.country.clone()),
            phone: present(&update.phone).or_else(|| self.phone.clone()),
        }
    }
}

/// Resolve an address from an optional base and an optional partial update
///
/// With a base, the update is merged over it. Without one, the update alone must
/// form a complete address.
pub fn resolve_address(base: Option<&Address>, update: Option<&AddressInput>) -> Option<Address> {
    match (base, update) {
        (Some(base), Some(update)) => Some(base.merged_with(update)),
        (Some(base), None) => Some(base.clone()),
        (None, Some(update)) => Address::from_input(update),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn home() -> Address {
        Address {
            recipient: Some("Ada Lovelace".to_string()),
            line1: "12 St James's Square".to_string(),
            line2: None,
            city: "London".to_string(),
            state: None,
            postal_code: "SW1Y 4JH".to_string(),
            country: "GB".to_string(),
            phone: Some("+44 20 7946 0000".to_string()),
        }
    }

    #[test]
    fn test_merge_keeps_fields_missing_from_update() {
        let update = AddressInput {
            city: Some("Cambridge".to_string()),
            ..Default::default()
        };

        let merged = home().merged_with(&update);
        assert_eq!(merged.city, "Cambridge");
        assert_eq!(merged.line1, "12 St James's Square");
        assert_eq!(merged.postal_code, "SW1Y 4JH");
        assert_eq!(merged.phone, home().phone);
    }

    #[test]
    fn test_merge_ignores_blank_values() {
        let update = AddressInput {
            line1: Some("   ".to_string()),
            phone: Some(String::new()),
            ..Default::default()
        };

        assert_eq!(home().merged_with(&update), home());
    }

    #[test]
    fn test_from_input_requires_core_fields() {
        let partial = AddressInput {
            line1: Some("1 Main St".to_string()),
            city: Some("Springfield".to_string()),
            ..Default::default()
        };
        assert!(Address::from_input(&partial).is_none());

        let complete = AddressInput {
            postal_code: Some("12345".to_string()),
            country: Some("US".to_string()),
            ..partial
        };
        let address = Address::from_input(&complete).unwrap();
        assert_eq!(address.line1, "1 Main St");
        assert_eq!(address.country, "US");
    }

    #[test]
    fn test_resolve_address_combinations() {
        let base = home();
        assert_eq!(resolve_address(Some(&base), None), Some(base.clone()));
        assert_eq!(resolve_address(None, None), None);
        assert_eq!(resolve_address(None, Some(&AddressInput::default())), None);

        let update = AddressInput {
            line2: Some("Flat 3".to_string()),
            ..Default::default()
        };
        let resolved = resolve_address(Some(&base), Some(&update)).unwrap();
        assert_eq!(resolved.line2.as_deref(), Some("Flat 3"));
    }

    #[test]
    fn test_is_empty() {
        assert!(AddressInput::default().is_empty());
        assert!(AddressInput {
            city: Some(" ".to_string()),
            ..Default::default()
        }
        .is_empty());
        assert!(!AddressInput {
            city: Some("Oslo".to_string()),
            ..Default::default()
        }
        .is_empty());
    }
}
