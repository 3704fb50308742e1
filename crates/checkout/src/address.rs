//! Shipper-entered address state and its backend wire shape.
//!
//! The form keeps one free-text street field; the backend splits it into
//! `addressLine1`/`addressLine2`. [`AddressFormData::to_remote`] and
//! [`AddressFormData::from_remote`] convert between the two and are inverses
//! of each other for all valid inputs.

use serde::{Deserialize, Serialize};

use tidepool_core::Email;

/// Raw address input exactly as the shopper typed it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AddressFormData {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    /// Street address (maps to the backend's `addressLine1`).
    pub address: String,
    /// Apartment/suite/etc. (maps to the backend's `addressLine2`).
    pub address2: String,
    pub city: String,
    pub region: String,
    pub postal_code: String,
    pub country: String,
    /// Save to the shopper's address book after a successful order.
    pub save_for_reuse: bool,
}

/// The backend's address shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAddress {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub address_line1: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_line2: Option<String>,
    pub city: String,
    pub region: String,
    pub postal_code: String,
    pub country: String,
}

/// Fields that must be non-empty for an address to be usable.
const REQUIRED_FIELDS: &[(&str, fn(&AddressFormData) -> &str)] = &[
    ("first name", |f| &f.first_name),
    ("last name", |f| &f.last_name),
    ("email", |f| &f.email),
    ("phone", |f| &f.phone),
    ("address", |f| &f.address),
    ("city", |f| &f.city),
    ("region", |f| &f.region),
    ("country", |f| &f.country),
];

impl AddressFormData {
    /// Convert to the backend shape. Pure; inverse of [`Self::from_remote`].
    #[must_use]
    pub fn to_remote(&self) -> RemoteAddress {
        RemoteAddress {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            address_line1: self.address.clone(),
            address_line2: if self.address2.is_empty() {
                None
            } else {
                Some(self.address2.clone())
            },
            city: self.city.clone(),
            region: self.region.clone(),
            postal_code: self.postal_code.clone(),
            country: self.country.clone(),
        }
    }

    /// Convert from the backend shape. Pure; inverse of [`Self::to_remote`].
    ///
    /// The `save_for_reuse` flag is input-only and always comes back `false`.
    #[must_use]
    pub fn from_remote(remote: &RemoteAddress) -> Self {
        Self {
            first_name: remote.first_name.clone(),
            last_name: remote.last_name.clone(),
            email: remote.email.clone(),
            phone: remote.phone.clone(),
            address: remote.address_line1.clone(),
            address2: remote.address_line2.clone().unwrap_or_default(),
            city: remote.city.clone(),
            region: remote.region.clone(),
            postal_code: remote.postal_code.clone(),
            country: remote.country.clone(),
            save_for_reuse: false,
        }
    }

    /// Whether every required field is non-empty (structure not checked).
    #[must_use]
    pub fn is_complete(&self) -> bool {
        REQUIRED_FIELDS
            .iter()
            .all(|(_, get)| !get(self).trim().is_empty())
    }

    /// Validate the form for step advancement.
    ///
    /// Missing fields produce one aggregated message naming all of them.
    /// Structural checks run afterwards, email before phone, and report only
    /// the first offender.
    ///
    /// # Errors
    ///
    /// Returns the user-facing validation message.
    pub fn validate(&self) -> Result<(), String> {
        let missing: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .filter(|(_, get)| get(self).trim().is_empty())
            .map(|(name, _)| *name)
            .collect();

        if !missing.is_empty() {
            return Err(format!("please fill in: {}", missing.join(", ")));
        }

        if Email::parse(self.email.trim()).is_err() {
            return Err("enter a valid email address".to_owned());
        }

        let digits = self.phone.chars().filter(char::is_ascii_digit).count();
        if !(7..=15).contains(&digits) {
            return Err("enter a valid phone number (7-15 digits)".to_owned());
        }

        Ok(())
    }
}
