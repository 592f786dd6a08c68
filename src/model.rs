use crate::error::HagakiError;
use serde::{Deserialize, Serialize};

pub const DEFAULT_HONORIFIC: &str = "様";

/// One addressee: a row of the address book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRecord {
    pub family_name: String,
    pub given_name: String,
    /// Joint addressees, nearest-to-main-name first.
    pub joint_names: Vec<String>,
    pub honorific: String,
    /// Seven ASCII digits once normalized.
    pub postal_code: String,
    pub address1: String,
    pub address2: Option<String>,
    /// Source row (1-based, header is row 1).
    pub row: usize,
}

impl AddressRecord {
    pub fn new(family_name: impl Into<String>, given_name: impl Into<String>) -> Self {
        Self {
            family_name: family_name.into(),
            given_name: given_name.into(),
            joint_names: Vec::new(),
            honorific: DEFAULT_HONORIFIC.to_string(),
            postal_code: String::new(),
            address1: String::new(),
            address2: None,
            row: 0,
        }
    }

    pub fn with_postal_code(mut self, code: impl Into<String>) -> Self {
        self.postal_code = code.into();
        self
    }

    pub fn with_address(mut self, line1: impl Into<String>, line2: Option<String>) -> Self {
        self.address1 = line1.into();
        self.address2 = line2.filter(|line| !line.is_empty());
        self
    }

    pub fn with_joint_names(mut self, names: Vec<String>) -> Self {
        self.joint_names = names;
        self
    }

    /// An empty honorific falls back to the default.
    pub fn with_honorific(mut self, honorific: impl Into<String>) -> Self {
        let honorific = honorific.into();
        self.honorific = if honorific.is_empty() {
            DEFAULT_HONORIFIC.to_string()
        } else {
            honorific
        };
        self
    }

    pub fn with_row(mut self, row: usize) -> Self {
        self.row = row;
        self
    }

    pub fn display_name(&self) -> String {
        format!("{}{}", self.family_name, self.given_name)
    }

    pub fn validate(&self) -> Result<(), HagakiError> {
        if self.family_name.trim().is_empty() {
            return Err(HagakiError::InvalidRecord(format!(
                "row {}: family name is empty",
                self.row
            )));
        }
        Ok(())
    }
}

/// The sender block, shared by every page.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderProfile {
    pub family_name: String,
    pub given_name: String,
    pub postal_code: String,
    pub address1: String,
    pub address2: String,
}

impl SenderProfile {
    pub fn full_name(&self) -> String {
        format!("{}{}", self.family_name, self.given_name)
    }

    pub fn address2(&self) -> Option<&str> {
        if self.address2.is_empty() {
            None
        } else {
            Some(&self.address2)
        }
    }
}

/// Per-year markers kept next to each address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct YearStatus {
    pub sent: bool,
    pub received: bool,
    pub mourning: bool,
}

impl YearStatus {
    /// Still owed a card this year.
    pub fn is_pending(&self) -> bool {
        !self.sent && !self.mourning
    }
}
