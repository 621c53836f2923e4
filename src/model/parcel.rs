use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised while turning request input into a [`ParcelKey`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParcelError {
    #[error("{0}")]
    InvalidParcelInput(String),
}

fn invalid(message: impl Into<String>) -> ParcelError {
    ParcelError::InvalidParcelInput(message.into())
}

/// NYC borough with its BBL code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Borough {
    Manhattan,
    Bronx,
    Brooklyn,
    Queens,
    StatenIsland,
}

impl Borough {
    pub const ALL: [Borough; 5] = [
        Borough::Manhattan,
        Borough::Bronx,
        Borough::Brooklyn,
        Borough::Queens,
        Borough::StatenIsland,
    ];

    pub fn code(&self) -> u8 {
        match self {
            Borough::Manhattan => 1,
            Borough::Bronx => 2,
            Borough::Brooklyn => 3,
            Borough::Queens => 4,
            Borough::StatenIsland => 5,
        }
    }

    /// Upper-case spelling used by datasets that store the borough by name
    pub fn name(&self) -> &'static str {
        match self {
            Borough::Manhattan => "MANHATTAN",
            Borough::Bronx => "BRONX",
            Borough::Brooklyn => "BROOKLYN",
            Borough::Queens => "QUEENS",
            Borough::StatenIsland => "STATEN ISLAND",
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.code() == code)
    }

    /// Accepts a code ("1".."5") or a borough name in any case
    pub fn parse(raw: &str) -> Result<Self, ParcelError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(invalid("Missing borough"));
        }

        if trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return trimmed
                .parse::<u8>()
                .ok()
                .and_then(Self::from_code)
                .ok_or_else(|| invalid(format!("Borough must be 1-5, got '{}'", trimmed)));
        }

        let normalized = trimmed
            .replace(['_', '-'], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_uppercase();

        Self::ALL
            .into_iter()
            .find(|b| b.name() == normalized)
            .ok_or_else(|| invalid(format!("Unknown borough '{}'", trimmed)))
    }
}

impl fmt::Display for Borough {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Borough-block-lot parcel identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParcelKey {
    pub borough: Borough,
    pub block: u32,
    pub lot: u32,
}

impl ParcelKey {
    pub fn new(borough: Borough, block: u32, lot: u32) -> Result<Self, ParcelError> {
        if block == 0 {
            return Err(invalid("Block must be a positive integer"));
        }
        if lot == 0 {
            return Err(invalid("Lot must be a positive integer"));
        }
        Ok(Self { borough, block, lot })
    }

    /// Build a key from three separate fields
    pub fn from_fields(borough: &str, block: &str, lot: &str) -> Result<Self, ParcelError> {
        let borough = Borough::parse(borough)?;
        let block = parse_positive("block", block)?;
        let lot = parse_positive("lot", lot)?;
        Self::new(borough, block, lot)
    }

    /// Parse a combined code such as `1013360066` or `1-01336-0066`.
    ///
    /// The first digit is the borough, the next (up to) five the block and
    /// whatever follows the lot.
    pub fn from_bbl(code: &str) -> Result<Self, ParcelError> {
        let digits: String = code.chars().filter(|c| c.is_ascii_digit()).collect();

        if digits.len() > 10 {
            return Err(invalid(format!(
                "BBL must have at most 10 digits, got {}",
                digits.len()
            )));
        }
        if digits.len() < 4 {
            return Err(invalid("BBL is too short to contain a block and lot"));
        }

        let (borough, rest) = digits.split_at(1);
        let split = rest.len().min(5);
        let (block, lot) = rest.split_at(split);

        if lot.is_empty() {
            return Err(invalid("BBL is missing the lot digits"));
        }

        Self::from_fields(borough, block, lot)
    }

    /// Canonical 10-digit code
    pub fn bbl(&self) -> String {
        format!("{}{:05}{:04}", self.borough.code(), self.block, self.lot)
    }

    pub fn padded_block(&self) -> String {
        format!("{:05}", self.block)
    }

    pub fn padded_lot(&self) -> String {
        format!("{:04}", self.lot)
    }
}

impl fmt::Display for ParcelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.bbl())
    }
}

fn parse_positive(field: &str, raw: &str) -> Result<u32, ParcelError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid(format!("Missing {}", field)));
    }
    if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(format!("{} must be numeric, got '{}'", field, trimmed)));
    }
    // Leading zeros are insignificant ("0066" is lot 66)
    let value = trimmed
        .parse::<u32>()
        .map_err(|_| invalid(format!("{} is out of range", field)))?;
    if value == 0 {
        return Err(invalid(format!("{} must be a positive integer", field)));
    }
    Ok(value)
}

/// Raw parcel fields as they arrive on a query string
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParcelInput {
    pub bbl: Option<String>,
    pub borough: Option<String>,
    pub block: Option<String>,
    pub lot: Option<String>,
}

impl ParcelInput {
    pub fn resolve(&self) -> Result<ParcelKey, ParcelError> {
        let present = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let borough = present(&self.borough);
        let block = present(&self.block);
        let lot = present(&self.lot);

        if let (Some(borough), Some(block), Some(lot)) = (&borough, &block, &lot) {
            return ParcelKey::from_fields(borough, block, lot);
        }

        match present(&self.bbl) {
            Some(bbl) => ParcelKey::from_bbl(&bbl),
            None => Err(invalid("Missing or invalid borough/block/lot")),
        }
    }
}
