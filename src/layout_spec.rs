//! Fixed coordinate tables for every slot on the card.
//!
//! All lengths are millimetres from the top-left corner of the page and all
//! font sizes are points. The defaults follow the Japan Post layout for a
//! 100 x 148 mm hagaki; a different table can be passed to the composer (or
//! loaded from a config file) without touching any shared state.

use crate::error::HagakiError;
use serde::{Deserialize, Serialize};

pub const POSTAL_DIGITS: usize = 7;

/// A vertical band: one column of text anchored on `x`, running from
/// `start_y` down to at most `limit_y`.
///
/// The line pitch is not per region: every band advances by
/// [`LINE_PITCH_RATIO`](crate::vertical::LINE_PITCH_RATIO) times the em, so a
/// layout table cannot change it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionSpec {
    pub x: f64,
    pub start_y: f64,
    pub limit_y: f64,
    pub font_size: f64,
}

impl RegionSpec {
    pub const fn new(x: f64, start_y: f64, limit_y: f64, font_size: f64) -> Self {
        Self {
            x,
            start_y,
            limit_y,
            font_size,
        }
    }

    pub fn available_height(&self) -> f64 {
        self.limit_y - self.start_y
    }

    fn validate(&self, name: &str) -> Result<(), HagakiError> {
        let values = [self.x, self.start_y, self.limit_y, self.font_size];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(HagakiError::InvalidConfiguration(format!(
                "{name}: coordinates must be finite"
            )));
        }
        if self.font_size <= 0.0 {
            return Err(HagakiError::InvalidConfiguration(format!(
                "{name}: font_size must be > 0"
            )));
        }
        if self.limit_y <= self.start_y {
            return Err(HagakiError::InvalidConfiguration(format!(
                "{name}: limit_y must be below start_y"
            )));
        }
        Ok(())
    }
}

/// Digit boxes of one postal code block: 3 + 4 boxes sharing one centre line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PostalSpec {
    pub x: [f64; POSTAL_DIGITS],
    pub center_y: f64,
    pub font_size: f64,
}

impl PostalSpec {
    fn validate(&self, name: &str) -> Result<(), HagakiError> {
        if self.x.iter().any(|v| !v.is_finite()) || !self.center_y.is_finite() {
            return Err(HagakiError::InvalidConfiguration(format!(
                "{name}: coordinates must be finite"
            )));
        }
        if !(self.font_size > 0.0) {
            return Err(HagakiError::InvalidConfiguration(format!(
                "{name}: font_size must be > 0"
            )));
        }
        Ok(())
    }
}

/// Recipient name column plus the pitch of the joint-name columns to its
/// left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NameBlockSpec {
    #[serde(flatten)]
    pub region: RegionSpec,
    pub joint_pitch: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutSpec {
    pub page_width: f64,
    pub page_height: f64,
    pub recipient_postal: PostalSpec,
    pub recipient_address1: RegionSpec,
    pub recipient_address2: RegionSpec,
    pub recipient_name: NameBlockSpec,
    pub sender_postal: PostalSpec,
    pub sender_address1: RegionSpec,
    pub sender_address2: RegionSpec,
    pub sender_name: RegionSpec,
}

impl LayoutSpec {
    pub fn hagaki() -> Self {
        const RECIPIENT_ADDRESS_Y: f64 = 27.0;
        const RECIPIENT_ADDRESS_SIZE: f64 = 11.0;
        const RECIPIENT_ADDRESS_LIMIT: f64 = 110.0;
        const SENDER_ADDRESS_Y: f64 = 62.0;
        const SENDER_ADDRESS_SIZE: f64 = 7.5;
        const SENDER_ADDRESS_LIMIT: f64 = 116.0;

        Self {
            page_width: 100.0,
            page_height: 148.0,
            recipient_postal: PostalSpec {
                x: [44.8, 51.9, 59.0, 67.9, 75.0, 82.1, 89.2],
                center_y: 13.5,
                font_size: 16.0,
            },
            recipient_address1: RegionSpec::new(
                83.0,
                RECIPIENT_ADDRESS_Y,
                RECIPIENT_ADDRESS_LIMIT,
                RECIPIENT_ADDRESS_SIZE,
            ),
            // Second line starts 5mm lower, 1.5pt smaller.
            recipient_address2: RegionSpec::new(
                74.0,
                RECIPIENT_ADDRESS_Y + 5.0,
                RECIPIENT_ADDRESS_LIMIT,
                RECIPIENT_ADDRESS_SIZE - 1.5,
            ),
            recipient_name: NameBlockSpec {
                region: RegionSpec::new(56.0, 32.0, 125.0, 18.0),
                joint_pitch: 9.0,
            },
            sender_postal: PostalSpec {
                x: [5.7, 9.6, 13.5, 18.9, 22.8, 26.7, 30.6],
                center_y: 122.5,
                font_size: 9.0,
            },
            sender_address1: RegionSpec::new(
                28.0,
                SENDER_ADDRESS_Y,
                SENDER_ADDRESS_LIMIT,
                SENDER_ADDRESS_SIZE,
            ),
            sender_address2: RegionSpec::new(
                23.5,
                SENDER_ADDRESS_Y + 2.0,
                SENDER_ADDRESS_LIMIT,
                SENDER_ADDRESS_SIZE - 1.0,
            ),
            sender_name: RegionSpec::new(17.0, 68.0, 116.0, 10.0),
        }
    }

    pub fn validate(&self) -> Result<(), HagakiError> {
        if !(self.page_width > 0.0 && self.page_height > 0.0) {
            return Err(HagakiError::InvalidConfiguration(
                "page_width and page_height must be > 0".to_string(),
            ));
        }
        self.recipient_postal.validate("recipient_postal")?;
        self.recipient_address1.validate("recipient_address1")?;
        self.recipient_address2.validate("recipient_address2")?;
        self.recipient_name.region.validate("recipient_name")?;
        if !(self.recipient_name.joint_pitch >= 0.0) {
            return Err(HagakiError::InvalidConfiguration(
                "recipient_name: joint_pitch must be >= 0".to_string(),
            ));
        }
        self.sender_postal.validate("sender_postal")?;
        self.sender_address1.validate("sender_address1")?;
        self.sender_address2.validate("sender_address2")?;
        self.sender_name.validate("sender_name")?;
        Ok(())
    }
}

impl Default for LayoutSpec {
    fn default() -> Self {
        Self::hagaki()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hagaki_table_is_valid() {
        let spec = LayoutSpec::hagaki();
        assert!(spec.validate().is_ok());
        assert_eq!(spec.recipient_address2.start_y, 32.0);
        assert_eq!(spec.recipient_address2.font_size, 9.5);
        assert_eq!(spec.sender_address2.start_y, 64.0);
        assert_eq!(spec.sender_address2.font_size, 6.5);
        assert_eq!(spec.recipient_name.region.available_height(), 93.0);
        assert!(spec.sender_postal.font_size < spec.recipient_postal.font_size);
    }

    #[test]
    fn every_region_advances_by_the_shared_pitch() {
        use crate::canvas::MemoryCanvas;
        use crate::vertical::{self, LINE_PITCH_RATIO, PT_TO_MM};

        let spec = LayoutSpec::hagaki();
        let canvas = MemoryCanvas::new();
        for region in [
            spec.recipient_address1,
            spec.recipient_address2,
            spec.recipient_name.region,
            spec.sender_address1,
            spec.sender_address2,
            spec.sender_name,
        ] {
            let run: Vec<_> = vertical::layout(
                "一二",
                region.x,
                region.start_y,
                region.font_size,
                region.limit_y,
                &canvas,
            )
            .collect();
            let pitch = region.font_size * PT_TO_MM * LINE_PITCH_RATIO;
            assert!((run[1].y - run[0].y - pitch).abs() < 1e-9);
        }
    }

    #[test]
    fn inverted_region_is_rejected() {
        let mut spec = LayoutSpec::hagaki();
        spec.sender_name.limit_y = spec.sender_name.start_y;
        let err = spec.validate().unwrap_err();
        assert!(err.to_string().contains("sender_name"));
    }

    #[test]
    fn non_positive_font_is_rejected() {
        let mut spec = LayoutSpec::hagaki();
        spec.recipient_postal.font_size = 0.0;
        assert!(spec.validate().is_err());
        let mut spec = LayoutSpec::hagaki();
        spec.recipient_address1.font_size = f64::NAN;
        assert!(spec.validate().is_err());
    }

    #[test]
    fn partial_json_overrides_keep_defaults() {
        let json = r#"{
            "page_width": 105.0,
            "recipient_name": { "x": 50.0, "start_y": 30.0, "limit_y": 120.0, "font_size": 20.0, "joint_pitch": 10.0 }
        }"#;
        let spec: LayoutSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.page_width, 105.0);
        assert_eq!(spec.page_height, 148.0);
        assert_eq!(spec.recipient_name.region.x, 50.0);
        assert_eq!(spec.recipient_name.joint_pitch, 10.0);
        assert_eq!(spec.sender_name, LayoutSpec::hagaki().sender_name);
    }
}
