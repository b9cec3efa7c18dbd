use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BannerError {
    #[error("banner window must end after it starts ({start_at} >= {end_at})")]
    InvalidWindow {
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    },
    #[error("banner placement cannot be empty")]
    EmptyPlacement,
}

/// A banner that can be shown in a placement slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvertisingUnit {
    pub id: i64,
    pub title: String,
    /// Logical slot name, e.g. "header" or "sidebar"
    pub placement: String,
    pub active: bool,
    #[serde(default)]
    pub start_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_at: Option<DateTime<Utc>>,
    pub width: u32,
    pub height: u32,
    pub target_url: String,
    #[serde(default)]
    pub image_url: String,
    /// Rotation position within the placement, ascending
    #[serde(default)]
    pub order: i32,
}

impl AdvertisingUnit {
    pub fn validate(&self) -> Result<(), BannerError> {
        validate_fields(&self.placement, self.start_at, self.end_at)
    }
}

/// Banner as submitted for creation, before the store assigns an id
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBanner {
    pub title: String,
    pub placement: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub start_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_at: Option<DateTime<Utc>>,
    pub width: u32,
    pub height: u32,
    pub target_url: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub order: i32,
}

fn default_active() -> bool {
    true
}

impl NewBanner {
    pub fn validate(&self) -> Result<(), BannerError> {
        validate_fields(&self.placement, self.start_at, self.end_at)
    }

    pub fn into_unit(self, id: i64) -> AdvertisingUnit {
        AdvertisingUnit {
            id,
            title: self.title,
            placement: self.placement,
            active: self.active,
            start_at: self.start_at,
            end_at: self.end_at,
            width: self.width,
            height: self.height,
            target_url: self.target_url,
            image_url: self.image_url,
            order: self.order,
        }
    }
}

fn validate_fields(
    placement: &str,
    start_at: Option<DateTime<Utc>>,
    end_at: Option<DateTime<Utc>>,
) -> Result<(), BannerError> {
    if placement.trim().is_empty() {
        return Err(BannerError::EmptyPlacement);
    }
    if let (Some(start_at), Some(end_at)) = (start_at, end_at) {
        if end_at <= start_at {
            return Err(BannerError::InvalidWindow { start_at, end_at });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn banner() -> NewBanner {
        NewBanner {
            title: "Farmers market".to_string(),
            placement: "header".to_string(),
            active: true,
            start_at: None,
            end_at: None,
            width: 728,
            height: 90,
            target_url: "https://example.org/market".to_string(),
            image_url: String::new(),
            order: 0,
        }
    }

    #[test]
    fn test_open_window_is_valid() {
        let mut b = banner();
        assert!(b.validate().is_ok());

        b.start_at = Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap());
        assert!(b.validate().is_ok());
    }

    #[test]
    fn test_end_must_follow_start() {
        let mut b = banner();
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        b.start_at = Some(t);
        b.end_at = Some(t);

        assert_eq!(
            b.validate(),
            Err(BannerError::InvalidWindow {
                start_at: t,
                end_at: t
            })
        );
    }

    #[test]
    fn test_placement_required() {
        let mut b = banner();
        b.placement = "  ".to_string();
        assert_eq!(b.validate(), Err(BannerError::EmptyPlacement));
    }

    #[test]
    fn test_unit_deserializes_camel_case() {
        let json = r#"{
            "id": 7,
            "title": "Library week",
            "placement": "sidebar",
            "active": true,
            "startAt": "2024-05-01T00:00:00Z",
            "width": 300,
            "height": 250,
            "targetUrl": "https://example.org/library"
        }"#;

        let unit: AdvertisingUnit = serde_json::from_str(json).unwrap();
        assert_eq!(unit.id, 7);
        assert_eq!(unit.start_at, Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()));
        assert_eq!(unit.end_at, None);
        assert_eq!(unit.order, 0);
    }
}
