pub mod banner;
pub mod event;

pub use banner::{AdvertisingUnit, BannerError, NewBanner};
pub use event::{EventKind, MetricEvent};
