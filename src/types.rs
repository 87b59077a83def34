//! Closed enumerations for the platform's wire constants.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of an asynchronous report job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportStatus {
    #[serde(rename = "NOT_STARTED")]
    Pending,
    #[serde(rename = "IN_PROGRESS")]
    Running,
    #[serde(rename = "OK")]
    Ready,
    #[serde(rename = "ERROR")]
    Failed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "NOT_STARTED",
            ReportStatus::Running => "IN_PROGRESS",
            ReportStatus::Ready => "OK",
            ReportStatus::Failed => "ERROR",
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NOT_STARTED" => Ok(ReportStatus::Pending),
            "IN_PROGRESS" => Ok(ReportStatus::Running),
            "OK" => Ok(ReportStatus::Ready),
            "ERROR" => Ok(ReportStatus::Failed),
            _ => anyhow::bail!("Unknown report status: {}", s),
        }
    }
}

/// Grouping of rows in a statistics report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupBy {
    #[default]
    Date,
    NoGroupBy,
    StartOfWeek,
    StartOfMonth,
}

impl FromStr for GroupBy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DATE" => Ok(GroupBy::Date),
            "NO_GROUP_BY" => Ok(GroupBy::NoGroupBy),
            "START_OF_WEEK" => Ok(GroupBy::StartOfWeek),
            "START_OF_MONTH" => Ok(GroupBy::StartOfMonth),
            _ => anyhow::bail!(
                "Unknown grouping: {}. Expected DATE, NO_GROUP_BY, START_OF_WEEK or START_OF_MONTH.",
                s
            ),
        }
    }
}

/// Advertising campaign state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CampaignState {
    #[serde(rename = "CAMPAIGN_STATE_UNKNOWN")]
    Unknown,
    #[serde(rename = "CAMPAIGN_STATE_RUNNING")]
    Running,
    #[serde(rename = "CAMPAIGN_STATE_PLANNED")]
    Planned,
    #[serde(rename = "CAMPAIGN_STATE_STOPPED")]
    Stopped,
    #[serde(rename = "CAMPAIGN_STATE_INACTIVE")]
    Inactive,
    #[serde(rename = "CAMPAIGN_STATE_ARCHIVED")]
    Archived,
    #[serde(rename = "CAMPAIGN_STATE_MODERATION_DRAFT")]
    ModerationDraft,
    #[serde(rename = "CAMPAIGN_STATE_MODERATION_IN_PROGRESS")]
    ModerationInProgress,
    #[serde(rename = "CAMPAIGN_STATE_MODERATION_FAILED")]
    ModerationFailed,
    #[serde(rename = "CAMPAIGN_STATE_FINISHED")]
    Finished,
}

/// Type of advertised object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdvertisingType {
    Sku,
    SearchPromo,
    Banner,
    BrandShelf,
    Video,
}

/// Campaign billing model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentType {
    /// Cost per click
    Cpc,
    /// Cost per thousand impressions
    Cpm,
    /// Cost per order
    Cpo,
}

/// Product visibility filter for product listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductVisibility {
    #[default]
    All,
    Visible,
    Invisible,
    EmptyStock,
    NotModerated,
    Moderated,
    Disabled,
    StateFailed,
    ReadyToSupply,
    ValidationStatePending,
    ValidationStateFail,
    ValidationStateSuccess,
    ToSupply,
    InSale,
    RemovedFromSale,
    Banned,
    Overpriced,
    CriticallyOverpriced,
    EmptyBarcode,
    BarcodeExists,
    Quarantine,
    Archived,
    OverpricedWithStock,
    PartialApproved,
    ImageAbsent,
    ModerationBlock,
}
