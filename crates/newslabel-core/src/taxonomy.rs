//! The closed 12-category TNMT (Tài nguyên và Môi trường) label taxonomy
//!
//! Labels serialize as their canonical Vietnamese display name. Matching raw
//! model output against the taxonomy goes through [`Label::parse`], which
//! compares NFC-normalized, case-folded keys so that composed/decomposed
//! diacritics and capitalization differences do not cause spurious drops.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::text::normalize_key;

/// One of the 12 fixed domain categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Label {
    #[serde(rename = "Biển - hải đảo")]
    SeaAndIslands,
    #[serde(rename = "Thông tin chung")]
    GeneralInformation,
    #[serde(rename = "Môi trường")]
    Environment,
    #[serde(rename = "Địa chất - Khoáng sản")]
    GeologyAndMinerals,
    #[serde(rename = "Đất đai")]
    Land,
    #[serde(rename = "Đa dạng sinh học")]
    Biodiversity,
    #[serde(rename = "Viễn thám")]
    RemoteSensing,
    #[serde(rename = "Quản lý chất thải rắn")]
    SolidWasteManagement,
    #[serde(rename = "Đo đạc và bản đồ")]
    SurveyingAndMapping,
    #[serde(rename = "Khí tượng thủy văn - Biến đổi khí hậu")]
    HydrometeorologyAndClimateChange,
    #[serde(rename = "Tài nguyên nước")]
    WaterResources,
    #[serde(rename = "Khác")]
    Other,
}

impl Label {
    /// All labels in taxonomy order (ids 1 through 12)
    pub const ALL: [Label; 12] = [
        Label::SeaAndIslands,
        Label::GeneralInformation,
        Label::Environment,
        Label::GeologyAndMinerals,
        Label::Land,
        Label::Biodiversity,
        Label::RemoteSensing,
        Label::SolidWasteManagement,
        Label::SurveyingAndMapping,
        Label::HydrometeorologyAndClimateChange,
        Label::WaterResources,
        Label::Other,
    ];

    /// Stable numeric id (1-12)
    pub fn id(&self) -> u8 {
        match self {
            Self::SeaAndIslands => 1,
            Self::GeneralInformation => 2,
            Self::Environment => 3,
            Self::GeologyAndMinerals => 4,
            Self::Land => 5,
            Self::Biodiversity => 6,
            Self::RemoteSensing => 7,
            Self::SolidWasteManagement => 8,
            Self::SurveyingAndMapping => 9,
            Self::HydrometeorologyAndClimateChange => 10,
            Self::WaterResources => 11,
            Self::Other => 12,
        }
    }

    /// Look up a label by its numeric id
    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|label| label.id() == id)
    }

    /// Canonical display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::SeaAndIslands => "Biển - hải đảo",
            Self::GeneralInformation => "Thông tin chung",
            Self::Environment => "Môi trường",
            Self::GeologyAndMinerals => "Địa chất - Khoáng sản",
            Self::Land => "Đất đai",
            Self::Biodiversity => "Đa dạng sinh học",
            Self::RemoteSensing => "Viễn thám",
            Self::SolidWasteManagement => "Quản lý chất thải rắn",
            Self::SurveyingAndMapping => "Đo đạc và bản đồ",
            Self::HydrometeorologyAndClimateChange => "Khí tượng thủy văn - Biến đổi khí hậu",
            Self::WaterResources => "Tài nguyên nước",
            Self::Other => "Khác",
        }
    }

    /// Short description used in prompts and reports
    pub fn description(&self) -> &'static str {
        match self {
            Self::SeaAndIslands => {
                "Các vấn đề liên quan đến biển, đại dương, hải đảo, tài nguyên biển, kinh tế biển"
            }
            Self::GeneralInformation => {
                "Thông tin tổng hợp, chính sách, quy định chung về tài nguyên môi trường"
            }
            Self::Environment => "Ô nhiễm môi trường, bảo vệ môi trường, môi trường sống, sinh thái",
            Self::GeologyAndMinerals => {
                "Khảo sát địa chất, khai thác khoáng sản, tài nguyên địa chất"
            }
            Self::Land => "Quản lý đất đai, quy hoạch sử dụng đất, chất lượng đất",
            Self::Biodiversity => "Bảo tồn thiên nhiên, động thực vật hoang dã, khu bảo tồn",
            Self::RemoteSensing => "Ứng dụng viễn thám, ảnh vệ tinh, GIS trong tài nguyên môi trường",
            Self::SolidWasteManagement => "Thu gom, xử lý chất thải, rác thải, tái chế",
            Self::SurveyingAndMapping => "Đo đạc địa hình, lập bản đồ, định vị GPS",
            Self::HydrometeorologyAndClimateChange => {
                "Dự báo thời tiết, biến đổi khí hậu, thiên tai"
            }
            Self::WaterResources => "Quản lý nguồn nước, cấp nước, xử lý nước thải",
            Self::Other => "Các chủ đề khác không thuộc các danh mục trên",
        }
    }

    /// Match a raw label string against the taxonomy.
    ///
    /// Both sides are NFC-normalized and case-folded, with whitespace and the
    /// spacing around `-` collapsed. Returns `None` for anything outside the
    /// 12 categories.
    pub fn parse(raw: &str) -> Option<Self> {
        let key = normalize_key(raw);
        if key.is_empty() {
            return None;
        }
        Self::ALL
            .iter()
            .copied()
            .find(|label| normalize_key(label.name()) == key)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Label {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
            .ok_or_else(|| crate::Error::validation(format!("label outside taxonomy: '{}'", s)))
    }
}
