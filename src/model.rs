use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ContentError;

/// Largest accepted image upload.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

const EXCERPT_CHARS: usize = 150;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ContentType {
    #[serde(rename = "blog")]
    Article,
    #[serde(rename = "case-study")]
    CaseStudy,
    #[serde(rename = "insight")]
    IndustryInsight,
}

const ARTICLE_CATEGORIES: &[&str] = &[
    "Governance Training",
    "Strategic Planning",
    "Organizational Development",
    "Financial Audits Support",
    "Outsourced Accounting",
    "Virtual CFO & Financial Leadership",
    "Grant & Donor Reporting",
    "M&E System Strengthening",
    "Program Reviews & Turnaround",
];

const CASE_STUDY_CATEGORIES: &[&str] = &[
    "Success Story",
    "NGO Transformation",
    "SME Growth",
    "Financial Turnaround",
    "Capacity Building",
    "Strategic Planning",
];

const INSIGHT_CATEGORIES: &[&str] = &[
    "Industry News",
    "Regulatory Updates",
    "Best Practices",
    "Financial Trends",
    "Governance",
    "Compliance",
];

impl ContentType {
    pub const ALL: [ContentType; 3] = [
        ContentType::Article,
        ContentType::CaseStudy,
        ContentType::IndustryInsight,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Article => "blog",
            ContentType::CaseStudy => "case-study",
            ContentType::IndustryInsight => "insight",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "blog" => Some(ContentType::Article),
            "case-study" => Some(ContentType::CaseStudy),
            "insight" => Some(ContentType::IndustryInsight),
            _ => None,
        }
    }

    /// Categories offered by the authoring UI for this type.
    pub fn categories(&self) -> &'static [&'static str] {
        match self {
            ContentType::Article => ARTICLE_CATEGORIES,
            ContentType::CaseStudy => CASE_STUDY_CATEGORIES,
            ContentType::IndustryInsight => INSIGHT_CATEGORIES,
        }
    }

    pub fn default_category(&self) -> &'static str {
        self.categories()[0]
    }

    /// Heading of the listing page for this type.
    pub fn page_title(&self) -> &'static str {
        match self {
            ContentType::Article => "Blogs",
            ContentType::CaseStudy => "Case Studies",
            ContentType::IndustryInsight => "Industry Insights",
        }
    }

    /// Label shown on a single item.
    pub fn label(&self) -> &'static str {
        match self {
            ContentType::Article => "Blog",
            ContentType::CaseStudy => "Case Study",
            ContentType::IndustryInsight => "Industry Insight",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = ContentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentType::parse(s).ok_or_else(|| ContentError::Invalid(format!("unknown type '{s}'")))
    }
}

/// One piece of published content, as pages and the API see it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ContentType,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub author: String,
    #[serde(default)]
    pub image_url: String,
    pub created_at: DateTime<Utc>,
    #[serde(default = "default_published")]
    pub published: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_published() -> bool {
    true
}

/// Fields supplied when authoring a new item. Id and timestamps are assigned on create.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewContent {
    #[serde(rename = "type")]
    pub kind: ContentType,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub author: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default = "default_published")]
    pub published: bool,
}

impl NewContent {
    pub fn new(
        kind: ContentType,
        title: impl Into<String>,
        content: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            title: title.into(),
            content: content.into(),
            excerpt: String::new(),
            category: String::new(),
            tags: Vec::new(),
            author: author.into(),
            image_url: String::new(),
            published: true,
        }
    }

    /// Fill in the authoring defaults for an empty excerpt and category.
    pub fn with_defaults(mut self) -> Self {
        if self.excerpt.trim().is_empty() {
            self.excerpt = default_excerpt(&self.content);
        }
        if self.category.trim().is_empty() {
            self.category = self.kind.default_category().to_string();
        }
        self
    }
}

/// First 150 characters of the body followed by an ellipsis.
pub fn default_excerpt(content: &str) -> String {
    let head: String = content.chars().take(EXCERPT_CHARS).collect();
    format!("{head}...")
}

/// Split a comma separated tag string, dropping blanks.
pub fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Partial update: only `Some` fields are written.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContentPatch {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ContentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<bool>,
}

impl ContentPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }
}

/// An image file submitted alongside a create or update.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for ImageUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageUpload")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl ImageUpload {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    pub fn validate(&self) -> Result<(), ContentError> {
        if !self.content_type.starts_with("image/") {
            return Err(ContentError::InvalidImage(
                "please select an image file".into(),
            ));
        }
        if self.bytes.is_empty() {
            return Err(ContentError::InvalidImage("image file is empty".into()));
        }
        if self.bytes.len() > MAX_IMAGE_BYTES {
            return Err(ContentError::InvalidImage(
                "image size should be less than 5MB".into(),
            ));
        }
        Ok(())
    }
}
