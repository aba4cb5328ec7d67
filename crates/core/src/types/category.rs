//! Category payloads

use crate::query::{QueryPairs, ToQuery};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub active: bool,
    pub created_at: String,
    pub modified_at: String,
    pub created_by: String,
    pub modified_by: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCategoryRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

/// One page of categories
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryList {
    pub categories: Vec<Category>,
    pub total_data: u64,
    pub total_page: u64,
}

/// Filters accepted by the category list endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryFilters {
    pub name: Option<String>,
    pub description: Option<String>,
    pub active: Option<bool>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ToQuery for CategoryFilters {
    fn query_pairs(&self) -> QueryPairs {
        QueryPairs::new()
            .push("name", self.name.as_deref())
            .push("description", self.description.as_deref())
            .push("active", self.active)
            .push("page", self.page)
            .push("limit", self.limit)
    }
}
