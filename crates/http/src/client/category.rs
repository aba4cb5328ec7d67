//! Category management client methods

use super::{ApiClient, ClientError};
use ledger_core::{
    Category, CategoryFilters, CategoryList, CreateCategoryRequest, ListResponse,
    MessageResponse, ToQuery, UpdateCategoryRequest,
};

pub const CATEGORIES_ENDPOINT: &str = "/v1/categories";

impl ApiClient {
    /// List categories matching `filters`
    pub async fn get_categories(
        &self,
        filters: &CategoryFilters,
    ) -> Result<CategoryList, ClientError> {
        let headers = self.auth_headers()?;
        let endpoint = format!("{CATEGORIES_ENDPOINT}{}", filters.to_query_string());
        let response: ListResponse<CategoryList> = self.get(&endpoint, headers).await?;
        Ok(response.into_inner())
    }

    pub async fn get_category(&self, id: &str) -> Result<Category, ClientError> {
        let headers = self.auth_headers()?;
        self.get(&format!("{CATEGORIES_ENDPOINT}/{id}"), headers)
            .await
    }

    pub async fn create_category(
        &self,
        category: &CreateCategoryRequest,
    ) -> Result<MessageResponse, ClientError> {
        let headers = self.auth_headers()?;
        self.post(CATEGORIES_ENDPOINT, Some(category), headers)
            .await
    }

    pub async fn update_category(
        &self,
        id: &str,
        category: &UpdateCategoryRequest,
    ) -> Result<MessageResponse, ClientError> {
        let headers = self.auth_headers()?;
        self.patch(&format!("{CATEGORIES_ENDPOINT}/{id}"), Some(category), headers)
            .await
    }

    pub async fn delete_category(&self, id: &str) -> Result<MessageResponse, ClientError> {
        let headers = self.auth_headers()?;
        self.delete(&format!("{CATEGORIES_ENDPOINT}/{id}"), headers)
            .await
    }
}
