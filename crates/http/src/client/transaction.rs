//! Transaction management client methods

use super::body::{Attachment, MultipartForm};
use super::{ApiClient, ClientError};
use ledger_core::{
    CreateTransactionRequest, ListResponse, MessageResponse, ProofUpload, ToQuery, Transaction,
    TransactionFilters, TransactionList, UpdateTransactionRequest,
};
use url::form_urlencoded;

pub const TRANSACTIONS_ENDPOINT: &str = "/v1/transactions";

impl ApiClient {
    /// List transactions matching `filters`
    pub async fn get_transactions(
        &self,
        filters: &TransactionFilters,
    ) -> Result<TransactionList, ClientError> {
        let headers = self.auth_headers()?;
        let endpoint = format!("{TRANSACTIONS_ENDPOINT}{}", filters.to_query_string());
        let response: ListResponse<TransactionList> = self.get(&endpoint, headers).await?;
        Ok(response.into_inner())
    }

    pub async fn get_transaction(&self, id: &str) -> Result<Transaction, ClientError> {
        let headers = self.auth_headers()?;
        self.get(&format!("{TRANSACTIONS_ENDPOINT}/{id}"), headers)
            .await
    }

    pub async fn create_transaction(
        &self,
        transaction: &CreateTransactionRequest,
    ) -> Result<Transaction, ClientError> {
        let headers = self.auth_headers()?;
        self.post(TRANSACTIONS_ENDPOINT, Some(transaction), headers)
            .await
    }

    /// Create a transaction together with its receipt file
    pub async fn create_transaction_with_file(
        &self,
        transaction: &CreateTransactionRequest,
        file: Attachment,
    ) -> Result<Transaction, ClientError> {
        let headers = self.auth_headers()?;
        self.upload(TRANSACTIONS_ENDPOINT, transaction_form(transaction, file), headers)
            .await
    }

    pub async fn update_transaction(
        &self,
        id: &str,
        transaction: &UpdateTransactionRequest,
    ) -> Result<MessageResponse, ClientError> {
        let headers = self.auth_headers()?;
        self.patch(
            &format!("{TRANSACTIONS_ENDPOINT}/{id}"),
            Some(transaction),
            headers,
        )
        .await
    }

    pub async fn delete_transaction(&self, id: &str) -> Result<MessageResponse, ClientError> {
        let headers = self.auth_headers()?;
        self.delete(&format!("{TRANSACTIONS_ENDPOINT}/{id}"), headers)
            .await
    }

    /// Attach a receipt to an existing transaction
    pub async fn upload_proof(
        &self,
        id: &str,
        file: Attachment,
    ) -> Result<ProofUpload, ClientError> {
        let headers = self.auth_headers()?;
        let form = MultipartForm::new().file("file", file);
        self.upload(&format!("{TRANSACTIONS_ENDPOINT}/{id}/proof"), form, headers)
            .await
    }

    /// Remove a receipt by its stored URL
    pub async fn delete_proof(
        &self,
        id: &str,
        image_url: &str,
    ) -> Result<MessageResponse, ClientError> {
        let headers = self.auth_headers()?;
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("image_url", image_url)
            .finish();
        self.delete(&format!("{TRANSACTIONS_ENDPOINT}/{id}/proof?{query}"), headers)
            .await
    }
}

/// Multipart form for a new transaction; optional fields are left out entirely
pub fn transaction_form(transaction: &CreateTransactionRequest, file: Attachment) -> MultipartForm {
    let mut form = MultipartForm::new()
        .text("amount", transaction.amount.to_string())
        .text("date", transaction.date.clone())
        .text("type", transaction.kind.as_str())
        .text("category", transaction.category.clone())
        .text("active", transaction.active.to_string());

    if let Some(description) = transaction.description.as_deref().filter(|d| !d.is_empty()) {
        form = form.text("description", description);
    }
    if let Some(proof) = transaction.proof.as_deref().filter(|p| !p.is_empty()) {
        form = form.text("proof", proof);
    }

    form.file("file", file)
}
