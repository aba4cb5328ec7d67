//! Unauthenticated transaction endpoints

use super::transaction::TRANSACTIONS_ENDPOINT;
use super::{ApiClient, ClientError};
use ledger_core::{
    Envelope, ListResponse, ToQuery, Transaction, TransactionFilters, TransactionList,
    TransactionSummary,
};
use reqwest::header::HeaderMap;

impl ApiClient {
    /// List transactions without a bearer token
    pub async fn get_public_transactions(
        &self,
        filters: &TransactionFilters,
    ) -> Result<TransactionList, ClientError> {
        let endpoint = format!("{TRANSACTIONS_ENDPOINT}{}", filters.to_query_string());
        let response: ListResponse<TransactionList> =
            self.get(&endpoint, HeaderMap::new()).await?;
        Ok(response.into_inner())
    }

    pub async fn get_public_transaction(&self, id: &str) -> Result<Transaction, ClientError> {
        self.get(&format!("{TRANSACTIONS_ENDPOINT}/{id}"), HeaderMap::new())
            .await
    }

    /// Income and expense totals
    pub async fn get_public_transaction_summary(&self) -> Result<TransactionSummary, ClientError> {
        let response: Envelope<TransactionSummary> = self
            .get(&format!("{TRANSACTIONS_ENDPOINT}/summary"), HeaderMap::new())
            .await?;
        Ok(response.data)
    }
}
