//! Typed per-table API: paginated scans, point lookups, and writes.

use std::marker::PhantomData;

use reqwest::header::CONTENT_RANGE;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::client::StoreClient;
use crate::error::StoreError;
use crate::query::{content_range_total, Direction, Query};

/// Window and ordering for a paginated scan.
#[derive(Debug, Clone)]
pub struct PageRequest {
    /// 1-based page number.
    pub page: u64,
    pub page_size: u64,
    pub sort: Option<(String, Direction)>,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 25,
            sort: None,
        }
    }
}

impl PageRequest {
    pub fn new(page: u64, page_size: u64) -> Self {
        Self {
            page,
            page_size,
            ..Self::default()
        }
    }

    pub fn with_sort(mut self, column: &str, direction: Direction) -> Self {
        self.sort = Some((column.to_string(), direction));
        self
    }

    fn to_query(&self) -> Query {
        let mut query = Query::new();
        if let Some((column, direction)) = &self.sort {
            query = query.order(column, *direction);
        }
        query
            .limit(self.page_size)
            .offset(self.page.saturating_sub(1) * self.page_size)
    }
}

/// One page of rows plus the exact table-wide total.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub rows: Vec<T>,
    pub total: u64,
}

/// Typed handle for one backend table.
pub struct TableClient<T> {
    store: StoreClient,
    table: &'static str,
    _row: PhantomData<fn() -> T>,
}

impl<T> Clone for TableClient<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            table: self.table,
            _row: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> TableClient<T> {
    pub(crate) fn new(store: StoreClient, table: &'static str) -> Self {
        Self {
            store,
            table,
            _row: PhantomData,
        }
    }

    pub fn table_name(&self) -> &'static str {
        self.table
    }

    /// Fetch one page, asking the backend to count the full table so callers
    /// can render "page X of Y".
    pub async fn page(&self, request: &PageRequest) -> Result<Page<T>, StoreError> {
        let url = self.store.rest_url(self.table);
        let req = request
            .to_query()
            .apply(self.store.request(Method::GET, &url))
            .header("Prefer", "count=exact");
        let response = StoreClient::check(req.send().await?).await?;

        let counted = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(content_range_total);
        let rows: Vec<T> = response.json().await?;
        let total = counted.unwrap_or(rows.len() as u64);
        debug!(table = self.table, page = request.page, total, "fetched page");
        Ok(Page { rows, total })
    }

    /// All rows matching `query`. Unfiltered when `query` is empty.
    pub async fn list(&self, query: Query) -> Result<Vec<T>, StoreError> {
        let url = self.store.rest_url(self.table);
        let req = query.apply(self.store.request(Method::GET, &url));
        let response = StoreClient::check(req.send().await?).await?;
        Ok(response.json().await?)
    }

    /// Point lookup by id.
    pub async fn find(&self, id: i64) -> Result<Option<T>, StoreError> {
        let rows = self.list(Query::new().eq("id", id).limit(1)).await?;
        Ok(rows.into_iter().next())
    }

    /// Point lookup by id, failing when the row is absent.
    pub async fn get(&self, id: i64) -> Result<T, StoreError> {
        self.find(id).await?.ok_or(StoreError::NotFound {
            table: self.table,
            id,
        })
    }

    /// Insert one row and return it as stored.
    pub async fn insert<P: Serialize>(&self, row: &P) -> Result<T, StoreError> {
        let rows = self.insert_many(std::slice::from_ref(row)).await?;
        rows.into_iter()
            .next()
            .ok_or(StoreError::EmptyWrite { table: self.table })
    }

    /// Insert a batch in one request. The backend applies the whole batch or
    /// none of it.
    pub async fn insert_many<P: Serialize>(&self, rows: &[P]) -> Result<Vec<T>, StoreError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.store.rest_url(self.table);
        let req = self
            .store
            .request(Method::POST, &url)
            .header("Prefer", "return=representation")
            .json(&rows);
        let response = StoreClient::check(req.send().await?).await?;
        debug!(table = self.table, count = rows.len(), "inserted rows");
        Ok(response.json().await?)
    }

    /// Update one row by id. A write that matches no row surfaces as
    /// [`StoreError::NotFound`] instead of silently succeeding.
    pub async fn update<P: Serialize>(&self, id: i64, patch: &P) -> Result<T, StoreError> {
        let url = self.store.rest_url(self.table);
        let req = Query::new()
            .eq("id", id)
            .apply(self.store.request(Method::PATCH, &url))
            .header("Prefer", "return=representation")
            .json(patch);
        let response = StoreClient::check(req.send().await?).await?;
        let rows: Vec<T> = response.json().await?;
        debug!(table = self.table, id, "updated row");
        rows.into_iter().next().ok_or(StoreError::NotFound {
            table: self.table,
            id,
        })
    }

    /// Delete a batch of rows by id in one request. No-op for an empty list.
    pub async fn delete_many(&self, ids: &[i64]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        let url = self.store.rest_url(self.table);
        let req = Query::new()
            .in_list("id", ids)
            .apply(self.store.request(Method::DELETE, &url));
        StoreClient::check(req.send().await?).await?;
        debug!(table = self.table, count = ids.len(), "deleted rows");
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.delete_many(&[id]).await
    }
}
