//! HTTP gateway for a PostgREST-style hosted datastore.

use std::future::Future;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use subledger_core::{
    ContractHeader, ContractSummary, ImportState, ProjectRef, RecordId, SubcontractorRef,
    TradeLineItem,
};
use tracing::{debug, info};

use crate::{ContractGateway, StoreError};

const SUMMARY_SELECT: &str =
    "contract_id,parent_contract_id,project_id,subcontractor_id,import_state";

/// Rows requested per page. Servers may cap pages lower.
const PAGE_SIZE: usize = 1000;

/// Rows fetched per name lookup before picking the exact match.
const NAME_CANDIDATES: usize = 10;

/// REST client speaking the PostgREST dialect (`/rest/v1/<table>`).
pub struct RestGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct IdRow {
    id: RecordId,
}

#[derive(Deserialize)]
struct NamedIdRow {
    id: RecordId,
    name: String,
}

/// Reference rows matched by display name.
trait Named {
    fn name(&self) -> &str;
}

impl Named for ProjectRef {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for SubcontractorRef {
    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Serialize)]
struct TradeItemRow<'a> {
    subcontract_id: RecordId,
    #[serde(flatten)]
    item: &'a TradeLineItem,
}

#[derive(Serialize)]
struct ResponsibilityRow<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct LinkRow {
    subcontract_id: RecordId,
    responsibility_id: RecordId,
}

#[derive(Serialize)]
struct StatePatch {
    import_state: ImportState,
}

impl RestGateway {
    /// Create a client for the datastore at `base_url` (no trailing slash needed).
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn get_rows<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, StoreError> {
        let url = self.table_url(table);
        debug!(url = %url, "querying datastore");
        let resp = self
            .authed(self.client.get(&url))
            .query(query)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn find_by_name<T: DeserializeOwned + Named>(
        &self,
        table: &str,
        select: &str,
        name: &str,
    ) -> Result<Option<T>, StoreError> {
        let name = name.trim();
        let rows: Vec<T> = self
            .get_rows(
                table,
                &[
                    ("select", select.to_string()),
                    ("name", format!("ilike.{}", ilike_pattern(name))),
                    ("order", "id".to_string()),
                    ("limit", NAME_CANDIDATES.to_string()),
                ],
            )
            .await?;
        Ok(exact_match(rows, name))
    }

    async fn summaries(
        &self,
        filter: Option<(&str, String)>,
    ) -> Result<Vec<ContractSummary>, StoreError> {
        collect_pages(|offset| {
            let mut query = vec![
                ("select", SUMMARY_SELECT.to_string()),
                ("order", "id".to_string()),
                ("limit", PAGE_SIZE.to_string()),
                ("offset", offset.to_string()),
            ];
            query.extend(filter.clone());
            async move { self.get_rows("subcontracts", &query).await }
        })
        .await
    }
}

/// Fetch pages by offset until one comes back empty.
///
/// A short page is not treated as the last one, since the server may cap
/// page sizes below what was asked for.
async fn collect_pages<T, F, Fut>(mut fetch: F) -> Result<Vec<T>, StoreError>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<Vec<T>, StoreError>>,
{
    let mut rows = Vec::new();
    loop {
        let page = fetch(rows.len()).await?;
        if page.is_empty() {
            return Ok(rows);
        }
        debug!(offset = rows.len(), count = page.len(), "fetched page");
        rows.extend(page);
    }
}

/// Literal `ilike` pattern for `name`.
///
/// `%`, `_` and `\` are escaped. PostgREST reads `*` as `%` with no escape,
/// so it becomes the single-character `_` and [`exact_match`] settles it.
fn ilike_pattern(name: &str) -> String {
    let mut pattern = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '\\' | '%' | '_' => {
                pattern.push('\\');
                pattern.push(c);
            }
            '*' => pattern.push('_'),
            _ => pattern.push(c),
        }
    }
    pattern
}

fn exact_match<T: Named>(rows: Vec<T>, name: &str) -> Option<T> {
    let wanted = name.trim().to_lowercase();
    rows.into_iter()
        .find(|row| row.name().trim().to_lowercase() == wanted)
}

/// Turn a non-2xx response into [`StoreError::Server`].
async fn check(resp: Response) -> Result<Response, StoreError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(StoreError::Server {
            status: status.as_u16(),
            body,
        });
    }
    Ok(resp)
}

#[async_trait]
impl ContractGateway for RestGateway {
    async fn find_project(&self, name: &str) -> Result<Option<ProjectRef>, StoreError> {
        self.find_by_name("projects", "id,name,code", name).await
    }

    async fn find_subcontractor(
        &self,
        name: &str,
    ) -> Result<Option<SubcontractorRef>, StoreError> {
        self.find_by_name("subcontractors", "id,name", name).await
    }

    async fn list_contracts(&self) -> Result<Vec<ContractSummary>, StoreError> {
        let contracts = self.summaries(None).await?;
        info!(count = contracts.len(), "listed stored contracts");
        Ok(contracts)
    }

    async fn list_addenda(&self, parent: &str) -> Result<Vec<ContractSummary>, StoreError> {
        self.summaries(Some(("parent_contract_id", format!("eq.{parent}"))))
            .await
    }

    async fn list_incomplete(&self) -> Result<Vec<ContractSummary>, StoreError> {
        self.summaries(Some((
            "import_state",
            format!("eq.{}", ImportState::Pending.as_str()),
        )))
        .await
    }

    async fn create_contract_header(
        &self,
        header: &ContractHeader,
    ) -> Result<RecordId, StoreError> {
        let resp = self
            .authed(self.client.post(self.table_url("subcontracts")))
            .header("Prefer", "return=representation")
            .json(header)
            .send()
            .await?;
        let rows: Vec<IdRow> = check(resp).await?.json().await?;
        let id = rows.first().map(|r| r.id).ok_or(StoreError::NoResults)?;
        info!(id, contract_id = %header.contract_id, "created contract header");
        Ok(id)
    }

    async fn create_trade_items(
        &self,
        contract: RecordId,
        items: &[TradeLineItem],
    ) -> Result<(), StoreError> {
        let rows: Vec<TradeItemRow<'_>> = items
            .iter()
            .map(|item| TradeItemRow {
                subcontract_id: contract,
                item,
            })
            .collect();
        let resp = self
            .authed(self.client.post(self.table_url("subcontract_trade_items")))
            .json(&rows)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn resolve_responsibilities(
        &self,
        names: &[String],
    ) -> Result<Vec<RecordId>, StoreError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<ResponsibilityRow<'_>> = names
            .iter()
            .map(|name| ResponsibilityRow { name: name.trim() })
            .collect();
        let resp = self
            .authed(self.client.post(self.table_url("responsibilities")))
            .query(&[("on_conflict", "name")])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&rows)
            .send()
            .await?;
        let stored: Vec<NamedIdRow> = check(resp).await?.json().await?;

        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            let id = stored
                .iter()
                .find(|row| row.name.eq_ignore_ascii_case(name.trim()))
                .map(|row| row.id)
                .ok_or_else(|| {
                    StoreError::Other(format!("responsibility {name:?} not returned"))
                })?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    async fn create_responsibility_links(
        &self,
        contract: RecordId,
        responsibility_ids: &[RecordId],
    ) -> Result<(), StoreError> {
        let rows: Vec<LinkRow> = responsibility_ids
            .iter()
            .map(|&responsibility_id| LinkRow {
                subcontract_id: contract,
                responsibility_id,
            })
            .collect();
        let resp = self
            .authed(self.client.post(self.table_url("subcontract_responsibilities")))
            .json(&rows)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn mark_complete(&self, contract: RecordId) -> Result<(), StoreError> {
        let resp = self
            .authed(self.client.patch(self.table_url("subcontracts")))
            .query(&[("id", format!("eq.{contract}"))])
            .json(&StatePatch {
                import_state: ImportState::Complete,
            })
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn gateway_trims_trailing_slash() {
        let gw = RestGateway::new("https://db.example.com/".into(), "key".into());
        assert_eq!(gw.base_url, "https://db.example.com");
        assert_eq!(
            gw.table_url("subcontracts"),
            "https://db.example.com/rest/v1/subcontracts"
        );
    }

    #[test]
    fn trade_item_row_is_flat() {
        let d = Decimal::from;
        let item = TradeLineItem::new("Masonry", "Brick Work", "nos", d(100), d(50), d(5)).unwrap();
        let row = TradeItemRow {
            subcontract_id: 12,
            item: &item,
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["subcontract_id"], 12);
        assert_eq!(json["trade"], "Masonry");
        assert_eq!(json["total"], "5000");
    }

    #[test]
    fn summary_without_import_state_defaults_to_pending() {
        let json = r#"[{
            "contract_id": "ID-0504-0001",
            "parent_contract_id": null,
            "project_id": 4,
            "subcontractor_id": 9
        }]"#;
        let rows: Vec<ContractSummary> = serde_json::from_str(json).unwrap();
        assert_eq!(rows[0].import_state, ImportState::Pending);
        assert!(rows[0].parent_contract_id.is_none());
    }

    #[test]
    fn like_wildcards_are_literal() {
        assert_eq!(ilike_pattern("Sample Project"), "Sample Project");
        assert_eq!(ilike_pattern("100% Build_Co"), r"100\% Build\_Co");
        assert_eq!(ilike_pattern(r"A\B"), r"A\\B");
        assert_eq!(ilike_pattern("Star*Works"), "Star_Works");
    }

    #[test]
    fn lookup_keeps_only_the_exact_name() {
        let sub = |id, name: &str| SubcontractorRef {
            id,
            name: name.into(),
        };
        let rows = vec![sub(1, "StarXWorks"), sub(2, " star*works ")];
        assert_eq!(exact_match(rows, "Star*Works").map(|s| s.id), Some(2));
        assert!(exact_match(vec![sub(1, "Sample Co")], "Sample").is_none());
    }

    #[tokio::test]
    async fn pages_are_read_until_an_empty_one() {
        // Server caps pages at 2 rows.
        let table: Vec<u32> = (1..=5).collect();
        let mut offsets = Vec::new();
        let rows = collect_pages(|offset| {
            offsets.push(offset);
            let page: Vec<u32> = table.iter().skip(offset).take(2).copied().collect();
            async move { Ok::<_, StoreError>(page) }
        })
        .await
        .unwrap();
        assert_eq!(rows, table);
        assert_eq!(offsets, vec![0, 2, 4, 5]);
    }

    #[tokio::test]
    async fn page_error_aborts_listing() {
        let mut calls = 0;
        let result: Result<Vec<u32>, _> = collect_pages(|offset| {
            calls += 1;
            async move {
                if offset == 0 {
                    Ok(vec![1, 2])
                } else {
                    Err(StoreError::Other("page 2 lost".into()))
                }
            }
        })
        .await;
        assert!(matches!(result, Err(StoreError::Other(_))));
        assert_eq!(calls, 2);
    }

    #[test]
    fn state_patch_uses_snake_case() {
        let json = serde_json::to_string(&StatePatch {
            import_state: ImportState::Complete,
        })
        .unwrap();
        assert_eq!(json, r#"{"import_state":"complete"}"#);
    }
}
