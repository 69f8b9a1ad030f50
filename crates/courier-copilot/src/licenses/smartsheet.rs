//! License counts kept in a Smartsheet sheet: organization name in the first
//! column, remaining seats in the second.

use super::{LicenseError, LicenseSource};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, warn};

pub const DEFAULT_API_URL: &str = "https://api.smartsheet.com/2.0";

#[derive(Debug, Deserialize)]
struct Sheet {
    #[serde(default)]
    rows: Vec<Row>,
}

#[derive(Debug, Deserialize)]
struct Row {
    id: i64,
    #[serde(default)]
    cells: Vec<Cell>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Cell {
    column_id: i64,
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CountCell {
    row_id: i64,
    column_id: i64,
}

pub struct SmartsheetSource {
    http: Client,
    sheet_url: Url,
    rows_url: Url,
    token: String,
    cells: Mutex<HashMap<String, CountCell>>,
}

impl SmartsheetSource {
    pub fn new(
        http: Client,
        base_url: &str,
        sheet_id: &str,
        token: impl Into<String>,
    ) -> Result<Self, LicenseError> {
        let base = Url::parse(base_url)
            .map_err(|e| LicenseError::Upstream(format!("invalid Smartsheet URL {base_url}: {e}")))?;
        let sheet_url = with_segments(&base, &["sheets", sheet_id])?;
        let rows_url = with_segments(&base, &["sheets", sheet_id, "rows"])?;
        Ok(Self {
            http,
            sheet_url,
            rows_url,
            token: token.into(),
            cells: Mutex::new(HashMap::new()),
        })
    }

    fn count_cell(&self, org: &str) -> Option<CountCell> {
        self.cells
            .lock()
            .ok()
            .and_then(|cells| cells.get(org).copied())
    }
}

impl LicenseSource for SmartsheetSource {
    async fn fetch(&self) -> Result<HashMap<String, i64>, LicenseError> {
        let response = self
            .http
            .get(self.sheet_url.clone())
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .send()
            .await
            .map_err(upstream)?;
        let status = response.status();
        if !status.is_success() {
            return Err(LicenseError::Upstream(format!(
                "Smartsheet returned {status} reading the sheet"
            )));
        }
        let sheet: Sheet = response.json().await.map_err(upstream)?;

        let mut counts = HashMap::new();
        let mut cells = HashMap::new();
        for row in sheet.rows {
            let Some((org, count, column_id)) = parse_row(&row) else {
                debug!(row = row.id, "skipping row without organization and count");
                continue;
            };
            cells.insert(
                org.clone(),
                CountCell {
                    row_id: row.id,
                    column_id,
                },
            );
            counts.insert(org, count);
        }

        if let Ok(mut known) = self.cells.lock() {
            *known = cells;
        }
        Ok(counts)
    }

    async fn write(&self, org: &str, count: i64) -> Result<(), LicenseError> {
        let Some(cell) = self.count_cell(org) else {
            warn!(org, "no sheet row for organization, count not written");
            return Err(LicenseError::Upstream(format!("no sheet row for '{org}'")));
        };

        let update = serde_json::json!([{
            "id": cell.row_id,
            "cells": [{ "columnId": cell.column_id, "value": count }],
        }]);
        let response = self
            .http
            .put(self.rows_url.clone())
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .json(&update)
            .send()
            .await
            .map_err(upstream)?;
        let status = response.status();
        if !status.is_success() {
            return Err(LicenseError::Upstream(format!(
                "Smartsheet returned {status} updating '{org}'"
            )));
        }
        debug!(org, count, "wrote license count");
        Ok(())
    }
}

fn with_segments(base: &Url, segments: &[&str]) -> Result<Url, LicenseError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| LicenseError::Upstream(format!("invalid Smartsheet URL {base}")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn parse_row(row: &Row) -> Option<(String, i64, i64)> {
    let [org_cell, count_cell, ..] = row.cells.as_slice() else {
        return None;
    };
    let org = org_cell.value.as_str()?.trim();
    if org.is_empty() {
        return None;
    }
    let count = match &count_cell.value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?,
        Value::String(s) => s.trim().parse::<f64>().ok()? as i64,
        _ => return None,
    };
    Some((org.to_string(), count, count_cell.column_id))
}

fn upstream(error: reqwest::Error) -> LicenseError {
    LicenseError::Upstream(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn sheet() -> Value {
        serde_json::json!({
            "id": 42,
            "rows": [
                { "id": 1, "cells": [
                    { "columnId": 10, "value": "acme" },
                    { "columnId": 11, "value": 3 }
                ]},
                { "id": 2, "cells": [
                    { "columnId": 10, "value": "globex" },
                    { "columnId": 11, "value": "2" }
                ]},
                { "id": 3, "cells": [
                    { "columnId": 10, "value": "initech" },
                    { "columnId": 11, "value": 4.0 }
                ]},
                { "id": 4, "cells": [{ "columnId": 10, "value": "lonely" }] },
                { "id": 5, "cells": [
                    { "columnId": 10 },
                    { "columnId": 11, "value": 9 }
                ]}
            ]
        })
    }

    fn source(server: &MockServer) -> SmartsheetSource {
        SmartsheetSource::new(Client::new(), &server.base_url(), "42", "ss_token").unwrap()
    }

    #[tokio::test]
    async fn fetch_reads_org_and_count_columns() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/sheets/42")
                    .header("authorization", "Bearer ss_token");
                then.status(200).json_body(sheet());
            })
            .await;

        let counts = source(&server).fetch().await.unwrap();

        mock.assert_async().await;
        assert_eq!(
            counts,
            HashMap::from([
                ("acme".to_string(), 3),
                ("globex".to_string(), 2),
                ("initech".to_string(), 4),
            ])
        );
    }

    #[tokio::test]
    async fn write_updates_the_count_cell_of_the_org_row() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/sheets/42");
                then.status(200).json_body(sheet());
            })
            .await;
        let update = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/sheets/42/rows")
                    .json_body(serde_json::json!([
                        { "id": 2, "cells": [{ "columnId": 11, "value": 1 }] }
                    ]));
                then.status(200).json_body(serde_json::json!({ "message": "SUCCESS" }));
            })
            .await;

        let source = source(&server);
        source.fetch().await.unwrap();
        source.write("globex", 1).await.unwrap();

        update.assert_async().await;
    }

    #[tokio::test]
    async fn write_before_fetch_has_no_row_to_update() {
        let server = MockServer::start_async().await;

        let err = source(&server).write("acme", 1).await.unwrap_err();

        assert!(matches!(err, LicenseError::Upstream(_)));
    }

    #[tokio::test]
    async fn error_status_is_upstream_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/sheets/42");
                then.status(403);
            })
            .await;

        let err = source(&server).fetch().await.unwrap_err();

        assert!(err.to_string().contains("403"));
    }
}
