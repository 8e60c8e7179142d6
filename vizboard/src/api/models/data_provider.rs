//! API request models for the data-provider routes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::provider::PageInfo;
use crate::types::SourceId;

/// Run a script against a stored source.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExecuteRequest {
    #[schema(value_type = String, format = "uuid")]
    pub source_id: SourceId,
    #[schema(example = "SELECT region, SUM(amount) FROM sales WHERE region = $region$ GROUP BY region")]
    pub script: String,
    /// Values for `$name$` placeholders, substituted as quoted literals
    #[serde(default)]
    pub variables: HashMap<String, String>,
    /// Run paged when present; otherwise the result is capped at the server's row limit
    pub page_info: Option<PageInfo>,
}
