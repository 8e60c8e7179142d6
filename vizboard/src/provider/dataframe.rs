//! Tabular query results.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

/// Coarse column type used by the chart layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    String,
    Numeric,
    Date,
    Boolean,
    Unknown,
}

impl DataType {
    /// Map a database type name (`VARCHAR(255)`, `double precision`, `INT UNSIGNED`, ...) onto a coarse type.
    pub fn from_sql_type(type_name: &str) -> Self {
        let upper = type_name.trim().to_ascii_uppercase();
        let base = upper.split(['(', ' ']).next().unwrap_or_default();

        match base {
            "BOOL" | "BOOLEAN" | "BIT" => DataType::Boolean,
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" | "INT2" | "INT4" | "INT8" | "SERIAL"
            | "SMALLSERIAL" | "BIGSERIAL" | "DECIMAL" | "DEC" | "NUMERIC" | "NUMBER" | "REAL" | "FLOAT" | "FLOAT4" | "FLOAT8"
            | "DOUBLE" | "MONEY" => DataType::Numeric,
            "DATE" | "TIME" | "TIMETZ" | "TIMESTAMP" | "TIMESTAMPTZ" | "DATETIME" | "YEAR" | "INTERVAL" => DataType::Date,
            "CHAR" | "VARCHAR" | "CHARACTER" | "NCHAR" | "NVARCHAR" | "BPCHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT"
            | "CLOB" | "STRING" | "CITEXT" | "NAME" | "UUID" | "JSON" | "JSONB" | "ENUM" | "SET" => DataType::String,
            _ => DataType::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// One-based page position plus the total row count of the unpaged query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PageInfo {
    pub page_no: i64,
    pub page_size: i64,
    #[serde(default)]
    pub total: i64,
}

impl PageInfo {
    pub fn new(page_no: i64, page_size: i64) -> Self {
        Self {
            page_no,
            page_size,
            total: 0,
        }
    }

    /// Rows preceding this page.
    pub fn offset(&self) -> i64 {
        (self.page_no.max(1) - 1).saturating_mul(self.page_size)
    }

    /// Clamp the page size into `1..=max_page_size`, falling back to `default_page_size` when unset.
    pub fn clamped(mut self, default_page_size: i64, max_page_size: i64) -> Self {
        if self.page_size <= 0 {
            self.page_size = default_page_size;
        }
        self.page_size = self.page_size.clamp(1, max_page_size.max(1));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Dataframe {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub columns: Vec<Column>,
    #[schema(value_type = Vec<Vec<Object>>)]
    pub rows: Vec<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_info: Option<PageInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
}

impl Dataframe {
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: None,
            columns,
            rows,
            page_info: None,
            script: None,
        }
    }

    pub fn with_page_info(mut self, page_info: PageInfo) -> Self {
        self.page_info = Some(page_info);
        self
    }

    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.script = Some(script.into());
        self
    }
}
