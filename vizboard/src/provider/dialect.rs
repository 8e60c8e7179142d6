//! SQL dialects supported by the data-provider layer.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use utoipa::ToSchema;

use super::{DataProviderError, PageInfo, SourceConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Dialect {
    Postgresql,
    Mysql,
    Sqlite,
}

impl Dialect {
    pub const ALL: [Dialect; 3] = [Dialect::Postgresql, Dialect::Mysql, Dialect::Sqlite];

    /// Look up a dialect by its database type name, case-insensitively.
    pub fn from_db_type(db_type: &str) -> Result<Self, DataProviderError> {
        match db_type.trim().to_ascii_uppercase().as_str() {
            "POSTGRESQL" | "POSTGRES" => Ok(Dialect::Postgresql),
            "MYSQL" | "MARIADB" => Ok(Dialect::Mysql),
            "SQLITE" => Ok(Dialect::Sqlite),
            _ => Err(DataProviderError::DialectMismatch {
                db_type: db_type.to_string(),
            }),
        }
    }

    /// Infer the dialect from a connection URL scheme.
    pub fn from_url(url: &str) -> Result<Self, DataProviderError> {
        let scheme = url.split_once(':').map(|(scheme, _)| scheme).unwrap_or(url);
        Self::from_db_type(scheme)
    }

    /// An explicit `db_type` wins over the URL scheme.
    pub fn resolve(config: &SourceConfig) -> Result<Self, DataProviderError> {
        match config.db_type.as_deref().filter(|t| !t.trim().is_empty()) {
            Some(db_type) => Self::from_db_type(db_type),
            None => Self::from_url(&config.url),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Postgresql => "POSTGRESQL",
            Dialect::Mysql => "MYSQL",
            Dialect::Sqlite => "SQLITE",
        }
    }

    pub fn identifier_quote(&self) -> char {
        match self {
            Dialect::Mysql => '`',
            Dialect::Postgresql | Dialect::Sqlite => '"',
        }
    }

    /// Bind placeholder for the `index`-th (1-based) parameter.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Dialect::Postgresql => format!("${index}"),
            Dialect::Sqlite => format!("?{index}"),
            Dialect::Mysql => "?".to_string(),
        }
    }

    pub fn supports_paging(&self) -> bool {
        true
    }

    pub fn quote_identifier(&self, identifier: &str) -> String {
        let quote = self.identifier_quote();
        let escaped = identifier.replace(quote, &format!("{quote}{quote}"));
        format!("{quote}{escaped}{quote}")
    }

    pub fn quote_literal(&self, value: &str) -> String {
        let mut escaped = value.replace('\'', "''");
        if *self == Dialect::Mysql {
            escaped = escaped.replace('\\', "\\\\");
        }
        format!("'{escaped}'")
    }

    // The script may end in a line comment, so it gets its own line inside the wrapper
    pub fn wrap_paging(&self, sql: &str, page_info: &PageInfo) -> String {
        format!(
            "SELECT * FROM (\n{sql}\n) vb_page LIMIT {} OFFSET {}",
            page_info.page_size,
            page_info.offset()
        )
    }

    pub fn wrap_count(&self, sql: &str) -> String {
        format!("SELECT COUNT(*) FROM (\n{sql}\n) vb_count")
    }

    /// Substitute `$name$` variables with quoted literals, trim the script and drop trailing `;`.
    ///
    /// Substitution is a single left-to-right pass, so text inserted for one variable is never
    /// scanned again. The result must be one read-only query, see [`Dialect::ensure_single_query`].
    pub fn render_script(&self, script: &str, variables: &HashMap<String, String>) -> Result<String, DataProviderError> {
        let rendered = self.substitute(script, variables);

        let rendered = rendered.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace());
        if rendered.is_empty() {
            return Err(DataProviderError::EmptyScript);
        }
        self.ensure_single_query(rendered)?;
        Ok(rendered.to_string())
    }

    fn substitute(&self, script: &str, variables: &HashMap<String, String>) -> String {
        let mut out = String::with_capacity(script.len());
        let mut rest = script;

        while let Some(start) = rest.find('$') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let name_len = after
                .find(|c: char| !(c.is_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            let name = &after[..name_len];

            if !name.is_empty()
                && after[name_len..].starts_with('$')
                && let Some(value) = variables.get(name)
            {
                out.push_str(&self.quote_literal(value));
                rest = &after[name_len + 1..];
                continue;
            }
            out.push('$');
            rest = after;
        }

        out.push_str(rest);
        out
    }

    /// Reject anything but a single statement that starts like a query.
    ///
    /// Literals, quoted identifiers and comments are skipped, so a `;` inside them is fine, and
    /// only comments may follow a trailing `;`. Sources are also opened read-only, this check just
    /// turns the common mistakes into a clear error before anything reaches the database.
    pub fn ensure_single_query(&self, sql: &str) -> Result<(), DataProviderError> {
        let chars: Vec<char> = sql.chars().collect();
        let mut keyword = String::new();
        let mut keyword_done = false;
        let mut terminated = false;
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            let next = chars.get(i + 1).copied();
            let significant = match c {
                '-' if next == Some('-') => {
                    i = skip_line(&chars, i);
                    false
                }
                '#' if *self == Dialect::Mysql => {
                    i = skip_line(&chars, i);
                    false
                }
                '/' if next == Some('*') => {
                    i += 2;
                    while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                        i += 1;
                    }
                    i += 1;
                    false
                }
                '\'' | '"' | '`' => {
                    i = self.skip_quoted(&chars, i);
                    true
                }
                ';' => {
                    terminated = true;
                    false
                }
                c if c.is_whitespace() => false,
                _ => true,
            };

            if significant {
                if terminated {
                    return Err(DataProviderError::UnsupportedStatement {
                        message: "only one statement can be run at a time".to_string(),
                    });
                }
                if !keyword_done {
                    if c.is_ascii_alphabetic() {
                        keyword.push(c.to_ascii_uppercase());
                    } else if !(c == '(' && keyword.is_empty()) {
                        keyword_done = true;
                    }
                }
            } else if !keyword.is_empty() {
                keyword_done = true;
            }
            i += 1;
        }

        if QUERY_KEYWORDS.contains(&keyword.as_str()) {
            Ok(())
        } else {
            Err(DataProviderError::UnsupportedStatement {
                message: format!("only queries that return rows can be run, found `{keyword}`"),
            })
        }
    }

    /// Index of the quote closing the literal that opens at `start`, or the end of input.
    fn skip_quoted(&self, chars: &[char], start: usize) -> usize {
        let quote = chars[start];
        let mut i = start + 1;
        while i < chars.len() {
            if chars[i] == '\\' && quote != '`' && *self == Dialect::Mysql {
                i += 2;
                continue;
            }
            if chars[i] == quote {
                if chars.get(i + 1) == Some(&quote) {
                    i += 2;
                    continue;
                }
                return i;
            }
            i += 1;
        }
        chars.len()
    }
}

/// Leading keywords of statements that return rows.
const QUERY_KEYWORDS: &[&str] = &["SELECT", "WITH", "VALUES", "TABLE", "SHOW", "DESC", "DESCRIBE"];

fn skip_line(chars: &[char], start: usize) -> usize {
    let mut i = start;
    while i < chars.len() && chars[i] != '\n' {
        i += 1;
    }
    i
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
