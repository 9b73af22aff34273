//! Column resolution: free-form spreadsheet headers → semantic fields.
//!
//! Header names and aliases are compared after normalization (lowercase, no
//! whitespace, no `.`/`_`/`-`). Aliases are tried in priority order and the
//! first column holding a present value wins.

use serde_json::{Map, Value};

use crate::config::ColumnProfile;

/// One input record: column name → scalar cell value, in column order.
pub type Row = Map<String, Value>;

/// Normalize a column name or alias for comparison.
pub fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '.' | '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Missing keys, `null` and `""` are absent. Whitespace, `0` and `false` are not.
pub fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Render a cell as a join key. Integral numbers drop their fractional part
/// so `123` and `123.0` produce the same key.
pub fn value_to_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                n.as_f64().map(|f| {
                    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                        (f as i64).to_string()
                    } else {
                        f.to_string()
                    }
                })
            }
        }
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Priority-ordered aliases for one field, normalized once.
#[derive(Debug, Clone, Default)]
pub struct AliasList {
    normalized: Vec<String>,
}

impl AliasList {
    pub fn new<S: AsRef<str>>(aliases: &[S]) -> Self {
        Self {
            normalized: aliases.iter().map(|a| normalize_key(a.as_ref())).collect(),
        }
    }
}

/// A row with its column names normalized, so several fields can be
/// resolved without re-normalizing every header.
pub struct NormalizedRow<'a> {
    columns: Vec<(String, &'a Value)>,
}

impl<'a> NormalizedRow<'a> {
    pub fn new(row: &'a Row) -> Self {
        Self {
            columns: row.iter().map(|(k, v)| (normalize_key(k), v)).collect(),
        }
    }

    /// First present value under any alias, aliases taken in priority order.
    pub fn resolve(&self, aliases: &AliasList) -> Option<&'a Value> {
        aliases.normalized.iter().find_map(|alias| {
            self.columns
                .iter()
                .find(|(column, value)| column == alias && !is_absent(value))
                .map(|(_, value)| *value)
        })
    }
}

/// A [`ColumnProfile`] with every alias list pre-normalized.
#[derive(Debug, Clone)]
pub struct ColumnResolver {
    pub account: AliasList,
    pub layer: AliasList,
    pub parent: AliasList,
    pub attributes: Vec<(String, AliasList)>,
}

impl ColumnResolver {
    pub fn compile(profile: &ColumnProfile) -> Self {
        Self {
            account: AliasList::new(&profile.account_aliases),
            layer: AliasList::new(&profile.layer_aliases),
            parent: AliasList::new(&profile.parent_aliases),
            attributes: profile
                .attribute_fields
                .iter()
                .map(|f| (f.key.clone(), AliasList::new(&f.aliases)))
                .collect(),
        }
    }
}

impl Default for ColumnResolver {
    fn default() -> Self {
        Self::compile(&ColumnProfile::default())
    }
}
