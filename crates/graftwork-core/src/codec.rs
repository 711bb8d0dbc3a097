//! # Structured-Value Codec
//!
//! Flattens logical values into a flat, string-keyed namespace and back.
//!
//! A dense value named `x` becomes the single entry `x$dense_tensor`. A sparse
//! value becomes three sibling entries `x$indices`, `x$values` and
//! `x$dense_shape`. Every flat key carries one of these four suffixes, so
//! names never collide and every flat key maps back to exactly one logical
//! name, even when the logical name itself contains `$`.

use crate::{GraftError, LogicalValue, SparseValue, TensorRef};
use std::collections::BTreeMap;
use std::fmt;

/// Map from logical name to structured value.
pub type LogicalMap = BTreeMap<String, LogicalValue>;

/// Map from flat key to component tensor.
pub type FlatMap = BTreeMap<String, TensorRef>;

/// Separator between a logical name and its suffix.
pub const SEPARATOR: char = '$';

// =============================================================================
// SUFFIX & FLAT KEY
// =============================================================================

/// The closed set of flat-key suffixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Suffix {
    Indices,
    Values,
    DenseShape,
    DenseTensor,
}

impl Suffix {
    /// All suffixes in encoding order.
    pub const ALL: [Suffix; 4] = [
        Suffix::Indices,
        Suffix::Values,
        Suffix::DenseShape,
        Suffix::DenseTensor,
    ];

    /// The suffix as it appears in a flat key.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Indices => "indices",
            Self::Values => "values",
            Self::DenseShape => "dense_shape",
            Self::DenseTensor => "dense_tensor",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|suffix| suffix.as_str() == s)
    }
}

/// A decoded flat key: `(logical name, suffix)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlatKey {
    logical: String,
    suffix: Suffix,
}

impl FlatKey {
    /// Create a flat key for `logical` with `suffix`.
    #[must_use]
    pub fn new(logical: impl Into<String>, suffix: Suffix) -> Self {
        Self {
            logical: logical.into(),
            suffix,
        }
    }

    /// Decode a flat key, splitting on the last `$`.
    pub fn parse(key: &str) -> Result<Self, GraftError> {
        key.rsplit_once(SEPARATOR)
            .and_then(|(logical, suffix)| Suffix::parse(suffix).map(|s| Self::new(logical, s)))
            .ok_or_else(|| GraftError::UnrecognizedKey(key.to_string()))
    }

    /// The logical name part.
    #[must_use]
    pub fn logical(&self) -> &str {
        &self.logical
    }

    /// The suffix part.
    #[must_use]
    pub fn suffix(&self) -> Suffix {
        self.suffix
    }
}

impl fmt::Display for FlatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.logical, SEPARATOR, self.suffix.as_str())
    }
}

// =============================================================================
// FLATTEN / UNFLATTEN
// =============================================================================

/// Flatten logical values into flat entries.
///
/// Produces `3 * sparse + dense` entries.
#[must_use]
pub fn flatten(values: &LogicalMap) -> FlatMap {
    let mut flat = FlatMap::new();
    for (name, value) in values {
        match value {
            LogicalValue::Dense(tensor) => {
                flat.insert(
                    FlatKey::new(name.as_str(), Suffix::DenseTensor).to_string(),
                    tensor.clone(),
                );
            }
            LogicalValue::Sparse(sparse) => {
                flat.insert(
                    FlatKey::new(name.as_str(), Suffix::Indices).to_string(),
                    sparse.indices.clone(),
                );
                flat.insert(
                    FlatKey::new(name.as_str(), Suffix::Values).to_string(),
                    sparse.values.clone(),
                );
                flat.insert(
                    FlatKey::new(name.as_str(), Suffix::DenseShape).to_string(),
                    sparse.dense_shape.clone(),
                );
            }
        }
    }
    flat
}

#[derive(Default)]
struct Group {
    indices: Option<TensorRef>,
    values: Option<TensorRef>,
    dense_shape: Option<TensorRef>,
    dense: Option<TensorRef>,
}

impl Group {
    fn into_value(self, name: &str) -> Result<LogicalValue, GraftError> {
        let malformed = |reason: &str| GraftError::MalformedFlatGroup {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        match self {
            Group {
                dense: Some(tensor),
                indices: None,
                values: None,
                dense_shape: None,
            } => Ok(LogicalValue::Dense(tensor)),
            Group { dense: Some(_), .. } => {
                Err(malformed("encoded both as a dense and as a sparse value"))
            }
            Group {
                indices: Some(indices),
                values: Some(values),
                dense_shape: Some(dense_shape),
                dense: None,
            } => Ok(LogicalValue::Sparse(SparseValue::new(
                indices,
                values,
                dense_shape,
            ))),
            Group { indices: None, .. } => Err(malformed("sparse value is missing $indices")),
            Group { values: None, .. } => Err(malformed("sparse value is missing $values")),
            Group { .. } => Err(malformed("sparse value is missing $dense_shape")),
        }
    }
}

/// Reassemble logical values from flat entries. Inverse of [`flatten`].
///
/// Every key must end in a recognized suffix, and each logical name must be
/// either exactly one dense entry or exactly three sparse entries.
pub fn unflatten(flat: FlatMap) -> Result<LogicalMap, GraftError> {
    let mut groups: BTreeMap<String, Group> = BTreeMap::new();

    for (key, tensor) in flat {
        let key = FlatKey::parse(&key)?;
        let group = groups.entry(key.logical).or_default();
        let slot = match key.suffix {
            Suffix::Indices => &mut group.indices,
            Suffix::Values => &mut group.values,
            Suffix::DenseShape => &mut group.dense_shape,
            Suffix::DenseTensor => &mut group.dense,
        };
        *slot = Some(tensor);
    }

    groups
        .into_iter()
        .map(|(name, group)| group.into_value(&name).map(|value| (name, value)))
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DType, Identifier, Shape, TensorSpec};

    fn tensor(name: &str, dtype: DType) -> TensorRef {
        TensorRef::new(
            Identifier::tensor(name, 0),
            TensorSpec::new(dtype, Shape::vector()),
        )
    }

    fn sparse(prefix: &str) -> SparseValue {
        SparseValue::new(
            tensor(&format!("{}_indices", prefix), DType::Int64),
            tensor(&format!("{}_values", prefix), DType::String),
            tensor(&format!("{}_shape", prefix), DType::Int64),
        )
    }

    #[test]
    fn flatten_dense_emits_one_key() {
        let mut values = LogicalMap::new();
        values.insert("age".to_string(), tensor("age", DType::Float32).into());

        let flat = flatten(&values);
        assert_eq!(flat.len(), 1);
        assert!(flat.contains_key("age$dense_tensor"));
    }

    #[test]
    fn flatten_sparse_emits_three_keys() {
        let mut values = LogicalMap::new();
        values.insert("tags".to_string(), sparse("tags").into());

        let flat = flatten(&values);
        let keys: Vec<_> = flat.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["tags$dense_shape", "tags$indices", "tags$values"]
        );
    }

    #[test]
    fn flat_key_splits_on_last_separator() {
        let key = FlatKey::parse("a$b$values").expect("parse");
        assert_eq!(key.logical(), "a$b");
        assert_eq!(key.suffix(), Suffix::Values);
        assert_eq!(key.to_string(), "a$b$values");
    }

    #[test]
    fn unrecognized_suffix_rejected() {
        let mut flat = FlatMap::new();
        flat.insert("x$weights".to_string(), tensor("x", DType::Float32));
        assert!(matches!(
            unflatten(flat),
            Err(GraftError::UnrecognizedKey(k)) if k == "x$weights"
        ));
    }

    #[test]
    fn key_without_separator_rejected() {
        let mut flat = FlatMap::new();
        flat.insert("plain".to_string(), tensor("x", DType::Float32));
        assert!(matches!(unflatten(flat), Err(GraftError::UnrecognizedKey(_))));
    }

    #[test]
    fn incomplete_sparse_group_rejected() {
        let mut flat = FlatMap::new();
        flat.insert("s$indices".to_string(), tensor("i", DType::Int64));
        flat.insert("s$values".to_string(), tensor("v", DType::Int64));
        assert!(matches!(
            unflatten(flat),
            Err(GraftError::MalformedFlatGroup { name, .. }) if name == "s"
        ));
    }

    #[test]
    fn mixed_dense_and_sparse_group_rejected() {
        let mut flat = FlatMap::new();
        flat.insert("s$dense_tensor".to_string(), tensor("d", DType::Int64));
        flat.insert("s$values".to_string(), tensor("v", DType::Int64));
        assert!(matches!(
            unflatten(flat),
            Err(GraftError::MalformedFlatGroup { .. })
        ));
    }

    #[test]
    fn round_trip_mixed_values() {
        let mut values = LogicalMap::new();
        values.insert("age".to_string(), tensor("age", DType::Float32).into());
        values.insert("tags".to_string(), sparse("tags").into());
        values.insert("odd$name".to_string(), sparse("odd").into());

        let restored = unflatten(flatten(&values)).expect("unflatten");
        assert_eq!(restored, values);
    }

    #[test]
    fn empty_maps_round_trip() {
        let restored = unflatten(flatten(&LogicalMap::new())).expect("unflatten");
        assert!(restored.is_empty());
    }
}
