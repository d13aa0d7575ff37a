//! Parameter bundles.
//!
//! A statement takes either no parameters, an ordered positional sequence,
//! or a name-to-value mapping. The two non-empty shapes are never mixed
//! within one statement; adapters reject markers they cannot resolve.

use std::collections::HashMap;

use crate::value::SqlValue;

/// Caller-supplied statement parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Params {
    /// No parameters.
    #[default]
    Empty,
    /// Ordered values for `?` markers. Nulls are preserved.
    Positional(Vec<SqlValue>),
    /// Values for `@name` markers.
    Named(HashMap<String, SqlValue>),
}

impl Params {
    pub fn none() -> Self {
        Params::Empty
    }

    pub fn positional<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<SqlValue>,
    {
        Params::Positional(values.into_iter().map(Into::into).collect())
    }

    pub fn named<I, K, T>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: Into<SqlValue>,
    {
        Params::Named(
            values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Wraps a single scalar as a one-element positional bundle.
    pub fn single(value: impl Into<SqlValue>) -> Self {
        Params::Positional(vec![value.into()])
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Params::Empty => true,
            Params::Positional(values) => values.is_empty(),
            Params::Named(values) => values.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Params::Empty => 0,
            Params::Positional(values) => values.len(),
            Params::Named(values) => values.len(),
        }
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Self {
        Params::Empty
    }
}

impl<T> From<Vec<T>> for Params
where
    T: Into<SqlValue>,
{
    fn from(values: Vec<T>) -> Self {
        Params::positional(values)
    }
}

impl<T> From<HashMap<String, T>> for Params
where
    T: Into<SqlValue>,
{
    fn from(values: HashMap<String, T>) -> Self {
        Params::named(values)
    }
}

impl<K, T, const N: usize> From<[(K, T); N]> for Params
where
    K: Into<String>,
    T: Into<SqlValue>,
{
    fn from(values: [(K, T); N]) -> Self {
        Params::named(values)
    }
}
