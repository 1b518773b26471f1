//! Location filter resolution
//!
//! Turns caller-supplied `region` / `province` / `city` values into a SQL
//! predicate. Only the column names of [`FilterKey`] are ever written into
//! the statement text; every value travels as a bound parameter.

use sqlx::{QueryBuilder, Sqlite};

use crate::error::{Result, StatisticsError};

/// Filterable columns, in hierarchy order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKey {
    Region,
    Province,
    City,
}

impl FilterKey {
    pub const ORDER: [FilterKey; 3] = [FilterKey::Region, FilterKey::Province, FilterKey::City];

    pub fn parse(key: &str) -> Option<Self> {
        match key {
            "region" => Some(FilterKey::Region),
            "province" => Some(FilterKey::Province),
            "city" => Some(FilterKey::City),
            _ => None,
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            FilterKey::Region => "region",
            FilterKey::Province => "province",
            FilterKey::City => "city",
        }
    }
}

/// Request-scoped location filter. Unset levels do not constrain the query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationFilter {
    region: Option<String>,
    province: Option<String>,
    city: Option<String>,
}

impl LocationFilter {
    /// Build from named pairs such as a query string
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut filter = Self::default();
        for (key, value) in pairs {
            let key = key.as_ref();
            let kind = FilterKey::parse(key).ok_or_else(|| {
                StatisticsError::InvalidFilter(format!("{} is not a valid filter", key))
            })?;
            let slot = filter.slot_mut(kind);
            if slot.is_some() {
                return Err(StatisticsError::InvalidFilter(format!(
                    "{} filter is given more than once",
                    key
                )));
            }
            *slot = Some(value.into());
        }
        Ok(filter)
    }

    /// Build from positional path segments: region, then province, then city
    pub fn from_path<S: AsRef<str>>(segments: &[S]) -> Result<Self> {
        if segments.len() > FilterKey::ORDER.len() {
            return Err(StatisticsError::InvalidFilter(format!(
                "at most {} location segments are supported",
                FilterKey::ORDER.len()
            )));
        }

        let mut filter = Self::default();
        for (kind, value) in FilterKey::ORDER.into_iter().zip(segments) {
            *filter.slot_mut(kind) = Some(value.as_ref().to_string());
        }
        Ok(filter)
    }

    pub fn is_empty(&self) -> bool {
        self.region.is_none() && self.province.is_none() && self.city.is_none()
    }

    pub fn get(&self, key: FilterKey) -> Option<&str> {
        match key {
            FilterKey::Region => self.region.as_deref(),
            FilterKey::Province => self.province.as_deref(),
            FilterKey::City => self.city.as_deref(),
        }
    }

    /// Set conditions in canonical order, independent of how they were supplied
    pub fn conditions(&self) -> impl Iterator<Item = (FilterKey, &str)> + '_ {
        FilterKey::ORDER
            .into_iter()
            .filter_map(move |key| self.get(key).map(|value| (key, value)))
    }

    /// Append ` WHERE alias.col = ? AND ...`, or nothing when the filter is empty
    pub fn push_where(&self, builder: &mut QueryBuilder<'_, Sqlite>, alias: &str) {
        if self.is_empty() {
            return;
        }

        builder.push(" WHERE ");
        let mut separated = builder.separated(" AND ");
        for (key, value) in self.conditions() {
            separated.push(format!("{}.{} = ", alias, key.column()));
            separated.push_bind_unseparated(value.to_string());
        }
    }

    /// Append ` AND alias.col = ?` for each set level, for statements that already have a WHERE
    pub fn push_and(&self, builder: &mut QueryBuilder<'_, Sqlite>, alias: &str) {
        for (key, value) in self.conditions() {
            builder
                .push(" AND ")
                .push(alias)
                .push(".")
                .push(key.column())
                .push(" = ")
                .push_bind(value.to_string());
        }
    }

    fn slot_mut(&mut self, key: FilterKey) -> &mut Option<String> {
        match key {
            FilterKey::Region => &mut self.region,
            FilterKey::Province => &mut self.province,
            FilterKey::City => &mut self.city,
        }
    }
}
