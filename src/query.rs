use crate::db::models::Album;
use crate::db::{Database, DbError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("invalid year query: {0}")]
    InvalidQuery(String),
    #[error(transparent)]
    Db(#[from] DbError),
}

/// How the full album list is ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlbumSort {
    Random,
    Artist,
    Year,
}

impl AlbumSort {
    /// Cycle order used by browsing front-ends.
    pub fn next(self) -> Self {
        match self {
            Self::Random => Self::Artist,
            Self::Artist => Self::Year,
            Self::Year => Self::Random,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::Artist => "artist",
            Self::Year => "year",
        }
    }
}

/// All albums in the given order. `ascending` is ignored for `Random`.
pub fn fetch_albums(db: &Database, sort: AlbumSort, ascending: bool) -> Result<Vec<Album>, DbError> {
    match sort {
        AlbumSort::Random => db.random_albums(),
        AlbumSort::Artist => db.albums_by_artist(ascending),
        AlbumSort::Year => db.albums_by_year(ascending),
    }
}

/// A validated year filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YearQuery {
    Exact(i32),
    /// Inclusive, `lo <= hi`
    Range(i32, i32),
}

impl YearQuery {
    /// Parse `["1977"]`, `["1970", "1980"]` or `["1970-1980"]`.
    /// Reversed bounds are swapped; a lower bound of 0 means a single year.
    pub fn parse(args: &[&str]) -> Result<Self, QueryError> {
        let (a, b) = match args {
            [single] => match single.split_once('-') {
                Some((lo, hi)) => (parse_year(lo)?, parse_year(hi)?),
                None => (0, parse_year(single)?),
            },
            [lo, hi] => (parse_year(lo)?, parse_year(hi)?),
            _ => {
                return Err(QueryError::InvalidQuery(format!(
                    "expected one or two years, got {}",
                    args.len()
                )));
            }
        };

        let (lo, hi) = if b < a { (b, a) } else { (a, b) };
        if lo > 0 {
            Ok(Self::Range(lo, hi))
        } else {
            Ok(Self::Exact(hi))
        }
    }

    pub fn fetch(self, db: &Database) -> Result<Vec<Album>, DbError> {
        match self {
            Self::Exact(year) => db.albums_from_year(year),
            Self::Range(lo, hi) => db.albums_in_years(lo, hi),
        }
    }
}

/// A year is one or more ASCII digits; signs and other punctuation are rejected.
fn parse_year(s: &str) -> Result<i32, QueryError> {
    let s = s.trim();
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(QueryError::InvalidQuery(s.to_string()));
    }
    s.parse::<i32>().map_err(|_| QueryError::InvalidQuery(s.to_string()))
}

/// Parse and run a year filter. Malformed input is rejected before touching the store.
pub fn albums_by_year_range(db: &Database, args: &[&str]) -> Result<Vec<Album>, QueryError> {
    let query = YearQuery::parse(args)?;
    Ok(query.fetch(db)?)
}
