//! Token based offset windowing.
//!
//! A token encodes the starting offset into the filtered, order-preserving
//! result sequence. Tokens are only meaningful against the same filters and
//! an unchanged store.

use crate::error::{Ec2Error, Result};
use crate::params::Params;

/// Allowed `MaxResults` range for an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub min: usize,
    pub max: usize,
}

impl PageLimits {
    pub const fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }
}

/// `MaxResults` 5-1000.
pub const WIDE: PageLimits = PageLimits::new(5, 1000);
/// `MaxResults` 5-100.
pub const NARROW: PageLimits = PageLimits::new(5, 100);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub max_results: Option<usize>,
    pub next_token: Option<String>,
}

impl PageRequest {
    pub fn from_params(params: &Params) -> Result<Self> {
        Ok(Self {
            max_results: params.number("MaxResults")?,
            next_token: params.string("NextToken"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

pub fn encode_token(offset: usize) -> String {
    format!("{:016x}", offset)
}

pub fn decode_token(token: &str) -> Result<usize> {
    let invalid = || Ec2Error::invalid("InvalidNextToken", format!("The token '{}' is invalid", token));
    if token.len() != 16 || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    usize::from_str_radix(token, 16).map_err(|_| invalid())
}

/// Return one page of `items`.
pub fn paginate<T>(items: Vec<T>, request: &PageRequest, limits: PageLimits) -> Result<Page<T>> {
    if let Some(max) = request.max_results
        && (max < limits.min || max > limits.max)
    {
        return Err(Ec2Error::invalid_value(format!(
            "Value ( {} ) for parameter maxResults is invalid. Expecting a value between {} and {}.",
            max, limits.min, limits.max
        )));
    }

    let start = match &request.next_token {
        Some(token) => decode_token(token)?,
        None => 0,
    };
    if start > items.len() {
        return Err(Ec2Error::invalid(
            "InvalidNextToken",
            "The token is no longer valid for this result set",
        ));
    }

    let total = items.len();
    let end = match request.max_results {
        Some(max) => (start + max).min(total),
        None => total,
    };
    let items: Vec<T> = items.into_iter().skip(start).take(end - start).collect();
    let next_token = (end < total).then(|| encode_token(end));
    Ok(Page { items, next_token })
}
