//! Activation URL decoding.
//!
//! The app is woken through a custom scheme such as
//! `ghdsoftwareutility://ghd/?id=mck_app_cat_item&sys_id=ABC123&fmno=99999`.
//! [`parse`] turns the query into an [`ActivationRequest`]; [`PackageQuery`]
//! pulls out the two keys the metadata API needs.

use std::collections::HashMap;

use url::Url;

use crate::error::ActivationError;

/// Query key carrying the catalog item id used for the metadata lookup.
pub const KEY_ITEM_ID: &str = "sys_id";
/// Query key carrying the request-tracking (form) number.
pub const KEY_FORM_NUMBER: &str = "fmno";

/// Decoded activation parameters. Keys are case-sensitive and unique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationRequest {
    params: HashMap<String, String>,
}

impl ActivationRequest {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }
}

impl FromIterator<(String, String)> for ActivationRequest {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            params: iter.into_iter().collect(),
        }
    }
}

/// Decode the query of an activation URL.
///
/// Pairs are split on `&` and then on the first `=`; a repeated key keeps its
/// last value. Decoding is deliberately minimal: only the literal `%20` is
/// turned into a space, every other escape is passed through unchanged.
/// Empty segments (`a=1&&b=2`, trailing `&`) are ignored, but a segment
/// without `=` rejects the whole URL.
pub fn parse(raw: &str) -> Result<ActivationRequest, ActivationError> {
    let url = Url::parse(raw).map_err(|e| ActivationError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    let Some(query) = url.query() else {
        return Ok(ActivationRequest::default());
    };

    let mut params = HashMap::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(ActivationError::MalformedPair {
                pair: pair.to_string(),
            });
        };
        params.insert(key.to_string(), value.replace("%20", " "));
    }

    Ok(ActivationRequest { params })
}

/// The two mandatory inputs of a metadata lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageQuery {
    pub item_id: String,
    pub form_number: String,
}

impl PackageQuery {
    /// Extract `sys_id` and `fmno`. Absent or empty values are both reported.
    pub fn from_request(request: &ActivationRequest) -> Result<Self, ActivationError> {
        let item_id = request.get(KEY_ITEM_ID).filter(|v| !v.is_empty());
        let form_number = request.get(KEY_FORM_NUMBER).filter(|v| !v.is_empty());

        match (item_id, form_number) {
            (Some(item_id), Some(form_number)) => Ok(Self {
                item_id: item_id.to_string(),
                form_number: form_number.to_string(),
            }),
            (item_id, form_number) => {
                let mut missing = Vec::new();
                if item_id.is_none() {
                    missing.push(KEY_ITEM_ID);
                }
                if form_number.is_none() {
                    missing.push(KEY_FORM_NUMBER);
                }
                Err(ActivationError::MissingParameters { missing })
            }
        }
    }
}
