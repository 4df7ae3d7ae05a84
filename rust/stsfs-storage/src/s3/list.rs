//! ListObjectsV2 and error response bodies.
//!
//! See [ListObjectsV2](https://docs.aws.amazon.com/AmazonS3/latest/API/API_ListObjectsV2.html).

use serde::Deserialize;

use crate::StorageError;

/// One page of a listing.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Full object keys in this page
    pub keys: Vec<String>,
    /// Token for the next page, if the listing is truncated
    pub next_continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "ListBucketResult")]
struct ListBucketResult {
    #[serde(rename = "IsTruncated", default)]
    is_truncated: bool,
    #[serde(rename = "Contents", default)]
    contents: Vec<Contents>,
    #[serde(rename = "NextContinuationToken")]
    next_continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Contents {
    #[serde(rename = "Key")]
    key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "Error")]
struct ErrorBody {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

/// Parse a ListObjectsV2 response body.
pub fn parse_list_page(xml: &str) -> Result<ListPage, StorageError> {
    let result: ListBucketResult = quick_xml::de::from_str(xml).map_err(|error| {
        StorageError::Service {
            status: 200,
            code: "InvalidResponse".into(),
            message: error.to_string(),
        }
    })?;

    Ok(ListPage {
        keys: result.contents.into_iter().map(|entry| entry.key).collect(),
        next_continuation_token: result
            .next_continuation_token
            .filter(|token| result.is_truncated && !token.is_empty()),
    })
}

/// Map a failed response onto a [`StorageError`], reading S3's `<Error>`
/// body when there is one. `key` names the object, for `404`s.
pub fn parse_error(status: u16, xml: &str, key: &str) -> StorageError {
    let (code, message) = match quick_xml::de::from_str::<ErrorBody>(xml) {
        Ok(body) => (body.code, body.message),
        Err(_) => (status.to_string(), xml.trim().to_string()),
    };

    match (status, code.as_str()) {
        (403, _) => StorageError::Denied { code, message },
        (404, "NoSuchKey") | (404, "404") => StorageError::NotFound {
            key: key.to_string(),
        },
        _ => StorageError::Service {
            status,
            code,
            message,
        },
    }
}
