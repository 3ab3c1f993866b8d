//! S3 ListObjectsV2 response parsing.
//!
//! [ListObjectsV2]: https://docs.aws.amazon.com/AmazonS3/latest/API/API_ListObjectsV2.html

use serde::Deserialize;

use crate::ListingError;

/// One object in a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// Object key.
    pub key: String,
    /// Size in bytes.
    pub size: Option<u64>,
    /// ISO-8601 modification time.
    pub last_modified: Option<String>,
    /// Entity tag without surrounding quotes.
    pub etag: Option<String>,
}

/// One page of a ListObjectsV2 response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListResult {
    /// Objects returned in this page.
    pub entries: Vec<ListEntry>,
    /// If true, there are more results to fetch.
    pub is_truncated: bool,
    /// Token to use for fetching the next page of results.
    pub next_continuation_token: Option<String>,
}

/// Root element of ListObjectsV2 XML response.
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

/// Individual object entry in the listing.
#[derive(Debug, Deserialize)]
struct Contents {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Size")]
    size: Option<u64>,
    #[serde(rename = "LastModified")]
    last_modified: Option<String>,
    #[serde(rename = "ETag")]
    etag: Option<String>,
}

/// S3 error response XML structure.
#[derive(Debug, Deserialize)]
#[serde(rename = "Error")]
struct S3Error {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message")]
    message: Option<String>,
}

impl ListResult {
    /// Parse a ListObjectsV2 XML body.
    ///
    /// Returns [`ListingError::Service`] when the body is an S3 `<Error>`
    /// document (e.g. `NoSuchBucket`, `AccessDenied`).
    pub fn parse(xml: &str) -> Result<Self, ListingError> {
        if let Ok(error) = quick_xml::de::from_str::<S3Error>(xml) {
            return Err(ListingError::Service {
                code: error.code,
                message: error.message.unwrap_or_default(),
            });
        }

        // quick-xml is lenient and will parse any XML as defaults, so we need to validate.
        if !xml.contains("<ListBucketResult") {
            return Err(ListingError::Serialization(
                "missing ListBucketResult element".into(),
            ));
        }

        let result: ListBucketResult = quick_xml::de::from_str(xml)
            .map_err(|e| ListingError::Serialization(e.to_string()))?;

        Ok(ListResult {
            entries: result
                .contents
                .into_iter()
                .map(|contents| ListEntry {
                    key: contents.key,
                    size: contents.size,
                    last_modified: contents.last_modified,
                    etag: contents
                        .etag
                        .map(|etag| etag.trim_matches('"').to_string()),
                })
                .collect(),
            is_truncated: result.is_truncated,
            next_continuation_token: result.next_continuation_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_parses_empty_list_response() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <ListBucketResult>
                <IsTruncated>false</IsTruncated>
            </ListBucketResult>"#;

        let result = ListResult::parse(xml).unwrap();
        assert!(result.entries.is_empty());
        assert!(!result.is_truncated);
        assert!(result.next_continuation_token.is_none());
    }

    #[test]
    fn it_parses_entries() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <ListBucketResult>
                <IsTruncated>true</IsTruncated>
                <NextContinuationToken>abc123</NextContinuationToken>
                <Contents>
                    <Key>photos/cat.jpg</Key>
                    <Size>100</Size>
                    <LastModified>2024-01-01T00:00:00.000Z</LastModified>
                    <ETag>"d41d8cd98f00b204e9800998ecf8427e"</ETag>
                </Contents>
                <Contents>
                    <Key>photos/dog.jpg</Key>
                </Contents>
            </ListBucketResult>"#;

        let result = ListResult::parse(xml).unwrap();
        assert_eq!(result.entries.len(), 2);
        assert_eq!(result.entries[0].key, "photos/cat.jpg");
        assert_eq!(result.entries[0].size, Some(100));
        assert_eq!(
            result.entries[0].etag.as_deref(),
            Some("d41d8cd98f00b204e9800998ecf8427e")
        );
        assert_eq!(result.entries[1].size, None);
        assert!(result.is_truncated);
        assert_eq!(result.next_continuation_token.as_deref(), Some("abc123"));
    }

    #[test]
    fn it_parses_service_errors() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <Error>
                <Code>NoSuchBucket</Code>
                <Message>The specified bucket does not exist</Message>
            </Error>"#;

        let result = ListResult::parse(xml);
        assert!(
            matches!(result, Err(ListingError::Service { ref code, .. }) if code == "NoSuchBucket"),
            "Expected NoSuchBucket error, got: {:?}",
            result
        );
    }

    #[test]
    fn it_errors_on_wrong_root_element() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <WrongRootElement><IsTruncated>false</IsTruncated></WrongRootElement>"#;

        let result = ListResult::parse(xml);
        assert!(matches!(result, Err(ListingError::Serialization(_))));
    }
}
