//! Request and response bodies of the upload URL issuer.

use serde::{Deserialize, Serialize};

/// Body of `POST /api/uploads/presign`.
///
/// The object name may be sent as `fileName` or `key` and the content type
/// as `fileType` or `contentType`; the first non-empty value wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UploadRequest {
    #[serde(rename = "fileName", default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(rename = "fileType", default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(rename = "contentType", default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl UploadRequest {
    pub fn new(file_name: impl Into<String>, file_type: impl Into<String>) -> Self {
        Self {
            file_name: Some(file_name.into()),
            file_type: Some(file_type.into()),
            ..Self::default()
        }
    }

    /// Object key the client asked for.
    pub fn desired_name(&self) -> Option<&str> {
        first_present(&self.file_name, &self.key)
    }

    /// Content type the upload will be bound to.
    pub fn desired_content_type(&self) -> Option<&str> {
        first_present(&self.file_type, &self.content_type)
    }
}

fn first_present<'a>(primary: &'a Option<String>, fallback: &'a Option<String>) -> Option<&'a str> {
    primary
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| fallback.as_deref().map(str::trim).filter(|v| !v.is_empty()))
}

/// A signed URL authorizing one PUT of `object_key`.
///
/// Serialized as `{"uploadURL", "key", "expiresIn"}`; `url` is also accepted
/// when reading an issuer response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IssuedUrl {
    #[serde(rename = "uploadURL", alias = "url", default)]
    pub url: String,
    #[serde(rename = "key", default)]
    pub object_key: String,
    #[serde(rename = "expiresIn", default)]
    pub expires_in_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prefers_file_name_and_file_type() {
        let req: UploadRequest = serde_json::from_value(json!({
            "fileName": "a.pdf", "key": "b.pdf",
            "fileType": "application/pdf", "contentType": "text/plain"
        }))
        .unwrap();
        assert_eq!(req.desired_name(), Some("a.pdf"));
        assert_eq!(req.desired_content_type(), Some("application/pdf"));
    }

    #[test]
    fn falls_back_to_key_and_content_type() {
        let req: UploadRequest = serde_json::from_value(json!({
            "fileName": "  ", "key": "b.pdf", "contentType": "image/png"
        }))
        .unwrap();
        assert_eq!(req.desired_name(), Some("b.pdf"));
        assert_eq!(req.desired_content_type(), Some("image/png"));
    }

    #[test]
    fn empty_body_has_nothing() {
        let req: UploadRequest = serde_json::from_value(json!({})).unwrap();
        assert_eq!(req.desired_name(), None);
        assert_eq!(req.desired_content_type(), None);
    }

    #[test]
    fn issued_url_uses_wire_names() {
        let issued = IssuedUrl {
            url: "http://h/storage/b/k?X-Amz-Signature=ab".into(),
            object_key: "k".into(),
            expires_in_seconds: 300,
        };
        let value = serde_json::to_value(&issued).unwrap();
        assert_eq!(value["uploadURL"], "http://h/storage/b/k?X-Amz-Signature=ab");
        assert_eq!(value["key"], "k");

        let legacy: IssuedUrl = serde_json::from_value(json!({ "url": "http://x" })).unwrap();
        assert_eq!(legacy.url, "http://x");
        assert!(legacy.object_key.is_empty());
    }
}
