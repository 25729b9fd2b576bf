//! Document metadata records kept in the shared catalogue.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Top-level fields every catalogue record must carry, in reporting order.
pub const REQUIRED_FIELDS: [&str; 7] = [
    "title",
    "img",
    "flag",
    "datecontent",
    "bllink",
    "permalink",
    "content",
];

/// One entry of the catalogue the website renders.
///
/// There is no identity: `permalink` is unique by convention only and the
/// recorder never deduplicates on it. Unknown fields (e.g. `sourceKey`,
/// `targetKey`) are kept in `extra` and written back untouched.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DocumentMetadata {
    pub title: String,
    pub img: String,
    pub flag: String,
    pub datecontent: String,
    pub bllink: String,
    pub permalink: String,
    pub content: DocumentContent,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Descriptive block nested under `content`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct DocumentContent {
    pub published: String,
    pub description: String,
    pub countries: String,
    pub themes: String,
    pub scale: String,
    pub langs: String,
}

/// Required fields absent (or `null`) in `record`, in declaration order.
///
/// Only presence is checked, never type or shape. A non-object record is
/// missing every field.
pub fn missing_fields(record: &Value) -> Vec<&'static str> {
    REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| record.get(field).is_none_or(Value::is_null))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "title": "Regional food crisis outlook",
            "img": "/uploads/2024/03/1700000000000_report.png",
            "flag": "/images/EN_Co-fundedbytheEU_RGB_POS.png",
            "datecontent": "March 2024",
            "bllink": "/documents/regional-food-crisis-outlook",
            "permalink": "/uploads/2024/03/1700000000000_report.pdf",
            "content": {
                "Published": "April 2024",
                "Description": "Cadre Harmonise results",
                "Countries": "Mali, Niger",
                "Themes": "Food security",
                "Scale": "Regional (West Africa)",
                "Langs": "English, French"
            },
            "sourceKey": "1700000000000_report.pdf"
        })
    }

    #[test]
    fn complete_record_has_no_missing_fields() {
        assert!(missing_fields(&sample()).is_empty());
    }

    #[test]
    fn reports_missing_and_null_fields_in_order() {
        let mut record = sample();
        let obj = record.as_object_mut().unwrap();
        obj.remove("permalink");
        obj.remove("img");
        obj.insert("flag".into(), Value::Null);

        assert_eq!(missing_fields(&record), vec!["img", "flag", "permalink"]);
    }

    #[test]
    fn presence_only_accepts_wrong_types() {
        let mut record = sample();
        record["content"] = json!("not an object");
        record["title"] = json!(42);
        assert!(missing_fields(&record).is_empty());
    }

    #[test]
    fn non_object_is_missing_everything() {
        assert_eq!(missing_fields(&json!([1, 2])), REQUIRED_FIELDS.to_vec());
    }

    #[test]
    fn pretty_catalogue_reads_back_with_extra_fields() {
        let docs: Vec<DocumentMetadata> = vec![serde_json::from_value(sample()).unwrap()];
        let pretty = serde_json::to_string_pretty(&docs).unwrap();
        let back: Vec<DocumentMetadata> = serde_json::from_str(&pretty).unwrap();

        assert_eq!(back, docs);
        assert_eq!(back[0].content.langs, "English, French");
        assert_eq!(back[0].extra["sourceKey"], "1700000000000_report.pdf");
    }
}
