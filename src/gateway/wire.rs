//! JSON request bodies and response-field extraction.

use crate::document::{SchematizedSection, Section};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Body of the summarize and schematize calls.
#[derive(Debug, Serialize)]
pub struct StructureRequest<'a> {
    pub structure: &'a [Section],
}

/// Body of the edit call.
#[derive(Debug, Serialize)]
pub struct EditRequest<'a> {
    pub structure: &'a [Section],
    pub schematization: &'a [SchematizedSection],
}

/// Body of the export call.
#[derive(Debug, Serialize)]
pub struct ExportRequest<'a> {
    pub structure: &'a [Section],
    pub schematization: &'a [SchematizedSection],
    pub export_format: &'a str,
}

/// Pull `name` out of a response object.
///
/// `Ok(None)` when the field is absent or `null`; `Err` with a readable
/// detail when the body is not an object or the field has the wrong shape.
pub fn take_field<T: DeserializeOwned>(body: &mut Value, name: &str) -> Result<Option<T>, String> {
    let found = kind(body);
    let object = body
        .as_object_mut()
        .ok_or_else(|| format!("expected a JSON object, got {found}"))?;

    match object.remove(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => {
            let found = kind(&value);
            serde_json::from_value(value)
                .map(Some)
                .map_err(|e| format!("`{name}` has the wrong shape ({found}): {e}"))
        }
    }
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_and_null_are_none() {
        let mut body = json!({"other": 1, "edited": null});
        assert_eq!(take_field::<Vec<Section>>(&mut body, "summarized"), Ok(None));
        assert_eq!(take_field::<Vec<SchematizedSection>>(&mut body, "edited"), Ok(None));
    }

    #[test]
    fn wrong_container_is_an_error() {
        let mut body = json!({"structure": {"title": "Art. 1"}});
        let err = take_field::<Vec<Section>>(&mut body, "structure").unwrap_err();
        assert!(err.contains("structure"), "got: {err}");
        assert!(err.contains("object"), "got: {err}");
    }

    #[test]
    fn non_object_body_is_an_error() {
        let mut body = json!([1, 2]);
        let err = take_field::<String>(&mut body, "file_url").unwrap_err();
        assert!(err.contains("array"), "got: {err}");
    }

    #[test]
    fn export_request_shape() {
        let structure = [Section::new("Art. 1", "x")];
        let body = serde_json::to_value(ExportRequest {
            structure: &structure,
            schematization: &[],
            export_format: "pdf",
        })
        .unwrap();
        assert_eq!(
            body,
            json!({
                "structure": [{"title": "Art. 1", "content": "x"}],
                "schematization": [],
                "export_format": "pdf"
            })
        );
    }
}
