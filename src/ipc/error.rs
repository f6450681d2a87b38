use serde_json::json;

/// A handler failure that becomes an `ok: false` envelope.
///
/// `code` is one of the stable machine codes clients branch on
/// (`bad_params`, `no_workspace`, `not_found`, `conflict`, `db_*_failed`, ...).
#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({ "id": id, "ok": true, "result": result })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({ "code": code, "message": message.into() });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({ "id": id, "ok": false, "error": error })
}

/// Wraps a handler result in the response envelope for request `id`.
pub fn respond(id: &str, result: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => e.response(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_envelope_omits_absent_details() {
        let resp = respond("7", Err(HandlerErr::new("not_found", "gate not mounted")));
        assert_eq!(resp["ok"], json!(false));
        assert_eq!(resp["id"], json!("7"));
        assert_eq!(resp["error"]["code"], json!("not_found"));
        assert!(resp["error"].get("details").is_none());
        assert!(resp.get("result").is_none());
    }

    #[test]
    fn details_ride_along_with_the_code() {
        let e = HandlerErr::new("db_insert_failed", "UNIQUE constraint failed")
            .with_details(json!({ "table": "users" }));
        let resp = respond("8", Err(e));
        assert_eq!(resp["error"]["details"]["table"], json!("users"));
        assert_eq!(resp["error"]["message"], json!("UNIQUE constraint failed"));
    }

    #[test]
    fn success_envelope_carries_result() {
        let resp = respond("9", Ok(json!({ "granted": false })));
        assert_eq!(resp["ok"], json!(true));
        assert_eq!(resp["result"]["granted"], json!(false));
        assert!(resp.get("error").is_none());
    }
}
