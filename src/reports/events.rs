use serde::Serialize;

/// One server-sent event of a report stream.
///
/// A stream carries `Id` first, any number of `Chunk`s, then exactly one of
/// `Done` or `Error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReportEvent {
    Id {
        #[serde(rename = "reportId")]
        report_id: i64,
    },
    Chunk {
        content: String,
    },
    Done {
        content: String,
    },
    Error {
        error: String,
    },
}

#[cfg(test)]
impl ReportEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReportEvent::Done { .. } | ReportEvent::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_format() {
        assert_eq!(
            serde_json::to_value(ReportEvent::Id { report_id: 5 }).unwrap(),
            json!({"type": "id", "reportId": 5})
        );
        assert_eq!(
            serde_json::to_value(ReportEvent::Chunk { content: "a".into() }).unwrap(),
            json!({"type": "chunk", "content": "a"})
        );
        assert_eq!(
            serde_json::to_value(ReportEvent::Done { content: "ab".into() }).unwrap(),
            json!({"type": "done", "content": "ab"})
        );
        assert_eq!(
            serde_json::to_value(ReportEvent::Error { error: "x".into() }).unwrap(),
            json!({"type": "error", "error": "x"})
        );
    }
}
