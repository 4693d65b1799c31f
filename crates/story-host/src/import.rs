//! Opening an image or a saved story through the import service.

use crate::adapters::registry::Collaborators;
use crate::error::HostResult;
use crate::protocol::{ImportReply, ImportRequest};
use crate::session::Session;

/// Error code the import service uses to ask whether an autosave should be
/// restored.
pub const AUTO_ASK: &str = "AUTO ASK";

#[derive(Debug)]
pub enum ImportOutcome {
    Loaded(Box<Session>),
    /// An autosave exists; repeat the request with an explicit choice.
    AskAutosave,
    Failed {
        code: Option<String>,
        message: String,
    },
}

/// Split `"<CODE> ERR: <message>"`. Anything else is a bare message.
pub fn parse_import_error(raw: &str) -> (Option<String>, String) {
    let mut parts = raw.split(" ERR: ");
    match (parts.next(), parts.next(), parts.next()) {
        (Some(code), Some(message), None) => (Some(code.to_string()), message.to_string()),
        _ => (None, raw.to_string()),
    }
}

pub fn interpret(reply: ImportReply) -> HostResult<ImportOutcome> {
    match reply {
        ImportReply::Loaded(payload) => {
            let session = Session::from_payload(&payload)?;
            Ok(ImportOutcome::Loaded(Box::new(session)))
        }
        ImportReply::Failed { error } => {
            let (code, message) = parse_import_error(&error);
            if code.as_deref() == Some(AUTO_ASK) {
                return Ok(ImportOutcome::AskAutosave);
            }
            tracing::warn!(code = ?code, %message, "import failed");
            Ok(ImportOutcome::Failed { code, message })
        }
    }
}

pub async fn import(collab: &Collaborators, request: &ImportRequest) -> HostResult<ImportOutcome> {
    tracing::info!(file = %request.filepath, logic = ?request.autosave_logic, "importing");
    let reply = collab.import(request).await?;
    interpret(reply)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_split_once() {
        assert_eq!(
            parse_import_error("IMPORT ERR: file missing"),
            (Some("IMPORT".into()), "file missing".into())
        );
        assert_eq!(parse_import_error("plain failure"), (None, "plain failure".into()));
        assert_eq!(
            parse_import_error("A ERR: b ERR: c"),
            (None, "A ERR: b ERR: c".into())
        );
    }

    #[test]
    fn auto_ask_requests_a_choice() {
        let outcome = interpret(ImportReply::Failed {
            error: "AUTO ASK ERR: autosave found".into(),
        })
        .unwrap();
        assert!(matches!(outcome, ImportOutcome::AskAutosave));
    }

    #[test]
    fn replies_decode_either_shape() {
        let failed: ImportReply = serde_json::from_str(r#"{"error":"FORMAT ERR: bad"}"#).unwrap();
        assert!(matches!(failed, ImportReply::Failed { .. }));

        let loaded: ImportReply =
            serde_json::from_str(r#"{"image_name":"img.tif","channels":["DNA"]}"#).unwrap();
        match interpret(loaded).unwrap() {
            ImportOutcome::Loaded(session) => {
                assert_eq!(session.document().image_name, "img.tif");
                assert_eq!(session.document().channels().len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
