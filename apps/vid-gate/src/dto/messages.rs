//! Client messages
//!
//! A client talks to the relay with binary fragment frames (see
//! [`super::frame`]) and JSON text frames tagged by `type`:
//!
//! - `{"type":"finalize","name":"a.webm","userId":42}`
//! - `{"type":"fragment","name":"a.webm","seq":0,"data":"<base64>"}` for
//!   clients that cannot send binary frames
//!
//! Both shapes decode into an [`Inbound`] command.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use vidrelay_domain::UserId;

use super::frame::{FragmentFrame, FrameError};

/// JSON control message sent by the client
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Fragment {
        name: String,
        seq: u64,
        /// Base64 (standard alphabet) payload
        data: String,
    },
    Finalize {
        name: String,
        #[serde(rename = "userId")]
        user_id: UserIdField,
    },
}

/// Clients send the user id either as a string or as a number
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum UserIdField {
    Text(String),
    Number(u64),
}

impl From<UserIdField> for UserId {
    fn from(field: UserIdField) -> Self {
        match field {
            UserIdField::Text(id) => UserId::new(id),
            UserIdField::Number(id) => UserId::new(id.to_string()),
        }
    }
}

/// A decoded client command
#[derive(Debug, PartialEq, Eq)]
pub enum Inbound {
    Fragment(FragmentFrame),
    Finalize { name: String, user: UserId },
}

impl Inbound {
    pub fn from_binary(frame: Bytes) -> Result<Self, FrameError> {
        FragmentFrame::decode(frame).map(Inbound::Fragment)
    }

    pub fn from_text(text: &str) -> Result<Self, FrameError> {
        let message: ClientMessage =
            serde_json::from_str(text).map_err(|err| FrameError::InvalidMessage(err.to_string()))?;

        match message {
            ClientMessage::Fragment { name, seq, data } => {
                let payload = STANDARD
                    .decode(data.as_bytes())
                    .map_err(|err| FrameError::InvalidBase64(err.to_string()))?;
                Ok(Inbound::Fragment(FragmentFrame {
                    name,
                    seq,
                    payload: Bytes::from(payload),
                }))
            }
            ClientMessage::Finalize { name, user_id } => Ok(Inbound::Finalize {
                name,
                user: user_id.into(),
            }),
        }
    }
}

/// Response body of `GET /sessions`
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionsResponse {
    /// Transfer sessions currently open across all connections
    #[schema(example = 3)]
    pub active: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalize_accepts_string_and_numeric_user_ids() {
        let numeric = Inbound::from_text(r#"{"type":"finalize","name":"a.webm","userId":42}"#).unwrap();
        let text = Inbound::from_text(r#"{"type":"finalize","name":"a.webm","userId":"42"}"#).unwrap();

        let expected = Inbound::Finalize {
            name: "a.webm".to_string(),
            user: UserId::new("42"),
        };
        assert_eq!(numeric, expected);
        assert_eq!(text, expected);
    }

    #[test]
    fn test_text_fragment_is_base64_decoded() {
        let inbound =
            Inbound::from_text(r#"{"type":"fragment","name":"a.webm","seq":5,"data":"aGVsbG8="}"#).unwrap();

        assert_eq!(
            inbound,
            Inbound::Fragment(FragmentFrame {
                name: "a.webm".to_string(),
                seq: 5,
                payload: Bytes::from_static(b"hello"),
            })
        );
    }

    #[test]
    fn test_bad_base64_is_rejected() {
        assert!(matches!(
            Inbound::from_text(r#"{"type":"fragment","name":"a.webm","seq":0,"data":"***"}"#),
            Err(FrameError::InvalidBase64(_))
        ));
    }

    #[test]
    fn test_unknown_or_incomplete_messages_are_rejected() {
        for text in [
            r#"{"type":"pause","name":"a.webm"}"#,
            r#"{"type":"finalize","name":"a.webm"}"#,
            r#"{"name":"a.webm","userId":1}"#,
            "not json",
        ] {
            assert!(
                matches!(Inbound::from_text(text), Err(FrameError::InvalidMessage(_))),
                "accepted {}",
                text
            );
        }
    }

    #[test]
    fn test_sessions_response_shape() {
        let json = serde_json::to_string(&SessionsResponse { active: 2 }).unwrap();
        assert_eq!(json, r#"{"active":2}"#);
    }
}
