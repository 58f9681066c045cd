//! Operator control protocol: JSON commands and responses carried
//! over a line-delimited stream.

use arrayvec::ArrayString;
use serde::{Deserialize, Serialize};

pub const MAX_COMMAND_SIZE: usize = 512;
pub const MAX_RESPONSE_SIZE: usize = 16384;

pub type CommandBuffer = ArrayString<MAX_COMMAND_SIZE>;
pub type ResponseBuffer = ArrayString<MAX_RESPONSE_SIZE>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlCommand {
    pub id: u32,
    pub timestamp: u64,
    pub request: ControlRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ControlRequest {
    Start,
    Pause,
    Resume,
    Stop,
    Status,
    ListAvns,
    PayAvn { avn_id: u32, amount: f64 },
    QueryAirline { name: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlResponse {
    pub id: u32,
    pub timestamp: u64,
    pub status: ResponseStatus,
    pub message: Option<String>,
    /// Structured payload: a status report, an AVN list, or airline
    /// violations, depending on the request.
    pub payload: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseStatus {
    Success,
    Error,
    InvalidCommand,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    InvalidJson,
    MessageTooLarge,
    SerializationError,
    InvalidCommand,
    InvalidParameter,
}

impl core::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ProtocolError::InvalidJson => write!(f, "invalid JSON"),
            ProtocolError::MessageTooLarge => write!(f, "message exceeds buffer size"),
            ProtocolError::SerializationError => write!(f, "serialization failed"),
            ProtocolError::InvalidCommand => write!(f, "invalid command"),
            ProtocolError::InvalidParameter => write!(f, "invalid parameter"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Parses, validates, and serializes control traffic using
/// preallocated buffers.
#[derive(Debug, Default)]
pub struct ProtocolHandler {
    command_counter: u32,
    command_buffer: CommandBuffer,
    response_buffer: ResponseBuffer,
}

impl ProtocolHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse_command(&mut self, json_str: &str) -> Result<ControlCommand, ProtocolError> {
        if json_str.len() > MAX_COMMAND_SIZE {
            return Err(ProtocolError::MessageTooLarge);
        }
        self.command_buffer.clear();
        let _ = self.command_buffer.try_push_str(json_str);

        serde_json::from_str::<ControlCommand>(json_str)
            .map_err(|_| ProtocolError::InvalidJson)
    }

    pub fn validate_command(&self, command: &ControlCommand) -> Result<(), ProtocolError> {
        if command.id == 0 {
            return Err(ProtocolError::InvalidCommand);
        }
        match &command.request {
            ControlRequest::PayAvn { avn_id, amount } => {
                if *amount <= 0.0 || !amount.is_finite() {
                    return Err(ProtocolError::InvalidParameter);
                }
                if *avn_id == 0 {
                    return Err(ProtocolError::InvalidParameter);
                }
            }
            ControlRequest::QueryAirline { name } => {
                if name.trim().is_empty() {
                    return Err(ProtocolError::InvalidParameter);
                }
            }
            _ => {}
        }
        Ok(())
    }

    pub fn serialize_response(
        &mut self,
        response: &ControlResponse,
    ) -> Result<&str, ProtocolError> {
        self.response_buffer.clear();
        let json_str = serde_json::to_string(response)
            .map_err(|_| ProtocolError::SerializationError)?;
        if json_str.len() > MAX_RESPONSE_SIZE {
            return Err(ProtocolError::MessageTooLarge);
        }
        let _ = self.response_buffer.try_push_str(&json_str);
        Ok(&self.response_buffer)
    }

    pub fn create_response(
        &self,
        command_id: u32,
        status: ResponseStatus,
        message: Option<&str>,
        payload: Option<serde_json::Value>,
    ) -> ControlResponse {
        ControlResponse {
            id: command_id,
            timestamp: now_millis(),
            status,
            message: message.map(str::to_string),
            payload,
        }
    }

    pub fn next_command_id(&mut self) -> u32 {
        self.command_counter = self.command_counter.wrapping_add(1);
        self.command_counter.max(1)
    }
}

fn now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_round_trip() {
        let mut handler = ProtocolHandler::new();
        let command = ControlCommand {
            id: 7,
            timestamp: 1000,
            request: ControlRequest::PayAvn {
                avn_id: 1003,
                amount: 575_000.0,
            },
        };
        let json = serde_json::to_string(&command).unwrap();
        let parsed = handler.parse_command(&json).unwrap();
        assert_eq!(parsed.id, 7);
        assert_eq!(
            parsed.request,
            ControlRequest::PayAvn {
                avn_id: 1003,
                amount: 575_000.0
            }
        );
    }

    #[test]
    fn malformed_json_is_rejected() {
        let mut handler = ProtocolHandler::new();
        assert_eq!(
            handler.parse_command("{not json"),
            Err(ProtocolError::InvalidJson)
        );
    }

    #[test]
    fn oversized_command_is_rejected() {
        let mut handler = ProtocolHandler::new();
        let big = "x".repeat(MAX_COMMAND_SIZE + 1);
        assert_eq!(
            handler.parse_command(&big),
            Err(ProtocolError::MessageTooLarge)
        );
    }

    #[test]
    fn validation_rejects_bad_payments() {
        let handler = ProtocolHandler::new();
        let bad_amount = ControlCommand {
            id: 1,
            timestamp: 0,
            request: ControlRequest::PayAvn {
                avn_id: 1000,
                amount: -5.0,
            },
        };
        assert_eq!(
            handler.validate_command(&bad_amount),
            Err(ProtocolError::InvalidParameter)
        );

        let empty_airline = ControlCommand {
            id: 1,
            timestamp: 0,
            request: ControlRequest::QueryAirline {
                name: "  ".to_string(),
            },
        };
        assert_eq!(
            handler.validate_command(&empty_airline),
            Err(ProtocolError::InvalidParameter)
        );

        let zero_id = ControlCommand {
            id: 0,
            timestamp: 0,
            request: ControlRequest::Status,
        };
        assert_eq!(
            handler.validate_command(&zero_id),
            Err(ProtocolError::InvalidCommand)
        );
    }

    #[test]
    fn response_serializes_with_payload() {
        let mut handler = ProtocolHandler::new();
        let response = handler.create_response(
            9,
            ResponseStatus::Success,
            Some("3 unpaid"),
            Some(serde_json::json!([{ "avn_id": 1000 }])),
        );
        let json = handler.serialize_response(&response).unwrap();
        let parsed: ControlResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.id, 9);
        assert_eq!(parsed.status, ResponseStatus::Success);
        assert!(parsed.payload.is_some());
    }

    #[test]
    fn command_ids_are_never_zero() {
        let mut handler = ProtocolHandler::new();
        for _ in 0..10 {
            assert!(handler.next_command_id() >= 1);
        }
    }
}
