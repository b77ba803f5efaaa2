//! Wire protocol for client <-> simulator communication
//!
//! Requests: `{"command": "<COMMAND>", "body": <command-specific or null>}`
//! Responses: `{"Success": bool, "Body": <any>}`
//!
//! Each document is UTF-8 JSON carried in exactly one frame.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sim_rl_core::{Result, SimConfig, SimError};

/// Requests the client can send
#[derive(Debug, Clone, PartialEq)]
pub enum SimRequest {
    /// Start a new simulation session with the given config
    StartSimSession(SimConfig),
    /// Fetch the current simulation state
    GetState,
    /// Cast a spell
    Cast { spell: String },
    /// Advance simulated time by `duration` milliseconds
    WaitDuration { duration: u64 },
}

impl SimRequest {
    /// Wire name of the command
    pub fn command(&self) -> &'static str {
        match self {
            SimRequest::StartSimSession(_) => "START_SIM_SESSION",
            SimRequest::GetState => "GET_STATE",
            SimRequest::Cast { .. } => "CAST",
            SimRequest::WaitDuration { .. } => "WAIT_DURATION",
        }
    }

    /// Build a cast request
    pub fn cast(spell: impl Into<String>) -> Self {
        SimRequest::Cast {
            spell: spell.into(),
        }
    }

    /// Build a wait request
    pub fn wait(duration_ms: u64) -> Self {
        SimRequest::WaitDuration {
            duration: duration_ms,
        }
    }
}

/// Body payloads, serialized without a tag
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RequestBody {
    StartSimSession {
        #[serde(rename = "RaidSimRequest")]
        raid_sim_request: SimConfig,
    },
    Cast {
        spell: String,
    },
    WaitDuration {
        duration: u64,
    },
}

#[derive(Serialize)]
struct RequestEnvelope<'a> {
    command: &'static str,
    body: Option<&'a RequestBody>,
}

#[derive(Deserialize)]
struct RawRequest {
    command: String,
    #[serde(default)]
    body: serde_json::Value,
}

impl Serialize for SimRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let body = match self {
            SimRequest::StartSimSession(config) => Some(RequestBody::StartSimSession {
                raid_sim_request: config.clone(),
            }),
            SimRequest::GetState => None,
            SimRequest::Cast { spell } => Some(RequestBody::Cast {
                spell: spell.clone(),
            }),
            SimRequest::WaitDuration { duration } => Some(RequestBody::WaitDuration {
                duration: *duration,
            }),
        };
        RequestEnvelope {
            command: self.command(),
            body: body.as_ref(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SimRequest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = RawRequest::deserialize(deserializer)?;
        let body = |what: &str| -> std::result::Result<RequestBody, D::Error> {
            RequestBody::deserialize(raw.body.clone())
                .map_err(|e| D::Error::custom(format!("invalid {} body: {}", what, e)))
        };
        match raw.command.as_str() {
            "START_SIM_SESSION" => match body("START_SIM_SESSION")? {
                RequestBody::StartSimSession { raid_sim_request } => {
                    Ok(SimRequest::StartSimSession(raid_sim_request))
                }
                _ => Err(D::Error::custom("START_SIM_SESSION body needs RaidSimRequest")),
            },
            "GET_STATE" => Ok(SimRequest::GetState),
            "CAST" => match body("CAST")? {
                RequestBody::Cast { spell } => Ok(SimRequest::Cast { spell }),
                _ => Err(D::Error::custom("CAST body needs spell")),
            },
            "WAIT_DURATION" => match body("WAIT_DURATION")? {
                RequestBody::WaitDuration { duration } => Ok(SimRequest::WaitDuration { duration }),
                _ => Err(D::Error::custom("WAIT_DURATION body needs duration")),
            },
            other => Err(D::Error::custom(format!("unknown command {}", other))),
        }
    }
}

/// Response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SimResponse {
    pub success: bool,
    #[serde(default)]
    pub body: serde_json::Value,
}

impl SimResponse {
    /// Successful response carrying `body`
    pub fn ok(body: serde_json::Value) -> Self {
        Self {
            success: true,
            body,
        }
    }

    /// Failed response carrying diagnostic `body`
    pub fn failure(body: serde_json::Value) -> Self {
        Self {
            success: false,
            body,
        }
    }

    /// Body of a successful response, or an application error for `command`
    pub fn into_result(self, command: &str) -> Result<serde_json::Value> {
        if self.success {
            Ok(self.body)
        } else {
            Err(SimError::Application {
                command: command.to_string(),
                body: self.body,
            })
        }
    }
}

/// Serialize a request to JSON bytes
pub fn serialize_request(request: &SimRequest) -> Result<Vec<u8>> {
    serde_json::to_vec(request).map_err(Into::into)
}

/// Deserialize a response from JSON bytes
pub fn deserialize_response(bytes: &[u8]) -> Result<SimResponse> {
    serde_json::from_slice(bytes)
        .map_err(|e| SimError::Protocol(format!("Invalid response document: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let cases = [
            (SimRequest::GetState, json!({"command": "GET_STATE", "body": null})),
            (
                SimRequest::cast("Pestilence"),
                json!({"command": "CAST", "body": {"spell": "Pestilence"}}),
            ),
            (
                SimRequest::wait(13500),
                json!({"command": "WAIT_DURATION", "body": {"duration": 13500}}),
            ),
            (
                SimRequest::StartSimSession(SimConfig::new(60000, 0)),
                json!({
                    "command": "START_SIM_SESSION",
                    "body": {"RaidSimRequest": {"duration": 60000, "randomSeed": 0}}
                }),
            ),
        ];

        for (request, expected) in cases {
            let bytes = serialize_request(&request).unwrap();
            let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(value, expected);

            let decoded: SimRequest = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(decoded, request);
        }
    }

    #[test]
    fn test_request_rejects_unknown_command() {
        let result: std::result::Result<SimRequest, _> =
            serde_json::from_str(r#"{"command": "FLY", "body": null}"#);
        assert!(result.is_err());

        let result: std::result::Result<SimRequest, _> =
            serde_json::from_str(r#"{"command": "CAST", "body": null}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_response_from_simulator() {
        let json = br#"{"Success":true,"Body":{"dps":1000,"isDone":false}}"#;
        let response = deserialize_response(json).unwrap();

        assert!(response.success);
        assert_eq!(response.into_result("GET_STATE").unwrap()["dps"], 1000);
    }

    #[test]
    fn test_failed_response_is_application_error() {
        let json = br#"{"Success":false,"Body":"Spell not ready"}"#;
        let err = deserialize_response(json)
            .unwrap()
            .into_result("CAST")
            .unwrap_err();

        match err {
            SimError::Application { command, body } => {
                assert_eq!(command, "CAST");
                assert_eq!(body, "Spell not ready");
            }
            other => panic!("Wrong error: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_response_document() {
        let err = deserialize_response(b"{\"Body\": 1}").unwrap_err();
        assert!(matches!(err, SimError::Protocol(_)));
    }
}
