// Message types exchanged with the drivetrain coordinator

use serde::{Deserialize, Serialize};

use crate::module::{ModulePosition, ModuleState};

// Request from the coordinator/teleop -> runtime
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModuleRequest {
    /// Chassis-frame wheel state: speed in m/s, angle in radians
    SetState { speed: f64, angle: f64 },
    ResetEncoders,
}

/// Telemetry published by the runtime every cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModuleTelemetry {
    pub state: ModuleState,
    pub position: ModulePosition,
    pub desired: ModuleState,
    pub health: RuntimeHealth,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    /// The last cycle's hardware write or read failed
    Fault,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set_state() {
        let req: ModuleRequest =
            serde_json::from_str(r#"{"type":"set_state","speed":1.5,"angle":-0.25}"#).unwrap();
        assert_eq!(
            req,
            ModuleRequest::SetState {
                speed: 1.5,
                angle: -0.25
            }
        );
    }

    #[test]
    fn test_parse_reset() {
        let req: ModuleRequest = serde_json::from_str(r#"{"type":"reset_encoders"}"#).unwrap();
        assert_eq!(req, ModuleRequest::ResetEncoders);
    }

    #[test]
    fn test_unknown_request_is_rejected() {
        assert!(serde_json::from_str::<ModuleRequest>(r#"{"type":"spin"}"#).is_err());
        assert!(serde_json::from_str::<ModuleRequest>(r#"{"speed":1.0,"angle":0.0}"#).is_err());
    }

    #[test]
    fn test_telemetry_shape() {
        let telemetry = ModuleTelemetry {
            state: ModuleState::new(0.5, 0.1),
            position: ModulePosition {
                distance: 2.0,
                angle: 0.1,
            },
            desired: ModuleState::new(0.5, 0.1),
            health: RuntimeHealth::CmdStale,
        };
        let json = serde_json::to_value(telemetry).unwrap();
        assert_eq!(json["state"]["speed"], 0.5);
        assert_eq!(json["position"]["distance"], 2.0);
        assert_eq!(json["health"], "cmd_stale");
    }
}
