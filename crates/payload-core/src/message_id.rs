//! Message type identifiers.
//!
//! One table for every command the payload understands (uplink) and every
//! reply it can emit (downlink). Each category owns a disjoint range so an
//! ID never means two different things:
//!
//! | Range       | Category                 |
//! |-------------|--------------------------|
//! | 0x00 - 0x0F | time                     |
//! | 0x20 - 0x2F | payload control          |
//! | 0x30 - 0x3F | camera                   |
//! | 0x40 - 0x4F | inference                |
//! | 0x50 - 0x5F | attitude & orbit         |
//! | 0x80 - 0x8F | downlink replies         |
//! | 0xF0 - 0xFF | debug                    |

// ── Time ──────────────────────────────────────────────────────────────────────

pub const SYNCHRONIZE_TIME: u8 = 0x00;
pub const REQUEST_TIME: u8 = 0x01;

// ── Payload control ───────────────────────────────────────────────────────────

pub const REQUEST_PAYLOAD_STATE: u8 = 0x20;
pub const REQUEST_PAYLOAD_MONITORING_DATA: u8 = 0x21;
pub const REQUEST_CAMERA_STATUS: u8 = 0x22;
pub const RESTART_PAYLOAD: u8 = 0x23;
/// Payload sends logs from the last X seconds.
pub const REQUEST_LOGS_FROM_LAST_X_SECONDS: u8 = 0x25;
pub const DELETE_ALL_LOGS: u8 = 0x26;

// ── Camera ────────────────────────────────────────────────────────────────────

pub const CAPTURE_AND_SEND_IMAGE: u8 = 0x30;
pub const REQUEST_LAST_IMAGE: u8 = 0x31;
pub const REQUEST_IMAGE: u8 = 0x32;
pub const REQUEST_IMAGE_METADATA: u8 = 0x33;
pub const REQUEST_IMAGE_STORAGE_INFO: u8 = 0x34;
pub const TURN_ON_CAMERAS: u8 = 0x35;
pub const TURN_OFF_CAMERAS: u8 = 0x36;
pub const ENABLE_CAMERA_X: u8 = 0x37;
pub const DISABLE_CAMERA_X: u8 = 0x38;
pub const CHANGE_CAMERA_RESOLUTION: u8 = 0x39;
pub const DELETE_ALL_STORED_IMAGES: u8 = 0x3A;

// ── Inference ─────────────────────────────────────────────────────────────────

pub const REQUEST_LANDMARKED_IMAGE: u8 = 0x40;
pub const REQUEST_LANDMARKED_IMAGE_METADATA: u8 = 0x41;
pub const DISABLE_REGION_X: u8 = 0x42;
pub const ENABLE_REGION_X: u8 = 0x43;
pub const REQUEST_REGION_X_STATUS: u8 = 0x44;
pub const REQUEST_LAST_OBSERVATIONS_FILE: u8 = 0x45;
pub const RUN_ML_PIPELINE: u8 = 0x46;

// ── Attitude & orbit ──────────────────────────────────────────────────────────

pub const RESET_AOD_STATE: u8 = 0x50;
pub const REQUEST_AOD_LAST_ESTIMATE: u8 = 0x51;
pub const REQUEST_ATTITUDE_ESTIMATE: u8 = 0x52;
pub const REQUEST_ORBIT_ESTIMATE: u8 = 0x53;
/// Propagate the estimate forward to the current time.
pub const RESOLVE_STATE: u8 = 0x54;
pub const REQUEST_LAST_AOD_ESTIMATE_LOGS: u8 = 0x55;
pub const RUN_ATTITUDE_AND_ORBIT_ESTIMATION: u8 = 0x56;

// ── Downlink replies ──────────────────────────────────────────────────────────

/// Body: one byte, the `PayloadState` discriminant.
pub const PAYLOAD_STATE: u8 = 0x80;
/// Body: unix seconds, u64 little-endian.
pub const TIME: u8 = 0x81;
/// Body: the echoed debug payload.
pub const DEBUG_ECHO: u8 = 0x82;
/// Body: `[failed_message_type, utf-8 reason...]`.
pub const TASK_FAILED: u8 = 0x8F;

// ── Debug ─────────────────────────────────────────────────────────────────────

pub const DEBUG_HELLO: u8 = 0xF0;
pub const DEBUG_RANDOM_ERROR: u8 = 0xF1;
pub const DEBUG_GOODBYE: u8 = 0xF2;
pub const DEBUG_NUMBER: u8 = 0xF3;

/// Human-readable name for logging. Unknown IDs map to `"unknown"`.
pub fn name(id: u8) -> &'static str {
    match id {
        SYNCHRONIZE_TIME => "synchronize_time",
        REQUEST_TIME => "request_time",
        REQUEST_PAYLOAD_STATE => "request_payload_state",
        REQUEST_PAYLOAD_MONITORING_DATA => "request_payload_monitoring_data",
        REQUEST_CAMERA_STATUS => "request_camera_status",
        RESTART_PAYLOAD => "restart_payload",
        REQUEST_LOGS_FROM_LAST_X_SECONDS => "request_logs_from_last_x_seconds",
        DELETE_ALL_LOGS => "delete_all_logs",
        CAPTURE_AND_SEND_IMAGE => "capture_and_send_image",
        REQUEST_LAST_IMAGE => "request_last_image",
        REQUEST_IMAGE => "request_image",
        REQUEST_IMAGE_METADATA => "request_image_metadata",
        REQUEST_IMAGE_STORAGE_INFO => "request_image_storage_info",
        TURN_ON_CAMERAS => "turn_on_cameras",
        TURN_OFF_CAMERAS => "turn_off_cameras",
        ENABLE_CAMERA_X => "enable_camera_x",
        DISABLE_CAMERA_X => "disable_camera_x",
        CHANGE_CAMERA_RESOLUTION => "change_camera_resolution",
        DELETE_ALL_STORED_IMAGES => "delete_all_stored_images",
        REQUEST_LANDMARKED_IMAGE => "request_landmarked_image",
        REQUEST_LANDMARKED_IMAGE_METADATA => "request_landmarked_image_metadata",
        DISABLE_REGION_X => "disable_region_x",
        ENABLE_REGION_X => "enable_region_x",
        REQUEST_REGION_X_STATUS => "request_region_x_status",
        REQUEST_LAST_OBSERVATIONS_FILE => "request_last_observations_file",
        RUN_ML_PIPELINE => "run_ml_pipeline",
        RESET_AOD_STATE => "reset_aod_state",
        REQUEST_AOD_LAST_ESTIMATE => "request_aod_last_estimate",
        REQUEST_ATTITUDE_ESTIMATE => "request_attitude_estimate",
        REQUEST_ORBIT_ESTIMATE => "request_orbit_estimate",
        RESOLVE_STATE => "resolve_state",
        REQUEST_LAST_AOD_ESTIMATE_LOGS => "request_last_aod_estimate_logs",
        RUN_ATTITUDE_AND_ORBIT_ESTIMATION => "run_attitude_and_orbit_estimation",
        PAYLOAD_STATE => "payload_state",
        TIME => "time",
        DEBUG_ECHO => "debug_echo",
        TASK_FAILED => "task_failed",
        DEBUG_HELLO => "debug_hello",
        DEBUG_RANDOM_ERROR => "debug_random_error",
        DEBUG_GOODBYE => "debug_goodbye",
        DEBUG_NUMBER => "debug_number",
        _ => "unknown",
    }
}

/// Every assigned ID, uplink and downlink.
pub const ALL: &[u8] = &[
    SYNCHRONIZE_TIME,
    REQUEST_TIME,
    REQUEST_PAYLOAD_STATE,
    REQUEST_PAYLOAD_MONITORING_DATA,
    REQUEST_CAMERA_STATUS,
    RESTART_PAYLOAD,
    REQUEST_LOGS_FROM_LAST_X_SECONDS,
    DELETE_ALL_LOGS,
    CAPTURE_AND_SEND_IMAGE,
    REQUEST_LAST_IMAGE,
    REQUEST_IMAGE,
    REQUEST_IMAGE_METADATA,
    REQUEST_IMAGE_STORAGE_INFO,
    TURN_ON_CAMERAS,
    TURN_OFF_CAMERAS,
    ENABLE_CAMERA_X,
    DISABLE_CAMERA_X,
    CHANGE_CAMERA_RESOLUTION,
    DELETE_ALL_STORED_IMAGES,
    REQUEST_LANDMARKED_IMAGE,
    REQUEST_LANDMARKED_IMAGE_METADATA,
    DISABLE_REGION_X,
    ENABLE_REGION_X,
    REQUEST_REGION_X_STATUS,
    REQUEST_LAST_OBSERVATIONS_FILE,
    RUN_ML_PIPELINE,
    RESET_AOD_STATE,
    REQUEST_AOD_LAST_ESTIMATE,
    REQUEST_ATTITUDE_ESTIMATE,
    REQUEST_ORBIT_ESTIMATE,
    RESOLVE_STATE,
    REQUEST_LAST_AOD_ESTIMATE_LOGS,
    RUN_ATTITUDE_AND_ORBIT_ESTIMATION,
    PAYLOAD_STATE,
    TIME,
    DEBUG_ECHO,
    TASK_FAILED,
    DEBUG_HELLO,
    DEBUG_RANDOM_ERROR,
    DEBUG_GOODBYE,
    DEBUG_NUMBER,
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_collision_free() {
        let unique: HashSet<u8> = ALL.iter().copied().collect();
        assert_eq!(unique.len(), ALL.len(), "duplicate message id in table");
    }

    #[test]
    fn every_id_has_a_name() {
        for id in ALL {
            assert_ne!(name(*id), "unknown", "id 0x{id:02x} has no name");
        }
        assert_eq!(name(0x7F), "unknown");
    }

    #[test]
    fn replies_live_in_downlink_range() {
        for id in [PAYLOAD_STATE, TIME, DEBUG_ECHO, TASK_FAILED] {
            assert!((0x80..=0x8F).contains(&id));
        }
    }
}
