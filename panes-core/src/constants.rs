/// Application-wide constants shared by every window.
/// Distances are screen pixels and times are milliseconds unless noted otherwise.
pub const CHANNEL_NAME: &str = "panes-msg-channel";

/// Shared store key holding the id of the current authority.
pub const HOST_KEY: &str = "host";
/// Shared store key holding the ordered list of live window ids.
pub const WINDOWS_KEY: &str = "windows";
/// Shared store key holding the serialized [`crate::Settings`].
pub const SETTINGS_KEY: &str = "settings";
/// Shared store key holding the authority's last liveness timestamp.
pub const HEARTBEAT_KEY: &str = "host-heartbeat";

/// Default inward offset of the border wall.
pub const BORDER_THICKNESS: f64 = 50.0;

/// Pending requests older than this resolve to `NoResponse`.
pub const REQUEST_TIMEOUT_MS: f64 = 1_000.0;
/// How often the authority refreshes its heartbeat.
pub const HEARTBEAT_INTERVAL_MS: f64 = 500.0;
/// A heartbeat older than this marks the authority as gone.
pub const AUTHORITY_TIMEOUT_MS: f64 = 3_000.0;
/// Poll interval for window movement (browsers have no move event).
pub const MOVE_POLL_MS: i32 = 50;

/// Converts `gravity * gravityScale` (px/ms²) into px/s².
pub const GRAVITY_UNITS: f64 = 1.0e6;
/// Simulation step bounds (ms) so a stalled tab doesn't explode the solver.
pub const MIN_STEP_MS: f64 = 1000.0 / 240.0;
pub const MAX_STEP_MS: f64 = 1000.0 / 30.0;

/// Radius of spawned circles and half-size of spawned squares.
pub const SPAWN_RADIUS: f64 = 80.0;
pub const SPAWN_RESTITUTION: f64 = 1.0;
/// Velocity gain (1/s) pulling a dragged body toward the pointer.
pub const DRAG_GAIN: f64 = 12.0;

pub const MINIMAP_SCALE: f64 = 0.1;
pub const MINIMAP_PADDING: f64 = 5.0;
