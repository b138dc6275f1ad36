/// Side length of a block, in grid units.
pub const BLOCK_SIZE: i64 = 32;

/// Blocks on each side of the containing block included in a neighborhood.
pub const NEIGHBORHOOD_RADIUS: i64 = 1;

/// Bits created without explicit coordinates spawn in `[-SPAWN_RADIUS, SPAWN_RADIUS]`.
pub const SPAWN_RADIUS: i64 = 16;

pub const TICK_MS: u64 = 300;

/// Size of one grid unit on the client canvas.
pub const GRID_UNIT_PX: i64 = 16;

pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_WS_PATH: &str = "/ws";

/// Largest accepted coordinate magnitude. Matches the largest integer a JSON
/// client can represent exactly; block arithmetic never overflows below it.
pub const MAX_COORDINATE: i64 = 9_007_199_254_740_991;
