//! EResult codes returned by the CM servers (subset).

pub const INVALID: i32 = 0;
pub const OK: i32 = 1;
pub const FAIL: i32 = 2;
pub const NO_CONNECTION: i32 = 3;
pub const INVALID_PASSWORD: i32 = 5;
pub const ACCESS_DENIED: i32 = 15;
pub const SERVICE_UNAVAILABLE: i32 = 20;
pub const TRY_ANOTHER_CM: i32 = 110;
