use crate::error::{EngineError, Result};

// ------------- Msg -------------
// Message numbers are assigned monotonically by the outside world.
pub type Msg = u64;

// Reserved at both ends of the number space, never a real message.
pub const GENESIS: Msg = 0;
pub const TERMINUS: Msg = Msg::MAX;

/// Fails when the number is one of the two sentinels.
pub fn validate(msg: Msg) -> Result<Msg> {
    if msg == GENESIS || msg == TERMINUS {
        return Err(EngineError::InvalidMessage(msg));
    }
    Ok(msg)
}
