//! Raspberry Pi 40-pin header map.
//!
//! Single source of truth for translating between physical header
//! positions (BOARD numbering) and Broadcom channel numbers (BCM).  The
//! real pin backend resolves every configured pin through here once.

use crate::config::PinNumbering;
use crate::error::HardwareError;

/// Highest BCM channel exposed on the 40-pin header.
pub const MAX_BCM_GPIO: u8 = 27;

/// Number of physical header positions.
pub const HEADER_PINS: u8 = 40;

// ---------------------------------------------------------------------------
// Header position -> BCM channel
// ---------------------------------------------------------------------------

/// `(header position, BCM channel)` for every header pin with a GPIO
/// function.  Power and ground positions are absent.
const BOARD_TO_BCM: [(u8, u8); 28] = [
    (3, 2),
    (5, 3),
    (7, 4),
    (8, 14),
    (10, 15),
    (11, 17),
    (12, 18),
    (13, 27),
    (15, 22),
    (16, 23),
    (18, 24),
    (19, 10),
    (21, 9),
    (22, 25),
    (23, 11),
    (24, 8),
    (26, 7),
    (27, 0),
    (28, 1),
    (29, 5),
    (31, 6),
    (32, 12),
    (33, 13),
    (35, 19),
    (36, 16),
    (37, 26),
    (38, 20),
    (40, 21),
];

/// Map a header position to its BCM channel.
pub fn board_to_bcm(header_pin: u8) -> Result<u8, HardwareError> {
    if header_pin == 0 || header_pin > HEADER_PINS {
        return Err(HardwareError::PinOutOfRange(header_pin));
    }
    BOARD_TO_BCM
        .iter()
        .find(|(board, _)| *board == header_pin)
        .map(|(_, bcm)| *bcm)
        .ok_or(HardwareError::NotAGpio(header_pin))
}

/// Resolve a configured pin number to a BCM channel under `numbering`.
pub fn resolve(numbering: PinNumbering, pin: u8) -> Result<u8, HardwareError> {
    match numbering {
        PinNumbering::Bcm if pin <= MAX_BCM_GPIO => Ok(pin),
        PinNumbering::Bcm => Err(HardwareError::PinOutOfRange(pin)),
        PinNumbering::Board => board_to_bcm(pin),
    }
}
